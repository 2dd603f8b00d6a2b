use clap::Parser;
use log::debug;
use nitlang::driver::{self, RunError};
use nitlang::runtime::VmConfig;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

/// Run a TSVM assembly program.
#[derive(Parser, Debug)]
#[command(name = "tsvm", version)]
struct Cli {
    /// Assembly file to run
    file: PathBuf,

    /// Abort after executing this many instructions
    #[arg(long)]
    max_steps: Option<usize>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", cli.file.display(), e);
            process::exit(1);
        }
    };

    let config = VmConfig {
        max_steps: cli.max_steps,
        ..VmConfig::default()
    };
    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();
    let result = driver::run_with_config(&source, config, &mut input, &mut output);

    match result {
        Ok(outcome) => {
            debug!("program finished: {:?}", outcome);
            process::exit(exit_status(outcome.status()));
        }
        Err(err @ RunError::Load(_)) => {
            eprintln!("{}: {}", cli.file.display(), err);
            process::exit(1);
        }
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

/// Truncate a program status to what the platform accepts.
fn exit_status(status: i64) -> i32 {
    status as i32
}
