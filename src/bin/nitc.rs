use clap::Parser;
use log::info;
use nitlang::driver::{self, CompileError};
use nitlang::lang::CompilationUnit;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Check a NITLang compilation unit and write TSVM assembly for it.
#[derive(Parser, Debug)]
#[command(name = "nitc", version)]
struct Cli {
    /// Postcard-encoded compilation unit written by the front end
    unit: PathBuf,

    /// Where to write the assembly
    #[arg(short, long, default_value = "output.tsvm")]
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match build(&cli.unit, &cli.output) {
        Ok(()) => {
            println!("Assembly written to {}", cli.output.display());
            ExitCode::SUCCESS
        }
        Err(messages) => {
            for message in messages {
                eprintln!("{}", message);
            }
            ExitCode::FAILURE
        }
    }
}

/// Compile `unit` into `output`. On failure returns the lines to report.
fn build(unit: &Path, output: &Path) -> Result<(), Vec<String>> {
    let bytes = fs::read(unit)
        .map_err(|e| vec![format!("Failed to read '{}': {}", unit.display(), e)])?;
    let unit = CompilationUnit::from_bytes(&bytes).map_err(|e| vec![e.to_string()])?;

    let asm = driver::compile(&unit).map_err(|err| {
        let heading = match &err {
            CompileError::Syntax(_) => "Syntax errors found:",
            CompileError::Semantic(_) => "Semantic errors found:",
        };
        let mut lines = vec![heading.to_string()];
        lines.extend(err.messages());
        lines
    })?;
    info!("generated {} bytes of assembly", asm.len());

    fs::write(output, asm)
        .map_err(|e| vec![format!("Failed to write '{}': {}", output.display(), e)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitlang::lang::build::*;
    use nitlang::lang::{Program, Type};
    use std::io::Write;

    fn unit_file(unit: &CompilationUnit) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&unit.to_bytes().unwrap()).unwrap();
        file
    }

    #[test]
    fn test_writes_loadable_assembly() {
        let unit = CompilationUnit::new(Program::new(vec![function(
            "main",
            vec![],
            Type::Null,
            vec![expr(print(int(1)))],
        )]));
        let input = unit_file(&unit);
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.tsvm");

        build(input.path(), &output).unwrap();
        let asm = fs::read_to_string(&output).unwrap();
        assert!(asm.starts_with("proc main\n"), "{}", asm);
        assert!(nitlang::asm::load(&asm).is_ok());
    }

    #[test]
    fn test_reports_semantic_errors_without_writing() {
        let unit = CompilationUnit::new(Program::new(vec![function(
            "main",
            vec![],
            Type::Null,
            vec![expr(print(ident("nope")))],
        )]));
        let input = unit_file(&unit);
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.tsvm");

        let messages = build(input.path(), &output).unwrap_err();
        assert_eq!(messages[0], "Semantic errors found:");
        assert!(messages[1].contains("'nope'"), "{:?}", messages);
        assert!(!output.exists());
    }

    #[test]
    fn test_rejects_garbage_units() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff; 8]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let messages = build(file.path(), &dir.path().join("out.tsvm")).unwrap_err();
        assert!(messages[0].starts_with("cannot decode"), "{:?}", messages);
    }
}
