//! Pipeline entry points shared by the binaries: compile a unit handed over
//! by the front end, or load and run assembly text.

use crate::asm::{LoadError, load};
use crate::codegen;
use crate::lang::CompilationUnit;
use crate::runtime::{Outcome, RuntimeError, Vm, VmConfig};
use crate::semantic::{self, SemanticError};
use log::debug;
use std::io::{BufRead, Write};
use thiserror::Error;

/// Why a unit produced no assembly. Code generation is skipped on any
/// syntax or semantic error.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{} syntax error(s)", .0.len())]
    Syntax(Vec<String>),
    #[error("{} semantic error(s)", .0.len())]
    Semantic(Vec<SemanticError>),
}

impl CompileError {
    /// One printable line per error.
    pub fn messages(&self) -> Vec<String> {
        match self {
            CompileError::Syntax(errors) => errors.clone(),
            CompileError::Semantic(errors) => errors.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Runtime Error: {0}")]
    Runtime(#[from] RuntimeError),
}

pub fn compile(unit: &CompilationUnit) -> Result<String, CompileError> {
    if !unit.syntax_errors.is_empty() {
        return Err(CompileError::Syntax(unit.syntax_errors.clone()));
    }
    let analysis = semantic::check(&unit.program);
    if !analysis.is_ok() {
        debug!("check failed with {} error(s)", analysis.errors.len());
        return Err(CompileError::Semantic(analysis.errors));
    }
    Ok(codegen::generate(&unit.program, &analysis))
}

pub fn run<R: BufRead, W: Write>(
    source: &str,
    input: &mut R,
    output: &mut W,
) -> Result<Outcome, RunError> {
    run_with_config(source, VmConfig::default(), input, output)
}

pub fn run_with_config<R: BufRead, W: Write>(
    source: &str,
    config: VmConfig,
    input: &mut R,
    output: &mut W,
) -> Result<Outcome, RunError> {
    let program = load(source)?;
    let mut vm = Vm::with_config(config);
    Ok(vm.run(&program, input, output)?)
}
