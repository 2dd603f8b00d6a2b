use super::node::{ClassDecl, FunctionDecl, Stmt};
use serde::{Deserialize, Serialize};

/// A parsed NITLang program: the ordered top-level statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.statements.iter().filter_map(|stmt| match stmt {
            Stmt::Class(class) => Some(class),
            _ => None,
        })
    }

    /// Top-level functions only; methods live inside their classes.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.statements.iter().filter_map(|stmt| match stmt {
            Stmt::Function(func) => Some(func),
            _ => None,
        })
    }
}

/// What the front end hands over: the tree plus whatever syntax errors it
/// recovered from while building it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub program: Program,
    pub syntax_errors: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("cannot encode compilation unit: {0}")]
    Encode(#[source] postcard::Error),
    #[error("cannot decode compilation unit: {0}")]
    Decode(#[source] postcard::Error),
}

impl CompilationUnit {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            syntax_errors: Vec::new(),
        }
    }

    /// Postcard encoding used between the front end and `nitc`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, UnitError> {
        postcard::to_allocvec(self).map_err(UnitError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnitError> {
        postcard::from_bytes(bytes).map_err(UnitError::Decode)
    }
}
