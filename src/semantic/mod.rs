//! # Semantic checking
//!
//! Resolves classes, functions and variables, infers expression types and
//! collects diagnostics. The walk never stops at the first error.

pub mod checker;
pub mod class_table;
pub mod const_eval;
pub mod scope;
pub mod semantic_error;
pub mod type_of;

pub use checker::{Checker, Context};
pub use class_table::{ClassInfo, ClassTable, FieldInfo};
pub use scope::{Symbol, SymbolKind, SymbolTable};
pub use semantic_error::SemanticError;
pub use type_of::type_of;

use crate::lang::Program;
use log::debug;

/// What the checker learned about a program.
#[derive(Debug, Clone)]
pub struct Analysis<'a> {
    pub classes: ClassTable<'a>,
    /// Global scope as it stands after the walk.
    pub symbols: SymbolTable<'a>,
    pub errors: Vec<SemanticError>,
}

impl Analysis<'_> {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn check(program: &Program) -> Analysis<'_> {
    let mut checker = Checker::new();
    checker.check_program(program);
    debug!("semantic check finished with {} errors", checker.errors.len());
    Analysis {
        classes: checker.classes,
        symbols: checker.symbols,
        errors: checker.errors,
    }
}
