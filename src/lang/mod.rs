//! # NITLang syntax tree
//!
//! The tree is produced by an external front end and consumed by the
//! semantic checker and the code generator. It is never mutated after
//! construction.
//!
//! Literals and identifiers are leaves (`Expr::Int`, `Expr::Ident`, ...);
//! everything else is a structured node.

pub mod build;
pub mod node;
pub mod program;
pub mod types;

pub use node::{
    BinaryOp, ClassDecl, Expr, FunctionDecl, LValue, Lambda, Param, Stmt, UnaryOp, VarDecl,
};
pub use program::{CompilationUnit, Program, UnitError};
pub use types::Type;
