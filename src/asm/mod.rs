//! # TSVM assembly
//!
//! The instruction set shared by the code generator (which emits typed
//! [`Line`]s and renders them) and the virtual machine (which loads text
//! back into a [`Program`]).

pub mod layout;
pub mod loader;
pub mod op;
pub mod program;

pub use loader::{LoadError, load};
pub use op::{ArithOp, Cond, Instr, Intrinsic, Line, Operand, Register, render};
pub use program::Program;
