//! # TSVM
//!
//! Executes loaded assembly over a flat memory of [`Cell`]s: a downward
//! growing stack, a globals window and a bump-allocated heap.

pub mod memory;
pub mod runtime_error;
pub mod vm;

pub use memory::{Cell, Memory};
pub use runtime_error::{Fault, RuntimeError};
pub use vm::{Outcome, Vm, VmConfig};
