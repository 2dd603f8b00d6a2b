//! Memory layout and calling-convention constants shared by the code
//! generator and the virtual machine.
//!
//! ```text
//!   0 ........ 9000   stack (grows down from STACK_TOP)
//!   10000 .... 20000  globals window
//!   20000 ....        heap (bump allocated, grows up)
//! ```

/// Number of addressable cells.
pub const MEMORY_SIZE: usize = 50_000;

/// Initial value of `sp` and `fp`.
pub const STACK_TOP: i64 = 9_000;

/// Address of global variable offset 0.
pub const GLOBAL_BASE: i64 = 10_000;

/// First heap address handed out by `mem`.
pub const HEAP_BASE: i64 = 20_000;

/// Procedure the machine enters after global initialization.
pub const ENTRY_PROC: &str = "main";

/// Return address pushed before entering `main`; popping it ends the run.
pub const RETURN_SENTINEL: i64 = -1;

/// Exit status used by generated code on a null dereference or null store.
pub const NULL_DEREF_EXIT: i64 = 1;

/// Offset from `fp` of the first parameter (`fp+0` saved fp, `fp+1` return
/// address).
pub const FIRST_PARAM_OFFSET: i64 = 2;

/// Offset below `fp` of the first local.
pub const FIRST_LOCAL_OFFSET: i64 = 1;
