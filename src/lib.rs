//! NITLang back end.
//!
//! A parsed program ([`lang`]) is checked by [`semantic`], lowered to TSVM
//! assembly by [`codegen`], and the assembly is loaded by [`asm`] and run by
//! the virtual machine in [`runtime`]. [`driver`] strings the stages
//! together for the `nitc` and `tsvm` binaries.

pub mod asm;
pub mod codegen;
pub mod driver;
pub mod lang;
pub mod runtime;
pub mod semantic;
