//! Library entrypoint for `fugue`.
//!
//! The crate contains the semantic builder, the elaborated program
//! representation it produces, and the versioned bytecode codec that
//! round-trips that representation. Execution of the sequential operation
//! subset lives in [`exec`]; the textual assembly writer in [`asm`].

pub mod asm;
pub mod builder;
pub mod codec;
pub mod exec;
pub mod ir;
