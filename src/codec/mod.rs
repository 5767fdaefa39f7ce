//! The versioned bytecode codec: a writer producing the linear format
//! and a two-pass loader that rebuilds the IR graph from it.

pub mod error;
pub mod loader;
pub mod opcodes;
pub mod writer;

pub use error::{CodecError, CodecErrorKind};
pub use loader::{load_program, load_program_from_file};
pub use writer::{write_program, write_program_to_file};
