//! Text to words: the scanner finds command lines in comment text and the
//! invocation parser splits each one into an argument vector.

pub mod scan;
pub mod shell;
pub mod types;

pub use scan::{DEFAULT_MARKER, Scanner, scan};
pub use shell::parse;
pub use types::{ArgumentVector, CommandLine, ParseError};
