//! Protocol error types.

use thiserror::Error;

/// Errors that can occur during protocol parsing.
///
/// Any of these is fatal to the connection the frame arrived on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid packet opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("String is missing its NUL terminator")]
    MissingTerminator,

    #[error("Invalid permutation table: {0}")]
    InvalidPermutation(String),
}
