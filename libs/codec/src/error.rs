//! Error taxonomy for TLV message analysis.

use crate::Tag;
use thiserror::Error;

/// Structural errors from TLV message analysis.
///
/// Each error carries a 16-bit "error information" value suitable for
/// protocol-level error responses: parse-position errors carry a byte offset
/// from the start of the outermost message buffer, count errors carry the
/// offending parameter tag.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TlvError {
    /// The version byte does not match the protocol version.
    #[error("unsupported protocol version at offset {offset}")]
    UnsupportedVersion { offset: u16 },

    /// The buffer is not a well-formed TLV message (truncated or empty).
    #[error("invalid message at offset {offset}")]
    InvalidMessage { offset: u16 },

    /// The command tag is not declared in the protocol.
    #[error("unknown command tag at offset {offset}")]
    UnknownCommandTag { offset: u16 },

    /// A parameter tag is not declared for this command.
    #[error("unknown parameter tag at offset {offset}")]
    UnknownParameterTag { offset: u16 },

    /// A parameter value is outside its declared size range.
    #[error("invalid parameter length at offset {offset}")]
    InvalidParameterLength { offset: u16 },

    /// A parameter occurs more or less often than declared.
    #[error("invalid occurrence count for parameter 0x{tag:04X}")]
    InvalidParameterCount { tag: Tag },

    /// A mandatory parameter is absent.
    #[error("missing mandatory parameter 0x{tag:04X}")]
    MissingParameter { tag: Tag },
}

impl TlvError {
    /// The 16-bit error information for protocol error responses: an offset
    /// for parse-position errors, the raw parameter tag for count errors.
    pub fn error_information(self) -> u16 {
        match self {
            TlvError::UnsupportedVersion { offset }
            | TlvError::InvalidMessage { offset }
            | TlvError::UnknownCommandTag { offset }
            | TlvError::UnknownParameterTag { offset }
            | TlvError::InvalidParameterLength { offset } => offset,
            TlvError::InvalidParameterCount { tag } | TlvError::MissingParameter { tag } => tag,
        }
    }

    /// Shift an offset-kind error by `base` bytes, used to translate errors
    /// reported by a compound-parameter sub-analysis into the coordinate
    /// system of the outermost buffer. Tag-kind errors pass through.
    pub(crate) fn at_offset(self, base: usize) -> TlvError {
        let shift = |offset: u16| offset + base as u16;
        match self {
            TlvError::UnsupportedVersion { offset } => {
                TlvError::UnsupportedVersion { offset: shift(offset) }
            }
            TlvError::InvalidMessage { offset } => TlvError::InvalidMessage { offset: shift(offset) },
            TlvError::UnknownCommandTag { offset } => {
                TlvError::UnknownCommandTag { offset: shift(offset) }
            }
            TlvError::UnknownParameterTag { offset } => {
                TlvError::UnknownParameterTag { offset: shift(offset) }
            }
            TlvError::InvalidParameterLength { offset } => {
                TlvError::InvalidParameterLength { offset: shift(offset) }
            }
            TlvError::InvalidParameterCount { .. } | TlvError::MissingParameter { .. } => self,
        }
    }
}

/// Raised when a protocol binding disagrees with its own syntax declaration:
/// a declared command with no concrete message type, or a parameter fetched
/// with a width the descriptor never pinned. Indicates a bug in the binding,
/// never a peer fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("deserialization internal error: {0}")]
pub struct InternalError(pub String);

impl InternalError {
    pub fn new(msg: impl Into<String>) -> Self {
        InternalError(msg.into())
    }
}
