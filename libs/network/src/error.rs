//! Transport and client error types.

use codec::InternalError;
use thiserror::Error;

/// Failures of the framed TLV transport.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("peer disconnected")]
    Disconnected,

    /// The abort flag was tripped during a blocking receive.
    #[error("receive aborted")]
    Aborted,

    /// The consecutive invalid message limit was reached, the connection
    /// has been closed.
    #[error("too many invalid messages ({0}), disconnecting")]
    TooManyInvalidMessages(usize),

    /// A protocol binding bug surfaced while building a message.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Failures of the EMMG/PDG client API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client already connected")]
    AlreadyConnected,

    #[error("MUX is disconnected")]
    NotConnected,

    /// The synchronous wait elapsed without a response.
    #[error("MUX {0} response timeout")]
    Timeout(&'static str),

    #[error("unexpected response 0x{got:04X} from MUX (expected {expected})")]
    UnexpectedResponse { expected: &'static str, got: u16 },

    /// The peer answered with a channel_error or stream_error; details are
    /// available through `get_last_error_response`.
    #[error("MUX reported an error")]
    PeerError,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
