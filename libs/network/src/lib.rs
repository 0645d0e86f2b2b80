//! # SimulCrypt Network Runtime
//!
//! Blocking-I/O transport and client state machines for the DVB SimulCrypt
//! TLV protocols:
//!
//! - [`Connection`]: framed TLV messages over one TCP association, with
//!   atomic sends, invalid-message accounting and automatic error replies
//! - [`EmmgClient`]: the EMMG/PDG side of the EMMG/PDG <=> MUX protocol —
//!   channel and stream negotiation, keep-alive auto-replies, synchronous
//!   request/response, TCP or UDP data provision
//! - [`ProtocolLogger`]: per-tag severity logging of protocol messages
//! - [`AbortFlag`]: cooperative cancellation of blocking receives
//!
//! Concurrency model: parallel OS threads over blocking sockets. Each client
//! owns one receiver thread; any number of application threads may send.

pub mod abort;
pub mod connection;
pub mod emmg_client;
pub mod error;
pub mod logger;

pub use abort::AbortFlag;
pub use connection::Connection;
pub use emmg_client::{ConnectConfig, EmmgClient};
pub use error::{ClientError, ConnectionError};
pub use logger::ProtocolLogger;
