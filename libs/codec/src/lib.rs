//! # SimulCrypt TLV Protocol Codec
//!
//! ## Purpose
//!
//! Generic framework for the connection-oriented TLV protocols of the DVB
//! SimulCrypt head-end standard (ETSI TS 103 197). A protocol is declared as
//! a table of commands and parameters with size and occurrence constraints;
//! incoming byte buffers are validated against that table and turned into
//! typed messages, outgoing messages are serialized back to the exact wire
//! form.
//!
//! ## Wire format
//!
//! ```text
//!     generic_message
//!     {
//!         protocol_version      1 byte (only for versioned protocols)
//!         message_type          2 bytes
//!         message_length        2 bytes
//!         for (i=0; i < n; i++)
//!         {
//!             parameter_type    2 bytes
//!             parameter_length  2 bytes
//!             parameter_value   <parameter_length> bytes
//!         }
//!     }
//! ```
//!
//! All multi-byte integers are big-endian. A parameter value may itself be a
//! compound TLV structure described by a child protocol.
//!
//! ## What This Crate Contains
//!
//! - [`Analyzer`]: forward-only cursor over a flat TLV byte stream
//! - [`Protocol`]: declarative command/parameter syntax tables
//! - [`MessageFactory`]: deserialization and validation against a [`Protocol`]
//! - [`Serializer`]: TLV serialization with length back-patching
//! - [`Message`] / [`Body`]: the typed message model shared by all bindings
//! - [`SimulCryptDate`]: the fixed 8-byte SimulCrypt timestamp
//! - [`TlvError`] / [`InternalError`]: the validation error taxonomy
//!
//! ## What This Crate Does NOT Contain
//!
//! - Concrete protocol bindings (ECMG<=>SCS, EMMG/PDG<=>MUX) — `protocols`
//! - Sockets, framing over TCP, client state machines — `network`

pub mod analyzer;
pub mod error;
pub mod factory;
pub mod message;
pub mod protocol;
pub mod serializer;
pub mod timestamp;

pub use analyzer::Analyzer;
pub use error::{InternalError, TlvError};
pub use factory::{MessageFactory, ParamView};
pub use message::{Body, ChannelHeader, Message, StreamHeader};
pub use protocol::{Protocol, ProtocolDefinition};
pub use serializer::Serializer;
pub use timestamp::SimulCryptDate;

/// Protocol version number (8 bits).
pub type Version = u8;
/// Tag of a command or parameter (16 bits).
pub type Tag = u16;
/// Byte count of a TLV value field (16 bits).
pub type Length = u16;

/// Reserved by DVB, usable as a "no value" marker.
pub const NULL_TAG: Tag = 0x0000;
