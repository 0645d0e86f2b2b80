//! # DVB SimulCrypt Protocol Bindings
//!
//! Concrete TLV protocols on top of the generic `codec` framework:
//!
//! - [`ecmgscs`]: ECMG <=> SCS (ETSI TS 103 197), the ECM generation
//!   interface driven by a SimulCrypt Synchronizer
//! - [`emmgmux`]: EMMG/PDG <=> MUX, the EMM/private-data injection interface
//! - [`ducklog`]: a small proprietary protocol shipping sections and tables
//!   over the same framing, for logging pipelines
//!
//! Each binding supplies its tag catalog, the declarative syntax table, the
//! per-command message types gathered in one `Body` sum type, the dispatch
//! from a validated `MessageFactory`, and the mapping from generic TLV
//! errors to the protocol's own error codes.

pub mod ducklog;
pub mod ecmgscs;
pub mod emmgmux;
