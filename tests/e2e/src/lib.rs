//! Loopback integration scenarios for the SimulCrypt client runtime.
//!
//! The tests under `tests/` run a mock MUX or ECMG on a localhost TCP
//! listener and drive the real client code against it.
