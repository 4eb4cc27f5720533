//! Foundation types for FrankenBus.
//!
//! This crate is dependency-light on purpose: peer ids and addresses, the
//! string-grammar validators, and the wire-protocol constants shared by the
//! codec and the broker core. Runtime machinery lives in `fbus-core`.

pub mod address;
pub mod protocol;
pub mod validate;

pub use address::{Address, PeerId};
pub use protocol::MessageType;
