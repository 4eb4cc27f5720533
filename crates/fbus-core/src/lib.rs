//! FrankenBus broker core.
//!
//! This crate is the message router of a DBus-compatible broker: the
//! registries (peers, names, matches, replies, activations), the policy
//! and quota layers, and the driver that serves `org.freedesktop.DBus`
//! and routes every client message.
//!
//! The whole core is a single-threaded state machine. The transport layer
//! (sockets, SASL, epoll) lives outside; it feeds complete wire images
//! into [`driver::dispatch`], drains per-peer outgoing queues, and calls
//! [`driver::peer_disconnected`] when a connection dies. Nothing in here
//! blocks, and nothing is shared across threads.

pub mod activation;
pub mod bus;
pub mod connection;
pub mod controller;
pub mod driver;
pub mod limits;
pub mod match_rule;
pub mod name;
pub mod peer;
pub mod policy;
pub mod reply;

pub use bus::{Bus, BusConfig};
pub use controller::{Controller, ControllerError, NullController};
pub use driver::{dispatch, peer_disconnected, DispatchError, DriverError, FatalError};
pub use limits::Limits;
pub use peer::{PeerCredentials, PeerState};
pub use policy::{Access, PolicyConfig, PolicySnapshot};
