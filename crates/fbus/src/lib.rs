//! Public API facade for FrankenBus.
//!
//! Embedders get the bus state machine and the wire codec from one place;
//! internal crates stay re-exported wholesale until the surface
//! stabilizes.

pub use fbus_core::{
    dispatch, peer_disconnected, Access, Bus, BusConfig, Controller, ControllerError,
    DispatchError, DriverError, FatalError, Limits, NullController, PeerCredentials, PeerState,
    PolicyConfig, PolicySnapshot,
};
pub use fbus_types::{protocol, validate, Address, MessageType, PeerId};
pub use fbus_wire::{Endian, Message, MessageBuilder, Value, WireError};

pub use fbus_core;
pub use fbus_types;
pub use fbus_wire;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_construction_and_identity() {
        let mut config = BusConfig::default();
        config.guid = [0xab; 16];
        config.machine_id = "9b04c34c7e304a2b82b82b729fd32e69".to_owned();
        let bus = Bus::new(config);
        assert_eq!(bus.guid_hex(), "ab".repeat(16));
        assert_eq!(bus.machine_id(), "9b04c34c7e304a2b82b82b729fd32e69");
    }

    #[test]
    fn test_public_api_hello_round_trip() {
        let mut bus = Bus::new(BusConfig::default());
        let peer = bus.connect_peer(PeerCredentials::unprivileged(1000, 100));

        let call = MessageBuilder::new(MessageType::MethodCall)
            .serial(1)
            .destination(protocol::DRIVER_NAME)
            .path(protocol::DRIVER_PATH)
            .interface(protocol::DRIVER_NAME)
            .member("Hello")
            .build()
            .expect("call should build");
        dispatch(&mut bus, peer, call.data().to_vec()).expect("dispatch should succeed");

        let reply = bus
            .peers
            .get_mut(peer)
            .expect("peer exists")
            .connection
            .pop_outgoing()
            .expect("reply queued");
        let body = reply.read_body("s").expect("body decodes");
        assert_eq!(body[0], Value::Str(peer.unique_name()));
    }

    #[test]
    fn test_disconnect_removes_peer() {
        let mut bus = Bus::new(BusConfig::default());
        let peer = bus.connect_peer(PeerCredentials::unprivileged(1000, 100));
        peer_disconnected(&mut bus, peer).expect("teardown should succeed");
        assert!(bus.peers.get(peer).is_none());
    }
}
