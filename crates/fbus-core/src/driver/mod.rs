//! The driver subsystem.
//!
//! Everything a client message can cause goes through [`dispatch`]: calls
//! to the bus's own `org.freedesktop.DBus` endpoint, unicast forwarding
//! with reply tracking, broadcast fan-out over the match registry,
//! activation capture, and reply routing. Monitors are mirrored before any
//! real delivery. Peer teardown runs [`peer_disconnected`], which releases
//! every resource in a fixed order.
//!
//! Error tiers: client mistakes are answered over the bus (unless the call
//! asked for no reply), protocol violations bubble to the transport as
//! [`DispatchError::ProtocolViolation`] to drop the peer, and broker-side
//! encoding failures are fatal.

mod encoder;
mod error;
mod methods;
mod notify;

use std::collections::BTreeSet;
use std::sync::Arc;

use fbus_types::protocol::{DRIVER_NAME, HEADER_FLAG_NO_AUTO_START};
use fbus_types::{MessageType, PeerId};
use fbus_wire::{Message, Value};

use crate::activation::ActivationMessage;
use crate::bus::Bus;
use crate::match_rule::MatchSender;
use crate::peer::{Peer, PeerState};
use crate::policy::{PeerNames, PolicySnapshot};

pub use error::{DispatchError, DriverError, FatalError};

use methods::MethodCtx;

/// Route one inbound message from `peer`.
///
/// The transport hands over the complete wire image; a
/// [`DispatchError::ProtocolViolation`] result means the peer must be
/// dropped, a fatal result stops the broker.
pub fn dispatch(bus: &mut Bus, peer: PeerId, data: Vec<u8>) -> Result<(), DispatchError> {
    let Some(state) = bus.peers.get(peer) else {
        // the transport can race a disconnect; nothing left to route
        return Ok(());
    };
    if state.is_monitor() {
        return Err(DispatchError::ProtocolViolation);
    }

    let mut message = match Message::parse(data) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(peer = %peer, %error, "dropping malformed message");
            return Err(DispatchError::ProtocolViolation);
        }
    };
    // clients cannot forge identity
    message.stitch_sender(peer);
    let message = Arc::new(message);

    mirror_to_monitors(bus, Some(peer), &message);

    match dispatch_internal(bus, peer, &message) {
        Ok(()) => Ok(()),
        Err(
            DriverError::PeerNotRegistered
            | DriverError::InvalidMessage
            | DriverError::ProtocolViolation,
        ) => Err(DispatchError::ProtocolViolation),
        Err(DriverError::Fatal(fatal)) => Err(DispatchError::Fatal(fatal)),
        Err(error) => {
            if let Some(name) = error.dbus_error_name() {
                send_error_reply(bus, peer, message.read_serial(), name, &error.to_string())?;
            }
            Ok(())
        }
    }
}

fn dispatch_internal(
    bus: &mut Bus,
    peer: PeerId,
    message: &Arc<Message>,
) -> Result<(), DriverError> {
    let meta = message.metadata();
    let serial = message.read_serial();

    // a method call without a destination addresses a pseudo-peer that
    // only implements org.freedesktop.DBus.Peer
    if meta.kind == Some(MessageType::MethodCall) && meta.fields.destination.is_none() {
        if meta
            .fields
            .interface
            .as_deref()
            .is_some_and(|i| i != "org.freedesktop.DBus.Peer")
        {
            return Err(DriverError::UnexpectedMethod);
        }
        return methods::dispatch_method(bus, peer, methods::PEER_METHODS, serial, message);
    }

    if meta.fields.destination.as_deref() == Some(DRIVER_NAME) {
        return dispatch_driver(bus, peer, serial, message);
    }

    if !bus.peers.get(peer).is_some_and(Peer::is_registered) {
        return Err(DriverError::PeerNotRegistered);
    }

    let Some(destination) = meta.fields.destination.clone() else {
        if meta.kind == Some(MessageType::Signal) {
            return forward_broadcast(bus, peer, message);
        }
        return Err(DriverError::UnexpectedMessageType);
    };

    match meta.kind {
        Some(MessageType::Signal | MessageType::MethodCall) => {
            forward_unicast(bus, peer, &destination, message)
        }
        Some(MessageType::MethodReturn | MessageType::Error) => {
            // required header field for both types, present after parse
            let reply_serial = meta.fields.reply_serial.unwrap_or(0);
            queue_reply(bus, peer, &destination, reply_serial, message)
        }
        _ => Err(DriverError::UnexpectedMessageType),
    }
}

/// Calls addressed to the reserved name.
fn dispatch_driver(
    bus: &mut Bus,
    peer: PeerId,
    serial: u32,
    message: &Arc<Message>,
) -> Result<(), DriverError> {
    let meta = message.metadata();

    // anything but a method call addressed to the driver is dropped
    if meta.kind != Some(MessageType::MethodCall) {
        return Ok(());
    }

    let interface = meta.fields.interface.as_deref();
    let member = meta.fields.member.as_deref();
    let path = meta.fields.path.as_deref();

    let allowed = bus
        .peers
        .get(peer)
        .ok_or(DriverError::PeerNotFound)?
        .policy
        .check_send(
            Some(PeerNames::Driver),
            interface,
            member,
            path,
            meta.raw_type,
            false,
        )
        .is_ok();
    if !allowed {
        tracing::warn!(
            peer = %peer,
            "A security policy denied {} to send method call {}:{}.{} to org.freedesktop.DBus.",
            peer,
            path.unwrap_or(""),
            interface.unwrap_or(""),
            member.unwrap_or("")
        );
        return Err(DriverError::SendDenied);
    }

    let registered = bus.peers.get(peer).is_some_and(Peer::is_registered);
    match methods::dispatch_interfaces(bus, peer, serial, message) {
        Err(DriverError::UnexpectedInterface | DriverError::UnexpectedMethod) if !registered => {
            // Hello is the only call an unregistered peer may make
            Err(DriverError::PeerNotYetRegistered)
        }
        other => other,
    }
}

/// Identity under which a unicast delivery is judged. Live sends borrow
/// from the sending peer; activation replay restores the snapshot taken at
/// capture time.
pub(crate) struct SenderSnapshot {
    pub id: PeerId,
    pub unique: String,
    pub names: BTreeSet<String>,
    pub policy: Arc<PolicySnapshot>,
    /// Whether the sender is still connected; reply slots are only
    /// registered for the living.
    pub alive: bool,
}

fn forward_unicast(
    bus: &mut Bus,
    sender: PeerId,
    destination: &str,
    message: &Arc<Message>,
) -> Result<(), DriverError> {
    if let Some(receiver) = bus.find_peer_by_name(destination) {
        let snapshot = {
            let peer = bus.peers.get(sender).ok_or(DriverError::PeerNotFound)?;
            SenderSnapshot {
                id: sender,
                unique: peer.unique_name().to_owned(),
                names: peer.owned_names.clone(),
                policy: Arc::clone(&peer.policy),
                alive: true,
            }
        };
        return queue_unicast(bus, &snapshot, receiver, message);
    }

    if message.metadata().flags & HEADER_FLAG_NO_AUTO_START != 0 {
        return Err(DriverError::DestinationNotFound);
    }

    // capture into the destination's activation, if it has one
    let max_entries = bus.limits.max_activation_entries;
    let captured = {
        let peer = bus.peers.get(sender).ok_or(DriverError::PeerNotFound)?;
        ActivationMessage {
            message: Arc::clone(message),
            sender,
            sender_names: peer.owned_names.clone(),
            sender_unique: peer.unique_name().to_owned(),
            sender_policy: Arc::clone(&peer.policy),
            sender_uid: peer.credentials.uid,
        }
    };
    let Some(activation) = bus
        .names
        .get_mut(destination)
        .and_then(|entry| entry.activation.as_mut())
    else {
        return Err(DriverError::NameNotActivatable);
    };
    activation
        .queue_message(captured, max_entries)
        .map_err(|_| DriverError::Quota)?;
    if !activation.requested {
        activation.requested = true;
        bus.controller
            .request_service_start(destination)
            .map_err(|_| DriverError::ForwardFailed)?;
    }
    Ok(())
}

/// Policy-checked, reply-tracked delivery to one receiver.
pub(crate) fn queue_unicast(
    bus: &mut Bus,
    sender: &SenderSnapshot,
    receiver_id: PeerId,
    message: &Arc<Message>,
) -> Result<(), DriverError> {
    let meta = message.metadata();
    let interface = meta.fields.interface.as_deref();
    let member = meta.fields.member.as_deref();
    let path = meta.fields.path.as_deref();

    {
        let receiver = bus
            .peers
            .get(receiver_id)
            .ok_or(DriverError::DestinationNotFound)?;
        sender
            .policy
            .check_send(
                Some(PeerNames::Names {
                    unique: receiver.unique_name(),
                    owned: &receiver.owned_names,
                }),
                interface,
                member,
                path,
                meta.raw_type,
                false,
            )
            .map_err(|_| DriverError::SendDenied)?;
        receiver
            .policy
            .check_receive(
                Some(PeerNames::Names {
                    unique: &sender.unique,
                    owned: &sender.names,
                }),
                interface,
                member,
                path,
                meta.raw_type,
                false,
            )
            .map_err(|_| DriverError::ReceiveDenied)?;
    }

    let wants_reply =
        meta.kind == Some(MessageType::MethodCall) && message.read_serial() != 0 && sender.alive;
    if wants_reply {
        if bus
            .peers
            .get(sender.id)
            .ok_or(DriverError::PeerNotFound)?
            .owned_replies
            .len()
            >= bus.limits.max_replies_per_peer
        {
            return Err(DriverError::Quota);
        }
        bus.peers
            .get_mut(receiver_id)
            .ok_or(DriverError::DestinationNotFound)?
            .replies
            .add(sender.id, meta.serial)
            .map_err(|_| DriverError::ExpectedReplyExists)?;
        if let Some(waiter) = bus.peers.get_mut(sender.id) {
            waiter.owned_replies.insert((receiver_id, meta.serial));
        }
    }

    let queued = bus
        .peers
        .get_mut(receiver_id)
        .ok_or(DriverError::DestinationNotFound)?
        .connection
        .queue(Arc::clone(message));
    if queued.is_err() {
        // roll the slot back before bouncing the quota to the sender
        if wants_reply {
            if let Some(receiver) = bus.peers.get_mut(receiver_id) {
                receiver.replies.remove(sender.id, meta.serial);
            }
            if let Some(waiter) = bus.peers.get_mut(sender.id) {
                waiter.owned_replies.remove(&(receiver_id, meta.serial));
            }
        }
        return Err(DriverError::Quota);
    }
    Ok(())
}

fn forward_broadcast(
    bus: &mut Bus,
    sender_id: PeerId,
    message: &Arc<Message>,
) -> Result<(), DriverError> {
    let meta = message.metadata();
    let interface = meta.fields.interface.as_deref();
    let member = meta.fields.member.as_deref();
    let path = meta.fields.path.as_deref();

    let destinations: Vec<PeerId> = {
        let sender = bus.peers.get(sender_id).ok_or(DriverError::PeerNotFound)?;
        let ctx = MatchSender::Peer {
            id: sender_id,
            unique: sender.unique_name(),
            owned: &sender.owned_names,
        };
        bus.matches
            .destinations(meta, &ctx)
            .into_iter()
            .filter(|&id| {
                let Some(receiver) = bus.peers.get(id) else {
                    return false;
                };
                // a denial skips this receiver, not the whole broadcast
                sender
                    .policy
                    .check_send(
                        Some(PeerNames::Names {
                            unique: receiver.unique_name(),
                            owned: &receiver.owned_names,
                        }),
                        interface,
                        member,
                        path,
                        meta.raw_type,
                        true,
                    )
                    .is_ok()
                    && receiver
                        .policy
                        .check_receive(
                            Some(PeerNames::Names {
                                unique: sender.unique_name(),
                                owned: &sender.owned_names,
                            }),
                            interface,
                            member,
                            path,
                            meta.raw_type,
                            true,
                        )
                        .is_ok()
            })
            .collect()
    };

    for id in destinations {
        let Some(receiver) = bus.peers.get_mut(id) else {
            continue;
        };
        if receiver.connection.queue(Arc::clone(message)).is_err() {
            receiver.connection.shutdown();
            tracing::warn!(
                peer = %id,
                "Peer {} is being disconnected as it does not have the resources \
                 to receive a signal it subscribed to.",
                id
            );
        }
    }
    Ok(())
}

/// Route a method return or error to whoever registered the slot.
fn queue_reply(
    bus: &mut Bus,
    responder: PeerId,
    destination: &str,
    reply_serial: u32,
    message: &Arc<Message>,
) -> Result<(), DriverError> {
    let Some(waiter) = methods::resolve_unique(destination) else {
        return Err(DriverError::UnexpectedReply);
    };
    let consumed = bus
        .peers
        .get_mut(responder)
        .ok_or(DriverError::PeerNotFound)?
        .replies
        .consume(waiter, reply_serial);
    if !consumed {
        return Err(DriverError::UnexpectedReply);
    }

    if let Some(waiter_peer) = bus.peers.get_mut(waiter) {
        waiter_peer.owned_replies.remove(&(responder, reply_serial));
        if waiter_peer.connection.queue(Arc::clone(message)).is_err() {
            waiter_peer.connection.shutdown();
            tracing::warn!(
                peer = %waiter,
                "Peer {} is being disconnected as it does not have the resources \
                 to receive a reply or unicast signal it expects.",
                waiter
            );
        }
    }
    Ok(())
}

/// Mirror a routed message to every monitor whose rules hit it, before the
/// real receiver sees it. `sender` is `None` for broker-originated
/// traffic.
fn mirror_to_monitors(bus: &mut Bus, sender: Option<PeerId>, message: &Arc<Message>) {
    if bus.monitors.is_empty() {
        return;
    }
    let meta = message.metadata();
    let destinations: Vec<PeerId> = {
        let sender_peer = sender.and_then(|id| bus.peers.get(id));
        let ctx = match (sender, sender_peer) {
            (Some(id), Some(peer)) => MatchSender::Peer {
                id,
                unique: peer.unique_name(),
                owned: &peer.owned_names,
            },
            _ => MatchSender::Driver,
        };
        bus.monitors
            .iter()
            .copied()
            .filter(|&id| {
                bus.peers.get(id).is_some_and(|monitor| {
                    monitor
                        .monitor_rules
                        .iter()
                        .any(|rule| rule.matches(meta, &ctx))
                })
            })
            .collect()
    };

    for id in destinations {
        let Some(monitor) = bus.peers.get_mut(id) else {
            continue;
        };
        if monitor.connection.queue(Arc::clone(message)).is_err() {
            monitor.connection.shutdown();
            tracing::warn!(
                peer = %id,
                "Monitor {} is being disconnected as it does not have the resources \
                 to receive a message it subscribed to.",
                id
            );
        }
    }
}

/// Queue a broker-originated message on one receiver, mirroring monitors
/// first. Queue overflow disconnects the receiver; the broker never
/// retries.
pub(crate) fn send_unicast(bus: &mut Bus, receiver: PeerId, message: Arc<Message>) {
    mirror_to_monitors(bus, None, &message);
    let Some(peer) = bus.peers.get_mut(receiver) else {
        return;
    };
    if peer.connection.queue(message).is_err() {
        peer.connection.shutdown();
        tracing::warn!(
            peer = %receiver,
            "Peer {} is being disconnected as it does not have the resources \
             to receive a reply or unicast signal it expects.",
            receiver
        );
    }
}

/// Answer a call with a driver error, unless the caller declined replies.
pub(crate) fn send_error_reply(
    bus: &mut Bus,
    receiver: PeerId,
    serial: u32,
    error_name: &str,
    text: &str,
) -> Result<(), FatalError> {
    if serial == 0 {
        return Ok(());
    }
    let message = encoder::error(receiver, serial, error_name, text)?;
    send_unicast(bus, receiver, Arc::new(message));
    Ok(())
}

/// Answer a call with a method return, unless the caller declined replies.
pub(crate) fn send_method_return(
    bus: &mut Bus,
    ctx: &MethodCtx,
    body: Vec<Value>,
) -> Result<(), DriverError> {
    debug_assert_eq!(fbus_wire::value::body_signature(&body), ctx.out_sig);
    if ctx.serial == 0 {
        return Ok(());
    }
    let message = encoder::method_return(ctx.peer, ctx.serial, body)?;
    send_unicast(bus, ctx.peer, Arc::new(message));
    Ok(())
}

/// Tear down a peer's bus-visible state in a fixed order. `silent`
/// suppresses all NameOwnerChanged traffic; the monitor transition uses
/// it, disconnect does not.
pub(crate) fn goodbye(bus: &mut Bus, peer: PeerId, silent: bool) -> Result<(), FatalError> {
    // this peer's own subscriptions go first, so it cannot observe its own
    // teardown
    bus.matches.flush_owner(peer);
    if let Some(state) = bus.peers.get_mut(peer) {
        state.match_count = 0;
    }

    // replies this peer was awaiting; the responders' slots just vanish
    let awaited: Vec<(PeerId, u32)> = bus
        .peers
        .get_mut(peer)
        .map(|state| std::mem::take(&mut state.owned_replies).into_iter().collect())
        .unwrap_or_default();
    for (responder, serial) in awaited {
        if let Some(responder) = bus.peers.get_mut(responder) {
            responder.replies.remove(peer, serial);
        }
    }

    // release names, notifying successors unless silent
    let changes = bus.names.release_all(peer);
    if let Some(state) = bus.peers.get_mut(peer) {
        state.owned_names.clear();
    }
    for change in &changes {
        if !silent {
            notify::name_owner_changed(bus, Some(&change.name), change.old_owner, change.new_owner)?;
        }
    }

    match bus.peers.get(peer).map(Peer::state) {
        Some(PeerState::Registered) => {
            if !silent {
                notify::name_owner_changed(bus, None, Some(peer), None)?;
            }
            if let Some(state) = bus.peers.get_mut(peer) {
                state.unregister();
            }
            tracing::info!(peer = %peer, "peer unregistered");
        }
        Some(PeerState::Monitor) => {
            if let Some(state) = bus.peers.get_mut(peer) {
                state.stop_monitor();
            }
            bus.monitors.retain(|&id| id != peer);
        }
        _ => {}
    }

    // rules others keyed on this unique name can never match again
    let owners = bus.matches.flush_peer_keys(peer);
    for owner in owners {
        if let Some(state) = bus.peers.get_mut(owner) {
            state.match_count = state.match_count.saturating_sub(1);
        }
    }

    // replies this peer owed; every waiter learns the responder is gone
    let owed = bus
        .peers
        .get_mut(peer)
        .map(|state| state.replies.drain())
        .unwrap_or_default();
    for (waiter, serial) in owed {
        if let Some(state) = bus.peers.get_mut(waiter) {
            state.owned_replies.remove(&(peer, serial));
        }
        if !silent {
            send_error_reply(
                bus,
                waiter,
                serial,
                "org.freedesktop.DBus.Error.NoReply",
                "Remote peer disconnected",
            )?;
        }
    }

    Ok(())
}

/// Transport-level disconnect: run the goodbye sequence, then drop the
/// peer from the registry.
pub fn peer_disconnected(bus: &mut Bus, peer: PeerId) -> Result<(), FatalError> {
    goodbye(bus, peer, false)?;
    bus.peers.remove(peer);
    Ok(())
}

/// Controller callback: the config reload requested by (`sender`,
/// `serial`) went through.
pub fn reload_config_completed(
    bus: &mut Bus,
    sender: PeerId,
    serial: u32,
) -> Result<(), FatalError> {
    if serial == 0 || bus.peers.get(sender).is_none() {
        return Ok(());
    }
    let message = encoder::method_return(sender, serial, vec![])?;
    send_unicast(bus, sender, Arc::new(message));
    Ok(())
}

/// Controller callback: the new configuration was rejected.
pub fn reload_config_invalid(
    bus: &mut Bus,
    sender: PeerId,
    serial: u32,
) -> Result<(), FatalError> {
    if bus.peers.get(sender).is_none() {
        return Ok(());
    }
    send_error_reply(
        bus,
        sender,
        serial,
        "org.freedesktop.DBus.Error.Failed",
        "Config invalid. Reload ignored.",
    )
}

/// Controller callback: starting the service behind `name` failed.
pub fn activation_failed(bus: &mut Bus, name: &str) -> Result<(), FatalError> {
    notify::name_activation_failed(bus, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    use fbus_types::protocol::DRIVER_PATH;
    use fbus_wire::MessageBuilder;

    use crate::bus::BusConfig;
    use crate::peer::PeerCredentials;

    fn bus_with_peer() -> (Bus, PeerId) {
        let mut bus = Bus::new(BusConfig::default());
        let peer = bus.connect_peer(PeerCredentials::unprivileged(1000, 100));
        (bus, peer)
    }

    fn driver_call(member: &str, serial: u32) -> Vec<u8> {
        MessageBuilder::new(MessageType::MethodCall)
            .serial(serial)
            .destination(DRIVER_NAME)
            .path(DRIVER_PATH)
            .interface(DRIVER_NAME)
            .member(member)
            .build()
            .expect("call should build")
            .data()
            .to_vec()
    }

    fn next_message(bus: &mut Bus, peer: PeerId) -> Arc<Message> {
        bus.peers
            .get_mut(peer)
            .expect("peer exists")
            .connection
            .pop_outgoing()
            .expect("a message was queued")
    }

    #[test]
    fn hello_registers_and_replies_with_unique_name() {
        let (mut bus, peer) = bus_with_peer();
        dispatch(&mut bus, peer, driver_call("Hello", 1)).expect("dispatch succeeds");

        let reply = next_message(&mut bus, peer);
        assert_eq!(reply.metadata().kind, Some(MessageType::MethodReturn));
        assert_eq!(reply.metadata().fields.reply_serial, Some(1));
        let body = reply.read_body("s").expect("body decodes");
        assert_eq!(body[0], Value::Str(peer.unique_name()));
        assert!(bus.peers.get(peer).expect("peer exists").is_registered());
    }

    #[test]
    fn second_hello_is_refused() {
        let (mut bus, peer) = bus_with_peer();
        dispatch(&mut bus, peer, driver_call("Hello", 1)).expect("dispatch succeeds");
        next_message(&mut bus, peer);
        dispatch(&mut bus, peer, driver_call("Hello", 2)).expect("dispatch succeeds");

        let reply = next_message(&mut bus, peer);
        assert_eq!(reply.metadata().kind, Some(MessageType::Error));
        assert_eq!(
            reply.metadata().fields.error_name.as_deref(),
            Some("org.freedesktop.DBus.Error.Failed")
        );
        let body = reply.read_body("s").expect("body decodes");
        assert_eq!(body[0], Value::Str("Hello() already called".into()));
    }

    #[test]
    fn unregistered_peer_gets_access_denied_for_other_methods() {
        let (mut bus, peer) = bus_with_peer();
        dispatch(&mut bus, peer, driver_call("ListNames", 1)).expect("dispatch succeeds");

        let reply = next_message(&mut bus, peer);
        assert_eq!(
            reply.metadata().fields.error_name.as_deref(),
            Some("org.freedesktop.DBus.Error.AccessDenied")
        );
        let body = reply.read_body("s").expect("body decodes");
        assert_eq!(body[0], Value::Str("Hello() was not yet called".into()));
    }

    #[test]
    fn unregistered_forwarding_is_a_protocol_violation() {
        let (mut bus, peer) = bus_with_peer();
        let data = MessageBuilder::new(MessageType::MethodCall)
            .serial(1)
            .destination(":1.99")
            .path("/")
            .member("M")
            .build()
            .expect("call should build")
            .data()
            .to_vec();
        assert!(matches!(
            dispatch(&mut bus, peer, data),
            Err(DispatchError::ProtocolViolation)
        ));
    }

    #[test]
    fn garbage_is_a_protocol_violation() {
        let (mut bus, peer) = bus_with_peer();
        assert!(matches!(
            dispatch(&mut bus, peer, vec![0xde, 0xad, 0xbe, 0xef]),
            Err(DispatchError::ProtocolViolation)
        ));
    }

    #[test]
    fn no_reply_expected_suppresses_even_errors() {
        let (mut bus, peer) = bus_with_peer();
        dispatch(&mut bus, peer, driver_call("Hello", 1)).expect("dispatch succeeds");
        next_message(&mut bus, peer);

        let data = MessageBuilder::new(MessageType::MethodCall)
            .serial(2)
            .flags(fbus_types::protocol::HEADER_FLAG_NO_REPLY_EXPECTED)
            .destination(DRIVER_NAME)
            .path(DRIVER_PATH)
            .interface(DRIVER_NAME)
            .member("AddMatch")
            .arg(Value::Str("bogus".into()))
            .build()
            .expect("call should build")
            .data()
            .to_vec();
        dispatch(&mut bus, peer, data).expect("dispatch succeeds");
        assert!(bus
            .peers
            .get_mut(peer)
            .expect("peer exists")
            .connection
            .pop_outgoing()
            .is_none());
    }

    #[test]
    fn signature_mismatch_reports_invalid_args() {
        let (mut bus, peer) = bus_with_peer();
        dispatch(&mut bus, peer, driver_call("Hello", 1)).expect("dispatch succeeds");
        next_message(&mut bus, peer);

        // GetNameOwner declares "s" but is called with "su"
        let data = MessageBuilder::new(MessageType::MethodCall)
            .serial(2)
            .destination(DRIVER_NAME)
            .path(DRIVER_PATH)
            .interface(DRIVER_NAME)
            .member("GetNameOwner")
            .arg(Value::Str("com.x".into()))
            .arg(Value::Uint32(0))
            .build()
            .expect("call should build")
            .data()
            .to_vec();
        dispatch(&mut bus, peer, data).expect("dispatch succeeds");
        let reply = next_message(&mut bus, peer);
        assert_eq!(
            reply.metadata().fields.error_name.as_deref(),
            Some("org.freedesktop.DBus.Error.InvalidArgs")
        );
    }
}
