//! Ownership-change notifications and activation drain.
//!
//! Every primary-owner transition emits, in order: `NameLost` unicast to
//! the old owner, `NameOwnerChanged` broadcast to monitors and matching
//! subscribers, `NameAcquired` unicast to the new owner. When an
//! activatable name gains its owner, the queued start requests and
//! captured messages replay in FIFO order, judged by the policy snapshots
//! taken at capture time.

use std::sync::Arc;

use fbus_types::protocol::START_REPLY_SUCCESS;
use fbus_types::PeerId;
use fbus_wire::Value;

use crate::activation::ActivationMessage;
use crate::bus::Bus;
use crate::driver::error::{DriverError, FatalError};
use crate::driver::{encoder, send_error_reply, send_unicast, SenderSnapshot};
use crate::match_rule::MatchSender;

/// Emit the full notification sequence for one ownership transition.
///
/// `name` is `None` for peer connect/disconnect, where the name in
/// question is the unique name itself.
pub(crate) fn name_owner_changed(
    bus: &mut Bus,
    name: Option<&str>,
    old: Option<PeerId>,
    new: Option<PeerId>,
) -> Result<(), FatalError> {
    debug_assert!(old.is_some() || new.is_some());

    let old_str = old.map(PeerId::unique_name).unwrap_or_default();
    let new_str = new.map(PeerId::unique_name).unwrap_or_default();
    let name = match name {
        Some(name) => name.to_owned(),
        None => {
            if old_str.is_empty() {
                new_str.clone()
            } else {
                old_str.clone()
            }
        }
    };

    if let Some(old) = old {
        let lost = encoder::signal(Some(old), "NameLost", vec![Value::Str(name.clone())])?;
        send_unicast(bus, old, Arc::new(lost));
    }

    broadcast_owner_changed(bus, &name, &old_str, &new_str)?;

    if let Some(new) = new {
        let acquired =
            encoder::signal(Some(new), "NameAcquired", vec![Value::Str(name.clone())])?;
        send_unicast(bus, new, Arc::new(acquired));
    }

    Ok(())
}

/// Broadcast `NameOwnerChanged` to monitors first, then subscribers,
/// each gated by its receive policy.
fn broadcast_owner_changed(
    bus: &mut Bus,
    name: &str,
    old: &str,
    new: &str,
) -> Result<(), FatalError> {
    let message = Arc::new(encoder::signal(
        None,
        "NameOwnerChanged",
        vec![
            Value::Str(name.to_owned()),
            Value::Str(old.to_owned()),
            Value::Str(new.to_owned()),
        ],
    )?);
    let meta = message.metadata();

    let destinations: Vec<PeerId> = {
        let monitors = bus.monitors.iter().filter(|&&id| {
            bus.peers.get(id).is_some_and(|peer| {
                peer.monitor_rules
                    .iter()
                    .any(|rule| rule.matches(meta, &MatchSender::Driver))
            })
        });
        let subscribers = bus.matches.destinations(meta, &MatchSender::Driver);
        monitors
            .copied()
            .chain(subscribers)
            .filter(|&id| {
                bus.peers.get(id).is_some_and(|peer| {
                    peer.policy
                        .check_receive(
                            None,
                            meta.fields.interface.as_deref(),
                            meta.fields.member.as_deref(),
                            meta.fields.path.as_deref(),
                            meta.raw_type,
                            true,
                        )
                        .is_ok()
                })
            })
            .collect()
    };

    for id in destinations {
        let Some(peer) = bus.peers.get_mut(id) else {
            continue;
        };
        if peer.connection.queue(Arc::clone(&message)).is_err() {
            peer.connection.shutdown();
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

/// Drain an activation after its name acquired a primary owner.
pub(crate) fn name_activated(
    bus: &mut Bus,
    name: &str,
    receiver: PeerId,
) -> Result<(), FatalError> {
    let Some(entry) = bus.names.get_mut(name) else {
        return Ok(());
    };
    let Some(activation) = entry.activation.as_mut() else {
        return Ok(());
    };
    let (requests, messages) = activation.drain();

    for request in requests {
        if request.serial == 0 || bus.peers.get(request.sender).is_none() {
            continue;
        }
        let reply = encoder::method_return(
            request.sender,
            request.serial,
            vec![Value::Uint32(START_REPLY_SUCCESS)],
        )?;
        send_unicast(bus, request.sender, Arc::new(reply));
    }

    for captured in messages {
        deliver_captured(bus, receiver, captured)?;
    }

    Ok(())
}

/// Deliver one captured message with its snapshotted sender identity;
/// failures map to error replies to the original sender, if it is still
/// connected.
fn deliver_captured(
    bus: &mut Bus,
    receiver: PeerId,
    captured: ActivationMessage,
) -> Result<(), FatalError> {
    let alive = bus.peers.get(captured.sender).is_some();
    tracing::debug!(
        sender = %captured.sender,
        uid = captured.sender_uid,
        receiver = %receiver,
        "replaying captured activation message"
    );
    let snapshot = SenderSnapshot {
        id: captured.sender,
        unique: captured.sender_unique,
        names: captured.sender_names,
        policy: captured.sender_policy,
        alive,
    };
    let serial = captured.message.read_serial();

    match super::queue_unicast(bus, &snapshot, receiver, &captured.message) {
        Ok(()) => Ok(()),
        Err(
            error @ (DriverError::Quota
            | DriverError::ExpectedReplyExists
            | DriverError::SendDenied
            | DriverError::ReceiveDenied),
        ) => {
            if alive {
                if let Some(dbus_name) = error.dbus_error_name() {
                    send_error_reply(
                        bus,
                        captured.sender,
                        serial,
                        dbus_name,
                        &error.to_string(),
                    )?;
                }
            }
            Ok(())
        }
        Err(DriverError::Fatal(fatal)) => Err(fatal),
        Err(_) => Ok(()),
    }
}

/// Entry point for the controller: activation failed, bounce everything.
pub(crate) fn name_activation_failed(bus: &mut Bus, name: &str) -> Result<(), FatalError> {
    let Some(entry) = bus.names.get_mut(name) else {
        return Ok(());
    };
    let Some(activation) = entry.activation.as_mut() else {
        return Ok(());
    };
    // drain() re-arms `requested` so a future attempt starts the service
    // again
    let (requests, messages) = activation.drain();

    for request in requests {
        if bus.peers.get(request.sender).is_none() {
            continue;
        }
        send_error_reply(
            bus,
            request.sender,
            request.serial,
            "org.freedesktop.DBus.Error.ServiceUnknown",
            "Could not activate remote peer.",
        )?;
    }

    for captured in messages {
        if bus.peers.get(captured.sender).is_none() {
            continue;
        }
        let serial = captured.message.read_serial();
        send_error_reply(
            bus,
            captured.sender,
            serial,
            "org.freedesktop.DBus.Error.NameHasNoOwner",
            "Could not activate remote peer.",
        )?;
    }

    Ok(())
}
