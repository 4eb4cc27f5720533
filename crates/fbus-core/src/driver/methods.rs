//! The driver's method tables and handlers.
//!
//! Five interfaces are served on the reserved name. Each table entry
//! declares the member name, whether the caller must have said `Hello`,
//! an optional pinned object path, and the input/output body signatures.
//! Dispatch is a linear scan; when the caller omitted the interface, every
//! table is scanned and the first member match wins.
//!
//! Handlers send their own replies so they control the ordering between
//! the reply and any signals they raise, exactly like the reference
//! broker: `Hello` replies before `NameOwnerChanged`, `RequestName`
//! notifies before replying.

use fbus_types::protocol::{
    DRIVER_NAME, DRIVER_PATH, RELEASE_NAME_REPLY_NON_EXISTENT, RELEASE_NAME_REPLY_NOT_OWNER,
    RELEASE_NAME_REPLY_RELEASED, REQUEST_NAME_REPLY_ALREADY_OWNER, REQUEST_NAME_REPLY_EXISTS,
    REQUEST_NAME_REPLY_IN_QUEUE, REQUEST_NAME_REPLY_PRIMARY_OWNER, START_REPLY_ALREADY_RUNNING,
};
use fbus_types::{validate, Address, PeerId};
use fbus_wire::{Message, Value};

use crate::activation::ActivationRequest;
use crate::bus::Bus;
use crate::driver::error::DriverError;
use crate::driver::{notify, send_method_return};
use crate::match_rule::{MatchError, MatchRule};
use crate::name::{ReleaseReply, RequestReply};

/// Context handed to every handler.
pub(crate) struct MethodCtx {
    pub peer: PeerId,
    /// Reply serial; 0 when the caller does not want a reply.
    pub serial: u32,
    /// Declared output body signature of the method.
    pub out_sig: &'static str,
}

type MethodFn = fn(&mut Bus, &MethodCtx, &str, &[Value]) -> Result<(), DriverError>;

/// One entry of an interface's method table.
pub(crate) struct DriverMethod {
    name: &'static str,
    needs_registration: bool,
    path: Option<&'static str>,
    in_sig: &'static str,
    out_sig: &'static str,
    handler: MethodFn,
}

struct DriverInterface {
    name: &'static str,
    methods: &'static [DriverMethod],
}

macro_rules! method {
    ($name:literal, $reg:expr, $path:expr, $in:literal, $out:literal, $handler:path) => {
        DriverMethod {
            name: $name,
            needs_registration: $reg,
            path: $path,
            in_sig: $in,
            out_sig: $out,
            handler: $handler,
        }
    };
}

static DBUS_METHODS: &[DriverMethod] = &[
    method!("Hello", false, None, "", "s", hello),
    method!("AddMatch", true, None, "s", "", add_match),
    method!("RemoveMatch", true, None, "s", "", remove_match),
    method!("RequestName", true, None, "su", "u", request_name),
    method!("ReleaseName", true, None, "s", "u", release_name),
    method!("GetConnectionCredentials", true, None, "s", "a{sv}", get_connection_credentials),
    method!("GetConnectionUnixUser", true, None, "s", "u", get_connection_unix_user),
    method!("GetConnectionUnixProcessID", true, None, "s", "u", get_connection_unix_process_id),
    method!("GetAdtAuditSessionData", true, None, "s", "ay", get_adt_audit_session_data),
    method!(
        "GetConnectionSELinuxSecurityContext",
        true,
        None,
        "s",
        "ay",
        get_connection_selinux_security_context
    ),
    method!("StartServiceByName", true, None, "su", "u", start_service_by_name),
    method!("ListQueuedOwners", true, None, "s", "as", list_queued_owners),
    method!("ListNames", true, None, "", "as", list_names),
    method!("ListActivatableNames", true, None, "", "as", list_activatable_names),
    method!("NameHasOwner", true, None, "s", "b", name_has_owner),
    method!(
        "UpdateActivationEnvironment",
        true,
        Some(DRIVER_PATH),
        "a{ss}",
        "",
        update_activation_environment
    ),
    method!("GetNameOwner", true, None, "s", "s", get_name_owner),
    method!("ReloadConfig", true, None, "", "", reload_config),
    method!("GetId", true, None, "", "s", get_id),
];

static MONITORING_METHODS: &[DriverMethod] =
    &[method!("BecomeMonitor", true, Some(DRIVER_PATH), "asu", "", become_monitor)];

static INTROSPECTABLE_METHODS: &[DriverMethod] =
    &[method!("Introspect", true, None, "", "s", introspect)];

pub(crate) static PEER_METHODS: &[DriverMethod] = &[
    method!("Ping", true, None, "", "", ping),
    method!("GetMachineId", true, None, "", "s", get_machine_id),
];

static PROPERTIES_METHODS: &[DriverMethod] = &[
    method!("Get", true, Some(DRIVER_PATH), "ss", "v", properties_get),
    method!("Set", true, Some(DRIVER_PATH), "ssv", "", properties_set),
    method!("GetAll", true, Some(DRIVER_PATH), "s", "a{sv}", properties_get_all),
];

static INTERFACES: &[DriverInterface] = &[
    DriverInterface {
        name: "org.freedesktop.DBus",
        methods: DBUS_METHODS,
    },
    DriverInterface {
        name: "org.freedesktop.DBus.Monitoring",
        methods: MONITORING_METHODS,
    },
    DriverInterface {
        name: "org.freedesktop.DBus.Introspectable",
        methods: INTROSPECTABLE_METHODS,
    },
    DriverInterface {
        name: "org.freedesktop.DBus.Peer",
        methods: PEER_METHODS,
    },
    DriverInterface {
        name: "org.freedesktop.DBus.Properties",
        methods: PROPERTIES_METHODS,
    },
];

/// Dispatch within one table: linear scan by member name. A member whose
/// registration requirement is unmet is treated as absent.
pub(crate) fn dispatch_method(
    bus: &mut Bus,
    peer: PeerId,
    methods: &[DriverMethod],
    serial: u32,
    message: &Message,
) -> Result<(), DriverError> {
    let meta = message.metadata();
    let member = meta.fields.member.as_deref().unwrap_or("");
    let path = meta.fields.path.as_deref().unwrap_or("");
    let registered = bus
        .peers
        .get(peer)
        .is_some_and(crate::peer::Peer::is_registered);

    for method in methods {
        if method.name != member {
            continue;
        }
        if !registered && method.needs_registration {
            continue;
        }
        if let Some(pinned) = method.path {
            if pinned != path {
                return Err(DriverError::UnexpectedPath);
            }
        }
        let signature = meta.fields.signature.as_deref().unwrap_or("");
        if signature != method.in_sig {
            return Err(DriverError::UnexpectedSignature);
        }
        let args = message
            .read_body(method.in_sig)
            .map_err(|_| DriverError::InvalidMessage)?;
        let ctx = MethodCtx {
            peer,
            serial,
            out_sig: method.out_sig,
        };
        return (method.handler)(bus, &ctx, path, &args);
    }

    Err(DriverError::UnexpectedMethod)
}

/// Dispatch across the interface tables, for messages addressed to the
/// reserved name.
pub(crate) fn dispatch_interfaces(
    bus: &mut Bus,
    peer: PeerId,
    serial: u32,
    message: &Message,
) -> Result<(), DriverError> {
    let meta = message.metadata();
    let interface = meta.fields.interface.as_deref();

    if let Some(interface) = interface {
        for table in INTERFACES {
            if table.name == interface {
                return dispatch_method(bus, peer, table.methods, serial, message);
            }
        }
        return Err(DriverError::UnexpectedInterface);
    }

    for table in INTERFACES {
        match dispatch_method(bus, peer, table.methods, serial, message) {
            Err(DriverError::UnexpectedMethod) => continue,
            other => return other,
        }
    }
    Err(DriverError::UnexpectedMethod)
}

// ---------------------------------------------------------------------------
// org.freedesktop.DBus
// ---------------------------------------------------------------------------

fn hello(bus: &mut Bus, ctx: &MethodCtx, _path: &str, _args: &[Value]) -> Result<(), DriverError> {
    let peer = bus.peers.get_mut(ctx.peer).ok_or(DriverError::PeerNotFound)?;
    if peer.is_registered() {
        return Err(DriverError::PeerAlreadyRegistered);
    }
    peer.register();
    let unique = peer.unique_name().to_owned();
    tracing::info!(peer = %unique, "peer registered");

    send_method_return(bus, ctx, vec![Value::Str(unique)])?;
    notify::name_owner_changed(bus, None, None, Some(ctx.peer))?;
    Ok(())
}

/// Shared front half of `RequestName`/`ReleaseName`: reject the reserved
/// name, unique names, and anything that is not a well-formed bus name.
fn check_ownable_name(name: &str) -> Result<(), DriverError> {
    if !validate::validate_name(name) {
        return Err(DriverError::NameInvalid);
    }
    if name == DRIVER_NAME {
        return Err(DriverError::NameReserved);
    }
    if name.starts_with(':') {
        return Err(DriverError::NameUnique);
    }
    Ok(())
}

/// Reconcile a peer's owned-names back-pointer with the registry.
fn sync_owned_name(bus: &mut Bus, peer: PeerId, name: &str) {
    let queued = bus
        .names
        .get(name)
        .is_some_and(|entry| entry.queued_owners().contains(&peer));
    if let Some(peer) = bus.peers.get_mut(peer) {
        if queued {
            peer.owned_names.insert(name.to_owned());
        } else {
            peer.owned_names.remove(name);
        }
    }
}

fn request_name(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name), Value::Uint32(flags)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    check_ownable_name(name)?;

    let peer = bus.peers.get(ctx.peer).ok_or(DriverError::PeerNotFound)?;
    peer.policy
        .check_own(name)
        .map_err(|_| DriverError::NameRefused)?;
    let already_queued = peer.owned_names.contains(name.as_str());
    if !already_queued && peer.owned_names.len() >= bus.limits.max_names_per_peer {
        return Err(DriverError::Quota);
    }

    let (reply, change) = bus.names.request_name(name, ctx.peer, *flags);
    let reply_code = match reply {
        RequestReply::PrimaryOwner => REQUEST_NAME_REPLY_PRIMARY_OWNER,
        RequestReply::AlreadyOwner => REQUEST_NAME_REPLY_ALREADY_OWNER,
        RequestReply::InQueue => REQUEST_NAME_REPLY_IN_QUEUE,
        RequestReply::Exists => REQUEST_NAME_REPLY_EXISTS,
    };

    sync_owned_name(bus, ctx.peer, name);
    if let Some(change) = &change {
        if let Some(old) = change.old_owner {
            sync_owned_name(bus, old, name);
        }
        notify::name_owner_changed(
            bus,
            Some(&change.name),
            change.old_owner,
            change.new_owner,
        )?;
        if let Some(new_owner) = change.new_owner {
            notify::name_activated(bus, &change.name, new_owner)?;
        }
    }

    send_method_return(bus, ctx, vec![Value::Uint32(reply_code)])
}

fn release_name(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    check_ownable_name(name)?;

    let (reply, change) = bus.names.release_name(name, ctx.peer);
    let reply_code = match reply {
        ReleaseReply::Released => RELEASE_NAME_REPLY_RELEASED,
        ReleaseReply::NonExistent => RELEASE_NAME_REPLY_NON_EXISTENT,
        ReleaseReply::NotOwner => RELEASE_NAME_REPLY_NOT_OWNER,
    };

    sync_owned_name(bus, ctx.peer, name);
    if let Some(change) = &change {
        notify::name_owner_changed(
            bus,
            Some(&change.name),
            change.old_owner,
            change.new_owner,
        )?;
    }

    send_method_return(bus, ctx, vec![Value::Uint32(reply_code)])
}

fn list_queued_owners(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };

    let owners: Vec<Value> = if name == DRIVER_NAME {
        vec![Value::Str(DRIVER_NAME.to_owned())]
    } else if let Some(entry) = bus.names.get(name) {
        if entry.primary().is_none() {
            return Err(DriverError::NameNotFound);
        }
        entry
            .queued_owners()
            .into_iter()
            .map(|id| Value::Str(id.unique_name()))
            .collect()
    } else {
        let peer = bus
            .find_peer_by_name(name)
            .ok_or(DriverError::NameNotFound)?;
        vec![Value::Str(peer.unique_name())]
    };

    send_method_return(
        bus,
        ctx,
        vec![Value::Array {
            element: "s".into(),
            items: owners,
        }],
    )
}

fn list_names(bus: &mut Bus, ctx: &MethodCtx, _path: &str, _args: &[Value]) -> Result<(), DriverError> {
    let mut items = vec![Value::Str(DRIVER_NAME.to_owned())];
    items.extend(
        bus.peers
            .iter()
            .filter(|(_, peer)| peer.is_registered())
            .map(|(id, _)| Value::Str(id.unique_name())),
    );
    items.extend(
        bus.names
            .iter()
            .filter(|(_, name)| name.primary().is_some())
            .map(|(name, _)| Value::Str(name.clone())),
    );
    send_method_return(
        bus,
        ctx,
        vec![Value::Array {
            element: "s".into(),
            items,
        }],
    )
}

fn list_activatable_names(bus: &mut Bus, ctx: &MethodCtx, _path: &str, _args: &[Value]) -> Result<(), DriverError> {
    let mut items = vec![Value::Str(DRIVER_NAME.to_owned())];
    items.extend(
        bus.names
            .iter()
            .filter(|(_, name)| name.activation.is_some())
            .map(|(name, _)| Value::Str(name.clone())),
    );
    send_method_return(
        bus,
        ctx,
        vec![Value::Array {
            element: "s".into(),
            items,
        }],
    )
}

fn name_has_owner(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let has = name == DRIVER_NAME || bus.find_peer_by_name(name).is_some();
    send_method_return(bus, ctx, vec![Value::Bool(has)])
}

fn start_service_by_name(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    // the flags argument is accepted and ignored
    let [Value::Str(name), Value::Uint32(_flags)] = args else {
        return Err(DriverError::InvalidMessage);
    };

    let max_entries = bus.limits.max_activation_entries;
    let Some(entry) = bus.names.get_mut(name) else {
        return Err(DriverError::NameNotActivatable);
    };
    if entry.activation.is_none() {
        return Err(DriverError::NameNotActivatable);
    }

    if entry.primary().is_some() {
        return send_method_return(bus, ctx, vec![Value::Uint32(START_REPLY_ALREADY_RUNNING)]);
    }

    let activation = entry
        .activation
        .as_mut()
        .ok_or(DriverError::NameNotActivatable)?;
    activation
        .queue_request(
            ActivationRequest {
                sender: ctx.peer,
                serial: ctx.serial,
            },
            max_entries,
        )
        .map_err(|_| DriverError::Quota)?;
    if !activation.requested {
        activation.requested = true;
        bus.controller
            .request_service_start(name)
            .map_err(|_| DriverError::ForwardFailed)?;
    }
    // no reply now; the drain after activation produces it
    Ok(())
}

fn update_activation_environment(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let peer = bus.peers.get(ctx.peer).ok_or(DriverError::PeerNotFound)?;
    if !peer.credentials.privileged {
        return Err(DriverError::PeerNotPrivileged);
    }

    let [Value::Array { items, .. }] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let Some((Value::Str(key), Value::Str(value))) = item.as_dict_entry() else {
            return Err(DriverError::InvalidMessage);
        };
        pairs.push((key.clone(), value.clone()));
    }

    bus.controller
        .update_environment(&pairs)
        .map_err(|_| DriverError::ForwardFailed)?;

    send_method_return(bus, ctx, vec![])
}

fn get_name_owner(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let owner = if name == DRIVER_NAME {
        DRIVER_NAME.to_owned()
    } else {
        bus.find_peer_by_name(name)
            .ok_or(DriverError::NameOwnerNotFound)?
            .unique_name()
    };
    send_method_return(bus, ctx, vec![Value::Str(owner)])
}

/// Credentials of the connection a name resolves to, or the broker's own
/// for the reserved name.
fn resolve_credentials(
    bus: &Bus,
    name: &str,
) -> Result<(u32, u32, Option<Vec<u8>>), DriverError> {
    if name == DRIVER_NAME {
        return Ok((bus.uid(), bus.pid(), bus.seclabel().map(<[u8]>::to_vec)));
    }
    let id = bus
        .find_peer_by_name(name)
        .ok_or(DriverError::PeerNotFound)?;
    let peer = bus.peers.get(id).ok_or(DriverError::PeerNotFound)?;
    Ok((
        peer.credentials.uid,
        peer.credentials.pid,
        peer.credentials.seclabel.clone(),
    ))
}

fn get_connection_unix_user(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let (uid, _, _) = resolve_credentials(bus, name)?;
    send_method_return(bus, ctx, vec![Value::Uint32(uid)])
}

fn get_connection_unix_process_id(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let (_, pid, _) = resolve_credentials(bus, name)?;
    send_method_return(bus, ctx, vec![Value::Uint32(pid)])
}

fn get_connection_credentials(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let (uid, pid, seclabel) = resolve_credentials(bus, name)?;

    let mut entries = vec![
        Value::DictEntry(
            Box::new(Value::Str("UnixUserID".into())),
            Box::new(Value::Variant(Box::new(Value::Uint32(uid)))),
        ),
        Value::DictEntry(
            Box::new(Value::Str("ProcessID".into())),
            Box::new(Value::Variant(Box::new(Value::Uint32(pid)))),
        ),
    ];
    if let Some(label) = seclabel {
        // the label is shipped verbatim with a trailing NUL byte appended
        let mut bytes: Vec<Value> = label.into_iter().map(Value::Byte).collect();
        bytes.push(Value::Byte(0));
        entries.push(Value::DictEntry(
            Box::new(Value::Str("LinuxSecurityLabel".into())),
            Box::new(Value::Variant(Box::new(Value::Array {
                element: "y".into(),
                items: bytes,
            }))),
        ));
    }

    send_method_return(
        bus,
        ctx,
        vec![Value::Array {
            element: "{sv}".into(),
            items: entries,
        }],
    )
}

fn get_adt_audit_session_data(bus: &mut Bus, _ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    // the name is validated for existence first, as the reference does
    if name != DRIVER_NAME {
        bus.find_peer_by_name(name)
            .ok_or(DriverError::PeerNotFound)?;
    }
    Err(DriverError::AdtNotSupported)
}

fn get_connection_selinux_security_context(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(name)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let (_, _, seclabel) = resolve_credentials(bus, name)?;
    if !bus.selinux_enabled() {
        return Err(DriverError::SelinuxNotSupported);
    }
    // unlike LinuxSecurityLabel, no trailing NUL here
    let bytes: Vec<Value> = seclabel
        .unwrap_or_default()
        .into_iter()
        .map(Value::Byte)
        .collect();
    send_method_return(
        bus,
        ctx,
        vec![Value::Array {
            element: "y".into(),
            items: bytes,
        }],
    )
}

fn add_match(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(rule_string)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let rule = MatchRule::parse(rule_string).map_err(|_| DriverError::MatchInvalid)?;

    let peer = bus.peers.get_mut(ctx.peer).ok_or(DriverError::PeerNotFound)?;
    if peer.match_count >= bus.limits.max_matches_per_peer {
        return Err(DriverError::Quota);
    }
    peer.match_count += 1;
    bus.matches.add(ctx.peer, rule);

    send_method_return(bus, ctx, vec![])
}

fn remove_match(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(rule_string)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    let rule = MatchRule::parse(rule_string).map_err(|_| DriverError::MatchInvalid)?;

    bus.matches.remove(ctx.peer, &rule).map_err(|e| match e {
        MatchError::NotFound => DriverError::MatchNotFound,
        MatchError::Invalid => DriverError::MatchInvalid,
    })?;
    if let Some(peer) = bus.peers.get_mut(ctx.peer) {
        peer.match_count = peer.match_count.saturating_sub(1);
    }

    send_method_return(bus, ctx, vec![])
}

fn reload_config(bus: &mut Bus, ctx: &MethodCtx, _path: &str, _args: &[Value]) -> Result<(), DriverError> {
    let uid = bus
        .peers
        .get(ctx.peer)
        .ok_or(DriverError::PeerNotFound)?
        .credentials
        .uid;
    bus.controller
        .request_config_reload(uid, ctx.peer, ctx.serial)
        .map_err(|_| DriverError::ForwardFailed)?;
    // the reply arrives asynchronously via reload_config_completed()
    Ok(())
}

fn get_id(bus: &mut Bus, ctx: &MethodCtx, _path: &str, _args: &[Value]) -> Result<(), DriverError> {
    let guid = bus.guid_hex();
    send_method_return(bus, ctx, vec![Value::Str(guid)])
}

// ---------------------------------------------------------------------------
// org.freedesktop.DBus.Monitoring
// ---------------------------------------------------------------------------

fn become_monitor(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let peer = bus.peers.get(ctx.peer).ok_or(DriverError::PeerNotFound)?;
    if !peer.credentials.privileged {
        return Err(DriverError::PeerNotPrivileged);
    }

    let [Value::Array { items, .. }, Value::Uint32(flags)] = args else {
        return Err(DriverError::InvalidMessage);
    };

    // an empty rule array subscribes to everything, as if one empty
    // (wildcard) rule had been passed
    let mut rules = Vec::with_capacity(items.len().max(1));
    if items.is_empty() {
        rules.push(MatchRule::default());
    }
    for item in items {
        let Value::Str(rule_string) = item else {
            return Err(DriverError::InvalidMessage);
        };
        rules.push(MatchRule::parse(rule_string).map_err(|_| DriverError::MatchInvalid)?);
    }

    if *flags != 0 {
        return Err(DriverError::UnexpectedFlags);
    }

    send_method_return(bus, ctx, vec![])?;

    // Only fatal errors from here on: the reply is out, the peer must end
    // up a monitor. The transition releases names and matches without
    // NameOwnerChanged traffic.
    super::goodbye(bus, ctx.peer, true)?;
    if let Some(peer) = bus.peers.get_mut(ctx.peer) {
        peer.become_monitor(rules);
        bus.monitors.push(ctx.peer);
        tracing::info!(peer = %ctx.peer, "peer became a monitor");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// org.freedesktop.DBus.Introspectable
// ---------------------------------------------------------------------------

mod introspection;

fn introspect(bus: &mut Bus, ctx: &MethodCtx, path: &str, _args: &[Value]) -> Result<(), DriverError> {
    let xml = match path {
        DRIVER_PATH => introspection::DRIVER,
        "/org/freedesktop" => introspection::ORG_FREEDESKTOP,
        "/org" => introspection::ORG,
        "/" => introspection::ROOT,
        _ => introspection::EMPTY,
    };
    send_method_return(bus, ctx, vec![Value::Str(xml.to_owned())])
}

// ---------------------------------------------------------------------------
// org.freedesktop.DBus.Peer
// ---------------------------------------------------------------------------

fn ping(bus: &mut Bus, ctx: &MethodCtx, _path: &str, _args: &[Value]) -> Result<(), DriverError> {
    send_method_return(bus, ctx, vec![])
}

fn get_machine_id(bus: &mut Bus, ctx: &MethodCtx, _path: &str, _args: &[Value]) -> Result<(), DriverError> {
    let machine_id = bus.machine_id().to_owned();
    send_method_return(bus, ctx, vec![Value::Str(machine_id)])
}

// ---------------------------------------------------------------------------
// org.freedesktop.DBus.Properties
// ---------------------------------------------------------------------------

fn property_features(bus: &Bus) -> Value {
    let mut items = Vec::new();
    if bus.selinux_enabled() {
        items.push(Value::Str("SELinux".into()));
    }
    Value::Variant(Box::new(Value::Array {
        element: "s".into(),
        items,
    }))
}

fn property_interfaces() -> Value {
    Value::Variant(Box::new(Value::Array {
        element: "s".into(),
        items: vec![Value::Str("org.freedesktop.DBus.Monitoring".into())],
    }))
}

fn properties_get(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(interface), Value::Str(property)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    if interface != DRIVER_NAME {
        return Err(DriverError::UnexpectedInterface);
    }
    let value = match property.as_str() {
        "Features" => property_features(bus),
        "Interfaces" => property_interfaces(),
        _ => return Err(DriverError::UnexpectedProperty),
    };
    send_method_return(bus, ctx, vec![value])
}

fn properties_set(_bus: &mut Bus, _ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(interface), Value::Str(property), Value::Variant(_)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    if interface != DRIVER_NAME {
        return Err(DriverError::UnexpectedInterface);
    }
    if property != "Features" && property != "Interfaces" {
        return Err(DriverError::UnexpectedProperty);
    }
    Err(DriverError::ReadonlyProperty)
}

fn properties_get_all(bus: &mut Bus, ctx: &MethodCtx, _path: &str, args: &[Value]) -> Result<(), DriverError> {
    let [Value::Str(interface)] = args else {
        return Err(DriverError::InvalidMessage);
    };
    if interface != DRIVER_NAME {
        return Err(DriverError::UnexpectedInterface);
    }
    let dict = Value::Array {
        element: "{sv}".into(),
        items: vec![
            Value::DictEntry(
                Box::new(Value::Str("Features".into())),
                Box::new(property_features(bus)),
            ),
            Value::DictEntry(
                Box::new(Value::Str("Interfaces".into())),
                Box::new(property_interfaces()),
            ),
        ],
    };
    send_method_return(bus, ctx, vec![dict])
}

// resolve_peer_by_address is used by the reply path as well
pub(crate) fn resolve_unique(destination: &str) -> Option<PeerId> {
    match Address::parse(destination)? {
        Address::Unique(id) => Some(id),
        _ => None,
    }
}
