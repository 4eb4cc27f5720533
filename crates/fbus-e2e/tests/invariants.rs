//! For-all properties of the router: reply-slot uniqueness, ownership
//! queues, id allocation, reply counting, notification ordering, and the
//! idempotence pairs.

use fbus::protocol::{
    REQUEST_NAME_FLAG_ALLOW_REPLACEMENT, REQUEST_NAME_FLAG_REPLACE_EXISTING,
};
use fbus::{MessageType, Value};
use fbus_e2e::{
    assert_error, assert_method_return, driver_call, driver_call_on, method_call,
    reply_string_array, reply_u32, TestBus,
};

#[test]
fn at_most_one_reply_slot_per_serial() {
    let mut t = TestBus::new();
    let a = t.client();
    let b = t.client();
    let b_name = t.bus.peers.get(b).expect("peer exists").unique_name().to_owned();

    t.send_ok(a, &method_call(7, &b_name, "First").build_msg());
    assert_eq!(t.drain(b).len(), 1);

    // the same serial again: the slot already exists
    t.send_ok(a, &method_call(7, &b_name, "Second").build_msg());
    let reply = t.next_message(a);
    assert_error(
        &reply,
        "org.freedesktop.DBus.Error.AccessDenied",
        "Pending reply with that serial already exists",
    );
    t.assert_no_messages(b);
}

#[test]
fn get_name_owner_tracks_the_queue_head() {
    let mut t = TestBus::new();
    let a = t.client();
    let b = t.client();

    t.send_ok(
        a,
        &driver_call(2, "RequestName")
            .str_arg("com.x")
            .u32_arg(REQUEST_NAME_FLAG_ALLOW_REPLACEMENT)
            .build_msg(),
    );
    t.drain(a);
    t.send_ok(
        a,
        &driver_call(3, "GetNameOwner").str_arg("com.x").build_msg(),
    );
    let reply = t.next_message(a);
    assert_eq!(reply.read_body("s").expect("body")[0], Value::Str(":1.1".into()));

    t.send_ok(
        b,
        &driver_call(2, "RequestName")
            .str_arg("com.x")
            .u32_arg(REQUEST_NAME_FLAG_REPLACE_EXISTING)
            .build_msg(),
    );
    t.drain(a);
    t.drain(b);
    t.send_ok(
        a,
        &driver_call(4, "GetNameOwner").str_arg("com.x").build_msg(),
    );
    let reply = t.next_message(a);
    assert_eq!(reply.read_body("s").expect("body")[0], Value::Str(":1.2".into()));

    // the displaced owner heads the waiter queue
    t.send_ok(
        a,
        &driver_call(5, "ListQueuedOwners").str_arg("com.x").build_msg(),
    );
    let reply = t.next_message(a);
    assert_eq!(reply_string_array(&reply), vec![":1.2", ":1.1"]);
}

#[test]
fn peer_ids_are_monotonic_and_never_reused() {
    let mut t = TestBus::new();
    let a = t.client();
    let b = t.client();
    assert!(a.get() < b.get());

    t.disconnect(a);
    let c = t.client();
    assert!(c.get() > b.get());
    assert_eq!(c.unique_name(), format!(":1.{}", c.get()));
}

#[test]
fn every_driver_call_yields_exactly_one_reply() {
    let mut t = TestBus::new();
    let a = t.client();

    let calls = vec![
        driver_call(10, "NameHasOwner").str_arg("com.x").build_msg(),
        driver_call(11, "ListNames").build_msg(),
        driver_call(12, "ListActivatableNames").build_msg(),
        driver_call(13, "GetId").build_msg(),
        driver_call_on(
            14,
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus.Peer",
            "Ping",
        )
        .build_msg(),
        driver_call_on(
            15,
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus.Introspectable",
            "Introspect",
        )
        .build_msg(),
        // error replies count as the one reply too
        driver_call(16, "GetNameOwner").str_arg("no.such.name").build_msg(),
        driver_call(17, "NoSuchMethod").build_msg(),
    ];
    for (n, call) in calls.into_iter().enumerate() {
        t.send_ok(a, &call);
        let replies = t.drain(a);
        assert_eq!(replies.len(), 1, "call #{n} produced {}", replies.len());
        assert_eq!(
            replies[0].metadata().fields.reply_serial,
            Some(10 + n as u32)
        );
    }
}

#[test]
fn notification_order_is_lost_changed_acquired() {
    let mut t = TestBus::new();
    let a = t.client();
    let b = t.client();

    // a wildcard monitor observes the global emission order
    let m = t.connect_privileged();
    t.send_ok(m, &driver_call(1, "Hello").build_msg());
    t.drain(m);
    t.send_ok(
        m,
        &driver_call_on(
            2,
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus.Monitoring",
            "BecomeMonitor",
        )
        .arg(Value::Array {
            element: "s".into(),
            items: vec![],
        })
        .u32_arg(0)
        .build_msg(),
    );
    t.drain(m);

    t.send_ok(
        a,
        &driver_call(2, "RequestName")
            .str_arg("com.x")
            .u32_arg(REQUEST_NAME_FLAG_ALLOW_REPLACEMENT)
            .build_msg(),
    );
    t.drain(a);
    t.drain(m);

    t.send_ok(
        b,
        &driver_call(2, "RequestName")
            .str_arg("com.x")
            .u32_arg(REQUEST_NAME_FLAG_REPLACE_EXISTING)
            .build_msg(),
    );

    let seen: Vec<String> = t
        .drain(m)
        .iter()
        .map(|msg| {
            let meta = msg.metadata();
            match meta.kind {
                Some(MessageType::MethodCall) | Some(MessageType::Signal) => {
                    meta.fields.member.clone().unwrap_or_default()
                }
                Some(MessageType::MethodReturn) => "return".to_owned(),
                _ => "other".to_owned(),
            }
        })
        .collect();
    assert_eq!(
        seen,
        vec![
            "RequestName",
            "NameLost",
            "NameOwnerChanged",
            "NameAcquired",
            "return",
        ]
    );
}

#[test]
fn request_then_release_is_a_no_op() {
    let mut t = TestBus::new();
    let a = t.client();

    t.send_ok(a, &driver_call(2, "ListNames").build_msg());
    let before = reply_string_array(&t.next_message(a));

    t.send_ok(
        a,
        &driver_call(3, "RequestName").str_arg("com.x").u32_arg(0).build_msg(),
    );
    t.drain(a);
    t.send_ok(a, &driver_call(4, "ReleaseName").str_arg("com.x").build_msg());
    let replies = t.drain(a);
    assert_eq!(reply_u32(&replies[replies.len() - 1]), 1); // RELEASED

    t.send_ok(a, &driver_call(5, "ListNames").build_msg());
    let after = reply_string_array(&t.next_message(a));
    assert_eq!(before, after);

    t.send_ok(a, &driver_call(6, "NameHasOwner").str_arg("com.x").build_msg());
    let reply = t.next_message(a);
    assert_eq!(reply.read_body("b").expect("body")[0], Value::Bool(false));
}

#[test]
fn add_then_remove_match_restores_the_index() {
    let mut t = TestBus::new();
    let a = t.client();
    assert!(t.bus.matches.is_empty());

    let rule = "type='signal',member='Ping'";
    t.send_ok(a, &driver_call(2, "AddMatch").str_arg(rule).build_msg());
    t.next_message(a);
    assert_eq!(t.bus.matches.len(), 1);

    t.send_ok(a, &driver_call(3, "RemoveMatch").str_arg(rule).build_msg());
    t.next_message(a);
    assert!(t.bus.matches.is_empty());
    assert_eq!(
        t.bus.peers.get(a).expect("peer exists").match_count,
        0
    );
}

#[test]
fn signature_mismatch_leaves_no_side_effect() {
    let mut t = TestBus::new();
    let a = t.client();

    // RequestName declares "su" but only "s" is supplied
    t.send_ok(a, &driver_call(2, "RequestName").str_arg("com.x").build_msg());
    let reply = t.next_message(a);
    assert_error(
        &reply,
        "org.freedesktop.DBus.Error.InvalidArgs",
        "Invalid signature for method",
    );

    t.send_ok(a, &driver_call(3, "NameHasOwner").str_arg("com.x").build_msg());
    let reply = t.next_message(a);
    assert_eq!(reply.read_body("b").expect("body")[0], Value::Bool(false));
}

#[test]
fn monitors_see_what_the_receiver_sees() {
    let mut t = TestBus::new();
    let a = t.client();
    let b = t.client();
    let b_name = t.bus.peers.get(b).expect("peer exists").unique_name().to_owned();

    let m = t.connect_privileged();
    t.send_ok(m, &driver_call(1, "Hello").build_msg());
    t.drain(m);
    t.send_ok(
        m,
        &driver_call_on(
            2,
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus.Monitoring",
            "BecomeMonitor",
        )
        .arg(Value::Array {
            element: "s".into(),
            items: vec![],
        })
        .u32_arg(0)
        .build_msg(),
    );
    t.drain(m);

    t.send_ok(a, &method_call(9, &b_name, "Poke").build_msg());
    let direct = t.next_message(b);
    let mirrored = t.next_message(m);
    assert_eq!(direct.metadata().fields.member.as_deref(), Some("Poke"));
    assert_eq!(mirrored.metadata().fields.member.as_deref(), Some("Poke"));
    assert_eq!(mirrored.data(), direct.data());
}

#[test]
fn replies_are_routed_once_and_only_once() {
    let mut t = TestBus::new();
    let a = t.client();
    let b = t.client();
    let a_name = t.bus.peers.get(a).expect("peer exists").unique_name().to_owned();
    let b_name = t.bus.peers.get(b).expect("peer exists").unique_name().to_owned();

    t.send_ok(a, &method_call(21, &b_name, "Ask").build_msg());
    t.next_message(b);

    t.send_ok(b, &fbus_e2e::method_reply(4, &a_name, 21).build_msg());
    let reply = t.next_message(a);
    assert_eq!(reply.metadata().kind, Some(MessageType::MethodReturn));
    assert_eq!(reply.metadata().fields.reply_serial, Some(21));

    // the slot is consumed; a second reply is forged
    t.send_ok(b, &fbus_e2e::method_reply(5, &a_name, 21).build_msg());
    let bounced = t.next_message(b);
    assert_error(
        &bounced,
        "org.freedesktop.DBus.Error.AccessDenied",
        "No pending reply with that serial",
    );
    t.assert_no_messages(a);
}

#[test]
fn driver_identity_replies() {
    let mut t = TestBus::new();
    let a = t.client();

    t.send_ok(a, &driver_call(2, "GetId").build_msg());
    let reply = t.next_message(a);
    let body = reply.read_body("s").expect("body");
    let Value::Str(guid) = &body[0] else {
        panic!("GetId returns a string");
    };
    assert_eq!(guid.len(), 32);
    assert!(guid.bytes().all(|b| b.is_ascii_hexdigit()));

    t.send_ok(
        a,
        &driver_call_on(
            3,
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus.Peer",
            "GetMachineId",
        )
        .build_msg(),
    );
    let reply = t.next_message(a);
    assert_eq!(
        reply.read_body("s").expect("body")[0],
        Value::Str("8f9a1b2c3d4e5f60718293a4b5c6d7e8".into())
    );
    assert_method_return(&reply, 3);
}
