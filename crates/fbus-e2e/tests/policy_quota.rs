//! Policy denials and quota enforcement, end to end.

use fbus::{BusConfig, Limits, MessageType, PolicyConfig, Value};
use fbus_e2e::{assert_error, assert_method_return, driver_call, method_call, TestBus};

fn bus_with_policy(policy: serde_json::Value) -> TestBus {
    let mut config = BusConfig::default();
    config.policy = serde_json::from_value::<PolicyConfig>(policy).expect("valid policy config");
    TestBus::with_config(config)
}

fn bus_with_limits(limits: Limits) -> TestBus {
    let mut config = BusConfig::default();
    config.limits = limits;
    TestBus::with_config(config)
}

#[test]
fn policy_refuses_name_ownership() {
    let mut t = bus_with_policy(serde_json::json!({
        "own": [
            { "access": "deny", "name": "com.locked", "prefix": true }
        ]
    }));
    let a = t.client();
    t.send_ok(
        a,
        &driver_call(2, "RequestName").str_arg("com.locked.App").u32_arg(0).build_msg(),
    );
    let reply = t.next_message(a);
    assert_error(
        &reply,
        "org.freedesktop.DBus.Error.AccessDenied",
        "Request to own name refused by policy",
    );

    // unrelated names are untouched
    t.send_ok(
        a,
        &driver_call(3, "RequestName").str_arg("com.open.App").u32_arg(0).build_msg(),
    );
    let replies = t.drain(a);
    assert_method_return(&replies[replies.len() - 1], 3);
}

#[test]
fn send_policy_gates_driver_calls() {
    let mut t = bus_with_policy(serde_json::json!({
        "send": [
            { "access": "deny", "member": "ListNames" }
        ]
    }));
    let a = t.client();
    t.send_ok(a, &driver_call(2, "ListNames").build_msg());
    let reply = t.next_message(a);
    assert_error(
        &reply,
        "org.freedesktop.DBus.Error.AccessDenied",
        "Sender is not authorized to send message",
    );
}

#[test]
fn send_policy_gates_unicast_forwarding() {
    let mut t = bus_with_policy(serde_json::json!({
        "send": [
            { "access": "deny", "peer_name": "com.example.Locked" }
        ]
    }));
    let a = t.client();
    let b = t.client();
    t.send_ok(
        b,
        &driver_call(2, "RequestName").str_arg("com.example.Locked").u32_arg(0).build_msg(),
    );
    t.drain(b);

    t.send_ok(a, &method_call(5, "com.example.Locked", "Poke").build_msg());
    let reply = t.next_message(a);
    assert_error(
        &reply,
        "org.freedesktop.DBus.Error.AccessDenied",
        "Sender is not authorized to send message",
    );
    t.assert_no_messages(b);
}

#[test]
fn receive_policy_skips_only_the_denied_receiver() {
    let mut t = bus_with_policy(serde_json::json!({
        "receive": [
            { "access": "deny", "interface": "com.example.Noisy", "broadcast": true }
        ]
    }));
    let a = t.client();
    let b = t.client();
    t.send_ok(
        b,
        &driver_call(2, "AddMatch").str_arg("type='signal'").build_msg(),
    );
    t.next_message(b);

    t.send_ok(
        a,
        &fbus_e2e::broadcast_signal(3, "com.example.Noisy", "Blast").build_msg(),
    );
    // the denial silently skips the receiver; the sender sees no error
    t.assert_no_messages(a);
    t.assert_no_messages(b);

    t.send_ok(
        a,
        &fbus_e2e::broadcast_signal(4, "com.example.Quiet", "Whisper").build_msg(),
    );
    let got = t.next_message(b);
    assert_eq!(got.metadata().fields.member.as_deref(), Some("Whisper"));
}

#[test]
fn match_rules_are_quota_counted() {
    let mut t = bus_with_limits(Limits {
        max_matches_per_peer: 1,
        ..Limits::default()
    });
    let a = t.client();
    t.send_ok(a, &driver_call(2, "AddMatch").str_arg("member='A'").build_msg());
    assert_method_return(&t.next_message(a), 2);

    t.send_ok(a, &driver_call(3, "AddMatch").str_arg("member='B'").build_msg());
    assert_error(
        &t.next_message(a),
        "org.freedesktop.DBus.Error.LimitsExceeded",
        "Sending user's quota exceeded",
    );

    // removing one rule makes room again
    t.send_ok(a, &driver_call(4, "RemoveMatch").str_arg("member='A'").build_msg());
    t.next_message(a);
    t.send_ok(a, &driver_call(5, "AddMatch").str_arg("member='B'").build_msg());
    assert_method_return(&t.next_message(a), 5);
}

#[test]
fn unicast_queue_overflow_bounces_to_the_sender() {
    let mut t = bus_with_limits(Limits {
        max_outgoing_messages: 1,
        ..Limits::default()
    });
    let a = t.client();
    let b = t.client();
    let b_name = t.bus.peers.get(b).expect("peer exists").unique_name().to_owned();

    t.send_ok(a, &method_call(5, &b_name, "One").build_msg());
    t.send_ok(a, &method_call(6, &b_name, "Two").build_msg());

    let reply = t.next_message(a);
    assert_error(
        &reply,
        "org.freedesktop.DBus.Error.LimitsExceeded",
        "Sending user's quota exceeded",
    );
    // the receiver keeps the first message and its connection
    assert_eq!(t.drain(b).len(), 1);
    assert!(!t
        .bus
        .peers
        .get(b)
        .expect("peer exists")
        .connection
        .is_shutdown());

    // the rolled-back slot leaves serial 6 free for a retry
    t.send_ok(a, &method_call(6, &b_name, "TwoAgain").build_msg());
    assert_eq!(t.drain(b).len(), 1);
}

#[test]
fn broadcast_queue_overflow_disconnects_the_receiver() {
    let mut t = bus_with_limits(Limits {
        max_outgoing_messages: 1,
        ..Limits::default()
    });
    let a = t.client();
    let b = t.client();
    t.send_ok(
        b,
        &driver_call(2, "AddMatch").str_arg("type='signal'").build_msg(),
    );
    t.next_message(b);

    t.send_ok(
        a,
        &fbus_e2e::broadcast_signal(3, "com.example.Iface", "Tick").build_msg(),
    );
    t.send_ok(
        a,
        &fbus_e2e::broadcast_signal(4, "com.example.Iface", "Tick").build_msg(),
    );

    // quota on a broadcast receiver is not the sender's problem
    t.assert_no_messages(a);
    assert!(t
        .bus
        .peers
        .get(b)
        .expect("peer exists")
        .connection
        .is_shutdown());
}

#[test]
fn monitor_overflow_disconnects_the_monitor_but_not_the_route() {
    let mut t = bus_with_limits(Limits {
        max_outgoing_messages: 2,
        ..Limits::default()
    });
    let a = t.client();
    let b = t.client();
    let b_name = t.bus.peers.get(b).expect("peer exists").unique_name().to_owned();

    let m = t.connect_privileged();
    t.send_ok(m, &driver_call(1, "Hello").build_msg());
    t.drain(m);
    let call = fbus_e2e::driver_call_on(
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
    .build_msg();
    t.send_ok(m, &call);
    t.drain(m);

    // a fresh client's Hello mirrors three messages into the monitor's
    // two-slot queue; the overflow disconnects the monitor only
    let c = t.connect();
    t.send_ok(c, &driver_call(1, "Hello").build_msg());
    assert!(t
        .bus
        .peers
        .get(m)
        .expect("peer exists")
        .connection
        .is_shutdown());
    assert_eq!(t.drain(c).len(), 1);

    // routing continues without the monitor
    t.send_ok(a, &method_call(5, &b_name, "One").build_msg());
    let delivered = t.drain(b);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].metadata().kind, Some(MessageType::MethodCall));
}
