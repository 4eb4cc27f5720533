//! In-process harness for driving a bus the way a transport would.
//!
//! [`TestBus`] owns one broker and plays the part of the event loop:
//! clients are connected with chosen credentials, complete wire images are
//! dispatched, and each peer's outgoing queue is drained and decoded for
//! assertions. The [`RecordingController`] stands in for the parent
//! process and logs every request it would have been asked to perform.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use fbus::protocol::{DRIVER_NAME, DRIVER_PATH};
use fbus::{
    Bus, BusConfig, Controller, ControllerError, DispatchError, Message, MessageBuilder,
    MessageType, PeerCredentials, PeerId, Value,
};

/// Install a subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Everything the broker would have asked its parent process to do.
#[derive(Debug, Default)]
pub struct ControllerLog {
    pub started_services: Vec<String>,
    pub environment_updates: Vec<Vec<(String, String)>>,
    pub config_reloads: Vec<(u32, PeerId, u32)>,
}

/// Controller double that records requests and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingController {
    log: Rc<RefCell<ControllerLog>>,
}

impl RecordingController {
    #[must_use]
    pub fn handle(&self) -> Rc<RefCell<ControllerLog>> {
        Rc::clone(&self.log)
    }
}

impl Controller for RecordingController {
    fn request_service_start(&mut self, name: &str) -> Result<(), ControllerError> {
        self.log.borrow_mut().started_services.push(name.to_owned());
        Ok(())
    }

    fn update_environment(&mut self, pairs: &[(String, String)]) -> Result<(), ControllerError> {
        self.log.borrow_mut().environment_updates.push(pairs.to_vec());
        Ok(())
    }

    fn request_config_reload(
        &mut self,
        uid: u32,
        sender: PeerId,
        serial: u32,
    ) -> Result<(), ControllerError> {
        self.log
            .borrow_mut()
            .config_reloads
            .push((uid, sender, serial));
        Ok(())
    }
}

/// Controller double whose pipe to the parent is broken.
#[derive(Debug, Default)]
pub struct BrokenController;

impl Controller for BrokenController {
    fn request_service_start(&mut self, _name: &str) -> Result<(), ControllerError> {
        Err(ControllerError::ForwardFailed)
    }

    fn update_environment(&mut self, _pairs: &[(String, String)]) -> Result<(), ControllerError> {
        Err(ControllerError::ForwardFailed)
    }

    fn request_config_reload(
        &mut self,
        _uid: u32,
        _sender: PeerId,
        _serial: u32,
    ) -> Result<(), ControllerError> {
        Err(ControllerError::ForwardFailed)
    }
}

/// One in-process broker plus the harness bookkeeping around it.
pub struct TestBus {
    pub bus: Bus,
    pub controller: Rc<RefCell<ControllerLog>>,
    next_pid: u32,
}

impl Default for TestBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBus {
    /// A bus with a fixed GUID and machine id, so identity replies are
    /// deterministic.
    #[must_use]
    pub fn new() -> Self {
        let mut config = BusConfig::default();
        config.guid = *b"frankenbus-e2e!!";
        config.machine_id = "8f9a1b2c3d4e5f60718293a4b5c6d7e8".to_owned();
        Self::with_config(config)
    }

    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        init_logging();
        let controller = RecordingController::default();
        let handle = controller.handle();
        Self {
            bus: Bus::with_controller(config, Box::new(controller)),
            controller: handle,
            next_pid: 100,
        }
    }

    /// Connect an unprivileged client.
    pub fn connect(&mut self) -> PeerId {
        self.connect_with(false)
    }

    /// Connect a client the policy layer marked privileged.
    pub fn connect_privileged(&mut self) -> PeerId {
        self.connect_with(true)
    }

    fn connect_with(&mut self, privileged: bool) -> PeerId {
        self.next_pid += 1;
        let mut credentials = PeerCredentials::unprivileged(1000, self.next_pid);
        credentials.privileged = privileged;
        self.bus.connect_peer(credentials)
    }

    /// Dispatch a finished message from `peer`.
    pub fn send(&mut self, peer: PeerId, message: &Message) -> Result<(), DispatchError> {
        fbus::dispatch(&mut self.bus, peer, message.data().to_vec())
    }

    /// Dispatch and demand success.
    pub fn send_ok(&mut self, peer: PeerId, message: &Message) {
        self.send(peer, message).expect("dispatch should succeed");
    }

    /// Connect and register in one step, draining the Hello traffic.
    pub fn client(&mut self) -> PeerId {
        let peer = self.connect();
        self.send_ok(peer, &driver_call(1, "Hello").build_msg());
        let reply = self.next_message(peer);
        assert_eq!(reply.metadata().kind, Some(MessageType::MethodReturn));
        peer
    }

    /// Pop the next queued message for `peer`.
    pub fn next_message(&mut self, peer: PeerId) -> Arc<Message> {
        self.bus
            .peers
            .get_mut(peer)
            .expect("peer exists")
            .connection
            .pop_outgoing()
            .expect("a message was queued")
    }

    /// Drain everything queued for `peer`.
    pub fn drain(&mut self, peer: PeerId) -> Vec<Arc<Message>> {
        let mut out = Vec::new();
        if let Some(state) = self.bus.peers.get_mut(peer) {
            while let Some(message) = state.connection.pop_outgoing() {
                out.push(message);
            }
        }
        out
    }

    pub fn assert_no_messages(&mut self, peer: PeerId) {
        assert!(
            self.drain(peer).is_empty(),
            "expected an empty queue for {peer}"
        );
    }

    /// Simulate the transport noticing a dead connection.
    pub fn disconnect(&mut self, peer: PeerId) {
        fbus::peer_disconnected(&mut self.bus, peer).expect("teardown should succeed");
    }
}

/// Builder wrapper so scenario code reads as one chain.
pub struct Call(MessageBuilder);

impl Call {
    #[must_use]
    pub fn arg(self, value: Value) -> Self {
        Self(self.0.arg(value))
    }

    #[must_use]
    pub fn str_arg(self, value: &str) -> Self {
        self.arg(Value::Str(value.to_owned()))
    }

    #[must_use]
    pub fn u32_arg(self, value: u32) -> Self {
        self.arg(Value::Uint32(value))
    }

    #[must_use]
    pub fn flags(self, flags: u8) -> Self {
        Self(self.0.flags(flags))
    }

    #[must_use]
    pub fn build_msg(self) -> Message {
        self.0.build().expect("message should build")
    }
}

/// A call to the driver on its canonical path.
#[must_use]
pub fn driver_call(serial: u32, member: &str) -> Call {
    Call(
        MessageBuilder::new(MessageType::MethodCall)
            .serial(serial)
            .destination(DRIVER_NAME)
            .path(DRIVER_PATH)
            .interface(DRIVER_NAME)
            .member(member),
    )
}

/// A driver call on a chosen interface and path.
#[must_use]
pub fn driver_call_on(serial: u32, path: &str, interface: &str, member: &str) -> Call {
    Call(
        MessageBuilder::new(MessageType::MethodCall)
            .serial(serial)
            .destination(DRIVER_NAME)
            .path(path)
            .interface(interface)
            .member(member),
    )
}

/// A client-to-client method call.
#[must_use]
pub fn method_call(serial: u32, destination: &str, member: &str) -> Call {
    Call(
        MessageBuilder::new(MessageType::MethodCall)
            .serial(serial)
            .destination(destination)
            .path("/com/example/Object")
            .interface("com.example.Iface")
            .member(member),
    )
}

/// A broadcast signal.
#[must_use]
pub fn broadcast_signal(serial: u32, interface: &str, member: &str) -> Call {
    Call(
        MessageBuilder::new(MessageType::Signal)
            .serial(serial)
            .path("/com/example/Object")
            .interface(interface)
            .member(member),
    )
}

/// A method return answering `reply_serial`.
#[must_use]
pub fn method_reply(serial: u32, destination: &str, reply_serial: u32) -> Call {
    Call(
        MessageBuilder::new(MessageType::MethodReturn)
            .serial(serial)
            .destination(destination)
            .reply_serial(reply_serial),
    )
}

// ---------------------------------------------------------------------------
// assertion helpers
// ---------------------------------------------------------------------------

/// Assert a method return correlating to `reply_serial`.
pub fn assert_method_return(message: &Message, reply_serial: u32) {
    assert_eq!(message.metadata().kind, Some(MessageType::MethodReturn));
    assert_eq!(message.metadata().fields.reply_serial, Some(reply_serial));
    assert_eq!(
        message.metadata().fields.sender.as_deref(),
        Some(DRIVER_NAME)
    );
}

/// Assert an error reply with the given name and human text.
pub fn assert_error(message: &Message, error_name: &str, text: &str) {
    assert_eq!(message.metadata().kind, Some(MessageType::Error));
    assert_eq!(
        message.metadata().fields.error_name.as_deref(),
        Some(error_name),
        "error name mismatch"
    );
    let body = message.read_body("s").expect("error body is one string");
    assert_eq!(body[0], Value::Str(text.to_owned()), "error text mismatch");
}

/// Assert a driver signal with the given member and string arguments.
pub fn assert_signal(message: &Message, member: &str, args: &[&str]) {
    assert_eq!(message.metadata().kind, Some(MessageType::Signal));
    assert_eq!(message.metadata().fields.member.as_deref(), Some(member));
    let got: Vec<&str> = message
        .metadata()
        .args
        .iter()
        .map(|a| a.value.as_str())
        .collect();
    assert_eq!(got, args, "signal arguments mismatch");
}

/// The strings of an `as` reply body.
pub fn reply_string_array(message: &Message) -> Vec<String> {
    let body = message.read_body("as").expect("body is one string array");
    let Some(items) = body[0].as_items() else {
        panic!("body is not an array");
    };
    items
        .iter()
        .map(|v| v.as_str().expect("array of strings").to_owned())
        .collect()
}

/// The single u32 of a `u` reply body.
pub fn reply_u32(message: &Message) -> u32 {
    let body = message.read_body("u").expect("body is one u32");
    body[0].as_u32().expect("u32 body")
}
