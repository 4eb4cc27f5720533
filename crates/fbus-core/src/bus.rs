//! The bus singleton.
//!
//! One [`Bus`] holds every long-lived table: peers, names, subscriptions,
//! the monitor roster, quotas, and the broker's own identity. It is created
//! at startup, torn down at exit, and only ever touched from the event-loop
//! thread; the driver borrows it per dispatch and never owns it.

use std::sync::Arc;

use fbus_types::{Address, PeerId};

use crate::controller::{Controller, NullController};
use crate::limits::Limits;
use crate::match_rule::MatchRegistry;
use crate::name::NameRegistry;
use crate::peer::{PeerCredentials, PeerRegistry};
use crate::policy::{PolicyConfig, PolicySnapshot};

/// Startup configuration, supplied by the process controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// 16-byte bus GUID, reported by `GetId` as 32 hex characters.
    pub guid: [u8; 16],
    /// Host machine id, reported by `GetMachineId`.
    pub machine_id: String,
    /// Credentials of the broker process itself, reported for the
    /// reserved name.
    pub uid: u32,
    pub pid: u32,
    pub seclabel: Option<Vec<u8>>,
    /// Whether SELinux enforcement is available on this bus.
    pub selinux_enabled: bool,
    pub limits: Limits,
    pub policy: PolicyConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            guid: [0; 16],
            machine_id: "0".repeat(32),
            uid: 0,
            pid: 0,
            seclabel: None,
            selinux_enabled: false,
            limits: Limits::default(),
            policy: PolicyConfig::default(),
        }
    }
}

/// The broker's complete runtime state.
pub struct Bus {
    pub peers: PeerRegistry,
    pub names: NameRegistry,
    pub matches: MatchRegistry,
    /// Peers currently in monitor state, in the order they subscribed.
    pub monitors: Vec<PeerId>,
    pub limits: Limits,
    pub default_policy: Arc<PolicySnapshot>,
    pub controller: Box<dyn Controller>,
    guid: [u8; 16],
    machine_id: String,
    uid: u32,
    pid: u32,
    seclabel: Option<Vec<u8>>,
    selinux_enabled: bool,
}

impl Bus {
    /// Create a bus with no parent process attached.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self::with_controller(config, Box::new(NullController))
    }

    #[must_use]
    pub fn with_controller(config: BusConfig, controller: Box<dyn Controller>) -> Self {
        Self {
            peers: PeerRegistry::new(),
            names: NameRegistry::new(),
            matches: MatchRegistry::new(),
            monitors: Vec::new(),
            limits: config.limits,
            default_policy: PolicySnapshot::compile(&config.policy),
            controller,
            guid: config.guid,
            machine_id: config.machine_id,
            uid: config.uid,
            pid: config.pid,
            seclabel: config.seclabel,
            selinux_enabled: config.selinux_enabled,
        }
    }

    /// Admit an authenticated connection; the transport calls this after
    /// the SASL handshake.
    pub fn connect_peer(&mut self, credentials: PeerCredentials) -> PeerId {
        self.peers
            .add(credentials, Arc::clone(&self.default_policy), &self.limits)
    }

    /// Resolve a destination string to a registered peer.
    ///
    /// The reserved name resolves to nothing here; callers special-case the
    /// driver before routing.
    #[must_use]
    pub fn find_peer_by_name(&self, name: &str) -> Option<PeerId> {
        match Address::parse(name)? {
            Address::Driver => None,
            Address::Unique(id) => self
                .peers
                .get(id)
                .filter(|peer| peer.is_registered())
                .map(|peer| peer.id()),
            Address::WellKnown(name) => self.names.resolve(name),
        }
    }

    /// The bus GUID as a 32-character hex string.
    #[must_use]
    pub fn guid_hex(&self) -> String {
        let mut out = String::with_capacity(32);
        for byte in self.guid {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    #[inline]
    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[inline]
    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[inline]
    #[must_use]
    pub fn seclabel(&self) -> Option<&[u8]> {
        self.seclabel.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn selinux_enabled(&self) -> bool {
        self.selinux_enabled
    }

    /// Number of peers currently monitoring.
    #[inline]
    #[must_use]
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("peers", &self.peers.len())
            .field("monitors", &self.monitors.len())
            .field("guid", &self.guid_hex())
            .finish_non_exhaustive()
    }
}
