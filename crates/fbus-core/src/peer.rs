//! Connected peers and the peer registry.
//!
//! A peer is one authenticated connection. It starts unregistered — the
//! only useful thing it can do is call `Hello` — becomes registered with a
//! unique name, and may later turn into a passive monitor. The registry
//! allocates ids monotonically and never reuses them, so `:1.<id>` names
//! stay unambiguous for the lifetime of the bus.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fbus_types::PeerId;

use crate::connection::Connection;
use crate::limits::Limits;
use crate::match_rule::MatchRule;
use crate::policy::PolicySnapshot;
use crate::reply::ReplyRegistry;

/// Identity established by the transport's authentication handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub pid: u32,
    /// Raw security label as handed over by the kernel, without trailing NUL.
    pub seclabel: Option<Vec<u8>>,
    /// Whether the policy layer granted this connection broker-admin calls
    /// (`BecomeMonitor`, `UpdateActivationEnvironment`).
    pub privileged: bool,
}

impl PeerCredentials {
    /// Plain unprivileged credentials, the common case in tests.
    #[must_use]
    pub fn unprivileged(uid: u32, pid: u32) -> Self {
        Self {
            uid,
            pid,
            seclabel: None,
            privileged: false,
        }
    }
}

/// Lifecycle state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Unregistered,
    Registered,
    Monitor,
}

/// One connected client.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    unique_name: String,
    state: PeerState,
    pub credentials: PeerCredentials,
    pub connection: Connection,
    pub policy: Arc<PolicySnapshot>,
    /// Well-known names this peer holds an ownership in (primary or queued).
    pub owned_names: BTreeSet<String>,
    /// Number of match rules this peer has filed, for quota accounting.
    pub match_count: usize,
    /// Replies this peer awaits: `(responder, serial)` keys.
    pub owned_replies: BTreeSet<(PeerId, u32)>,
    /// Replies this peer owes to others.
    pub replies: ReplyRegistry,
    /// Rules installed by `BecomeMonitor`; empty unless in monitor state.
    pub monitor_rules: Vec<MatchRule>,
}

impl Peer {
    fn new(
        id: PeerId,
        credentials: PeerCredentials,
        policy: Arc<PolicySnapshot>,
        limits: &Limits,
    ) -> Self {
        Self {
            id,
            unique_name: id.unique_name(),
            state: PeerState::Unregistered,
            credentials,
            connection: Connection::new(limits),
            policy,
            owned_names: BTreeSet::new(),
            match_count: 0,
            owned_replies: BTreeSet::new(),
            replies: ReplyRegistry::new(),
            monitor_rules: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The peer's unique name, `:1.<id>`.
    #[inline]
    #[must_use]
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> PeerState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.state == PeerState::Registered
    }

    #[inline]
    #[must_use]
    pub fn is_monitor(&self) -> bool {
        self.state == PeerState::Monitor
    }

    pub fn register(&mut self) {
        debug_assert_eq!(self.state, PeerState::Unregistered);
        self.state = PeerState::Registered;
    }

    pub fn unregister(&mut self) {
        self.state = PeerState::Unregistered;
    }

    /// Enter monitor state with the given rule set.
    pub fn become_monitor(&mut self, rules: Vec<MatchRule>) {
        self.state = PeerState::Monitor;
        self.monitor_rules = rules;
    }

    pub fn stop_monitor(&mut self) {
        self.state = PeerState::Unregistered;
        self.monitor_rules.clear();
    }
}

/// The bus-wide peer table, iterated in id order.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: BTreeMap<PeerId, Peer>,
    next_id: u64,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    /// Ids count up from 1; `:1.0` is never handed out.
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Admit a new connection. Ids are monotonic and never reused.
    pub fn add(
        &mut self,
        credentials: PeerCredentials,
        policy: Arc<PolicySnapshot>,
        limits: &Limits,
    ) -> PeerId {
        let id = PeerId::new(self.next_id);
        self.next_id += 1;
        self.peers
            .insert(id, Peer::new(id, credentials, policy, limits));
        id
    }

    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, PeerId, Peer> {
        self.peers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
