//! Security policy snapshots.
//!
//! The driver consults three questions: may this peer own a name, may it
//! send a given message, may a receiver accept one. Policy is compiled from
//! a serde-loadable rule list into an immutable [`PolicySnapshot`]; peers
//! capture an `Arc` of their snapshot at accept time, and activation
//! captures the sender's snapshot into queued messages, so later config
//! reloads never retroactively change in-flight decisions.
//!
//! Rule evaluation is last-match-wins over the rules whose constraints all
//! hold, starting from a configurable default verdict.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Verdict of a policy rule or default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Allow,
    Deny,
}

/// Constraint on who may own a well-known name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnRule {
    pub access: Access,
    /// Exact name, or a dot-terminated prefix when `prefix` is set.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prefix: bool,
}

/// Constraint on message transfer, used for both send and receive rules.
///
/// `peer_name` constrains the other side of the transfer: for send rules
/// the receiver, for receive rules the sender. A transfer matches when
/// every present constraint holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRule {
    pub access: Access,
    #[serde(default)]
    pub peer_name: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub member: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub message_type: Option<u8>,
    /// Restrict the rule to broadcasts (`true`) or unicasts (`false`).
    #[serde(default)]
    pub broadcast: Option<bool>,
}

/// Serde-loadable policy description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub default_access: Option<Access>,
    pub own: Vec<OwnRule>,
    pub send: Vec<TransferRule>,
    pub receive: Vec<TransferRule>,
}

/// Policy denial.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("access denied by policy")]
    AccessDenied,
}

/// Immutable, compiled policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    default_access: Access,
    own: Vec<OwnRule>,
    send: Vec<TransferRule>,
    receive: Vec<TransferRule>,
}

/// The other side of a transfer, as seen by a rule's `peer_name`
/// constraint: the driver itself, or a peer with its owned names.
#[derive(Debug, Clone, Copy)]
pub enum PeerNames<'a> {
    Driver,
    Names {
        unique: &'a str,
        owned: &'a BTreeSet<String>,
    },
}

impl PeerNames<'_> {
    fn contains(&self, name: &str) -> bool {
        match self {
            Self::Driver => name == fbus_types::protocol::DRIVER_NAME,
            Self::Names { unique, owned } => *unique == name || owned.contains(name),
        }
    }
}

impl PolicySnapshot {
    /// Compile a config into a snapshot.
    #[must_use]
    pub fn compile(config: &PolicyConfig) -> Arc<Self> {
        Arc::new(Self {
            default_access: config.default_access.unwrap_or(Access::Allow),
            own: config.own.clone(),
            send: config.send.clone(),
            receive: config.receive.clone(),
        })
    }

    /// A snapshot that allows everything.
    #[must_use]
    pub fn allow_all() -> Arc<Self> {
        Self::compile(&PolicyConfig::default())
    }

    /// May the holder of this snapshot own `name`?
    pub fn check_own(&self, name: &str) -> Result<(), PolicyError> {
        let mut verdict = self.default_access;
        for rule in &self.own {
            let applies = match (&rule.name, rule.prefix) {
                (None, _) => true,
                (Some(want), false) => want == name,
                (Some(want), true) => {
                    name == want || name.strip_prefix(want.as_str()).is_some_and(|r| r.starts_with('.'))
                }
            };
            if applies {
                verdict = rule.access;
            }
        }
        match verdict {
            Access::Allow => Ok(()),
            Access::Deny => Err(PolicyError::AccessDenied),
        }
    }

    /// May the holder send this message to `receiver`?
    pub fn check_send(
        &self,
        receiver: Option<PeerNames<'_>>,
        interface: Option<&str>,
        member: Option<&str>,
        path: Option<&str>,
        message_type: u8,
        broadcast: bool,
    ) -> Result<(), PolicyError> {
        Self::check_transfer(
            &self.send,
            self.default_access,
            receiver,
            interface,
            member,
            path,
            message_type,
            broadcast,
        )
    }

    /// May the holder receive this message from `sender`?
    pub fn check_receive(
        &self,
        sender: Option<PeerNames<'_>>,
        interface: Option<&str>,
        member: Option<&str>,
        path: Option<&str>,
        message_type: u8,
        broadcast: bool,
    ) -> Result<(), PolicyError> {
        Self::check_transfer(
            &self.receive,
            self.default_access,
            sender,
            interface,
            member,
            path,
            message_type,
            broadcast,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn check_transfer(
        rules: &[TransferRule],
        default_access: Access,
        peer: Option<PeerNames<'_>>,
        interface: Option<&str>,
        member: Option<&str>,
        path: Option<&str>,
        message_type: u8,
        broadcast: bool,
    ) -> Result<(), PolicyError> {
        let mut verdict = default_access;
        for rule in rules {
            if let Some(want) = &rule.peer_name {
                let holds = peer.as_ref().is_some_and(|p| p.contains(want));
                if !holds {
                    continue;
                }
            }
            if let Some(want) = &rule.interface {
                if interface != Some(want.as_str()) {
                    continue;
                }
            }
            if let Some(want) = &rule.member {
                if member != Some(want.as_str()) {
                    continue;
                }
            }
            if let Some(want) = &rule.path {
                if path != Some(want.as_str()) {
                    continue;
                }
            }
            if let Some(want) = rule.message_type {
                if message_type != want {
                    continue;
                }
            }
            if let Some(want) = rule.broadcast {
                if broadcast != want {
                    continue;
                }
            }
            verdict = rule.access;
        }
        match verdict {
            Access::Allow => Ok(()),
            Access::Deny => Err(PolicyError::AccessDenied),
        }
    }
}
