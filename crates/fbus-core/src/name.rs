//! Well-known names and their ownership queues.
//!
//! A name holds an ordered queue of ownerships; the head is the primary
//! owner, the one `GetNameOwner` reports. Every primary-owner transition
//! produces a [`NameChange`], which the driver turns into `NameLost` /
//! `NameOwnerChanged` / `NameAcquired` traffic. A name with an empty queue
//! and no activation record is garbage-collected.

use std::collections::btree_map;
use std::collections::{BTreeMap, VecDeque};

use fbus_types::protocol::{
    REQUEST_NAME_FLAG_ALLOW_REPLACEMENT, REQUEST_NAME_FLAG_DO_NOT_QUEUE,
    REQUEST_NAME_FLAG_REPLACE_EXISTING,
};
use fbus_types::PeerId;

use crate::activation::Activation;

/// One entry in a name's ownership queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameOwnership {
    pub owner: PeerId,
    pub flags: u32,
}

impl NameOwnership {
    #[inline]
    #[must_use]
    fn allows_replacement(&self) -> bool {
        self.flags & REQUEST_NAME_FLAG_ALLOW_REPLACEMENT != 0
    }

    #[inline]
    #[must_use]
    fn do_not_queue(&self) -> bool {
        self.flags & REQUEST_NAME_FLAG_DO_NOT_QUEUE != 0
    }
}

/// A well-known name.
#[derive(Debug)]
pub struct Name {
    queue: VecDeque<NameOwnership>,
    pub activation: Option<Activation>,
}

impl Name {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            activation: None,
        }
    }

    /// The primary owner, the head of the queue.
    #[must_use]
    pub fn primary(&self) -> Option<NameOwnership> {
        self.queue.front().copied()
    }

    /// Unique names of every queued owner, queue order.
    #[must_use]
    pub fn queued_owners(&self) -> Vec<PeerId> {
        self.queue.iter().map(|o| o.owner).collect()
    }

    #[must_use]
    fn in_queue(&self, peer: PeerId) -> Option<usize> {
        self.queue.iter().position(|o| o.owner == peer)
    }

    /// A name persists only while something references it.
    #[must_use]
    fn is_unused(&self) -> bool {
        self.queue.is_empty() && self.activation.is_none()
    }
}

/// A primary-owner transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChange {
    pub name: String,
    pub old_owner: Option<PeerId>,
    pub new_owner: Option<PeerId>,
}

/// Outcome of `RequestName`, mapped to the wire reply code by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestReply {
    PrimaryOwner,
    AlreadyOwner,
    InQueue,
    Exists,
}

/// Outcome of `ReleaseName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReply {
    Released,
    NonExistent,
    NotOwner,
}

/// The bus-wide name table, iterated in name order for `ListNames`.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: BTreeMap<String, Name>,
}

impl NameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Name> {
        self.names.get(name)
    }

    #[must_use]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Name> {
        self.names.get_mut(name)
    }

    /// Primary owner of `name`, if any.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<PeerId> {
        self.names.get(name)?.primary().map(|o| o.owner)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Name> {
        self.names.iter()
    }

    /// Install an activation record, creating the name if needed.
    pub fn set_activation(&mut self, name: &str, activation: Activation) {
        self.names
            .entry(name.to_owned())
            .or_insert_with(Name::new)
            .activation = Some(activation);
    }

    /// Ask for ownership of `name` on behalf of `peer`.
    ///
    /// Implements the replacement/queueing state machine; reserved-name,
    /// unique-name, and policy checks happen in the driver before this is
    /// called. Returns the reply code and the primary change, if one
    /// happened.
    pub fn request_name(
        &mut self,
        name: &str,
        peer: PeerId,
        flags: u32,
    ) -> (RequestReply, Option<NameChange>) {
        let entry = self
            .names
            .entry(name.to_owned())
            .or_insert_with(Name::new);
        let request = NameOwnership { owner: peer, flags };
        let replace = flags & REQUEST_NAME_FLAG_REPLACE_EXISTING != 0;

        let reply = match entry.in_queue(peer) {
            Some(0) => {
                // Re-requests update the stored flags, so a primary can
                // change its replaceability after the fact.
                entry.queue[0] = request;
                (RequestReply::AlreadyOwner, None)
            }
            Some(at) => {
                let primary = entry.queue[0];
                if primary.allows_replacement() && replace {
                    entry.queue.remove(at);
                    Self::displace(entry, request);
                    (
                        RequestReply::PrimaryOwner,
                        Some(NameChange {
                            name: name.to_owned(),
                            old_owner: Some(primary.owner),
                            new_owner: Some(peer),
                        }),
                    )
                } else if request.do_not_queue() {
                    entry.queue.remove(at);
                    (RequestReply::Exists, None)
                } else {
                    entry.queue[at] = request;
                    (RequestReply::InQueue, None)
                }
            }
            None => match entry.primary() {
                None => {
                    entry.queue.push_front(request);
                    (
                        RequestReply::PrimaryOwner,
                        Some(NameChange {
                            name: name.to_owned(),
                            old_owner: None,
                            new_owner: Some(peer),
                        }),
                    )
                }
                Some(primary) if primary.allows_replacement() && replace => {
                    Self::displace(entry, request);
                    (
                        RequestReply::PrimaryOwner,
                        Some(NameChange {
                            name: name.to_owned(),
                            old_owner: Some(primary.owner),
                            new_owner: Some(peer),
                        }),
                    )
                }
                Some(_) if request.do_not_queue() => (RequestReply::Exists, None),
                Some(_) => {
                    entry.queue.push_back(request);
                    (RequestReply::InQueue, None)
                }
            },
        };

        self.collect(name);
        reply
    }

    /// Push `request` to the front; the displaced primary stays at the head
    /// of the waiters unless it asked not to queue.
    fn displace(entry: &mut Name, request: NameOwnership) {
        if entry.queue.front().is_some_and(NameOwnership::do_not_queue) {
            entry.queue.pop_front();
        }
        entry.queue.push_front(request);
    }

    /// Give up `peer`'s entry in `name`'s queue.
    pub fn release_name(&mut self, name: &str, peer: PeerId) -> (ReleaseReply, Option<NameChange>) {
        let Some(entry) = self.names.get_mut(name) else {
            return (ReleaseReply::NonExistent, None);
        };
        if entry.queue.is_empty() {
            // activation-only record: the name exists but nobody owns it
            return (ReleaseReply::NonExistent, None);
        }
        let Some(at) = entry.in_queue(peer) else {
            return (ReleaseReply::NotOwner, None);
        };
        let change = self.remove_ownership(name, at);
        (ReleaseReply::Released, change)
    }

    /// Drop every ownership `peer` holds, yielding the primary changes.
    /// Used by the goodbye sequence.
    pub fn release_all(&mut self, peer: PeerId) -> Vec<NameChange> {
        let owned: Vec<String> = self
            .names
            .iter()
            .filter(|(_, name)| name.in_queue(peer).is_some())
            .map(|(name, _)| name.clone())
            .collect();
        let mut changes = Vec::new();
        for name in owned {
            let at = self
                .names
                .get(&name)
                .and_then(|entry| entry.in_queue(peer));
            if let Some(at) = at {
                if let Some(change) = self.remove_ownership(&name, at) {
                    changes.push(change);
                }
            }
        }
        changes
    }

    fn remove_ownership(&mut self, name: &str, at: usize) -> Option<NameChange> {
        let entry = self.names.get_mut(name)?;
        let removed = entry.queue.remove(at)?;
        let change = (at == 0).then(|| NameChange {
            name: name.to_owned(),
            old_owner: Some(removed.owner),
            new_owner: entry.primary().map(|o| o.owner),
        });
        self.collect(name);
        change
    }

    /// Drop the name once nothing references it.
    fn collect(&mut self, name: &str) {
        if self.names.get(name).is_some_and(Name::is_unused) {
            self.names.remove(name);
        }
    }
}
