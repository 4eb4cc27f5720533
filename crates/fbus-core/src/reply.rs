//! Reply slots.
//!
//! Forwarding a method call that expects a reply registers a slot: "the
//! waiter is owed a reply with this serial from the responder". The slot is
//! indexed from both sides so either side's teardown can find it — the
//! responder holds the registry, the waiter holds a set of (responder,
//! serial) keys. At most one slot may exist per key; a second registration
//! is a forged or duplicate call serial and is refused.

use std::collections::BTreeSet;

use thiserror::Error;

use fbus_types::PeerId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("pending reply with that serial already exists")]
    AlreadyExists,
}

/// The responder-side index: keys are `(waiter, serial)`.
#[derive(Debug, Default)]
pub struct ReplyRegistry {
    slots: BTreeSet<(PeerId, u32)>,
}

impl ReplyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that `waiter` awaits `serial` from the owner of this
    /// registry.
    pub fn add(&mut self, waiter: PeerId, serial: u32) -> Result<(), ReplyError> {
        if !self.slots.insert((waiter, serial)) {
            return Err(ReplyError::AlreadyExists);
        }
        Ok(())
    }

    /// Consume the slot for `(waiter, serial)`; false if none exists.
    pub fn consume(&mut self, waiter: PeerId, serial: u32) -> bool {
        self.slots.remove(&(waiter, serial))
    }

    /// Remove a slot during waiter-side teardown.
    pub fn remove(&mut self, waiter: PeerId, serial: u32) {
        self.slots.remove(&(waiter, serial));
    }

    /// Drain all slots, yielding the waiters owed a synthetic error when
    /// the responder disconnects.
    pub fn drain(&mut self) -> Vec<(PeerId, u32)> {
        std::mem::take(&mut self.slots).into_iter().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
