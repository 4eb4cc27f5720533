//! On-demand service activation.
//!
//! An activatable name may sit unowned; traffic for it is captured instead
//! of bounced. Two queues accumulate in FIFO order: explicit
//! `StartServiceByName` requests, and unicast messages captured with a
//! snapshot of the sender's identity so that later delivery is judged by
//! the policy in force when the message was sent. When the service finally
//! takes the name both queues drain; if the controller reports failure they
//! drain into error replies instead.

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;

use fbus_types::PeerId;
use fbus_wire::Message;

use crate::policy::PolicySnapshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("activation queue quota exhausted")]
    Quota,
}

/// A queued `StartServiceByName` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRequest {
    pub sender: PeerId,
    pub serial: u32,
}

/// A unicast message captured while the name had no owner.
///
/// Carries the snapshot of the sender taken at capture time; the sender may
/// change names, change policy, or disconnect before the service appears.
#[derive(Debug)]
pub struct ActivationMessage {
    pub message: Arc<Message>,
    pub sender: PeerId,
    pub sender_names: BTreeSet<String>,
    pub sender_unique: String,
    pub sender_policy: Arc<PolicySnapshot>,
    pub sender_uid: u32,
}

/// Activation state of one name.
#[derive(Debug, Default)]
pub struct Activation {
    /// Whether the controller has been asked to start the service; reset
    /// when the name is taken or the start fails, re-arming future
    /// attempts.
    pub requested: bool,
    requests: VecDeque<ActivationRequest>,
    messages: VecDeque<ActivationMessage>,
}

impl Activation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> usize {
        self.requests.len() + self.messages.len()
    }

    /// Queue an explicit start request.
    pub fn queue_request(
        &mut self,
        request: ActivationRequest,
        max_entries: usize,
    ) -> Result<(), ActivationError> {
        if self.entries() >= max_entries {
            return Err(ActivationError::Quota);
        }
        self.requests.push_back(request);
        Ok(())
    }

    /// Capture a message for later delivery.
    pub fn queue_message(
        &mut self,
        message: ActivationMessage,
        max_entries: usize,
    ) -> Result<(), ActivationError> {
        if self.entries() >= max_entries {
            return Err(ActivationError::Quota);
        }
        self.messages.push_back(message);
        Ok(())
    }

    /// Take both queues for draining, FIFO order preserved.
    pub fn drain(&mut self) -> (Vec<ActivationRequest>, Vec<ActivationMessage>) {
        self.requested = false;
        (
            std::mem::take(&mut self.requests).into(),
            std::mem::take(&mut self.messages).into(),
        )
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.messages.is_empty()
    }
}
