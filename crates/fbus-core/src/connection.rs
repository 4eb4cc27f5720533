//! Per-peer outgoing queues.
//!
//! A handler never blocks on a socket: enqueueing is a memory-only append,
//! and the event loop flushes the queue when the fd turns writable. The
//! queue is the unit of quota accounting; once a connection is shut down the
//! transport tears it down and nothing more is delivered.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;

use fbus_wire::Message;

use crate::limits::Limits;

/// Queue failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("outgoing queue quota exhausted")]
    Quota,
}

/// Outgoing half of a peer connection.
#[derive(Debug)]
pub struct Connection {
    queue: VecDeque<Arc<Message>>,
    queued_bytes: usize,
    max_bytes: usize,
    max_messages: usize,
    shutdown: bool,
}

impl Connection {
    #[must_use]
    pub fn new(limits: &Limits) -> Self {
        Self {
            queue: VecDeque::new(),
            queued_bytes: 0,
            max_bytes: limits.max_outgoing_bytes,
            max_messages: limits.max_outgoing_messages,
            shutdown: false,
        }
    }

    /// Append a message, charging its size against the queue quota.
    pub fn queue(&mut self, message: Arc<Message>) -> Result<(), ConnectionError> {
        if self.shutdown {
            // The transport is already going away; drop silently.
            return Ok(());
        }
        let size = message.size();
        if self.queue.len() >= self.max_messages || self.queued_bytes + size > self.max_bytes {
            return Err(ConnectionError::Quota);
        }
        self.queued_bytes += size;
        self.queue.push_back(message);
        Ok(())
    }

    /// Mark the connection for teardown. The event loop observes this,
    /// closes the socket, and runs the goodbye sequence.
    pub fn shutdown(&mut self) {
        self.shutdown = true;
        self.queue.clear();
        self.queued_bytes = 0;
    }

    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Dequeue the next message for the transport to write.
    pub fn pop_outgoing(&mut self) -> Option<Arc<Message>> {
        let message = self.queue.pop_front()?;
        self.queued_bytes -= message.size();
        Some(message)
    }

    #[inline]
    #[must_use]
    pub fn queued_messages(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    #[must_use]
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use fbus_types::MessageType;
    use fbus_wire::MessageBuilder;

    fn message() -> Arc<Message> {
        Arc::new(
            MessageBuilder::new(MessageType::Signal)
                .serial(1)
                .path("/org/freedesktop/DBus")
                .interface("org.freedesktop.DBus")
                .member("NameOwnerChanged")
                .build()
                .expect("message should build"),
        )
    }

    #[test]
    fn queue_accounts_bytes() {
        let mut conn = Connection::new(&Limits::default());
        let msg = message();
        conn.queue(Arc::clone(&msg)).expect("within quota");
        assert_eq!(conn.queued_bytes(), msg.size());
        assert_eq!(conn.queued_messages(), 1);
        let popped = conn.pop_outgoing().expect("one message queued");
        assert_eq!(popped.size(), msg.size());
        assert_eq!(conn.queued_bytes(), 0);
    }

    #[test]
    fn message_count_quota() {
        let limits = Limits {
            max_outgoing_messages: 2,
            ..Limits::default()
        };
        let mut conn = Connection::new(&limits);
        conn.queue(message()).expect("first fits");
        conn.queue(message()).expect("second fits");
        assert_eq!(conn.queue(message()), Err(ConnectionError::Quota));
    }

    #[test]
    fn byte_quota() {
        let msg = message();
        let limits = Limits {
            max_outgoing_bytes: msg.size() + 1,
            ..Limits::default()
        };
        let mut conn = Connection::new(&limits);
        conn.queue(Arc::clone(&msg)).expect("first fits");
        assert_eq!(conn.queue(msg), Err(ConnectionError::Quota));
    }

    #[test]
    fn shutdown_discards_quietly() {
        let mut conn = Connection::new(&Limits::default());
        conn.queue(message()).expect("within quota");
        conn.shutdown();
        assert!(conn.is_shutdown());
        assert_eq!(conn.queued_messages(), 0);
        conn.queue(message()).expect("silently dropped");
        assert_eq!(conn.queued_messages(), 0);
    }
}
