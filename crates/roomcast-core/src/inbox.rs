//! Bounded per-user mailboxes.
//!
//! An [`Inbox`] is a multiple-producer, single-consumer queue: any number
//! of dispatcher workers and senders push into it concurrently, while
//! exactly one transport-side consumer drains it. Pushes never block:
//! a full inbox rejects the message and the producer decides whether
//! that is an error (private delivery) or a silent drop (broadcast).
//!
//! "Closed" is an explicit terminal state: once [`Inbox::close`] runs,
//! producers observe [`PushError::Closed`] and the consumer sees
//! end-of-stream after draining whatever was already queued.

use crate::message::Message;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

/// Default capacity for personal and private inboxes.
pub const DEFAULT_INBOX_CAPACITY: usize = 1000;

/// Why a non-blocking push was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The inbox is at capacity.
    Full,
    /// The inbox has been closed (owner removed) or its consumer is gone.
    Closed,
}

/// A bounded mailbox owned by a single user.
#[derive(Debug)]
pub struct Inbox {
    /// Producer handle; `None` once the inbox is closed.
    tx: Mutex<Option<mpsc::Sender<Message>>>,
    /// Consumer handle, taken exactly once by the transport side.
    rx: Mutex<Option<mpsc::Receiver<Message>>>,
}

impl Inbox {
    /// Create an inbox holding at most `capacity` undelivered messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Push a message without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] when the inbox is saturated and
    /// [`PushError::Closed`] once the inbox has been closed.
    pub fn try_push(&self, message: Message) -> Result<(), PushError> {
        // Clone the sender out of the lock so the critical section never
        // spans the channel operation.
        let tx = {
            let guard = self.tx.lock().expect("inbox sender lock poisoned");
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => return Err(PushError::Closed),
            }
        };

        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PushError::Full),
            Err(TrySendError::Closed(_)) => Err(PushError::Closed),
        }
    }

    /// Hand the receiving end to the single consumer.
    ///
    /// Returns `None` if the receiver was already taken; an inbox has
    /// exactly one consumer for its whole lifetime.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Message>> {
        self.rx.lock().expect("inbox receiver lock poisoned").take()
    }

    /// Close the inbox.
    ///
    /// Producers fail fast afterwards; the consumer drains any queued
    /// messages and then observes end-of-stream. Idempotent.
    pub fn close(&self) {
        let prior = self.tx.lock().expect("inbox sender lock poisoned").take();
        if prior.is_some() {
            trace!("inbox closed");
        }
    }

    /// Whether [`Inbox::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .expect("inbox sender lock poisoned")
            .is_none()
    }
}
