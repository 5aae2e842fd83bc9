//! Process-wide session table.
//!
//! One reader-writer lock guards the map. Lookups (`validate`, `broadcast`)
//! share the read side; `create`, `terminate` and subscriber attach/detach
//! take the write side. No method awaits while holding the lock, so stream
//! tasks never keep it across a suspension point.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::types::ServerCapabilities;

/// Default capacity of a subscriber queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Producer half of a subscriber mailbox. The registry keeps one per
/// attached stream; the stream task owns the matching receiver.
pub type SubscriberQueue = mpsc::Sender<Value>;

/// Server-side context for one MCP client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub capabilities: ServerCapabilities,
    pub created_at: DateTime<Utc>,
    subscribers: Vec<SubscriberQueue>,
    closed: CancellationToken,
}

impl Session {
    fn new(closed: CancellationToken) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            capabilities: ServerCapabilities::default_capabilities(),
            created_at: Utc::now(),
            subscribers: Vec::new(),
            closed,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Fires when the session is terminated or the server shuts down.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// Registry of active sessions, shared by every HTTP handler.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    // Poison-safe lock access: a panicking handler must not take the table down with it.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a session with a fresh 128-bit random id and default capabilities.
    pub fn create(&self) -> Session {
        let session = Session::new(self.shutdown.child_token());
        let snapshot = session.clone();
        self.write().insert(session.id.clone(), session);
        tracing::info!(session_id = %snapshot.id, "Session created");
        snapshot
    }

    /// `false` for empty or unknown ids.
    pub fn validate(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        self.read().contains_key(id)
    }

    /// Snapshot of a session, if it exists.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.read().get(id).cloned()
    }

    /// Remove a session. Idempotent; returns whether anything was removed.
    ///
    /// Open streams on the session observe its `closed` signal and end.
    pub fn terminate(&self, id: &str) -> bool {
        let removed = self.write().remove(id);
        match removed {
            Some(session) => {
                session.closed.cancel();
                tracing::info!(session_id = %id, "Session terminated");
                true
            }
            None => false,
        }
    }

    /// Create a bounded mailbox sized by this registry's queue capacity.
    pub fn subscriber_queue(&self) -> (SubscriberQueue, mpsc::Receiver<Value>) {
        mpsc::channel(self.queue_capacity)
    }

    /// Add a queue to a session's subscriber set. Returns `false` if the
    /// session does not exist.
    pub fn attach_subscriber(&self, id: &str, queue: SubscriberQueue) -> bool {
        let mut sessions = self.write();
        match sessions.get_mut(id) {
            Some(session) => {
                session.subscribers.push(queue);
                tracing::debug!(
                    session_id = %id,
                    subscribers = session.subscribers.len(),
                    "Subscriber attached"
                );
                true
            }
            None => false,
        }
    }

    /// Remove a queue from a session's subscriber set. No-op if the session
    /// or the queue is unknown.
    pub fn detach_subscriber(&self, id: &str, queue: &SubscriberQueue) {
        let mut sessions = self.write();
        if let Some(session) = sessions.get_mut(id) {
            let before = session.subscribers.len();
            session.subscribers.retain(|q| !q.same_channel(queue));
            if session.subscribers.len() != before {
                tracing::debug!(
                    session_id = %id,
                    subscribers = session.subscribers.len(),
                    "Subscriber detached"
                );
            }
        }
    }

    /// Non-blocking fan-out to every subscriber of a session.
    ///
    /// A full queue drops the message for that subscriber only; existing
    /// queue contents are kept. Returns the number of queues that accepted it.
    pub fn broadcast(&self, id: &str, message: &Value) -> usize {
        let sessions = self.read();
        let Some(session) = sessions.get(id) else {
            return 0;
        };

        let mut delivered = 0;
        for queue in &session.subscribers {
            match queue.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(session_id = %id, "Subscriber queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!(session_id = %id, "Subscriber queue closed");
                }
            }
        }
        delivered
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Signal every session's streams to close. Sessions stay registered
    /// until the process exits.
    pub fn shutdown(&self) {
        tracing::info!(sessions = self.len(), "Closing all session streams");
        self.shutdown.cancel();
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
