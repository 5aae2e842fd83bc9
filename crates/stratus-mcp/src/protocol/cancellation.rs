//! In-flight request bookkeeping for `notifications/cancelled`.
//!
//! Each cancellable dispatch registers a token under its session and
//! request id and holds an [`InFlight`] guard. The guard removes the record
//! when the dispatch finishes; a matching cancellation notification from the
//! same session fires the token and removes the record first. A record never
//! comes back once removed. Ids are client-chosen, so two sessions may use
//! the same id without seeing each other's records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::types::RequestId;

/// Session id plus request id. Requests dispatched outside a session use an
/// empty session id.
type RecordKey = (String, RequestId);

struct Record {
    generation: u64,
    token: CancellationToken,
}

/// (session, request id) → cancellation handle. At most one record per id
/// within a session.
#[derive(Default)]
pub struct CancellationRegistry {
    active: Mutex<HashMap<RecordKey, Record>>,
    next_generation: AtomicU64,
}

fn key(session_id: &str, id: &RequestId) -> RecordKey {
    (session_id.to_string(), id.clone())
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordKey, Record>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an in-flight request. A stale record under the same id in
    /// the same session is cancelled and replaced.
    pub fn register(self: &Arc<Self>, session_id: &str, id: RequestId) -> InFlight {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let key = key(session_id, &id);
        let previous = self.lock().insert(
            key.clone(),
            Record {
                generation,
                token: token.clone(),
            },
        );
        if let Some(stale) = previous {
            tracing::warn!(
                session_id = %session_id,
                request_id = %id,
                "Duplicate in-flight request id, cancelling the older one"
            );
            stale.token.cancel();
        }

        InFlight {
            registry: Arc::clone(self),
            key,
            generation,
            token,
        }
    }

    /// Fire and remove the handle for `id` in `session_id`. Returns `false`
    /// for unknown or already-finished requests, including ids that are only
    /// in flight on another session.
    pub fn cancel(&self, session_id: &str, id: &RequestId) -> bool {
        let removed = self.lock().remove(&key(session_id, id));
        match removed {
            Some(record) => {
                record.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: &str, id: &RequestId) -> bool {
        self.lock().contains_key(&key(session_id, id))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn complete(&self, key: &RecordKey, generation: u64) {
        let mut active = self.lock();
        if active.get(key).is_some_and(|r| r.generation == generation) {
            active.remove(key);
        }
    }
}

/// Registration of one in-flight request; dropping it marks the request
/// completed.
pub struct InFlight {
    registry: Arc<CancellationRegistry>,
    key: RecordKey,
    generation: u64,
    token: CancellationToken,
}

impl InFlight {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.registry.complete(&self.key, self.generation);
    }
}
