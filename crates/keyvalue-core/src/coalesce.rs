//! Write coalescing
//!
//! Record writes submitted within one window collapse into a single backend
//! write per record. The window opens with the first pending submission and
//! later submissions do not extend it, so no write waits longer than one
//! window. The last submitted record wins and the outcome of that write is
//! delivered to every submitter, in submission order.
//! Read-modify-write sequences are not serialized, so this reduces backend
//! traffic but does not prevent lost updates between concurrent writers.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use keyvalue_storage::{StorageArea, StorageBackend, StorageError};

use crate::config::MAX_WRITE_WINDOW_MS;
use crate::error::KeyValueError;
use crate::Result;

type WriteOutcome = std::result::Result<(), Arc<StorageError>>;

#[derive(Default)]
struct PendingWrite {
    record: Map<String, Value>,
    waiters: Vec<oneshot::Sender<WriteOutcome>>,
}

struct QueueState {
    pending: HashMap<(StorageArea, String), PendingWrite>,
    /// When the oldest unflushed submission arrived
    first_submit: Option<Instant>,
    flush_scheduled: bool,
}

pub(crate) struct WriteCoalescer {
    backend: Arc<dyn StorageBackend>,
    window: Duration,
    state: Arc<Mutex<QueueState>>,
    /// Held across each physical flush so flushes land in order
    flush_lock: Arc<tokio::sync::Mutex<()>>,
}

impl WriteCoalescer {
    pub fn new(backend: Arc<dyn StorageBackend>, window: Duration) -> Self {
        Self {
            backend,
            window: window.min(Duration::from_millis(MAX_WRITE_WINDOW_MS)),
            state: Arc::new(Mutex::new(QueueState {
                pending: HashMap::new(),
                first_submit: None,
                flush_scheduled: false,
            })),
            flush_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Number of callers waiting on writes that have not been flushed yet
    #[cfg(test)]
    pub fn pending_waiters(&self) -> usize {
        self.state
            .lock()
            .pending
            .values()
            .map(|write| write.waiters.len())
            .sum()
    }

    /// Queue `record` to be stored under `key` and wait for the flush that
    /// carries it.
    pub async fn submit(
        &self,
        area: StorageArea,
        key: String,
        record: Map<String, Value>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock();
            if state.first_submit.is_none() {
                state.first_submit = Some(Instant::now());
            }
            let write = state.pending.entry((area, key)).or_default();
            write.record = record;
            write.waiters.push(tx);

            if !state.flush_scheduled {
                state.flush_scheduled = true;
                tokio::spawn(flush_after_window(
                    Arc::clone(&self.backend),
                    Arc::clone(&self.state),
                    Arc::clone(&self.flush_lock),
                    self.window,
                ));
            }
        }

        match rx.await {
            Ok(outcome) => outcome.map_err(KeyValueError::Storage),
            Err(_) => Err(KeyValueError::WriteAbandoned),
        }
    }
}

impl Clone for WriteCoalescer {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            window: self.window,
            state: Arc::clone(&self.state),
            flush_lock: Arc::clone(&self.flush_lock),
        }
    }
}

async fn flush_after_window(
    backend: Arc<dyn StorageBackend>,
    state: Arc<Mutex<QueueState>>,
    flush_lock: Arc<tokio::sync::Mutex<()>>,
    window: Duration,
) {
    let batch = loop {
        let deadline = {
            let mut state = state.lock();
            let now = Instant::now();
            let deadline = state
                .first_submit
                .and_then(|first| first.checked_add(window))
                .unwrap_or(now);
            if now >= deadline {
                state.flush_scheduled = false;
                state.first_submit = None;
                break std::mem::take(&mut state.pending);
            }
            deadline
        };
        tokio::time::sleep_until(deadline).await;
    };

    let _guard = flush_lock.lock().await;
    for ((area, key), write) in batch {
        let mut items = Map::new();
        items.insert(key.clone(), Value::Object(write.record));

        let outcome = backend.set(area, items).await.map_err(Arc::new);
        match &outcome {
            Ok(()) => tracing::debug!(
                area = %area,
                key = %key,
                waiters = write.waiters.len(),
                "Flushed coalesced write"
            ),
            Err(e) => tracing::warn!(
                area = %area,
                key = %key,
                waiters = write.waiters.len(),
                error = %e,
                "Coalesced write failed"
            ),
        }

        for waiter in write.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}
