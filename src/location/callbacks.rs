//! Keyed registry of pending one-shot callbacks.
//!
//! The region service answers through a named callback instead of a plain
//! response. Every request registers its own key here, and whichever channel
//! receives the answer (the JSONP body, or the `/api/callbacks/{key}` route)
//! fulfils that key exactly once. Entries are removed on fulfilment, on
//! timeout and when the waiter is dropped.

use crate::error::{FinderError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Clone, Default)]
pub struct CallbackRegistry {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh key `<prefix>_<uuid>` and start waiting on it.
    pub fn register(&self, prefix: &str) -> PendingCallback {
        let key = format!("{}_{}", prefix, uuid::Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        self.lock().insert(key.clone(), tx);
        debug!(%key, "registered callback");
        PendingCallback {
            key,
            rx: Some(rx),
            registry: self.clone(),
        }
    }

    /// Deliver `payload` to the waiter registered under `key`.
    ///
    /// Returns false for unknown or already fulfilled keys.
    pub fn fulfill(&self, key: &str, payload: Value) -> bool {
        let sender = self.lock().remove(key);
        match sender {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    warn!(%key, "callback waiter went away before delivery");
                    return false;
                }
                debug!(%key, "callback fulfilled");
                true
            }
            None => {
                warn!(%key, "no pending callback under this key");
                false
            }
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Value>>> {
        // A poisoned map is still structurally valid.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The waiting half of a registered callback.
pub struct PendingCallback {
    key: String,
    rx: Option<oneshot::Receiver<Value>>,
    registry: CallbackRegistry,
}

impl PendingCallback {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the single delivery, or fail after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Value> {
        let rx = match self.rx.take() {
            Some(rx) => rx,
            None => return Err(FinderError::UnresolvedLocation("callback already consumed".into())),
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(FinderError::UnresolvedLocation(format!(
                "callback {} was dropped without a payload",
                self.key
            ))),
            Err(_) => {
                warn!(key = %self.key, "callback timed out");
                Err(FinderError::Timeout {
                    what: format!("callback {}", self.key),
                    secs: timeout.as_secs(),
                })
            }
        }
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}
