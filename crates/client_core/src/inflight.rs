use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::Notify;

use crate::error::{EntityKey, SyncError};

/// Set of entities with a mutation currently in flight.
///
/// Cloning shares the underlying set. Tokens are released from `Drop`, so the
/// set itself sits behind a std mutex that is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct InflightSet {
    inner: Arc<InflightInner>,
}

#[derive(Debug, Default)]
struct InflightInner {
    keys: Mutex<HashSet<EntityKey>>,
    released: Notify,
}

impl InflightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` busy, failing with [`SyncError::Busy`] if it already is.
    pub fn try_acquire(&self, key: EntityKey) -> Result<InflightToken, SyncError> {
        let mut keys = self.inner.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return Err(SyncError::Busy(key));
        }
        Ok(InflightToken {
            set: self.clone(),
            key,
        })
    }

    /// Waits until `key` is free, then marks it busy.
    pub async fn acquire(&self, key: EntityKey) -> InflightToken {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            match self.try_acquire(key.clone()) {
                Ok(token) => return token,
                Err(_) => {
                    tracing::debug!(entity = %key, "waiting for in-flight mutation");
                    released.await;
                }
            }
        }
    }

    pub fn is_busy(&self, key: &EntityKey) -> bool {
        self.inner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks one entity busy until dropped.
#[derive(Debug)]
#[must_use = "the entity is released as soon as the token is dropped"]
pub struct InflightToken {
    set: InflightSet,
    key: EntityKey,
}

impl InflightToken {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }
}

impl Drop for InflightToken {
    fn drop(&mut self) {
        self.set
            .inner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.set.inner.released.notify_waiters();
    }
}
