use {
    crate::domain::id::OrderId,
    std::{collections::HashMap, sync::Arc, sync::Mutex as StdMutex},
    tokio::sync::{Mutex, OwnedMutexGuard},
};

const CLEANUP_THRESHOLD: usize = 1024;

/// Per-order mutual exclusion for the reconcile check-then-act sequence.
///
/// The GET callback, the POST webhook and the client verify poll can all
/// fire for the same order within milliseconds of each other. The order's
/// mutex is held across load, classify and commit; the store's conditional
/// status updates remain as a second guard.
pub struct OrderLocks {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, order_id: &OrderId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("order lock map poisoned");
            if map.len() > CLEANUP_THRESHOLD {
                // Drop entries nobody is holding or waiting on.
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(order_id.as_str().to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for OrderLocks {
    fn default() -> Self {
        Self::new()
    }
}
