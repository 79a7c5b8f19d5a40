use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// A lazily-initialised, shareable resource slot.
///
/// Readers take the uncontended fast path through the `RwLock`. The first
/// caller to find the slot empty takes the async init lock, re-checks, runs
/// the initialiser and publishes the result, so at most one initialisation
/// runs at a time and concurrent first callers all observe the same value.
/// A failed initialisation publishes nothing; the next caller retries.
#[derive(Debug)]
pub(crate) struct SharedSlot<T> {
    value: RwLock<Option<Arc<T>>>,
    init: Mutex<()>,
}

impl<T> Default for SharedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<T>> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) async fn get_or_try_init<F, Fut, E>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let _guard = self.init.lock().await;
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let value = Arc::new(init().await?);
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Empties the slot, returning what it held.
    ///
    /// Waits for an in-flight initialisation so a value being created is
    /// never left behind after `take`.
    pub(crate) async fn take(&self) -> Option<Arc<T>> {
        let _guard = self.init.lock().await;
        self.value
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
