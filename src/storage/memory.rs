//! In-memory document sink

use crate::batch::WriteTask;
use crate::etl::Loader;
use async_trait::async_trait;
use eyre::Result;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Keeps every accepted batch in memory
///
/// Backs `load --dry-run` and the test suites. Selected calls can be made to
/// fail to simulate a store rejecting a batch, and `stop` can be made to fail
/// like a store that cannot be released.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<WriteTask>>>,
    calls: AtomicUsize,
    fail_on: HashSet<usize>,
    fail_stop: bool,
    stopped: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given `load` calls (1-based, in call order)
    pub fn fail_batches(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_on.extend(calls);
        self
    }

    /// Make `stop` return an error
    pub fn fail_on_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Sizes of the accepted batches, in acceptance order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().iter().map(Vec::len).collect()
    }

    /// Every accepted task, in acceptance order
    pub fn documents(&self) -> Vec<WriteTask> {
        self.lock().iter().flatten().cloned().collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<WriteTask>>> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Loader for MemorySink {
    type Item = WriteTask;

    async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        if self.fail_on.contains(&call) {
            eyre::bail!("Batch rejected by sink (call {})", call);
        }
        let count = items.len();
        self.lock().push(items);
        Ok(count)
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::Release);
        if self.fail_stop {
            eyre::bail!("Sink could not be stopped");
        }
        Ok(())
    }
}
