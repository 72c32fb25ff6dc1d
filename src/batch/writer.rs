//! Bounded, asynchronous batch writer

use super::{Batch, BatchOutcome, BatchStats, WriteTask};
use crate::error::LoadError;
use crate::etl::Loader;
use eyre::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

/// A sink accepting batches of write tasks
pub type DocumentSink = Arc<dyn Loader<Item = WriteTask>>;

/// Tuning for a [`BatchWriter`]
#[derive(Clone, Debug)]
pub struct BatchWriterConfig {
    /// Name used in log lines
    pub job_name: String,
    /// Maximum tasks per batch
    pub batch_size: usize,
    /// Number of workers transmitting batches; with more than one, batches
    /// may complete out of order
    pub thread_count: usize,
    /// Dispatched batches allowed to queue before `add` waits
    pub max_in_flight: usize,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            job_name: "sqlload".to_string(),
            batch_size: 100,
            thread_count: 1,
            max_in_flight: 2,
        }
    }
}

/// State shared between the producer and the workers
struct Shared {
    job_name: String,
    outstanding: AtomicUsize,
    idle: Notify,
    stats: Mutex<BatchStats>,
    outcomes: mpsc::UnboundedSender<BatchOutcome>,
}

impl Shared {
    fn stats(&self) -> BatchStats {
        match self.stats.lock() {
            Ok(stats) => *stats,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut BatchStats)) {
        match self.stats.lock() {
            Ok(mut stats) => f(&mut stats),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }
}

/// Accumulates write tasks and flushes them to a sink in bounded batches
///
/// Batches are transmitted by background tokio tasks. A failed batch is
/// reported through [`BatchWriter::drain_outcomes`] and the log, and never
/// stops later batches. Must be created inside a tokio runtime.
///
/// # Example
/// ```no_run
/// use sql_document_loader::batch::{BatchWriter, BatchWriterConfig, WriteTask};
/// use sql_document_loader::storage::MemorySink;
/// use sql_document_loader::transform::{Document, DocumentFormat};
/// use std::sync::Arc;
///
/// # async fn example() -> eyre::Result<()> {
/// let sink = Arc::new(MemorySink::new());
/// let mut writer = BatchWriter::new(BatchWriterConfig::default(), sink.clone());
///
/// let doc = Document::new(DocumentFormat::Xml, "<envelope/>");
/// writer.add(WriteTask::new("/a/1.xml", Arc::from(vec![]), doc)).await;
/// writer.flush_and_wait().await;
///
/// let stats = writer.stop().await?;
/// assert_eq!(stats.documents_written, 1);
/// # Ok(())
/// # }
/// ```
pub struct BatchWriter {
    batch_size: usize,
    pending: Vec<WriteTask>,
    next_sequence: u64,
    queue: mpsc::Sender<Batch>,
    shared: Arc<Shared>,
    outcomes: mpsc::UnboundedReceiver<BatchOutcome>,
    workers: Vec<JoinHandle<()>>,
    sink: DocumentSink,
}

impl BatchWriter {
    pub fn new(config: BatchWriterConfig, sink: DocumentSink) -> Self {
        let batch_size = config.batch_size.max(1);
        let thread_count = config.thread_count.max(1);
        let (queue, receiver) = mpsc::channel(config.max_in_flight.max(1));
        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            job_name: config.job_name,
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
            stats: Mutex::new(BatchStats::default()),
            outcomes: outcomes_tx,
        });

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..thread_count)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    receiver.clone(),
                    sink.clone(),
                    shared.clone(),
                ))
            })
            .collect();

        log::debug!(
            "Started batch writer '{}': batch size {}, {} worker(s)",
            shared.job_name,
            batch_size,
            thread_count
        );

        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
            next_sequence: 1,
            queue,
            shared,
            outcomes,
            workers,
            sink,
        }
    }

    /// Queue a task, dispatching the pending group once it is full
    ///
    /// Waits only when the dispatch queue is at its in-flight limit.
    pub async fn add(&mut self, task: WriteTask) {
        self.pending.push(task);
        if self.pending.len() >= self.batch_size {
            self.dispatch().await;
        }
    }

    /// Dispatch any partial group and wait until every dispatched batch has
    /// been acknowledged, successfully or not
    pub async fn flush_and_wait(&mut self) {
        if !self.pending.is_empty() {
            self.dispatch().await;
        }
        loop {
            if self.shared.outstanding.load(Ordering::Acquire) == 0 {
                break;
            }
            self.shared.idle.notified().await;
        }
    }

    /// Outcomes acknowledged since the last call, in completion order
    pub fn drain_outcomes(&mut self) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.outcomes.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Snapshot of the running totals
    pub fn stats(&self) -> BatchStats {
        self.shared.stats()
    }

    /// Batches dispatched but not yet acknowledged
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Tasks buffered but not yet dispatched
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flush remaining work, shut the workers down and stop the sink
    ///
    /// # Errors
    /// Returns an error if the sink fails to stop.
    pub async fn stop(mut self) -> Result<BatchStats> {
        self.flush_and_wait().await;

        let Self {
            queue,
            shared,
            workers,
            sink,
            ..
        } = self;
        drop(queue);
        for worker in workers {
            if let Err(e) = worker.await {
                log::error!("Batch worker for '{}' panicked: {}", shared.job_name, e);
            }
        }

        sink.stop().await?;
        let stats = shared.stats();
        log::debug!("Stopped batch writer '{}'", shared.job_name);
        Ok(stats)
    }

    async fn dispatch(&mut self) {
        let tasks = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let batch = Batch {
            sequence: self.next_sequence,
            tasks,
        };
        self.next_sequence += 1;

        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        self.shared.update_stats(|s| s.batches_dispatched += 1);
        log::debug!(
            "Dispatching batch {} ({} document(s))",
            batch.sequence,
            batch.len()
        );

        if let Err(mpsc::error::SendError(batch)) = self.queue.send(batch).await {
            // Every worker has exited, so nothing will acknowledge this batch.
            let message = "batch writer workers are not running".to_string();
            log::error!("Batch {} not sent: {}", batch.sequence, message);
            acknowledge(&self.shared, failed_outcome(&batch, message));
        }
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Batch>>>,
    sink: DocumentSink,
    shared: Arc<Shared>,
) {
    loop {
        let batch = { receiver.lock().await.recv().await };
        let Some(batch) = batch else {
            break;
        };

        let sequence = batch.sequence;
        let size = batch.len();
        let first_uri = batch.tasks.first().map(|t| t.uri.clone());

        // A sink that panics must still acknowledge its batch, so the load
        // runs in its own task and a JoinError becomes a failed outcome.
        let loader = sink.clone();
        let tasks = batch.tasks;
        let (written, failure) = match tokio::spawn(async move { loader.load(tasks).await }).await
        {
            Ok(Ok(written)) => {
                log::info!(
                    "[{}] Batch {} succeeded: {} document(s)",
                    shared.job_name,
                    sequence,
                    written
                );
                (written, None)
            }
            Ok(Err(e)) => {
                let written = match e.downcast_ref::<LoadError>() {
                    Some(LoadError::Sink { written, .. }) => *written,
                    _ => 0,
                };
                (written, Some(format!("{:#}", e)))
            }
            Err(e) => (0, Some(format!("sink panicked: {}", e))),
        };

        if let Some(message) = &failure {
            log::error!(
                "[{}] Batch {} failed ({} of {} document(s) written, first uri {}): {}",
                shared.job_name,
                sequence,
                written,
                size,
                first_uri.as_deref().unwrap_or("-"),
                message
            );
        }
        acknowledge(
            &shared,
            BatchOutcome {
                sequence,
                size,
                first_uri,
                written,
                failure,
            },
        );
    }
    log::trace!("Batch worker {} exiting", worker);
}

fn failed_outcome(batch: &Batch, message: String) -> BatchOutcome {
    BatchOutcome {
        sequence: batch.sequence,
        size: batch.len(),
        first_uri: batch.tasks.first().map(|t| t.uri.clone()),
        written: 0,
        failure: Some(message),
    }
}

/// Record an outcome, then release the batch from the outstanding count
fn acknowledge(shared: &Shared, outcome: BatchOutcome) {
    shared.update_stats(|s| s.record(&outcome));
    // The receiver lives as long as the writer; a closed channel only means
    // nobody is collecting outcomes any more.
    let _ = shared.outcomes.send(outcome);
    if shared.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
        shared.idle.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySink;
    use crate::transform::{Document, DocumentFormat};

    fn task(n: usize) -> WriteTask {
        WriteTask::new(
            format!("/src/sch/tbl/{}.xml", n),
            Arc::from(vec!["tbl".to_string()]),
            Document::new(DocumentFormat::Xml, format!("<id>{}</id>", n)),
        )
    }

    fn config(batch_size: usize) -> BatchWriterConfig {
        BatchWriterConfig {
            batch_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_batch_bound() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchWriter::new(config(100), sink.clone());

        for n in 0..250 {
            writer.add(task(n)).await;
        }
        writer.flush_and_wait().await;

        assert_eq!(sink.batch_sizes(), vec![100, 100, 50]);
        let stats = writer.stats();
        assert_eq!(stats.batches_dispatched, 3);
        assert_eq!(stats.documents_written, 250);
        assert_eq!(writer.outstanding(), 0);
        assert_eq!(writer.pending(), 0);
    }

    #[tokio::test]
    async fn test_partial_group_waits_for_flush() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchWriter::new(config(10), sink.clone());

        for n in 0..3 {
            writer.add(task(n)).await;
        }
        assert_eq!(writer.pending(), 3);
        assert_eq!(writer.stats().batches_dispatched, 0);

        writer.flush_and_wait().await;
        assert_eq!(sink.batch_sizes(), vec![3]);
    }

    #[tokio::test]
    async fn test_continue_on_failure() {
        let sink = Arc::new(MemorySink::new().fail_batches([2]));
        let mut writer = BatchWriter::new(config(2), sink.clone());

        for n in 0..6 {
            writer.add(task(n)).await;
        }
        writer.flush_and_wait().await;

        let mut outcomes = writer.drain_outcomes();
        outcomes.sort_by_key(|o| o.sequence);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert!(outcomes[2].is_success());
        assert_eq!(outcomes[1].first_uri.as_deref(), Some("/src/sch/tbl/2.xml"));

        let stats = writer.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.documents_written, 4);
        assert_eq!(stats.documents_failed, 2);
        assert_eq!(sink.documents().len(), 4);
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchWriter::new(config(3), sink.clone());

        for n in 0..10 {
            writer.add(task(n)).await;
        }
        writer.flush_and_wait().await;

        let uris: Vec<String> = sink.documents().into_iter().map(|t| t.uri).collect();
        let expected: Vec<String> = (0..10).map(|n| format!("/src/sch/tbl/{}.xml", n)).collect();
        assert_eq!(uris, expected);
    }

    #[tokio::test]
    async fn test_multiple_workers_deliver_everything() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchWriter::new(
            BatchWriterConfig {
                batch_size: 4,
                thread_count: 3,
                max_in_flight: 1,
                ..Default::default()
            },
            sink.clone(),
        );

        for n in 0..37 {
            writer.add(task(n)).await;
        }
        let stats = writer.stop().await.unwrap();

        assert_eq!(stats.batches_dispatched, 10);
        assert_eq!(stats.documents_written, 37);
        let mut uris: Vec<String> = sink.documents().into_iter().map(|t| t.uri).collect();
        uris.sort();
        uris.dedup();
        assert_eq!(uris.len(), 37);
    }

    #[tokio::test]
    async fn test_stop_flushes_and_stops_sink() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchWriter::new(config(100), sink.clone());
        writer.add(task(1)).await;

        let stats = writer.stop().await.unwrap();
        assert_eq!(stats.documents_written, 1);
        assert!(sink.is_stopped());
    }

    #[tokio::test]
    async fn test_flush_with_nothing_pending() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchWriter::new(config(5), sink.clone());
        writer.flush_and_wait().await;
        assert!(sink.batch_sizes().is_empty());
        assert!(writer.drain_outcomes().is_empty());
    }

    /// Accepts every document except the last one of each batch
    struct LastDocumentRejected;

    #[async_trait::async_trait]
    impl Loader for LastDocumentRejected {
        type Item = WriteTask;

        async fn load(&self, items: Vec<WriteTask>) -> Result<usize> {
            Err(LoadError::Sink {
                written: items.len() - 1,
                message: "1 document(s) failed".into(),
            }
            .into())
        }
    }

    #[tokio::test]
    async fn test_partial_batch_counts_written_documents() {
        let mut writer = BatchWriter::new(config(4), Arc::new(LastDocumentRejected));
        for n in 0..8 {
            writer.add(task(n)).await;
        }
        writer.flush_and_wait().await;

        let stats = writer.stats();
        assert_eq!(stats.batches_failed, 2);
        assert_eq!(stats.documents_written, 6);
        assert_eq!(stats.documents_failed, 2);
        assert!(writer.drain_outcomes().iter().all(|o| o.written == 3));
    }

    struct PanickingSink;

    #[async_trait::async_trait]
    impl Loader for PanickingSink {
        type Item = WriteTask;

        async fn load(&self, _items: Vec<WriteTask>) -> Result<usize> {
            panic!("connection state corrupted");
        }
    }

    #[tokio::test]
    async fn test_sink_panic_fails_batch_instead_of_hanging() {
        let mut writer = BatchWriter::new(config(2), Arc::new(PanickingSink));
        writer.add(task(1)).await;
        writer.add(task(2)).await;

        tokio::time::timeout(std::time::Duration::from_secs(5), writer.flush_and_wait())
            .await
            .expect("flush_and_wait returned");

        let outcomes = writer.drain_outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].error().unwrap().contains("panicked"));
        assert_eq!(writer.stats().documents_failed, 2);
        assert_eq!(writer.outstanding(), 0);

        // The worker survives the panic and keeps taking batches.
        writer.add(task(3)).await;
        writer.add(task(4)).await;
        writer.flush_and_wait().await;
        assert_eq!(writer.stats().batches_failed, 2);
    }
}
