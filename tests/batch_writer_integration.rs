//! Integration tests for concurrent batch writing

use async_trait::async_trait;
use eyre::Result;
use sql_document_loader::batch::{BatchWriter, BatchWriterConfig, WriteTask};
use sql_document_loader::etl::Loader;
use sql_document_loader::transform::{Document, DocumentFormat};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Loader that sleeps per batch and records peak concurrency
#[derive(Default)]
struct SlowLoader {
    active: AtomicUsize,
    peak: AtomicUsize,
    written: AtomicUsize,
}

#[async_trait]
impl Loader for SlowLoader {
    type Item = WriteTask;

    async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.written.fetch_add(items.len(), Ordering::SeqCst);
        Ok(items.len())
    }
}

/// Loader that holds every batch until the test opens the gate
struct GatedLoader {
    entered: Notify,
    gate: Semaphore,
    written: AtomicUsize,
}

impl GatedLoader {
    fn closed() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
            written: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Loader for GatedLoader {
    type Item = WriteTask;

    async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
        self.entered.notify_one();
        let _permit = self.gate.acquire().await?;
        self.written.fetch_add(items.len(), Ordering::SeqCst);
        Ok(items.len())
    }
}

fn task(n: usize) -> WriteTask {
    WriteTask::new(
        format!("/a/b/c/{}.json", n),
        Arc::from(Vec::<String>::new()),
        Document::new(DocumentFormat::Json, format!(r#"{{"n":{}}}"#, n)),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bounded_by_thread_count() {
    let loader = Arc::new(SlowLoader::default());
    let mut writer = BatchWriter::new(
        BatchWriterConfig {
            job_name: "bounded".to_string(),
            batch_size: 5,
            thread_count: 3,
            max_in_flight: 2,
        },
        loader.clone(),
    );

    for n in 0..100 {
        writer.add(task(n)).await;
    }
    let stats = writer.stop().await.unwrap();

    assert_eq!(stats.batches_dispatched, 20);
    assert_eq!(stats.batches_succeeded, 20);
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(loader.written.load(Ordering::SeqCst), 100);
    let peak = loader.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 3, "peak concurrency {}", peak);
}

#[tokio::test]
async fn test_flush_waits_for_every_batch() {
    let loader = Arc::new(SlowLoader::default());
    let mut writer = BatchWriter::new(
        BatchWriterConfig {
            batch_size: 4,
            thread_count: 2,
            ..Default::default()
        },
        loader.clone(),
    );

    for n in 0..10 {
        writer.add(task(n)).await;
    }
    assert_eq!(writer.pending(), 2);

    writer.flush_and_wait().await;
    assert_eq!(writer.pending(), 0);
    assert_eq!(writer.outstanding(), 0);
    assert_eq!(loader.written.load(Ordering::SeqCst), 10);

    let outcomes = writer.drain_outcomes();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_success()));
    writer.stop().await.unwrap();
}

#[tokio::test]
async fn test_empty_writer_stops_cleanly() {
    let loader = Arc::new(SlowLoader::default());
    let writer = BatchWriter::new(BatchWriterConfig::default(), loader.clone());
    let stats = writer.stop().await.unwrap();
    assert_eq!(stats.batches_dispatched, 0);
    assert_eq!(loader.written.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_add_waits_while_queue_is_full() {
    let loader = Arc::new(GatedLoader::closed());
    let mut writer = BatchWriter::new(
        BatchWriterConfig {
            job_name: "gated".to_string(),
            batch_size: 1,
            thread_count: 1,
            max_in_flight: 2,
        },
        loader.clone(),
    );

    // The only worker takes the first batch and blocks in the sink.
    writer.add(task(1)).await;
    loader.entered.notified().await;

    // Two more batches fill the queue.
    writer.add(task(2)).await;
    writer.add(task(3)).await;
    assert_eq!(writer.outstanding(), 3);

    let overflow = tokio::spawn(async move {
        writer.add(task(4)).await;
        writer
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!overflow.is_finished(), "add returned while the queue was full");
    assert_eq!(loader.written.load(Ordering::SeqCst), 0);

    loader.gate.add_permits(4);
    let writer = tokio::time::timeout(Duration::from_secs(5), overflow)
        .await
        .expect("add completed once the sink drained")
        .unwrap();
    let stats = writer.stop().await.unwrap();

    assert_eq!(stats.batches_dispatched, 4);
    assert_eq!(stats.documents_written, 4);
    assert_eq!(loader.written.load(Ordering::SeqCst), 4);
}
