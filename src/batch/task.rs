//! Units of work handed to a document sink

use crate::transform::Document;
use serde::Serialize;
use std::sync::Arc;

/// One document to write: destination URI, collection tags and content
#[derive(Clone, Debug, PartialEq)]
pub struct WriteTask {
    pub uri: String,
    pub collections: Arc<[String]>,
    pub document: Document,
}

impl WriteTask {
    pub fn new(uri: impl Into<String>, collections: Arc<[String]>, document: Document) -> Self {
        Self {
            uri: uri.into(),
            collections,
            document,
        }
    }
}

/// An ordered group of tasks transmitted to the sink together
#[derive(Debug)]
pub struct Batch {
    /// Dispatch order, starting at 1
    pub sequence: u64,
    pub tasks: Vec<WriteTask>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Acknowledgment of one batch by the sink
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub sequence: u64,
    pub size: usize,
    /// URI of the first task, to identify the batch in reports
    pub first_uri: Option<String>,
    /// Documents the sink accepted, also when the batch failed part way
    pub written: usize,
    /// Why the batch was not fully written
    pub failure: Option<String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn error(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// Running totals across all batches of a writer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub batches_dispatched: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub documents_written: u64,
    pub documents_failed: u64,
}

impl BatchStats {
    pub fn outstanding(&self) -> u64 {
        self.batches_dispatched - self.batches_succeeded - self.batches_failed
    }

    pub fn has_failures(&self) -> bool {
        self.batches_failed > 0
    }

    pub(crate) fn record(&mut self, outcome: &BatchOutcome) {
        if outcome.is_success() {
            self.batches_succeeded += 1;
        } else {
            self.batches_failed += 1;
        }
        let written = outcome.written.min(outcome.size);
        self.documents_written += written as u64;
        self.documents_failed += (outcome.size - written) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(size: usize, written: usize, failure: Option<&str>) -> BatchOutcome {
        BatchOutcome {
            sequence: 1,
            size,
            first_uri: None,
            written,
            failure: failure.map(String::from),
        }
    }

    #[test]
    fn test_stats_record() {
        let mut stats = BatchStats {
            batches_dispatched: 3,
            ..Default::default()
        };
        stats.record(&outcome(10, 10, None));
        stats.record(&outcome(10, 0, Some("rejected")));
        stats.record(&outcome(5, 4, None));

        assert_eq!(stats.batches_succeeded, 2);
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.documents_written, 14);
        assert_eq!(stats.documents_failed, 11);
        assert_eq!(stats.outstanding(), 0);
        assert!(stats.has_failures());
    }

    #[test]
    fn test_partially_written_batch() {
        let mut stats = BatchStats {
            batches_dispatched: 1,
            ..Default::default()
        };
        stats.record(&outcome(3, 2, Some("1 of 3 document(s) failed")));

        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.documents_written, 2);
        assert_eq!(stats.documents_failed, 1);
    }

    #[test]
    fn test_outcome_error() {
        assert_eq!(outcome(1, 0, Some("timeout")).error(), Some("timeout"));
        assert!(outcome(1, 1, None).is_success());
    }
}
