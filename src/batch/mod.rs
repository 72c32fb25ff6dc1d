//! Batched, asynchronous document writing
//!
//! [`BatchWriter`] buffers [`WriteTask`]s, hands bounded [`Batch`]es to a
//! sink on background workers, and reports one [`BatchOutcome`] per batch.

mod task;
mod writer;

pub use task::{Batch, BatchOutcome, BatchStats, WriteTask};
pub use writer::{BatchWriter, BatchWriterConfig, DocumentSink};
