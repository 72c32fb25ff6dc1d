//! Extractor trait for windowed data extraction

use crate::error::LoadError;
use async_trait::async_trait;

/// Extractor trait for pulling items from a source one window at a time
///
/// Implementors decide the window size (for database cursors this is the
/// prefetch size) so a whole result set is never held in memory.
///
/// # Example
/// ```no_run
/// use sql_document_loader::error::LoadError;
/// use sql_document_loader::etl::Extractor;
/// use async_trait::async_trait;
///
/// struct Countdown(u32);
///
/// #[async_trait]
/// impl Extractor for Countdown {
///     type Item = u32;
///
///     async fn extract(&mut self) -> Result<Vec<Self::Item>, LoadError> {
///         if self.0 == 0 {
///             return Ok(vec![]);
///         }
///         self.0 -= 1;
///         Ok(vec![self.0])
///     }
/// }
/// ```
#[async_trait]
pub trait Extractor: Send {
    /// The type of items extracted
    type Item: Send;

    /// Fetch the next window of items
    ///
    /// An empty window means the source is exhausted.
    ///
    /// # Errors
    /// Returns a typed [`LoadError`] so callers can tell fatal query
    /// failures from recoverable ones.
    async fn extract(&mut self) -> Result<Vec<Self::Item>, LoadError>;
}
