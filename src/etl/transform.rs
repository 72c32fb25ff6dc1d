//! Transformer trait for data transformation

use eyre::Result;

/// Transformer trait for transforming data items
///
/// Implementors define how to transform items, typically a source row
/// into a serialized document.
///
/// # Example
/// ```
/// use sql_document_loader::etl::Transformer;
/// use sql_document_loader::row::Row;
/// use eyre::Result;
///
/// struct ColumnCounter;
///
/// impl Transformer for ColumnCounter {
///     type Input = Row;
///     type Output = usize;
///
///     fn transform(&self, input: Self::Input) -> Result<Self::Output> {
///         Ok(input.len())
///     }
/// }
///
/// let counts = ColumnCounter
///     .transform_many(vec![Row::new().with("A", 1), Row::new()])
///     .unwrap();
/// assert_eq!(counts, vec![1, 0]);
/// ```
pub trait Transformer: Send + Sync {
    /// Input item type
    type Input: Send;

    /// Output item type after transformation
    type Output: Send;

    /// Transform a single item
    ///
    /// # Errors
    /// Returns an error if transformation fails (validation, conversion, etc.)
    fn transform(&self, input: Self::Input) -> Result<Self::Output>;

    /// Transform multiple items (default batch implementation)
    ///
    /// Override this for optimized batch processing
    fn transform_many(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>> {
        inputs.into_iter().map(|i| self.transform(i)).collect()
    }
}
