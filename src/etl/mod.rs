//! Core ETL (Extract, Transform, Load) abstractions
//!
//! A load is built from three seams: an [`Extractor`] yielding windows of
//! source rows, a [`Transformer`] turning each row into a document, and a
//! [`Loader`] accepting batches of write tasks.

mod extract;
mod load;
mod transform;

pub use extract::Extractor;
pub use load::Loader;
pub use transform::Transformer;
