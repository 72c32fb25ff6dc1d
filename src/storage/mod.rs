//! Local document sinks
//!
//! Destinations other than the remote document store:
//! - a directory tree mirroring document URIs
//! - an in-memory sink for dry runs

mod directory;
mod memory;

pub use directory::DirectorySink;
pub use memory::MemorySink;
