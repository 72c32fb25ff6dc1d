//! Document addressing
//!
//! Resolves a stable identifier for each row and composes the destination
//! URI the document is written under.

mod builder;
mod identifier;

pub use builder::UriBuilder;
pub use identifier::{IdentifierResolver, KeySpec};
