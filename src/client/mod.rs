//! Document store client and authentication.
//!
//! This module provides the [`DocumentStore`] sink for writing documents over
//! HTTP, along with authentication types ([`Auth`], [`AuthType`]).

mod auth;
mod store;

pub use auth::{Auth, AuthType};
pub use store::DocumentStore;
