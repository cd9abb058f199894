//! Caching repositories in front of remote collection and item resources.
//!
//! A [`Repository`] fetches full collections per scope, answers single-item
//! lookups from whatever it has cached, and keeps handing out the same
//! [`Item`] handle for a record across saves and reloads. Every operation
//! returns a [`Pending`] handle immediately.
//!
//! Operations should be issued from within a Tokio runtime. Remote results
//! are then processed on spawned tasks whether or not anyone awaits them.

pub mod cache;
pub mod config;
pub mod error;
pub mod pending;
pub mod repository;
pub mod resource;

pub use cache::{Collection, Item, Record};
pub use error::{FetchError, RepositoryError};
pub use pending::{Pending, PendingState};
pub use repository::{Params, Repository, RepositoryOptions};
pub use resource::{CollectionResource, ItemResource, RestResource, SearchResource};
