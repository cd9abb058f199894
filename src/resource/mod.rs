//! Remote collaborators a repository talks to.
//!
//! Each method issues the remote call and returns its pending outcome
//! immediately; the repository decides what to cache once it resolves.

mod rest;

pub use rest::RestResource;

use color_eyre::Result;
use futures::future::BoxFuture;

use crate::cache::Record;

/// Future returned by a remote call.
pub type Remote<T> = BoxFuture<'static, Result<T>>;

/// Collection endpoint: list and create.
pub trait CollectionResource: Send + Sync {
  /// Fetch every item of the collection selected by `params`.
  fn query(&self, params: Record) -> Remote<Vec<Record>>;

  /// Create a new item by posting to the collection.
  fn save(&self, params: Record) -> Remote<Record>;
}

/// Single-item endpoint: read, update/create, delete.
pub trait ItemResource: Send + Sync {
  fn get(&self, params: Record) -> Remote<Record>;

  fn save(&self, params: Record) -> Remote<Record>;

  fn delete(&self, params: Record) -> Remote<()>;
}

/// Search endpoint, queried with a single `q` parameter.
pub trait SearchResource: Send + Sync {
  fn query(&self, params: Record) -> Remote<Vec<Record>>;
}
