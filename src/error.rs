//! Error types for repository operations.

use color_eyre::Report;
use std::sync::Arc;
use thiserror::Error;

/// Configuration errors, raised before any remote interaction.
#[derive(Debug, Error)]
pub enum RepositoryError {
  #[error("{repo}: options.item_key_name is undefined")]
  MissingItemKeyName { repo: String },

  #[error("{repo}: at most 4 collection key names are supported, got {count}")]
  TooManyCollectionKeys { repo: String, count: usize },

  #[error("{repo}.get(params) method has been called but no item_key_name has been specified for the repo")]
  GetWithoutItemKey { repo: String },

  #[error("{repo}.add(obj) method has been called but this repo should use save() for new items")]
  AddNotSupported { repo: String },

  #[error("{repo}.save(obj) method has been called with an object other than the one loaded by the repository (key {key})")]
  DetachedCopy { repo: String, key: String },

  #[error("{repo}: no {resource} resource has been configured")]
  MissingResource {
    repo: String,
    resource: &'static str,
  },
}

/// Result type alias for operations that can fail on configuration.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Failure of a pending operation.
///
/// Shared by every observer of the same pending handle, so the underlying
/// report sits behind an `Arc`.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct FetchError(Arc<Report>);

impl FetchError {
  /// The underlying report.
  pub fn report(&self) -> &Report {
    &self.0
  }
}

impl From<Report> for FetchError {
  fn from(report: Report) -> Self {
    Self(Arc::new(report))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  #[test]
  fn test_messages_name_the_repository() {
    let err = RepositoryError::AddNotSupported {
      repo: "users".to_string(),
    };
    assert!(err.to_string().starts_with("users.add(obj)"));
  }

  #[test]
  fn test_fetch_error_clones_share_report() {
    let err = FetchError::from(eyre!("connection refused"));
    let clone = err.clone();
    assert_eq!(clone.to_string(), "connection refused");
    assert!(std::ptr::eq(err.report(), clone.report()));
  }
}
