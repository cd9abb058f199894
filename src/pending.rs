//! Pending-result handles for remote operations.
//!
//! A `Pending<T>` is returned immediately by every repository operation and
//! settles exactly once, either resolved with a value or failed with a
//! [`FetchError`]. Handles are cheap to clone and every clone observes the
//! same outcome, which is what lets concurrent `get_all` calls share one
//! in-flight fetch.
//!
//! # Example
//!
//! ```ignore
//! let users = repo.get_all(json!({ "company_id": 100 }))?;
//! assert!(users.is_pending());
//!
//! // Later, in any task
//! let collection = users.await?;
//! ```

use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::FetchError;

/// Outcome of a settled pending operation.
pub type Outcome<T> = Result<T, FetchError>;

/// The state of a pending handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
  /// Remote operation has not settled yet
  Pending,
  /// Settled with a value
  Resolved,
  /// Settled with an error
  Failed,
}

/// Single-transition, multi-observer handle for a remote operation.
pub struct Pending<T: Clone> {
  inner: Shared<BoxFuture<'static, Outcome<T>>>,
}

impl<T> Pending<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// Start driving `future` and return a handle to its outcome.
  ///
  /// When called inside a Tokio runtime the future is spawned, so its
  /// resolution is processed even if every handle is dropped. Outside a
  /// runtime nothing drives it until a handle is first awaited, and it never
  /// settles if every handle is dropped first. Repository operations that
  /// must settle unobserved therefore have to be issued from within a
  /// runtime.
  pub fn spawn<F>(future: F) -> Self
  where
    F: Future<Output = Outcome<T>> + Send + 'static,
  {
    let inner = future.boxed().shared();
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
      runtime.spawn(inner.clone());
    }
    Self { inner }
  }

  /// A handle that is already resolved with `value`.
  pub fn ready(value: T) -> Self {
    Self::settled(Ok(value))
  }

  /// A handle that has already failed with `error`.
  pub fn failed(error: FetchError) -> Self {
    Self::settled(Err(error))
  }

  fn settled(outcome: Outcome<T>) -> Self {
    let inner = futures::future::ready(outcome).boxed().shared();
    // Poll once so the outcome is observable through `peek` right away
    let _ = inner.clone().now_or_never();
    Self { inner }
  }
}

impl<T: Clone> Pending<T> {
  /// Current state, without blocking.
  pub fn state(&self) -> PendingState {
    match self.inner.peek() {
      None => PendingState::Pending,
      Some(Ok(_)) => PendingState::Resolved,
      Some(Err(_)) => PendingState::Failed,
    }
  }

  pub fn is_pending(&self) -> bool {
    self.state() == PendingState::Pending
  }

  pub fn is_resolved(&self) -> bool {
    self.state() == PendingState::Resolved
  }

  pub fn is_failed(&self) -> bool {
    self.state() == PendingState::Failed
  }

  /// The outcome, if settled.
  pub fn peek(&self) -> Option<&Outcome<T>> {
    self.inner.peek()
  }

  /// The resolved value, if any.
  pub fn value(&self) -> Option<T> {
    match self.inner.peek() {
      Some(Ok(value)) => Some(value.clone()),
      _ => None,
    }
  }

  /// The failure, if any.
  pub fn error(&self) -> Option<&FetchError> {
    match self.inner.peek() {
      Some(Err(e)) => Some(e),
      _ => None,
    }
  }

  /// True if both handles observe the same underlying operation.
  pub fn ptr_eq(&self, other: &Self) -> bool {
    Shared::ptr_eq(&self.inner, &other.inner)
  }
}

impl<T: Clone> Clone for Pending<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<T: Clone> Future for Pending<T> {
  type Output = Outcome<T>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.inner).poll(cx)
  }
}

impl<T: Clone> fmt::Debug for Pending<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pending")
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}
