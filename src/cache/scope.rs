//! Scope-key derivation for parameterized collections.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::item::{is_truthy, key_string, Record};

/// Scope key used when the collection takes no parameters.
pub const DEFAULT_SCOPE: &str = "defaultCachedList";

/// Separator between collection key values in a composite scope key.
pub const SCOPE_SEPARATOR: &str = "~~";

/// Maximum number of collection key names.
pub const MAX_COLLECTION_KEYS: usize = 4;

/// Transform applied to a key value before it is used remotely or in a
/// scope key.
pub type KeyDecorator = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Ordered collection key names and the decorator for the first one.
#[derive(Clone, Default)]
pub struct ScopeKeys {
  names: Vec<String>,
  decorator: Option<KeyDecorator>,
}

impl ScopeKeys {
  pub fn new(names: Vec<String>, decorator: Option<KeyDecorator>) -> Self {
    Self { names, decorator }
  }

  pub fn is_parameterized(&self) -> bool {
    !self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  /// Name of the first (primary) collection key.
  pub fn primary(&self) -> Option<&str> {
    self.names.first().map(String::as_str)
  }

  pub fn decorator(&self) -> Option<&KeyDecorator> {
    self.decorator.as_ref()
  }

  /// Derive the scope key for `params`.
  ///
  /// Returns `None` when the repository is parameterized but the primary
  /// key is absent, meaning the scope cannot be determined.
  pub fn scope_of(&self, params: &Record) -> Option<String> {
    let Some(primary) = self.primary() else {
      return Some(DEFAULT_SCOPE.to_string());
    };

    let first = key_string(params.get(primary)?)?;
    let mut scope = match &self.decorator {
      Some(decorate) => key_string(&decorate(&Value::String(first))).unwrap_or_default(),
      None => first,
    };

    for name in self.names.iter().skip(1) {
      scope.push_str(SCOPE_SEPARATOR);
      if let Some(value) = params.get(name).filter(|v| is_truthy(v)) {
        scope.push_str(&key_string(value).unwrap_or_default());
      }
    }

    if scope.is_empty() {
      return Some(DEFAULT_SCOPE.to_string());
    }
    Some(scope)
  }

  /// The subset of `params` holding collection key values.
  pub fn project(&self, params: &Record) -> Record {
    self
      .names
      .iter()
      .filter_map(|name| params.get(name).map(|v| (name.clone(), v.clone())))
      .collect()
  }
}

impl fmt::Debug for ScopeKeys {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ScopeKeys")
      .field("names", &self.names)
      .field("decorated", &self.decorator.is_some())
      .finish()
  }
}
