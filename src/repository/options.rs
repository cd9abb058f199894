//! Repository options.

use color_eyre::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::cache::{Item, KeyDecorator};
use crate::resource::{CollectionResource, ItemResource, SearchResource};

/// Post-resolution transform applied to every item before it is cached.
/// An error fails the operation that produced the item.
pub type ItemDecorator = Arc<dyn Fn(&Item) -> Result<()> + Send + Sync>;

/// Options for a [`Repository`](super::Repository). Everything is optional;
/// each resource enables the operations that need it.
#[derive(Clone, Default)]
pub struct RepositoryOptions {
  pub(crate) collection_resource: Option<Arc<dyn CollectionResource>>,
  pub(crate) collection_key_names: Vec<String>,
  pub(crate) collection_key_decorator: Option<KeyDecorator>,
  pub(crate) item_resource: Option<Arc<dyn ItemResource>>,
  pub(crate) item_key_name: Option<String>,
  pub(crate) item_key_decorator: Option<KeyDecorator>,
  pub(crate) item_decorator: Option<ItemDecorator>,
  pub(crate) search_resource: Option<Arc<dyn SearchResource>>,
  pub(crate) compare_key_name: Option<String>,
  pub(crate) no_cache: bool,
  pub(crate) uses_save_for_new_item: bool,
}

impl RepositoryOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Enables `get_all` and `add`.
  pub fn with_collection_resource(mut self, resource: Arc<dyn CollectionResource>) -> Self {
    self.collection_resource = Some(resource);
    self
  }

  /// Append a collection key name. Up to four, in order.
  pub fn with_collection_key(mut self, name: impl Into<String>) -> Self {
    self.collection_key_names.push(name.into());
    self
  }

  /// Transform applied to the first collection key before remote calls and
  /// scope-key derivation.
  pub fn with_collection_key_decorator(
    mut self,
    decorator: impl Fn(&Value) -> Value + Send + Sync + 'static,
  ) -> Self {
    self.collection_key_decorator = Some(Arc::new(decorator));
    self
  }

  /// Enables direct single-item `get`, `save` and `delete`.
  pub fn with_item_resource(mut self, resource: Arc<dyn ItemResource>) -> Self {
    self.item_resource = Some(resource);
    self
  }

  pub fn with_item_key(mut self, name: impl Into<String>) -> Self {
    self.item_key_name = Some(name.into());
    self
  }

  /// Transform applied to the item key before remote item calls.
  pub fn with_item_key_decorator(
    mut self,
    decorator: impl Fn(&Value) -> Value + Send + Sync + 'static,
  ) -> Self {
    self.item_key_decorator = Some(Arc::new(decorator));
    self
  }

  pub fn with_item_decorator(
    mut self,
    decorator: impl Fn(&Item) -> Result<()> + Send + Sync + 'static,
  ) -> Self {
    self.item_decorator = Some(Arc::new(decorator));
    self
  }

  /// Enables `search`.
  pub fn with_search_resource(mut self, resource: Arc<dyn SearchResource>) -> Self {
    self.search_resource = Some(resource);
    self
  }

  /// Field collections are sorted by. Defaults to `name` when a collection
  /// resource is configured, otherwise the item key.
  pub fn with_compare_key(mut self, name: impl Into<String>) -> Self {
    self.compare_key_name = Some(name.into());
    self
  }

  /// Disable all caching.
  pub fn with_no_cache(mut self, no_cache: bool) -> Self {
    self.no_cache = no_cache;
    self
  }

  /// Create new items through `save` instead of `add`.
  pub fn with_save_for_new_items(mut self, uses_save_for_new_item: bool) -> Self {
    self.uses_save_for_new_item = uses_save_for_new_item;
    self
  }

  /// The sort field in effect.
  pub fn compare_key(&self) -> String {
    match (&self.compare_key_name, &self.collection_resource) {
      (Some(name), _) => name.clone(),
      (None, Some(_)) => "name".to_string(),
      (None, None) => self.item_key_name.clone().unwrap_or_default(),
    }
  }
}

impl fmt::Debug for RepositoryOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RepositoryOptions")
      .field("collection_resource", &self.collection_resource.is_some())
      .field("collection_key_names", &self.collection_key_names)
      .field("item_resource", &self.item_resource.is_some())
      .field("item_key_name", &self.item_key_name)
      .field("search_resource", &self.search_resource.is_some())
      .field("compare_key_name", &self.compare_key_name)
      .field("no_cache", &self.no_cache)
      .field("uses_save_for_new_item", &self.uses_save_for_new_item)
      .finish_non_exhaustive()
  }
}
