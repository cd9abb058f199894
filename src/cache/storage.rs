//! Per-scope collection cache.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::collection::{Collection, SortOrder};
use super::item::Item;
use crate::pending::Pending;

/// Cached collection for one scope.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// The live list of cached items
  pub collection: Collection,
  /// Set when the entry was populated by a full collection fetch. Only such
  /// entries may satisfy a later `get_all`.
  pub loaded_by_get_all: bool,
  /// The fetch that populated the entry, shared with every `get_all` caller
  pub pending: Option<Pending<Collection>>,
  /// Identifies the fetch that registered this entry
  pub(crate) ticket: u64,
}

impl CacheEntry {
  /// An entry holding `items` that was not produced by a full fetch.
  pub fn partial(collection: Collection) -> Self {
    Self {
      collection,
      loaded_by_get_all: false,
      pending: None,
      ticket: 0,
    }
  }

  /// Whether this entry can answer `get_all` for its scope.
  pub fn is_authoritative(&self) -> bool {
    self.loaded_by_get_all && self.pending.is_some()
  }
}

/// Mapping from scope key to cached collection.
///
/// At most one entry exists per scope. Every mutation re-sorts the affected
/// collection with the configured [`SortOrder`]. A disabled store ignores
/// writes and answers every lookup with a miss.
#[derive(Debug)]
pub struct CacheStore {
  entries: HashMap<String, CacheEntry>,
  item_key: Option<String>,
  order: SortOrder,
  enabled: bool,
}

impl CacheStore {
  pub fn new(item_key: Option<String>, order: SortOrder) -> Self {
    Self {
      entries: HashMap::new(),
      item_key,
      order,
      enabled: true,
    }
  }

  /// A store that caches nothing.
  pub fn disabled(item_key: Option<String>, order: SortOrder) -> Self {
    Self {
      enabled: false,
      ..Self::new(item_key, order)
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  pub fn item_key(&self) -> Option<&str> {
    self.item_key.as_deref()
  }

  pub fn order(&self) -> &SortOrder {
    &self.order
  }

  pub fn lookup(&self, scope: &str) -> Option<&CacheEntry> {
    if !self.enabled {
      return None;
    }
    self.entries.get(scope)
  }

  /// Swap in `entry` for `scope`, returning the prior entry.
  pub fn replace(&mut self, scope: impl Into<String>, entry: CacheEntry) -> Option<CacheEntry> {
    if !self.enabled {
      return None;
    }
    self.entries.insert(scope.into(), entry)
  }

  /// Drop the entry for `scope`.
  pub fn evict(&mut self, scope: &str) -> Option<CacheEntry> {
    self.entries.remove(scope)
  }

  /// Add `item` to the entry for `scope` if that entry exists and does not
  /// already hold the item's key. Never creates an entry.
  pub fn insert(&mut self, scope: &str, item: &Item) -> bool {
    if !self.enabled {
      return false;
    }
    let Some(entry) = self.entries.get(scope) else {
      debug!(scope, "no cached collection for scope, item not cached");
      return false;
    };
    entry
      .collection
      .insert(item, self.item_key.as_deref(), &self.order)
  }

  /// Re-sort the scope's collection after an item changed in place.
  pub fn resort(&self, scope: &str) {
    if let Some(entry) = self.lookup(scope) {
      entry.collection.sort(&self.order);
    }
  }

  /// Remove the item with key `key` from the scope's entry, or from the first
  /// entry holding it when the scope is unknown.
  pub fn remove(&mut self, scope: Option<&str>, key: &Value) -> Option<Item> {
    if !self.enabled {
      return None;
    }
    let key_name = self.item_key.as_deref()?;
    match scope {
      Some(scope) => self.entries.get(scope)?.collection.remove(key_name, key),
      None => self
        .entries
        .values()
        .find_map(|entry| entry.collection.remove(key_name, key)),
    }
  }

  /// Find the item with key `key` in the scope's entry.
  pub fn find(&self, scope: &str, key: &Value) -> Option<Item> {
    let key_name = self.item_key.as_deref()?;
    self.lookup(scope)?.collection.find(key_name, key)
  }

  /// Find the item with key `key` in any entry.
  ///
  /// Linear in the total number of cached items; used only when the
  /// caller's scope cannot be resolved to an entry.
  pub fn find_across_all_scopes(&self, key: &Value) -> Option<Item> {
    if !self.enabled {
      return None;
    }
    let key_name = self.item_key.as_deref()?;
    self
      .entries
      .values()
      .find_map(|entry| entry.collection.find(key_name, key))
  }

  /// Remove every entry.
  pub fn flush(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Collections by scope key.
  pub fn collections(&self) -> BTreeMap<String, Collection> {
    self
      .entries
      .iter()
      .map(|(scope, entry)| (scope.clone(), entry.collection.clone()))
      .collect()
  }
}
