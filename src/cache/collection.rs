//! Live, sorted collections of cached items.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use super::item::Item;

/// Ordering applied to every cached collection.
///
/// Text values compare case-insensitively. Numbers sort greatest first.
/// Items lacking the compare field are reported once per sort and kept,
/// in their existing relative order, after the others.
#[derive(Debug, Clone)]
pub struct SortOrder {
  repo: String,
  compare_key: String,
}

/// Comparable form of one item's compare-field value
enum SortKey {
  Text(String),
  Number(f64),
  Missing,
}

impl SortOrder {
  pub fn new(repo: impl Into<String>, compare_key: impl Into<String>) -> Self {
    Self {
      repo: repo.into(),
      compare_key: compare_key.into(),
    }
  }

  pub fn compare_key(&self) -> &str {
    &self.compare_key
  }

  /// Sort `items` in place. Returns how many items lack a usable compare
  /// value.
  pub fn sort(&self, items: &mut Vec<Item>) -> usize {
    if items.len() < 2 {
      return 0;
    }

    let values: Vec<Option<Value>> = items
      .iter()
      .map(|item| item.get(&self.compare_key).filter(|v| !v.is_null()))
      .collect();

    // Any text value makes the whole field compare as text
    let textual = values.iter().flatten().any(Value::is_string);

    let mut keyed: Vec<(SortKey, Item)> = values
      .into_iter()
      .map(|value| sort_key(value, textual))
      .zip(items.drain(..))
      .collect();

    let unusable = keyed
      .iter()
      .filter(|(key, _)| matches!(key, SortKey::Missing))
      .count();
    if unusable > 0 {
      warn!(
        repo = %self.repo,
        compare_key = %self.compare_key,
        unusable,
        "compare key is invalid for repo: some items lack a comparable value"
      );
    }

    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b));
    items.extend(keyed.into_iter().map(|(_, item)| item));
    unusable
  }
}

fn sort_key(value: Option<Value>, textual: bool) -> SortKey {
  match value {
    None | Some(Value::Array(_)) | Some(Value::Object(_)) => SortKey::Missing,
    Some(Value::String(s)) => SortKey::Text(s.to_lowercase()),
    Some(other) if textual => {
      SortKey::Text(super::item::key_string(&other).unwrap_or_default().to_lowercase())
    }
    Some(Value::Number(n)) => n.as_f64().map(SortKey::Number).unwrap_or(SortKey::Missing),
    Some(Value::Bool(b)) => SortKey::Number(if b { 1.0 } else { 0.0 }),
    Some(_) => SortKey::Missing,
  }
}

fn compare_keys(a: &SortKey, b: &SortKey) -> Ordering {
  match (a, b) {
    (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
    // Greater value sorts first
    (SortKey::Number(a), SortKey::Number(b)) => b.total_cmp(a),
    (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
    (SortKey::Missing, _) => Ordering::Greater,
    (_, SortKey::Missing) => Ordering::Less,
    // Mixed kinds never occur within one sort
    (SortKey::Text(_), SortKey::Number(_)) => Ordering::Less,
    (SortKey::Number(_), SortKey::Text(_)) => Ordering::Greater,
  }
}

/// Ordered list of items shared between the cache and its readers.
///
/// The handle returned by `get_all` is the same list the cache mutates, so
/// later insertions and removals are visible through it.
#[derive(Clone, Default)]
pub struct Collection(Arc<RwLock<Vec<Item>>>);

impl Collection {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_items(items: Vec<Item>) -> Self {
    Self(Arc::new(RwLock::new(items)))
  }

  fn read(&self) -> RwLockReadGuard<'_, Vec<Item>> {
    self.0.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Vec<Item>> {
    self.0.write().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  /// Handles to the current items, in order.
  pub fn items(&self) -> Vec<Item> {
    self.read().clone()
  }

  pub fn get(&self, index: usize) -> Option<Item> {
    self.read().get(index).cloned()
  }

  /// First item whose `key_name` field matches `key`.
  pub fn find(&self, key_name: &str, key: &Value) -> Option<Item> {
    self
      .read()
      .iter()
      .find(|item| item.key_matches(key_name, key))
      .cloned()
  }

  pub fn contains(&self, item: &Item) -> bool {
    self.read().iter().any(|i| i.ptr_eq(item))
  }

  pub fn ptr_eq(&self, other: &Collection) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }

  /// Append `item` unless an item with the same key (or the same object when
  /// there is no key) is present, then re-sort. Returns whether it was added.
  pub(crate) fn insert(&self, item: &Item, key_name: Option<&str>, order: &SortOrder) -> bool {
    let mut items = self.write();
    let present = match key_name.and_then(|k| item.get(k).map(|v| (k, v))) {
      Some((k, key)) => items.iter().any(|i| i.key_matches(k, &key)),
      None => items.iter().any(|i| i.ptr_eq(item)),
    };
    if present {
      return false;
    }
    items.push(item.clone());
    order.sort(&mut items);
    true
  }

  /// Re-sort after items changed in place.
  pub(crate) fn sort(&self, order: &SortOrder) {
    order.sort(&mut self.write());
  }

  /// Keep only the items for which `keep` holds.
  pub(crate) fn retain(&self, keep: impl FnMut(&Item) -> bool) {
    self.write().retain(keep);
  }

  /// Remove and return the first item matching `key`.
  pub(crate) fn remove(&self, key_name: &str, key: &Value) -> Option<Item> {
    let mut items = self.write();
    let position = items.iter().position(|i| i.key_matches(key_name, key))?;
    Some(items.remove(position))
  }

  /// Replace the contents with `fetched`, keeping any current item whose
  /// key is not among them, then re-sort.
  ///
  /// A current item whose key is fetched again stays in place and takes the
  /// fetched fields, so handles already given out keep tracking the record.
  /// Later fetched records repeating an earlier key are dropped.
  pub(crate) fn absorb(&self, fetched: Vec<Item>, key_name: Option<&str>, order: &SortOrder) {
    let mut merged = unique_by_key(fetched, key_name);
    let mut items = self.write();
    for existing in items.drain(..) {
      match key_name.and_then(|k| existing.get(k).map(|v| (k, v))) {
        Some((k, key)) => match merged.iter().position(|i| i.key_matches(k, &key)) {
          Some(position) => {
            existing.assign_from(&merged[position]);
            merged[position] = existing;
          }
          None => merged.push(existing),
        },
        None => {
          if !merged.iter().any(|i| i.ptr_eq(&existing)) {
            merged.push(existing);
          }
        }
      }
    }
    order.sort(&mut merged);
    *items = merged;
  }
}

/// Keep the first item for each key. Items without a key are all kept.
fn unique_by_key(items: Vec<Item>, key_name: Option<&str>) -> Vec<Item> {
  let Some(key_name) = key_name else {
    return items;
  };
  let mut unique: Vec<Item> = Vec::with_capacity(items.len());
  for item in items {
    let repeated = item
      .get(key_name)
      .is_some_and(|key| unique.iter().any(|u| u.key_matches(key_name, &key)));
    if repeated {
      debug!(key_name, "dropping repeated key in fetched collection");
    } else {
      unique.push(item);
    }
  }
  unique
}

impl fmt::Debug for Collection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.read().iter()).finish()
  }
}
