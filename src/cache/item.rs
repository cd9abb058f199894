//! Shared item records and key comparison.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Field name to value mapping of a single item.
pub type Record = Map<String, Value>;

/// Handle to a cached item record.
///
/// Clones share the same record, so an update made through one handle is
/// observed by every holder. Two items are "the same object" when
/// [`Item::ptr_eq`] holds; matching across fetches uses [`keys_match`] on the
/// item-key field instead.
#[derive(Clone, Default)]
pub struct Item(Arc<RwLock<Record>>);

impl Item {
  pub fn new(record: Record) -> Self {
    Self(Arc::new(RwLock::new(record)))
  }

  /// Build an item from a JSON value. Non-object values yield an empty record.
  pub fn from_value(value: Value) -> Self {
    match value {
      Value::Object(record) => Self::new(record),
      _ => Self::default(),
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, Record> {
    self.0.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Record> {
    self.0.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Value of `field`, if present.
  pub fn get(&self, field: &str) -> Option<Value> {
    self.read().get(field).cloned()
  }

  pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) {
    self.write().insert(field.into(), value.into());
  }

  /// Copy of the current fields.
  pub fn snapshot(&self) -> Record {
    self.read().clone()
  }

  pub fn to_value(&self) -> Value {
    Value::Object(self.snapshot())
  }

  /// Overwrite this record's fields with those of `source`, in place.
  /// Fields absent from `source` are kept.
  pub fn assign(&self, source: &Record) {
    let mut record = self.write();
    for (field, value) in source {
      record.insert(field.clone(), value.clone());
    }
  }

  /// Copy the fields of `other` onto this item. No-op for the same object.
  pub fn assign_from(&self, other: &Item) {
    if self.ptr_eq(other) {
      return;
    }
    let source = other.snapshot();
    self.assign(&source);
  }

  /// True if the item's `key_name` field loosely equals `key`.
  pub fn key_matches(&self, key_name: &str, key: &Value) -> bool {
    self
      .read()
      .get(key_name)
      .is_some_and(|value| keys_match(value, key))
  }

  pub fn ptr_eq(&self, other: &Item) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl From<Record> for Item {
  fn from(record: Record) -> Self {
    Self::new(record)
  }
}

impl fmt::Debug for Item {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Item").field(&*self.read()).finish()
  }
}

/// Loose key equality: values are equal, or one is a string and the other a
/// number with the same textual form (`5 == "5"`). Null never matches.
pub fn keys_match(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Null, _) | (_, Value::Null) => false,
    (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
      n.to_string() == *s
        || match (n.as_f64(), s.trim().parse::<f64>()) {
          (Some(x), Ok(y)) => x == y,
          _ => false,
        }
    }
    (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
    _ => a == b,
  }
}

/// Textual form of a key value, as used to build scope keys.
/// Absent for null.
pub fn key_string(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    other => Some(other.to_string()),
  }
}

/// Whether a value counts as "set" for optional scope key positions.
pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0 && !x.is_nan()),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_keys_match_loosely() {
    assert!(keys_match(&json!(5), &json!(5)));
    assert!(keys_match(&json!(5), &json!("5")));
    assert!(keys_match(&json!("abc"), &json!("abc")));
    assert!(keys_match(&json!(5), &json!(5.0)));
    assert!(!keys_match(&json!(5), &json!(6)));
    assert!(!keys_match(&json!(null), &json!(null)));
    assert!(!keys_match(&json!("5x"), &json!(5)));
  }

  #[test]
  fn test_clones_share_updates() {
    let item = Item::new(record(json!({ "id": 1, "name": "Bob" })));
    let holder = item.clone();
    item.set("name", "Robert");
    assert_eq!(holder.get("name"), Some(json!("Robert")));
    assert!(holder.ptr_eq(&item));
  }

  #[test]
  fn test_assign_keeps_unrelated_fields() {
    let item = Item::new(record(json!({ "id": 1, "name": "Bob", "local": true })));
    item.assign(&record(json!({ "id": 1, "name": "Bobby" })));
    assert_eq!(item.get("name"), Some(json!("Bobby")));
    assert_eq!(item.get("local"), Some(json!(true)));
  }

  #[test]
  fn test_assign_from_self_is_noop() {
    let item = Item::new(record(json!({ "id": 1 })));
    item.assign_from(&item.clone());
    assert_eq!(item.get("id"), Some(json!(1)));
  }

  #[test]
  fn test_key_string_and_truthiness() {
    assert_eq!(key_string(&json!(100)), Some("100".to_string()));
    assert_eq!(key_string(&json!("acme")), Some("acme".to_string()));
    assert_eq!(key_string(&json!(null)), None);
    assert!(!is_truthy(&json!(0)));
    assert!(!is_truthy(&json!("")));
    assert!(is_truthy(&json!("x")));
  }
}
