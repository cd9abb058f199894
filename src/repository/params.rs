//! Operation parameters.

use serde_json::{Number, Value};

use crate::cache::{Item, Record};

/// Parameters accepted by repository operations: nothing, a bare key value,
/// or a field mapping.
///
/// A bare key is normalized into a mapping under the key name the operation
/// cares about (the first collection key for `get_all`, the item key for
/// `get` and `delete`).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
  #[default]
  None,
  Key(Value),
  Fields(Record),
}

impl Params {
  pub fn is_none(&self) -> bool {
    matches!(self, Params::None)
  }

  /// True for a bare string or number key.
  pub fn is_simple(&self) -> bool {
    matches!(self, Params::Key(_))
  }

  /// Normalize into a field mapping.
  pub fn into_fields(self, key_name: Option<&str>) -> Record {
    match self {
      Params::None => Record::new(),
      Params::Fields(fields) => fields,
      Params::Key(value) => key_name
        .map(|name| Record::from_iter([(name.to_string(), value)]))
        .unwrap_or_default(),
    }
  }
}

impl From<Value> for Params {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Params::None,
      Value::Object(fields) => Params::Fields(fields),
      other => Params::Key(other),
    }
  }
}

impl From<Record> for Params {
  fn from(fields: Record) -> Self {
    Params::Fields(fields)
  }
}

impl From<&Item> for Params {
  fn from(item: &Item) -> Self {
    Params::Fields(item.snapshot())
  }
}

impl From<&str> for Params {
  fn from(key: &str) -> Self {
    Params::Key(Value::String(key.to_string()))
  }
}

impl From<String> for Params {
  fn from(key: String) -> Self {
    Params::Key(Value::String(key))
  }
}

impl From<i64> for Params {
  fn from(key: i64) -> Self {
    Params::Key(Value::Number(Number::from(key)))
  }
}

impl From<u64> for Params {
  fn from(key: u64) -> Self {
    Params::Key(Value::Number(Number::from(key)))
  }
}

impl From<i32> for Params {
  fn from(key: i32) -> Self {
    Params::Key(Value::Number(Number::from(key)))
  }
}

impl<P: Into<Params>> From<Option<P>> for Params {
  fn from(params: Option<P>) -> Self {
    params.map(Into::into).unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_simple_key_lands_under_key_name() {
    let fields = Params::from(5).into_fields(Some("id"));
    assert_eq!(Value::Object(fields), json!({ "id": 5 }));
  }

  #[test]
  fn test_json_values_classify() {
    assert!(Params::from(json!(null)).is_none());
    assert!(Params::from(json!("acme")).is_simple());
    assert_eq!(
      Params::from(json!({ "company_id": 1 })).into_fields(Some("id")),
      json!({ "company_id": 1 }).as_object().cloned().unwrap()
    );
  }

  #[test]
  fn test_none_option_is_empty() {
    let params = Params::from(None::<&str>);
    assert!(params.into_fields(Some("id")).is_empty());
  }
}
