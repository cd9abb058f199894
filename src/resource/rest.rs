//! REST implementation of the resource traits.

use color_eyre::{eyre::eyre, Result};
use futures::FutureExt;
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use super::{CollectionResource, ItemResource, Remote, SearchResource};
use crate::cache::{key_string, Record};

/// A REST endpoint described by a path template such as
/// `/companies/:company_id/users/:id`.
///
/// Placeholders are filled from the call's params; a placeholder without a
/// value drops its path segment. Params not consumed by the template are sent
/// as the query string for reads and deletes. Saves post the full params as
/// a JSON body.
#[derive(Clone, Debug)]
pub struct RestResource {
  client: reqwest::Client,
  base: Url,
  template: String,
  token: Option<String>,
}

impl RestResource {
  pub fn new(client: reqwest::Client, base: Url, template: impl Into<String>) -> Self {
    Self {
      client,
      base,
      template: template.into(),
      token: None,
    }
  }

  /// Send `token` as a bearer token with every request.
  pub fn with_token(mut self, token: Option<String>) -> Self {
    self.token = token;
    self
  }

  /// Build the request URL for `params`, returning it with the params the
  /// template did not consume.
  pub fn expand(&self, params: &Record) -> Result<(Url, Record)> {
    let mut remaining = params.clone();
    let mut segments = Vec::new();

    for segment in self.template.split('/').filter(|s| !s.is_empty()) {
      match segment.strip_prefix(':') {
        Some(name) => {
          if let Some(value) = remaining.remove(name).as_ref().and_then(key_string) {
            if !value.is_empty() {
              segments.push(value);
            }
          }
        }
        None => segments.push(segment.to_string()),
      }
    }

    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Base URL {} cannot carry a path", self.base))?
      .pop_if_empty()
      .extend(&segments);

    Ok((url, remaining))
  }

  fn with_query(mut url: Url, params: &Record) -> Url {
    if !params.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (name, value) in params {
        if let Some(value) = key_string(value) {
          pairs.append_pair(name, &value);
        }
      }
    }
    url
  }

  fn request(&self, method: &Method, params: &Record) -> Result<reqwest::RequestBuilder> {
    let (url, remaining) = self.expand(params)?;
    let builder = if *method == Method::POST {
      self.client.request(method.clone(), url).json(params)
    } else {
      self
        .client
        .request(method.clone(), Self::with_query(url, &remaining))
    };
    Ok(match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    })
  }

  fn dispatch(&self, method: Method, params: &Record) -> Remote<reqwest::Response> {
    let request = self.request(&method, params);
    async move {
      request?
        .send()
        .await
        .map_err(|e| eyre!("Failed to {} resource: {}", method, e))?
        .error_for_status()
        .map_err(|e| eyre!("{} request failed: {}", method, e))
    }
    .boxed()
  }

  fn send<T>(&self, method: Method, params: Record) -> Remote<T>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let response = self.dispatch(method.clone(), &params);
    async move {
      response
        .await?
        .json::<T>()
        .await
        .map_err(|e| eyre!("Failed to parse {} response: {}", method, e))
    }
    .boxed()
  }
}

impl CollectionResource for RestResource {
  fn query(&self, params: Record) -> Remote<Vec<Record>> {
    self.send(Method::GET, params)
  }

  fn save(&self, params: Record) -> Remote<Record> {
    self.send(Method::POST, params)
  }
}

impl ItemResource for RestResource {
  fn get(&self, params: Record) -> Remote<Record> {
    self.send(Method::GET, params)
  }

  fn save(&self, params: Record) -> Remote<Record> {
    self.send(Method::POST, params)
  }

  fn delete(&self, params: Record) -> Remote<()> {
    self
      .dispatch(Method::DELETE, &params)
      .map(|result| result.map(|_| ()))
      .boxed()
  }
}

impl SearchResource for RestResource {
  fn query(&self, params: Record) -> Remote<Vec<Record>> {
    self.send(Method::GET, params)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::MockServer;
  use serde_json::{json, Value};

  fn params(value: Value) -> Record {
    value.as_object().cloned().unwrap()
  }

  fn resource(base: &str, template: &str) -> RestResource {
    RestResource::new(reqwest::Client::new(), Url::parse(base).unwrap(), template)
  }

  #[test]
  fn test_expand_fills_placeholders() {
    let users = resource("https://api.example.com/v1", "/companies/:company_id/users/:id");
    let (url, remaining) = users
      .expand(&params(json!({ "company_id": 7, "id": "a b", "active": true })))
      .unwrap();

    assert_eq!(url.as_str(), "https://api.example.com/v1/companies/7/users/a%20b");
    assert_eq!(Value::Object(remaining), json!({ "active": true }));
  }

  #[test]
  fn test_expand_drops_missing_placeholder() {
    let users = resource("https://api.example.com/", "/users/:id");
    let (url, _) = users.expand(&Record::new()).unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/users");
  }

  #[tokio::test]
  async fn test_query_sends_remaining_params_as_query_string() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method("GET")
          .path("/companies/7/users")
          .query_param("active", "true");
        then
          .status(200)
          .json_body(json!([{ "id": 1, "name": "Bob", "company_id": 7 }]));
      })
      .await;

    let users = resource(&server.base_url(), "/companies/:company_id/users");
    let records = CollectionResource::query(&users, params(json!({ "company_id": 7, "active": true })))
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("name"), Some(&json!("Bob")));
  }

  #[tokio::test]
  async fn test_save_posts_json_body_with_token() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method("POST")
          .path("/users/5")
          .header("authorization", "Bearer secret")
          .json_body(json!({ "id": 5, "name": "Bob" }));
        then
          .status(200)
          .json_body(json!({ "id": 5, "name": "Bob", "version": 2 }));
      })
      .await;

    let users = resource(&server.base_url(), "/users/:id").with_token(Some("secret".to_string()));
    let saved = ItemResource::save(&users, params(json!({ "id": 5, "name": "Bob" })))
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(saved.get("version"), Some(&json!(2)));
  }

  #[tokio::test]
  async fn test_error_status_fails() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/users/9");
        then.status(404);
      })
      .await;

    let users = resource(&server.base_url(), "/users/:id");
    let err = ItemResource::get(&users, params(json!({ "id": 9 })))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("GET request failed"));
  }
}
