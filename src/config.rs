//! YAML configuration of named repositories backed by a REST API.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::repository::{Repository, RepositoryOptions};
use crate::resource::RestResource;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Root URL every resource template is resolved against
  pub base_url: String,
  #[serde(default)]
  pub repositories: BTreeMap<String, RepositoryConfig>,
}

/// One repository. Resource fields are URL path templates such as
/// `/companies/:company_id/users/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryConfig {
  pub collection: Option<String>,
  pub item: Option<String>,
  pub search: Option<String>,
  #[serde(default)]
  pub collection_keys: Vec<String>,
  pub item_key: Option<String>,
  pub compare_key: Option<String>,
  #[serde(default)]
  pub no_cache: bool,
  #[serde(default)]
  pub uses_save_for_new_item: bool,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./repocache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/repocache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/repocache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("repocache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("repocache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.base_url()?;
    Ok(config)
  }

  /// Get the API token from the environment, if set.
  ///
  /// Checks REPOCACHE_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("REPOCACHE_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }

  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.base_url).map_err(|e| eyre!("Invalid base_url {}: {}", self.base_url, e))
  }

  /// Build the repository configured under `name`.
  pub fn repository(
    &self,
    name: &str,
    client: &reqwest::Client,
    token: Option<String>,
  ) -> Result<Repository> {
    let settings = self.repositories.get(name).ok_or_else(|| {
      let known: Vec<&str> = self.repositories.keys().map(String::as_str).collect();
      eyre!("Unknown repository '{}'. Configured: {}", name, known.join(", "))
    })?;

    let base = self.base_url()?;
    let options = settings.options(&base, client, token);
    Ok(Repository::new(name, options)?)
  }
}

impl RepositoryConfig {
  fn options(&self, base: &Url, client: &reqwest::Client, token: Option<String>) -> RepositoryOptions {
    let resource = |template: &String| {
      Arc::new(RestResource::new(client.clone(), base.clone(), template.as_str()).with_token(token.clone()))
    };

    let mut options = RepositoryOptions::new()
      .with_no_cache(self.no_cache)
      .with_save_for_new_items(self.uses_save_for_new_item);

    if let Some(template) = &self.collection {
      options = options.with_collection_resource(resource(template));
    }
    if let Some(template) = &self.item {
      options = options.with_item_resource(resource(template));
    }
    if let Some(template) = &self.search {
      options = options.with_search_resource(resource(template));
    }
    for key in &self.collection_keys {
      options = options.with_collection_key(key.as_str());
    }
    if let Some(key) = &self.item_key {
      options = options.with_item_key(key.as_str());
    }
    if let Some(key) = &self.compare_key {
      options = options.with_compare_key(key.as_str());
    }
    options
  }
}
