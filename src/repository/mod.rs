//! Caching repository in front of remote collection and item resources.
//!
//! A repository keeps one cached collection per scope (the values of its
//! collection keys) and hands out shared [`Item`] handles, so that a record
//! fetched once stays the same object across later lookups, saves and
//! reloads.
//!
//! - `get_all` fetches a scope's full collection once and shares the
//!   in-flight fetch with concurrent callers
//! - `get` answers from any cached collection before going remote, and
//!   falls back to a full collection fetch when no item resource exists
//! - Items fetched or created individually are cached only into a scope
//!   that already has a collection, except in item-only repositories
//! - `reload` refetches a scope and refreshes previously handed-out items in
//!   place rather than replacing them

mod options;
mod params;


pub use options::{ItemDecorator, RepositoryOptions};
pub use params::Params;

use color_eyre::eyre::eyre;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::cache::{
  key_string, CacheEntry, CacheStore, Collection, Item, KeyDecorator, Record, ScopeKeys,
  SortOrder, MAX_COLLECTION_KEYS,
};
use crate::error::{FetchError, RepositoryError, Result};
use crate::pending::{Outcome, Pending};

/// Caching repository for one kind of remote item.
///
/// Cloning is cheap and clones share the same cache.
#[derive(Clone)]
pub struct Repository {
  inner: Arc<Inner>,
}

struct Inner {
  name: String,
  options: RepositoryOptions,
  scope: ScopeKeys,
  cache: Mutex<CacheStore>,
  tickets: AtomicU64,
}

impl Repository {
  /// Create a repository named `name` (used in diagnostics).
  pub fn new(name: impl Into<String>, options: RepositoryOptions) -> Result<Self> {
    let name = name.into();

    if options.item_resource.is_some() && options.item_key_name.is_none() {
      return Err(RepositoryError::MissingItemKeyName { repo: name });
    }
    if options.collection_key_names.len() > MAX_COLLECTION_KEYS {
      return Err(RepositoryError::TooManyCollectionKeys {
        repo: name,
        count: options.collection_key_names.len(),
      });
    }

    let order = SortOrder::new(name.clone(), options.compare_key());
    let item_key = options.item_key_name.clone();
    let cache = if options.no_cache {
      CacheStore::disabled(item_key, order)
    } else {
      CacheStore::new(item_key, order)
    };
    let scope = ScopeKeys::new(
      options.collection_key_names.clone(),
      options.collection_key_decorator.clone(),
    );

    Ok(Self {
      inner: Arc::new(Inner {
        name,
        options,
        scope,
        cache: Mutex::new(cache),
        tickets: AtomicU64::new(0),
      }),
    })
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// Name of the field identifying an item, if configured.
  pub fn item_key(&self) -> Option<&str> {
    self.inner.options.item_key_name.as_deref()
  }

  /// The full collection for the scope selected by `params`.
  ///
  /// Served from the cache when the scope was already fetched; otherwise a
  /// single remote fetch is issued and shared with every caller until it
  /// settles.
  pub fn get_all(&self, params: impl Into<Params>) -> Result<Pending<Collection>> {
    let fields = self.collection_params(params.into(), "get_all");
    self.fetch_collection(fields, false)
  }

  /// Refetch the scope's collection even if it is cached, refreshing
  /// previously returned items in place. Joins a fetch already in flight.
  pub fn reload(&self, params: impl Into<Params>) -> Result<Pending<Collection>> {
    let fields = self.collection_params(params.into(), "reload");
    self.fetch_collection(fields, true)
  }

  /// A single item, from any cached collection when possible.
  pub fn get(&self, params: impl Into<Params>) -> Result<Pending<Item>> {
    let inner = &self.inner;
    let key_name = inner
      .options
      .item_key_name
      .clone()
      .ok_or_else(|| RepositoryError::GetWithoutItemKey {
        repo: inner.name.clone(),
      })?;

    let fields = params.into().into_fields(Some(&key_name));
    let key = fields.get(&key_name).cloned().unwrap_or(Value::Null);

    if let Some(found) = inner.find_existing(&fields, &key) {
      debug!(repo = %inner.name, key = %key, "item served from cache");
      return Ok(Pending::ready(found));
    }

    let Some(resource) = inner.options.item_resource.clone() else {
      warn!(
        repo = %inner.name,
        "get(params) called but no item resource has been specified; loading full collection instead"
      );
      return self.get_from_collection(&fields, key_name, key);
    };

    let request = decorate_key(
      fields,
      Some(&key_name),
      inner.options.item_key_decorator.as_ref(),
    );
    let remote = resource.get(request);
    let task = Arc::clone(inner);

    Ok(Pending::spawn(async move {
      let item = Item::new(remote.await?);
      task.decorate(&item)?;
      Ok(task.cache_item(&item))
    }))
  }

  /// Create `record` through the collection resource.
  pub fn add(&self, record: Record) -> Result<Pending<Item>> {
    let inner = &self.inner;
    if inner.options.uses_save_for_new_item {
      return Err(RepositoryError::AddNotSupported {
        repo: inner.name.clone(),
      });
    }
    let resource = inner
      .options
      .collection_resource
      .clone()
      .ok_or_else(|| inner.missing("collection"))?;

    let request = decorate_key(
      record,
      inner.scope.primary(),
      inner.scope.decorator(),
    );
    let remote = resource.save(request);
    let task = Arc::clone(inner);

    Ok(Pending::spawn(async move {
      let created = Item::new(remote.await?);
      task.decorate(&created)?;
      Ok(task.cache_item(&created))
    }))
  }

  /// Save `item` through the item resource.
  ///
  /// The returned handle resolves to `item` itself, updated in place with
  /// the fields the server returned.
  pub fn save(&self, item: &Item) -> Result<Pending<Item>> {
    let inner = &self.inner;
    if !inner.options.uses_save_for_new_item {
      inner.assert_not_copy(item)?;
    }
    let resource = inner
      .options
      .item_resource
      .clone()
      .ok_or_else(|| inner.missing("item"))?;

    let request = decorate_key(
      item.snapshot(),
      inner.options.item_key_name.as_deref(),
      inner.options.item_key_decorator.as_ref(),
    );
    let remote = resource.save(request);
    let task = Arc::clone(inner);
    let item = item.clone();

    Ok(Pending::spawn(async move {
      let saved = remote.await?;
      item.assign(&saved);
      task.decorate(&item)?;
      task.cache_item(&item);
      Ok(item)
    }))
  }

  /// Delete the item identified by `params`.
  ///
  /// The cached record is removed immediately; the remote delete settles on
  /// its own and is not undone in the cache if it fails.
  pub fn delete(&self, params: impl Into<Params>) -> Result<Pending<()>> {
    let inner = &self.inner;
    let resource = inner
      .options
      .item_resource
      .clone()
      .ok_or_else(|| inner.missing("item"))?;

    let key_name = inner.options.item_key_name.as_deref();
    let fields = params.into().into_fields(key_name);
    let request = decorate_key(
      fields.clone(),
      key_name,
      inner.options.item_key_decorator.as_ref(),
    );
    let remote = resource.delete(request);

    if let Some(key) = key_name.and_then(|k| fields.get(k)) {
      let mut store = inner.store();
      let scope = inner
        .scope
        .scope_of(&fields)
        .filter(|scope| store.lookup(scope).is_some());
      if store.remove(scope.as_deref(), key).is_some() {
        debug!(repo = %inner.name, key = %key, "removed deleted item from cache");
      }
    }

    Ok(Pending::spawn(async move {
      remote.await?;
      Ok(())
    }))
  }

  /// Query the search resource. Never reads or writes the cache.
  pub fn search(&self, query: &str) -> Result<Pending<Vec<Item>>> {
    let inner = &self.inner;
    let resource = inner
      .options
      .search_resource
      .clone()
      .ok_or_else(|| inner.missing("search"))?;

    let params = Record::from_iter([("q".to_string(), Value::String(query.to_string()))]);
    let remote = resource.query(params);
    let task = Arc::clone(inner);

    Ok(Pending::spawn(async move {
      let items: Vec<Item> = remote.await?.into_iter().map(Item::new).collect();
      for item in &items {
        task.decorate(item)?;
      }
      Ok(items)
    }))
  }

  /// Cached collections by scope key.
  pub fn cache(&self) -> BTreeMap<String, Collection> {
    self.inner.store().collections()
  }

  /// Drop every cached collection.
  pub fn flush_cache(&self) {
    self.inner.store().flush();
    debug!(repo = %self.inner.name, "cache flushed");
  }

  fn collection_params(&self, params: Params, operation: &str) -> Record {
    let scope = &self.inner.scope;
    if !params.is_none() && !scope.is_parameterized() {
      warn!(
        repo = %self.inner.name,
        "{}(params) called with params but no collection key has been specified for the repo",
        operation
      );
    }
    if params.is_simple() && scope.names().len() > 1 {
      warn!(
        repo = %self.inner.name,
        "{}(params) called with a simple parameter, but the repo has several collection keys",
        operation
      );
    }
    params.into_fields(scope.primary())
  }

  fn fetch_collection(&self, fields: Record, force: bool) -> Result<Pending<Collection>> {
    let inner = &self.inner;
    let scope = inner.scope.scope_of(&fields);
    if scope.is_none() {
      warn!(
        repo = %inner.name,
        "collection key missing from params; the collection will not be cached"
      );
    }

    let mut store = inner.store();
    let prior = scope.as_deref().and_then(|s| store.lookup(s)).cloned();

    let authoritative = prior
      .as_ref()
      .filter(|entry| entry.is_authoritative())
      .and_then(|entry| entry.pending.as_ref());
    if let Some(pending) = authoritative {
      if !force || pending.is_pending() {
        debug!(repo = %inner.name, scope = ?scope, "collection served from cache");
        return Ok(pending.clone());
      }
    }

    let resource = inner
      .options
      .collection_resource
      .clone()
      .ok_or_else(|| inner.missing("collection"))?;
    let request = decorate_key(fields, inner.scope.primary(), inner.scope.decorator());
    let remote = resource.query(request);

    let ticket = inner.tickets.fetch_add(1, Ordering::Relaxed) + 1;
    // Prior items stay visible to `get` while the fetch is in flight
    let collection = match &prior {
      Some(entry) => Collection::from_items(entry.collection.items()),
      None => Collection::new(),
    };

    let task = Arc::clone(inner);
    let task_scope = scope.clone();
    let task_collection = collection.clone();
    let task_prior = prior.clone();
    let pending = Pending::spawn(async move {
      let outcome = match remote.await {
        Ok(records) => task.fold_collection(
          records,
          task_prior.as_ref().map(|e| &e.collection),
          &task_collection,
        ),
        Err(report) => Err(FetchError::from(report)),
      };
      if outcome.is_err() {
        task.abandon_fetch(task_scope.as_deref(), ticket, task_prior);
      }
      outcome
    });

    if let Some(scope) = scope {
      debug!(repo = %inner.name, scope = %scope, "fetching collection");
      store.replace(
        scope,
        CacheEntry {
          collection,
          loaded_by_get_all: true,
          pending: Some(pending.clone()),
          ticket,
        },
      );
    }

    Ok(pending)
  }

  fn get_from_collection(&self, fields: &Record, key_name: String, key: Value) -> Result<Pending<Item>> {
    let listing = self.fetch_collection(self.inner.scope.project(fields), false)?;
    let repo = self.inner.name.clone();

    Ok(Pending::spawn(async move {
      let collection = listing.await?;
      collection.find(&key_name, &key).ok_or_else(|| {
        FetchError::from(eyre!(
          "{}: no item with {} {} in the collection",
          repo,
          key_name,
          key
        ))
      })
    }))
  }
}

impl Inner {
  fn store(&self) -> MutexGuard<'_, CacheStore> {
    self.cache.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn missing(&self, resource: &'static str) -> RepositoryError {
    RepositoryError::MissingResource {
      repo: self.name.clone(),
      resource,
    }
  }

  fn decorate(&self, item: &Item) -> Outcome<()> {
    match &self.options.item_decorator {
      Some(decorate) => decorate(item).map_err(FetchError::from),
      None => Ok(()),
    }
  }

  /// Look `key` up in the scope's collection, or in every collection when the
  /// scope has none.
  fn find_existing(&self, fields: &Record, key: &Value) -> Option<Item> {
    if key.is_null() {
      return None;
    }
    let store = self.store();
    match self.scope.scope_of(fields) {
      Some(scope) if store.lookup(&scope).is_some() => store.find(&scope, key),
      _ => store.find_across_all_scopes(key),
    }
  }

  /// Refuse to save a copy of an item the cache already holds.
  fn assert_not_copy(&self, item: &Item) -> Result<()> {
    let (Some(key_name), fields) = (self.options.item_key_name.as_deref(), item.snapshot()) else {
      return Ok(());
    };
    let (Some(key), Some(scope)) = (fields.get(key_name), self.scope.scope_of(&fields)) else {
      return Ok(());
    };

    let store = self.store();
    match store.find(&scope, key) {
      Some(existing) if !existing.ptr_eq(item) => Err(RepositoryError::DetachedCopy {
        repo: self.name.clone(),
        key: key_string(key).unwrap_or_default(),
      }),
      _ => Ok(()),
    }
  }

  /// Cache `item` into its scope's existing collection. Item-only
  /// repositories get a partial entry for the scope on first use.
  ///
  /// Returns the cached object for the item's key, which is `item` unless
  /// another object was already cached; that one is refreshed from `item`.
  fn cache_item(&self, item: &Item) -> Item {
    let mut store = self.store();
    if !store.is_enabled() {
      return item.clone();
    }
    let fields = item.snapshot();
    let Some(scope) = self.scope.scope_of(&fields) else {
      return item.clone();
    };

    let key = self
      .options
      .item_key_name
      .as_deref()
      .and_then(|k| fields.get(k));
    if let Some(existing) = key.and_then(|key| store.find(&scope, key)) {
      if !existing.ptr_eq(item) {
        existing.assign(&fields);
      }
      store.resort(&scope);
      return existing;
    }

    // Without a collection resource no full fetch can ever create the scope
    if self.options.collection_resource.is_none() && store.lookup(&scope).is_none() {
      store.replace(scope.clone(), CacheEntry::partial(Collection::new()));
    }
    if store.insert(&scope, item) {
      debug!(repo = %self.name, scope = %scope, "item cached");
    }
    item.clone()
  }

  /// Fill `target` with a freshly fetched collection, reusing the prior
  /// collection's item objects for keys present in both. Prior items the
  /// fetch no longer returns are dropped.
  fn fold_collection(
    &self,
    records: Vec<Record>,
    prior: Option<&Collection>,
    target: &Collection,
  ) -> Outcome<Collection> {
    let mut fetched = Vec::with_capacity(records.len());
    for record in records {
      let item = Item::new(record);
      self.decorate(&item)?;
      fetched.push(item);
    }

    let store = self.store();
    let key_name = self.options.item_key_name.as_deref();

    // Prior items still in the collection, i.e. not deleted meanwhile
    let held: Vec<Item> = match prior {
      Some(prior) => target
        .items()
        .into_iter()
        .filter(|item| prior.contains(item))
        .collect(),
      None => Vec::new(),
    };

    if let Some(key_name) = key_name.filter(|_| !held.is_empty()) {
      let mut refreshed = 0;
      for prior_item in &held {
        let Some(key) = prior_item.get(key_name) else {
          continue;
        };
        if let Some(position) = fetched.iter().position(|i| i.key_matches(key_name, &key)) {
          let fresh = std::mem::replace(&mut fetched[position], prior_item.clone());
          prior_item.assign_from(&fresh);
          refreshed += 1;
        }
      }
      debug!(repo = %self.name, refreshed, "merged reloaded collection into prior items");
    }

    target.retain(|item| !held.iter().any(|h| h.ptr_eq(item)));
    target.absorb(fetched, key_name, store.order());
    Ok(target.clone())
  }

  /// Undo the registration of a failed collection fetch, restoring the
  /// entry it replaced.
  fn abandon_fetch(&self, scope: Option<&str>, ticket: u64, prior: Option<CacheEntry>) {
    let Some(scope) = scope else {
      return;
    };
    let mut store = self.store();
    if store.lookup(scope).is_some_and(|entry| entry.ticket == ticket) {
      match prior {
        Some(prior) => {
          store.replace(scope, prior);
        }
        None => {
          store.evict(scope);
        }
      }
      debug!(repo = %self.name, scope, "evicted failed collection fetch");
    }
  }
}

/// Apply `decorator` to the `key_name` field of a request, if both exist.
fn decorate_key(
  mut fields: Record,
  key_name: Option<&str>,
  decorator: Option<&KeyDecorator>,
) -> Record {
  if let (Some(name), Some(decorate)) = (key_name, decorator) {
    if let Some(value) = fields.get_mut(name) {
      let decorated = decorate(value);
      *value = decorated;
    }
  }
  fields
}

impl fmt::Debug for Repository {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Repository")
      .field("name", &self.inner.name)
      .field("options", &self.inner.options)
      .field("scopes", &self.inner.store().len())
      .finish()
  }
}
