//! In-memory cache of collections and items.
//!
//! This module provides the storage half of a repository:
//! - Items are shared record handles, so updates are visible to every holder
//! - Collections are partitioned by a scope key derived from collection params
//! - Each scope holds one sorted collection, authoritative only when it was
//!   filled by a full collection fetch

mod collection;
mod item;
mod scope;
mod storage;

pub use collection::{Collection, SortOrder};
pub use item::{is_truthy, key_string, keys_match, Item, Record};
pub use scope::{KeyDecorator, ScopeKeys, DEFAULT_SCOPE, MAX_COLLECTION_KEYS, SCOPE_SEPARATOR};
pub use storage::{CacheEntry, CacheStore};
