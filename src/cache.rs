//! URI cache: one table per object kind, keyed by server URI.
//!
//! An entry lives exactly as long as the handles that registered it. Opening the same
//! remote object twice bumps the entry's holder count instead of adding a second entry.

use std::hash::BuildHasherDefault;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use seahash::SeaHasher;

use crate::error::{RestError, Result};
use crate::object::ObjectKind;

type Table = DashMap<String, CacheEntry, BuildHasherDefault<SeaHasher>>;

const CACHED_KINDS: [ObjectKind; 5] = [
    ObjectKind::File,
    ObjectKind::Group,
    ObjectKind::Dataset,
    ObjectKind::Attribute,
    ObjectKind::Datatype,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Path of the domain the object was opened under.
    pub domain: String,
    /// Live handles for this URI.
    pub holders: usize,
}

pub struct UriCache {
    tables: [Table; 5],
}

impl Default for UriCache {
    fn default() -> Self {
        Self::new()
    }
}

impl UriCache {
    pub fn new() -> Self {
        Self {
            tables: std::array::from_fn(|_| DashMap::with_hasher(BuildHasherDefault::default())),
        }
    }

    fn table(&self, kind: ObjectKind) -> Result<&Table> {
        CACHED_KINDS
            .iter()
            .position(|k| *k == kind)
            .map(|i| &self.tables[i])
            .ok_or_else(|| RestError::Internal(format!("no URI table for {kind} objects")))
    }

    pub fn insert(&self, kind: ObjectKind, uri: &str, domain: &str) -> Result<()> {
        if uri.is_empty() {
            return Err(RestError::Internal(format!(
                "refusing to cache {kind} with an empty URI"
            )));
        }
        let table = self.table(kind)?;
        match table.entry(uri.to_string()) {
            Entry::Occupied(mut e) => {
                e.get_mut().holders += 1;
                tracing::debug!("cache: {} '{}' now has {} holders", kind, uri, e.get().holders);
            }
            Entry::Vacant(e) => {
                e.insert(CacheEntry {
                    domain: domain.to_string(),
                    holders: 1,
                });
                tracing::debug!("cache: registered {} '{}'", kind, uri);
            }
        }
        Ok(())
    }

    pub fn lookup(&self, kind: ObjectKind, uri: &str) -> Option<CacheEntry> {
        self.table(kind)
            .ok()
            .and_then(|t| t.get(uri).map(|e| e.clone()))
    }

    pub fn contains(&self, kind: ObjectKind, uri: &str) -> bool {
        self.lookup(kind, uri).is_some()
    }

    pub fn remove(&self, kind: ObjectKind, uri: &str) -> Result<()> {
        let table = self.table(kind)?;
        match table.entry(uri.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().holders > 1 {
                    e.get_mut().holders -= 1;
                } else {
                    e.remove();
                    tracing::debug!("cache: dropped {} '{}'", kind, uri);
                }
                Ok(())
            }
            Entry::Vacant(_) => Err(RestError::Internal(format!(
                "{kind} '{uri}' is not in the URI cache"
            ))),
        }
    }

    pub fn len(&self, kind: ObjectKind) -> usize {
        self.table(kind).map(|t| t.len()).unwrap_or(0)
    }

    pub fn total_len(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Entries (not holders) registered under `domain`, across every table.
    pub fn count_in_domain(&self, domain: &str) -> usize {
        self.tables
            .iter()
            .map(|t| t.iter().filter(|e| e.value().domain == domain).count())
            .sum()
    }

    pub fn uris(&self, kind: ObjectKind) -> Vec<String> {
        let mut uris: Vec<String> = self
            .table(kind)
            .map(|t| t.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default();
        uris.sort();
        uris
    }

    /// Empties every table and returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.total_len();
        for table in &self.tables {
            table.clear();
        }
        dropped
    }
}
