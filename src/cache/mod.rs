//! A time aware least recently used cache for resolved record sets.
//!
//! Entries leave the cache in two ways. Every entry carries an absolute expiry time and is
//! dropped the first time a lookup finds it expired, there is no background sweep. When an
//! insertion pushes the cache over its capacity the least recently used entry is evicted.

use std::{num::NonZeroUsize, sync::Arc, time::Duration, time::Instant};

use lru::LruCache;

use crate::proto::{DomainName, Record, Type};

/// An immutable set of records, shared between the cache and every packet it is attached to.
pub type RecordSet = Arc<[Arc<Record>]>;

pub fn empty_set() -> RecordSet {
    Arc::from(Vec::new())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: DomainName,
    typ: Type,
}

impl CacheKey {
    /// The name is stored in lower case so lookups do not depend on the spelling used by the
    /// client or the upstream server.
    pub fn new(name: &DomainName, typ: Type) -> Self {
        Self {
            name: name.to_lowercase(),
            typ,
        }
    }

    pub fn name(&self) -> &DomainName {
        &self.name
    }

    pub fn typ(&self) -> Type {
        self.typ
    }
}

struct CacheEntry {
    records: RecordSet,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped by a lookup because their TTL ran out.
    pub expired: u64,
    /// Entries dropped to make room for a new one.
    pub evicted: u64,
}

pub struct TlruCache {
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

impl TlruCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<RecordSet> {
        self.get_at(key, Instant::now())
    }

    /// Look `key` up as if the current time was `now`.
    ///
    /// Expiry is checked before the entry is touched, so an expired entry is never promoted
    /// and never returned.
    pub fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<RecordSet> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if expired {
            self.entries.pop(key);
            self.stats.expired += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|entry| Arc::clone(&entry.records))
    }

    pub fn put(&mut self, key: CacheKey, records: RecordSet, ttl: u32) {
        self.put_at(key, records, ttl, Instant::now());
    }

    /// Insert or replace the entry for `key`, expiring `ttl` seconds after `now`.
    pub fn put_at(&mut self, key: CacheKey, records: RecordSet, ttl: u32, now: Instant) {
        let entry = CacheEntry {
            records,
            expires_at: now + Duration::from_secs(u64::from(ttl)),
        };
        // `push` hands back either the replaced entry for the same key or the evicted one.
        if let Some((old_key, _)) = self.entries.push(key.clone(), entry) {
            if old_key != key {
                tracing::trace!("Evicted {} {} from cache", old_key.name, old_key.typ);
                self.stats.evicted += 1;
            }
        }
    }

    /// Drop every entry that is expired at `now`, returning how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        self.stats.expired += expired.len() as u64;
        expired.len()
    }
}
