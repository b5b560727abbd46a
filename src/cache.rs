//! Session-lifetime memoization of listing queries.
//!
//! A cache entry is only ever valid for the exact key that produced it; there
//! is no partial-key matching, no TTL, and no eviction.  The data set is small
//! and the cache lives for a single page session, so a plain map is enough.
//! Staleness is handled by explicit invalidation after mutations, plus the one
//! deliberate cache bypass in the donation flow (see [`crate::workflow`]).

use std::collections::HashMap;
use std::fmt;

use crate::types::Application;

/// Which listing a page query targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListKind {
    Open,
    Completed,
    Filtered {
        country: String,
        city: Option<String>,
    },
}

/// Parameters of one page fetch.  Identical parameters hit the same cache
/// entry; any difference — including only the filter country — misses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageQuery {
    pub kind: ListKind,
    pub offset: u32,
    pub limit: u32,
}

/// Key under which a fetch result is memoized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A page of a listing.
    Page(PageQuery),
    /// A single application fetched by id.
    Application(u64),
    /// Everything scoped to one producer (their products and applications).
    Producer(u64),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Page(q) => match &q.kind {
                ListKind::Open => write!(f, "open-{}-{}", q.offset, q.limit),
                ListKind::Completed => write!(f, "completed-{}-{}", q.offset, q.limit),
                ListKind::Filtered { country, city } => write!(
                    f,
                    "filtered-{}-{}-{country}-{}",
                    q.offset,
                    q.limit,
                    city.as_deref().unwrap_or("")
                ),
            },
            CacheKey::Application(id) => write!(f, "application-{id}"),
            CacheKey::Producer(id) => write!(f, "producer-{id}"),
        }
    }
}

/// A memoized fetch result: the entities plus the total count the server
/// reported for that query at fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub applications: Vec<Application>,
    pub total_count: u64,
}

/// The in-memory query cache.  Constructed once at application start and
/// passed by reference wherever it is needed; never a global.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<CacheKey, Entry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: CacheKey, applications: Vec<Application>, total_count: u64) {
        self.entries.insert(
            key,
            Entry {
                applications,
                total_count,
            },
        );
    }

    /// Remove a single key.  Called after any mutation that could make the
    /// previously cached result stale, e.g. `Producer(id)` after the producer
    /// creates a product.
    pub fn invalidate(&mut self, key: &CacheKey) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
