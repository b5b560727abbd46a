//! Cache-first paged listings.
//!
//! The coordinator owns the page the UI is currently showing: which listing,
//! which page index, the last total count the server reported, and the
//! display sort.  Fetches go through the [`QueryCache`] first; the network is
//! only hit for keys the session has not seen.  The one place that must not
//! read through this cache — the fresh read before locking — talks to the
//! source directly (see [`crate::workflow::begin_donation`]).

use tracing::debug;

use crate::api::ApplicationSource;
use crate::cache::{CacheKey, ListKind, PageQuery, QueryCache};
use crate::errors::Result;
use crate::types::Application;
use std::collections::HashMap;

/// Display order of the loaded page.  Applied in memory after the fetch; it is
/// not part of the cache key and never re-sorts across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    PriceAscending,
    PriceDescending,
    DateAscending,
    DateDescending,
}

pub struct ListCoordinator<S> {
    source: S,
    cache: QueryCache,
    kind: ListKind,
    batch_size: u32,
    page_index: u32,
    total_count: u64,
    current: Vec<Application>,
    sort: Option<SortOrder>,
    countries: Option<Vec<String>>,
    cities: HashMap<String, Vec<String>>,
}

impl<S: ApplicationSource> ListCoordinator<S> {
    pub fn new(source: S, kind: ListKind, batch_size: u32) -> Self {
        Self {
            source,
            cache: QueryCache::new(),
            kind,
            batch_size,
            page_index: 0,
            total_count: 0,
            current: Vec::new(),
            sort: None,
            countries: None,
            cities: HashMap::new(),
        }
    }

    /// The page currently loaded, in display order.
    pub fn applications(&self) -> &[Application] {
        &self.current
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Total page count for the last observed total: `ceil(total / batch)`.
    /// A zero batch size holds no pages at all rather than dividing by zero.
    pub fn page_count(&self) -> u32 {
        match u64::from(self.batch_size) {
            0 => 0,
            batch => ((self.total_count + batch - 1) / batch) as u32,
        }
    }

    /// Load page `index`, serving from cache when the exact query was already
    /// fetched this session.
    pub async fn load_page(&mut self, index: u32) -> Result<()> {
        let query = PageQuery {
            kind: self.kind.clone(),
            offset: index * self.batch_size,
            limit: self.batch_size,
        };
        let key = CacheKey::Page(query.clone());

        let (applications, total_count) = match self.cache.get(&key) {
            Some(entry) => {
                debug!("Cache hit for {key}");
                (entry.applications.clone(), entry.total_count)
            }
            None => {
                debug!("Cache miss for {key}; fetching");
                let (applications, total_count) = self.source.fetch_page(&query).await?;
                self.cache
                    .set(key, applications.clone(), total_count);
                (applications, total_count)
            }
        };

        self.current = applications;
        self.total_count = total_count;
        self.page_index = index;
        self.apply_sort();
        Ok(())
    }

    /// Advance one page.  A no-op on the last page; returns whether it moved.
    pub async fn next_page(&mut self) -> Result<bool> {
        if self.page_index + 1 >= self.page_count() {
            return Ok(false);
        }
        self.load_page(self.page_index + 1).await?;
        Ok(true)
    }

    /// Go back one page.  A no-op on the first page; returns whether it moved.
    pub async fn previous_page(&mut self) -> Result<bool> {
        if self.page_index == 0 {
            return Ok(false);
        }
        self.load_page(self.page_index - 1).await?;
        Ok(true)
    }

    /// Switch to a different listing (e.g. applying or clearing a filter) and
    /// reset pagination.  Previously cached pages stay valid under their keys.
    pub fn set_kind(&mut self, kind: ListKind) {
        self.kind = kind;
        self.page_index = 0;
        self.total_count = 0;
        self.current.clear();
    }

    /// Change the display order and re-sort the loaded page in place.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = Some(sort);
        self.apply_sort();
    }

    /// Remove an application from the loaded page after the server confirmed a
    /// donation lock or a delete.  Decrements the tracked total and drops the
    /// cache entry for this page; the remainder of the page is not refetched.
    pub fn remove_current(&mut self, application_id: u64) -> bool {
        let before = self.current.len();
        self.current.retain(|a| a.application_id != application_id);
        if self.current.len() == before {
            return false;
        }
        self.total_count = self.total_count.saturating_sub(1);
        self.cache.invalidate(&CacheKey::Page(PageQuery {
            kind: self.kind.clone(),
            offset: self.page_index * self.batch_size,
            limit: self.batch_size,
        }));
        true
    }

    /// Countries with open applications, memoized for the session.
    pub async fn countries(&mut self) -> Result<&[String]> {
        if self.countries.is_none() {
            self.countries = Some(self.source.fetch_countries().await?);
        }
        Ok(self.countries.as_deref().unwrap_or_default())
    }

    /// Cities with open applications in `country`, memoized per country.
    pub async fn cities(&mut self, country: &str) -> Result<&[String]> {
        if !self.cities.contains_key(country) {
            let fetched = self.source.fetch_cities(country).await?;
            self.cities.insert(country.to_string(), fetched);
        }
        Ok(self.cities.get(country).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Shared mutable access to the cache, for invalidations driven from
    /// outside the listing (e.g. `producer-{id}` after creating a product).
    pub fn cache_mut(&mut self) -> &mut QueryCache {
        &mut self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn apply_sort(&mut self) {
        // Vec::sort_by_key is stable: equal keys keep their fetched order.
        match self.sort {
            None => {}
            Some(SortOrder::PriceAscending) => self.current.sort_by_key(|a| a.product_price),
            Some(SortOrder::PriceDescending) => {
                self.current.sort_by_key(|a| std::cmp::Reverse(a.product_price))
            }
            Some(SortOrder::DateAscending) => self.current.sort_by_key(|a| a.creation_date),
            Some(SortOrder::DateDescending) => {
                self.current.sort_by_key(|a| std::cmp::Reverse(a.creation_date))
            }
        }
    }
}
