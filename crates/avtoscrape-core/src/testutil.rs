//! Test utilities: mock implementations of the collaborator traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DuplicateGroup, RawListing, RenderedPage, VehicleCategory, VehicleRecord};
use crate::site::SiteLayout;
use crate::traits::{Fetcher, ListingParser, Renderer, VehicleStore};

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Mock renderer with a response queue per URL.
///
/// A URL with no queued response fails with a retryable network error.
#[derive(Clone, Default)]
pub struct MockRenderer {
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<RenderedPage, AppError>>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a 200 response whose body is `html`.
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_response(url, Ok(Self::page(url, url, 200, html)))
    }

    /// Queues a response that ends on `final_url` after redirects.
    pub fn with_redirect(self, url: &str, final_url: &str) -> Self {
        self.with_response(url, Ok(Self::page(url, final_url, 200, "")))
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_response(url, Ok(Self::page(url, url, status, "")))
    }

    pub fn with_error(self, url: &str, error: AppError) -> Self {
        self.with_response(url, Err(error))
    }

    pub fn with_response(self, url: &str, response: Result<RenderedPage, AppError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// URLs rendered so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    fn page(url: &str, final_url: &str, status: u16, html: &str) -> RenderedPage {
        RenderedPage {
            requested_url: url.to_string(),
            final_url: final_url.to_string(),
            status,
            html: html.to_string(),
        }
    }
}

impl Renderer for MockRenderer {
    async fn render(&self, url: &str, _wait_for: &[&str]) -> Result<RenderedPage, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(AppError::NetworkError(format!("no mock response for {url}"))))
    }
}

// ---------------------------------------------------------------------------
// MockParser
// ---------------------------------------------------------------------------

/// Mock parser returning listings keyed by page body, or from a queue.
///
/// A body registered with [`MockParser::with_listings`] always yields its
/// listings. Otherwise each call pops the queue; an empty queue reports
/// unexpected markup.
#[derive(Clone, Default)]
pub struct MockParser {
    by_html: Arc<Mutex<HashMap<String, Vec<RawListing>>>>,
    queue: Arc<Mutex<VecDeque<Result<Vec<RawListing>, AppError>>>>,
}

impl MockParser {
    pub fn new(responses: Vec<Result<Vec<RawListing>, AppError>>) -> Self {
        Self {
            by_html: Arc::default(),
            queue: Arc::new(Mutex::new(responses.into())),
        }
    }

    pub fn with_listings(self, html: &str, listings: Vec<RawListing>) -> Self {
        self.by_html
            .lock()
            .unwrap()
            .insert(html.to_string(), listings);
        self
    }
}

impl ListingParser for MockParser {
    fn parse(&self, page: &RenderedPage, _layout: &SiteLayout) -> Result<Vec<RawListing>, AppError> {
        if let Some(listings) = self.by_html.lock().unwrap().get(&page.html) {
            return Ok(listings.clone());
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::UnexpectedMarkup("no listing containers".into())))
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher returning a fixed body per URL.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<String, AppError>>>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: &str) -> Self {
        self.push(url, Ok(body.to_string()))
    }

    pub fn with_error(self, url: &str, error: AppError) -> Self {
        self.push(url, Err(error))
    }

    fn push(self, url: &str, response: Result<String, AppError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(AppError::NetworkError(format!("no mock response for {url}"))))
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredRecord {
    id: Uuid,
    category: VehicleCategory,
    record: VehicleRecord,
}

#[derive(Default)]
struct MemoryStoreInner {
    rows: Vec<StoredRecord>,
    fail_lookups: bool,
    fail_inserts: bool,
    fail_deletes: bool,
    insert_calls: usize,
    deleted: u64,
}

/// In-memory VehicleStore keeping records in insertion order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores records directly, bypassing failure injection and counters.
    pub fn seed(&self, category: VehicleCategory, records: Vec<VehicleRecord>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .rows
            .extend(records.into_iter().map(|record| StoredRecord {
                id: Uuid::new_v4(),
                category,
                record,
            }));
    }

    pub fn seed_links(&self, category: VehicleCategory, links: &[&str]) {
        self.seed(
            category,
            links.iter().map(|l| VehicleRecord::new(*l)).collect(),
        );
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.inner.lock().unwrap().fail_lookups = fail;
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_inserts = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_deletes = fail;
    }

    /// Stored links for `category`, in insertion order.
    pub fn links(&self, category: VehicleCategory) -> Vec<String> {
        self.records(category).into_iter().map(|r| r.link).collect()
    }

    pub fn records(&self, category: VehicleCategory) -> Vec<VehicleRecord> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|row| row.category == category)
            .map(|row| row.record.clone())
            .collect()
    }

    pub fn insert_calls(&self) -> usize {
        self.inner.lock().unwrap().insert_calls
    }

    /// Total records deleted through the trait.
    pub fn deleted(&self) -> u64 {
        self.inner.lock().unwrap().deleted
    }
}

impl VehicleStore for MemoryStore {
    async fn exists_by_link(&self, category: VehicleCategory, link: &str) -> Result<bool, AppError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_lookups {
            return Err(AppError::DatabaseError("lookup failed".into()));
        }
        Ok(inner
            .rows
            .iter()
            .any(|row| row.category == category && row.record.link == link))
    }

    async fn insert_many(
        &self,
        category: VehicleCategory,
        records: &[VehicleRecord],
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.insert_calls += 1;
        if inner.fail_inserts {
            return Err(AppError::DatabaseError("insert failed".into()));
        }
        inner.rows.extend(records.iter().map(|record| StoredRecord {
            id: Uuid::new_v4(),
            category,
            record: record.clone(),
        }));
        Ok(records.len() as u64)
    }

    async fn links_in_namespace(
        &self,
        category: VehicleCategory,
        namespace: &str,
    ) -> Result<Vec<String>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .iter()
            .filter(|row| row.category == category && row.record.link.starts_with(namespace))
            .map(|row| row.record.link.clone())
            .collect())
    }

    async fn delete_by_links(
        &self,
        category: VehicleCategory,
        links: &[String],
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_deletes {
            return Err(AppError::DatabaseError("delete failed".into()));
        }
        let before = inner.rows.len();
        inner
            .rows
            .retain(|row| row.category != category || !links.contains(&row.record.link));
        let deleted = (before - inner.rows.len()) as u64;
        inner.deleted += deleted;
        Ok(deleted)
    }

    async fn duplicate_groups(
        &self,
        category: VehicleCategory,
        namespace: Option<&str>,
    ) -> Result<Vec<DuplicateGroup>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for row in inner.rows.iter().filter(|row| {
            row.category == category
                && namespace.is_none_or(|ns| row.record.link.starts_with(ns))
        }) {
            match groups.iter_mut().find(|g| g.link == row.record.link) {
                Some(group) => group.ids.push(row.id),
                None => groups.push(DuplicateGroup {
                    link: row.record.link.clone(),
                    ids: vec![row.id],
                }),
            }
        }
        groups.retain(|g| g.ids.len() > 1);
        Ok(groups)
    }

    async fn delete_by_ids(&self, category: VehicleCategory, ids: &[Uuid]) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_deletes {
            return Err(AppError::DatabaseError("delete failed".into()));
        }
        let before = inner.rows.len();
        inner
            .rows
            .retain(|row| row.category != category || !ids.contains(&row.id));
        let deleted = (before - inner.rows.len()) as u64;
        inner.deleted += deleted;
        Ok(deleted)
    }
}
