use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DuplicateGroup, RawListing, RenderedPage, VehicleCategory, VehicleRecord};
use crate::site::SiteLayout;

/// Fetches a raw response body from a URL (JSON APIs).
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Navigates to a URL and returns the rendered document.
///
/// `wait_for` is an ordered list of selectors; implementations that render
/// JavaScript wait until any of them is present. A non-success HTTP status is
/// reported through [`RenderedPage::status`], not as an error.
pub trait Renderer: Send + Sync + Clone {
    fn render(
        &self,
        url: &str,
        wait_for: &[&str],
    ) -> impl Future<Output = Result<RenderedPage, AppError>> + Send;
}

/// Locates listing containers on a rendered results page and reads each
/// listing's raw fragments.
pub trait ListingParser: Send + Sync + Clone {
    /// A page with text but no listing containers yields no listings.
    /// Fails with [`AppError::UnexpectedMarkup`] when the document is blank.
    fn parse(&self, page: &RenderedPage, layout: &SiteLayout)
    -> Result<Vec<RawListing>, AppError>;
}

/// Persists canonical records, one collection per vehicle category.
///
/// No transactional guarantee is assumed across calls.
pub trait VehicleStore: Send + Sync + Clone {
    fn exists_by_link(
        &self,
        category: VehicleCategory,
        link: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Inserts all records. Returns the number inserted.
    fn insert_many(
        &self,
        category: VehicleCategory,
        records: &[VehicleRecord],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// All stored links starting with `namespace`, in storage order.
    fn links_in_namespace(
        &self,
        category: VehicleCategory,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Deletes every record whose link is in `links`. Returns the number deleted.
    fn delete_by_links(
        &self,
        category: VehicleCategory,
        links: &[String],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Links stored more than once, optionally restricted to a namespace.
    fn duplicate_groups(
        &self,
        category: VehicleCategory,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<DuplicateGroup>, AppError>> + Send;

    fn delete_by_ids(
        &self,
        category: VehicleCategory,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// A no-op VehicleStore for runs that only print what they harvest.
#[derive(Debug, Clone)]
pub struct NullStore;

impl VehicleStore for NullStore {
    async fn exists_by_link(&self, _category: VehicleCategory, _link: &str) -> Result<bool, AppError> {
        Ok(false)
    }

    async fn insert_many(
        &self,
        _category: VehicleCategory,
        records: &[VehicleRecord],
    ) -> Result<u64, AppError> {
        Ok(records.len() as u64)
    }

    async fn links_in_namespace(
        &self,
        _category: VehicleCategory,
        _namespace: &str,
    ) -> Result<Vec<String>, AppError> {
        Ok(vec![])
    }

    async fn delete_by_links(
        &self,
        _category: VehicleCategory,
        _links: &[String],
    ) -> Result<u64, AppError> {
        Ok(0)
    }

    async fn duplicate_groups(
        &self,
        _category: VehicleCategory,
        _namespace: Option<&str>,
    ) -> Result<Vec<DuplicateGroup>, AppError> {
        Ok(vec![])
    }

    async fn delete_by_ids(&self, _category: VehicleCategory, _ids: &[Uuid]) -> Result<u64, AppError> {
        Ok(0)
    }
}
