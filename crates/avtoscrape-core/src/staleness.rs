//! Removing stored listings that are no longer live.
//!
//! Two ways in: a diff against a freshly observed link set
//! ([`purge_absent`]), or probing each stored link's live page
//! ([`StalenessReconciler`]). Only sites in the probe allow-list are ever
//! probed; links of any other site are treated as valid.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::models::VehicleCategory;
use crate::retry::{BackoffPolicy, retry_with_backoff};
use crate::site::{SiteConfig, site_for_link};
use crate::traits::{Renderer, VehicleStore};

/// Deletes every stored link in `namespace` that is not in `valid`.
/// Returns the number of records deleted.
pub async fn purge_absent<S: VehicleStore>(
    store: &S,
    category: VehicleCategory,
    namespace: &str,
    valid: &HashSet<String>,
) -> Result<u64, AppError> {
    let stored = store.links_in_namespace(category, namespace).await?;
    let mut unique = HashSet::new();
    let absent: Vec<String> = stored
        .into_iter()
        .filter(|link| !valid.contains(link) && unique.insert(link.clone()))
        .collect();

    if absent.is_empty() {
        tracing::info!(%category, %namespace, "No absent links to purge");
        return Ok(0);
    }

    let deleted = store.delete_by_links(category, &absent).await?;
    tracing::info!(%category, %namespace, absent = absent.len(), deleted, "Purged absent links");
    Ok(deleted)
}

/// Outcome of probing one stored link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Valid,
    /// The site is not in the probe allow-list; the link is assumed valid.
    NotProbed,
    /// The live page says the listing is gone.
    Removed(String),
    /// The page could not be loaded, even after retrying.
    Unreachable(String),
}

impl LinkStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, LinkStatus::Valid | LinkStatus::NotProbed)
    }
}

/// Checks stored links against their live pages.
#[derive(Clone)]
pub struct LinkProber<R: Renderer> {
    renderer: R,
    backoff: BackoffPolicy,
}

impl<R: Renderer> LinkProber<R> {
    pub fn new(renderer: R, backoff: BackoffPolicy) -> Self {
        Self { renderer, backoff }
    }

    /// Probes `link`. Markup the prober does not recognise counts as valid;
    /// a page that never loads counts as gone.
    ///
    /// 5xx and 429 responses are retried like navigation errors and end as
    /// [`LinkStatus::Unreachable`] once the attempts run out. Any other
    /// non-success status is final.
    pub async fn probe(&self, link: &str) -> LinkStatus {
        let Some(site) = site_for_link(link).filter(|site| site.probe_enabled) else {
            return LinkStatus::NotProbed;
        };

        let renderer = &self.renderer;
        let page = retry_with_backoff(&self.backoff, link, |_| async move {
            let page = renderer.render(link, &[]).await?;
            if page.is_transient_failure() {
                return Err(AppError::HttpError(format!("HTTP {} for {link}", page.status)));
            }
            Ok(page)
        })
        .await;
        let page = match page {
            Ok(page) => page,
            Err(error) => return LinkStatus::Unreachable(error.to_string()),
        };

        if !page.is_success() {
            return LinkStatus::Removed(format!("HTTP {}", page.status));
        }
        if let Some(marker) = site
            .removal
            .redirect_urls
            .iter()
            .find(|marker| page.final_url == **marker)
        {
            return LinkStatus::Removed(format!("redirected to {marker}"));
        }
        if let Some(marker) = site
            .removal
            .content_markers
            .iter()
            .find(|marker| page.html.contains(**marker))
        {
            return LinkStatus::Removed(format!("page contains '{marker}'"));
        }

        LinkStatus::Valid
    }
}

/// Batch size, pacing and retry policy for probe-based purging.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub backoff: BackoffPolicy,
    /// Links probed concurrently while holding one permit.
    pub batch_size: usize,
    /// Pause after each batch.
    pub pause: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::probe(),
            batch_size: 30,
            pause: Duration::from_millis(500),
        }
    }
}

impl ProbeConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub probed: usize,
    pub invalid: usize,
    pub deleted: u64,
}

/// Probes stored links and deletes the ones that are gone.
///
/// Probe batches from every category share one permit pool, bounding the
/// number of batches in flight at once.
pub struct StalenessReconciler<R: Renderer, S: VehicleStore> {
    prober: LinkProber<R>,
    store: S,
    permits: Arc<Semaphore>,
    config: ProbeConfig,
}

impl<R: Renderer, S: VehicleStore> StalenessReconciler<R, S> {
    pub fn new(renderer: R, store: S, permits: Arc<Semaphore>, config: ProbeConfig) -> Self {
        Self {
            prober: LinkProber::new(renderer, config.backoff.clone()),
            store,
            permits,
            config,
        }
    }

    /// Probes every stored link of `site` in `category`.
    pub async fn purge_category(
        &self,
        site: &SiteConfig,
        category: VehicleCategory,
    ) -> Result<PurgeReport, AppError> {
        let mut report = PurgeReport::default();
        if !site.probe_enabled {
            tracing::info!(site = site.name, %category, "Site not in probe allow-list, skipping");
            return Ok(report);
        }

        let links = self.store.links_in_namespace(category, site.namespace).await?;
        let batch_size = self.config.batch_size.max(1);
        let batches = links.chunks(batch_size).count();
        tracing::info!(site = site.name, %category, links = links.len(), batches, "Probing stored links");

        for (index, batch) in links.chunks(batch_size).enumerate() {
            let statuses = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| AppError::Generic(format!("Probe permit pool closed: {e}")))?;
                join_all(batch.iter().map(|link| self.prober.probe(link))).await
            };

            let invalid: Vec<String> = batch
                .iter()
                .zip(statuses)
                .filter_map(|(link, status)| match status {
                    LinkStatus::Removed(reason) | LinkStatus::Unreachable(reason) => {
                        tracing::info!(%link, %reason, "Listing no longer live");
                        Some(link.clone())
                    }
                    LinkStatus::Valid | LinkStatus::NotProbed => None,
                })
                .collect();

            report.probed += batch.len();
            report.invalid += invalid.len();

            if !invalid.is_empty() {
                match self.store.delete_by_links(category, &invalid).await {
                    Ok(deleted) => report.deleted += deleted,
                    Err(error) => {
                        tracing::warn!(%category, batch = index + 1, %error, "Deleting stale links failed")
                    }
                }
            }

            if index + 1 < batches {
                tokio::time::sleep(self.config.pause).await;
            }
        }

        tracing::info!(
            site = site.name,
            %category,
            probed = report.probed,
            invalid = report.invalid,
            deleted = report.deleted,
            "Staleness check finished"
        );
        Ok(report)
    }

    /// Runs [`Self::purge_category`] for every category concurrently.
    pub async fn purge_site(
        &self,
        site: &SiteConfig,
    ) -> Vec<(VehicleCategory, Result<PurgeReport, AppError>)> {
        let results = join_all(
            VehicleCategory::ALL
                .iter()
                .map(|category| self.purge_category(site, *category)),
        )
        .await;
        VehicleCategory::ALL.into_iter().zip(results).collect()
    }
}
