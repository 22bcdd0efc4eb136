//! Batched, retried harvesting of a results-page range.
//!
//! Pages are grouped into fixed-size batches. Pages within a batch are
//! fetched concurrently; batches run one after another, so at most
//! `batch_size` pages are being rendered at any time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use futures::future::join_all;

use crate::error::AppError;
use crate::harvest::{HarvestTarget, filter_new, harvest_page};
use crate::models::VehicleRecord;
use crate::retry::{BackoffPolicy, retry_with_backoff};
use crate::staleness::purge_absent;
use crate::traits::{ListingParser, Renderer, VehicleStore};

/// Events emitted while harvesting, for monitoring/logging.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    BatchStarted {
        batch: usize,
        pages: &'a [u32],
    },
    PageHarvested {
        page: u32,
        assembled: usize,
        fresh: usize,
    },
    PageFailed {
        page: u32,
        error: &'a str,
    },
    RecordsInserted {
        page: u32,
        count: u64,
    },
    InsertFailed {
        page: u32,
        error: &'a str,
    },
    BatchFinished {
        batch: usize,
        harvested: usize,
        failed: usize,
    },
}

/// Trait for receiving harvest events (decoupled logging).
pub trait HarvestReporter: Send + Sync {
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHarvestReporter;

impl HarvestReporter for TracingHarvestReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::BatchStarted { batch, pages } => {
                tracing::info!(batch, ?pages, "Batch started");
            }
            HarvestEvent::PageHarvested {
                page,
                assembled,
                fresh,
            } => {
                tracing::info!(page, assembled, fresh, "Page harvested");
            }
            HarvestEvent::PageFailed { page, error } => {
                tracing::warn!(page, %error, "Page failed after retries");
            }
            HarvestEvent::RecordsInserted { page, count } => {
                tracing::info!(page, inserted = count, "Records inserted");
            }
            HarvestEvent::InsertFailed { page, error } => {
                tracing::warn!(page, %error, "Insert failed");
            }
            HarvestEvent::BatchFinished {
                batch,
                harvested,
                failed,
            } => {
                tracing::info!(batch, harvested, failed, "Batch finished");
            }
        }
    }
}

/// Lifecycle of one page number within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Pending,
    Fetching,
    Harvested,
    Failed,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Pages fetched concurrently per batch.
    pub batch_size: usize,
    pub backoff: BackoffPolicy,
    /// After a fully successful run, delete stored links of the site that
    /// were not observed.
    pub refresh: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            backoff: BackoffPolicy::default(),
            refresh: false,
        }
    }
}

impl HarvestConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// Splits `start..=end` into consecutive batches of at most `size` pages.
pub fn create_batches(start: u32, end: u32, size: usize) -> Vec<Vec<u32>> {
    if start > end {
        return Vec::new();
    }
    let pages: Vec<u32> = (start..=end).collect();
    pages.chunks(size.max(1)).map(<[u32]>::to_vec).collect()
}

/// Outcome of one harvest run.
#[derive(Debug, Default)]
pub struct HarvestSummary {
    pub pages: BTreeMap<u32, PageState>,
    /// Records that were new to this run and the store.
    pub records: Vec<VehicleRecord>,
    pub inserted: u64,
    /// Records deleted by the follow-up diff; `None` when it did not run.
    pub purged: Option<u64>,
}

impl HarvestSummary {
    pub fn count(&self, state: PageState) -> usize {
        self.pages.values().filter(|s| **s == state).count()
    }

    pub fn all_harvested(&self) -> bool {
        self.pages.values().all(|s| *s == PageState::Harvested)
    }
}

struct PageOutcome {
    page: u32,
    state: PageState,
    fresh: Vec<VehicleRecord>,
    inserted: u64,
}

/// Harvests a page range of one site and category.
///
/// Generic over all external dependencies via traits. Without a store,
/// nothing is checked or persisted and every assembled record is returned.
pub struct HarvestService<R, P, S>
where
    R: Renderer,
    P: ListingParser,
    S: VehicleStore,
{
    renderer: R,
    parser: P,
    store: Option<S>,
    config: HarvestConfig,
}

impl<R, P, S> HarvestService<R, P, S>
where
    R: Renderer,
    P: ListingParser,
    S: VehicleStore,
{
    /// Create a new HarvestService without persistence.
    pub fn new(renderer: R, parser: P, config: HarvestConfig) -> Self {
        Self {
            renderer,
            parser,
            store: None,
            config,
        }
    }

    /// Create a new HarvestService with persistence.
    pub fn with_store(renderer: R, parser: P, store: S, config: HarvestConfig) -> Self {
        Self {
            renderer,
            parser,
            store: Some(store),
            config,
        }
    }

    /// Harvests pages `start..=end` of `template` (the first results page).
    ///
    /// Page failures are recorded, never propagated: the run always
    /// continues with the remaining pages.
    pub async fn run<HR: HarvestReporter>(
        &self,
        target: &HarvestTarget,
        template: &str,
        start: u32,
        end: u32,
        reporter: &HR,
    ) -> HarvestSummary {
        let mut summary = HarvestSummary {
            pages: (start..=end).map(|p| (p, PageState::Pending)).collect(),
            ..HarvestSummary::default()
        };
        let seen = Mutex::new(HashSet::new());

        for (index, batch) in create_batches(start, end, self.config.batch_size)
            .iter()
            .enumerate()
        {
            let batch_no = index + 1;
            reporter.report(HarvestEvent::BatchStarted {
                batch: batch_no,
                pages: batch,
            });
            for page in batch {
                summary.pages.insert(*page, PageState::Fetching);
            }

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|page| self.process_page(target, template, *page, &seen, reporter)),
            )
            .await;

            let mut harvested = 0;
            for outcome in outcomes {
                if outcome.state == PageState::Harvested {
                    harvested += 1;
                }
                summary.pages.insert(outcome.page, outcome.state);
                summary.inserted += outcome.inserted;
                summary.records.extend(outcome.fresh);
            }
            reporter.report(HarvestEvent::BatchFinished {
                batch: batch_no,
                harvested,
                failed: batch.len() - harvested,
            });
        }

        if self.config.refresh {
            summary.purged = self.refresh(target, &summary, seen).await;
        }

        summary
    }

    async fn process_page<HR: HarvestReporter>(
        &self,
        target: &HarvestTarget,
        template: &str,
        page: u32,
        seen: &Mutex<HashSet<String>>,
        reporter: &HR,
    ) -> PageOutcome {
        let mut outcome = PageOutcome {
            page,
            state: PageState::Failed,
            fresh: Vec::new(),
            inserted: 0,
        };

        let records = match self.fetch_page(target, template, page).await {
            Ok(records) => records,
            Err(error) => {
                reporter.report(HarvestEvent::PageFailed {
                    page,
                    error: &error.to_string(),
                });
                return outcome;
            }
        };
        outcome.state = PageState::Harvested;
        let assembled = records.len();

        let fresh = match &self.store {
            Some(store) => filter_new(store, target.category, records, seen).await,
            None => dedupe_in_run(records, seen),
        };
        reporter.report(HarvestEvent::PageHarvested {
            page,
            assembled,
            fresh: fresh.len(),
        });

        if let (Some(store), false) = (&self.store, fresh.is_empty()) {
            match store.insert_many(target.category, &fresh).await {
                Ok(count) => {
                    outcome.inserted = count;
                    reporter.report(HarvestEvent::RecordsInserted { page, count });
                }
                Err(error) => reporter.report(HarvestEvent::InsertFailed {
                    page,
                    error: &error.to_string(),
                }),
            }
        }

        outcome.fresh = fresh;
        outcome
    }

    /// Render, check and harvest one page, retrying the whole step.
    async fn fetch_page(
        &self,
        target: &HarvestTarget,
        template: &str,
        page: u32,
    ) -> Result<Vec<VehicleRecord>, AppError> {
        let url = target.site.page_url(template, page)?;
        let label = format!("{} page {}", target.site.name, page);
        let (renderer, parser, url) = (&self.renderer, &self.parser, url.as_str());

        retry_with_backoff(&self.config.backoff, &label, |_| async move {
            let rendered = renderer.render(url, target.layout.ready).await?;
            if !rendered.is_success() {
                return Err(AppError::HttpError(format!(
                    "HTTP {} for {}",
                    rendered.status, rendered.final_url
                )));
            }
            harvest_page(parser, &rendered, target)
        })
        .await
    }

    async fn refresh(
        &self,
        target: &HarvestTarget,
        summary: &HarvestSummary,
        seen: Mutex<HashSet<String>>,
    ) -> Option<u64> {
        let store = self.store.as_ref()?;
        if !summary.all_harvested() {
            tracing::warn!(
                site = target.site.name,
                failed = summary.count(PageState::Failed),
                "Skipping refresh diff, not every page was harvested"
            );
            return None;
        }

        let observed = match seen.into_inner() {
            Ok(observed) => observed,
            Err(poisoned) => poisoned.into_inner(),
        };
        if observed.is_empty() {
            tracing::warn!(site = target.site.name, "Skipping refresh diff, no listings observed");
            return None;
        }

        match purge_absent(store, target.category, target.site.namespace, &observed).await {
            Ok(deleted) => Some(deleted),
            Err(error) => {
                tracing::warn!(site = target.site.name, %error, "Refresh diff failed");
                None
            }
        }
    }
}

fn dedupe_in_run(records: Vec<VehicleRecord>, seen: &Mutex<HashSet<String>>) -> Vec<VehicleRecord> {
    match seen.lock() {
        Ok(mut seen) => records
            .into_iter()
            .filter(|r| seen.insert(r.link.clone()))
            .collect(),
        Err(_) => records,
    }
}
