use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use avtoscrape_client::{HtmlListingParser, ReqwestFetcher};
use avtoscrape_core::api::ApiSyncService;
use avtoscrape_core::duplicates::collapse_all;
use avtoscrape_core::error::AppError;
use avtoscrape_core::harvest::HarvestTarget;
use avtoscrape_core::models::{RenderedPage, VehicleCategory};
use avtoscrape_core::orchestrator::{
    HarvestConfig, HarvestService, HarvestSummary, PageState, TracingHarvestReporter,
};
use avtoscrape_core::retry::BackoffPolicy;
use avtoscrape_core::site::{SiteConfig, SiteId};
use avtoscrape_core::staleness::{ProbeConfig, PurgeReport, StalenessReconciler};
use avtoscrape_core::throttle::{ThrottleConfig, Throttled};
use avtoscrape_core::traits::{NullStore, Renderer};
use avtoscrape_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(
    name = "avtoscrape",
    version,
    about = "Harvest and reconcile vehicle listings from EU marketplaces"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a range of results pages from a rendered-page site
    Harvest(HarvestArgs),

    /// Full-refresh sync of a JSON API site (all API sites when omitted)
    SyncApi {
        #[arg(short, long)]
        site: Option<SiteId>,

        #[command(flatten)]
        net: NetworkArgs,
    },

    /// Probe stored links and delete the listings that are gone
    PurgeStale(PurgeArgs),

    /// Collapse records stored more than once under the same link
    Dedupe {
        /// Restrict to one site's links
        #[arg(short, long)]
        site: Option<SiteId>,
    },
}

#[derive(Args, Debug)]
struct HarvestArgs {
    /// Source site (avtonet, autobid)
    #[arg(short, long)]
    site: SiteId,

    /// Vehicle category (car, motorcycle, truck)
    #[arg(short, long, default_value = "car")]
    category: VehicleCategory,

    #[arg(long, default_value_t = 1)]
    start_page: u32,

    #[arg(long, default_value_t = 25)]
    end_page: u32,

    /// Pages fetched concurrently per batch
    #[arg(long, env = "AVTOSCRAPE_BATCH_SIZE", default_value_t = 5)]
    batch_size: usize,

    /// First results page, overriding the site's built-in URL
    #[arg(long)]
    url: Option<String>,

    /// After a fully successful run, delete stored links that were not seen
    #[arg(long, default_value_t = false)]
    refresh: bool,

    /// Print harvested records as JSON instead of storing them
    #[arg(long, default_value_t = false, conflicts_with = "refresh")]
    dry_run: bool,

    #[command(flatten)]
    net: NetworkArgs,

    #[command(flatten)]
    browser: BrowserArgs,
}

#[derive(Args, Debug)]
struct PurgeArgs {
    /// Only this site (every probe-enabled site when omitted)
    #[arg(short, long)]
    site: Option<SiteId>,

    /// Only this category (every category when omitted)
    #[arg(short, long)]
    category: Option<VehicleCategory>,

    /// Probe batches allowed in flight across all sites and categories
    #[arg(long, env = "AVTOSCRAPE_PROBE_PERMITS", default_value_t = 3)]
    permits: usize,

    /// Links probed concurrently per batch
    #[arg(long, default_value_t = 30)]
    batch_size: usize,

    #[command(flatten)]
    net: NetworkArgs,

    #[command(flatten)]
    browser: BrowserArgs,
}

#[derive(Args, Debug, Clone)]
struct NetworkArgs {
    /// Attempts per page, probe or API request
    #[arg(long, env = "AVTOSCRAPE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, env = "AVTOSCRAPE_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Minimum gap between requests to the same domain, in milliseconds
    #[arg(long, env = "AVTOSCRAPE_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,
}

impl NetworkArgs {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    fn throttle(&self) -> ThrottleConfig {
        let delay = Duration::from_millis(self.delay_ms);
        ThrottleConfig::new(delay).with_jitter(delay / 2)
    }

    fn backoff(&self, base: BackoffPolicy) -> BackoffPolicy {
        match self.max_attempts {
            Some(attempts) => base.with_max_attempts(attempts),
            None => base,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct BrowserArgs {
    /// Render pages in headless Chromium (needs the `browser` feature)
    #[arg(long, default_value_t = false)]
    browser: bool,

    /// Chrome/Chromium executable
    #[arg(long, env = "CHROME_BIN")]
    chrome_bin: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("avtoscrape=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest(args) => cmd_harvest(args).await,
        Commands::SyncApi { site, net } => cmd_sync_api(site, &net).await,
        Commands::PurgeStale(args) => cmd_purge_stale(args).await,
        Commands::Dedupe { site } => cmd_dedupe(site).await,
    }
}

/// Connect to PostgreSQL and apply migrations. Missing configuration is the
/// one error that stops a job before it starts.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    Database::open(&config)
        .await
        .context("Failed to open the vehicle store")
}

// ---------------------------------------------------------------------------
// Page sources
// ---------------------------------------------------------------------------

/// The renderer picked on the command line.
#[derive(Clone)]
enum PageSource {
    Http(ReqwestFetcher),
    #[cfg(feature = "browser")]
    Browser(avtoscrape_client::BrowserRenderer),
}

impl Renderer for PageSource {
    async fn render(&self, url: &str, wait_for: &[&str]) -> Result<RenderedPage, AppError> {
        match self {
            PageSource::Http(fetcher) => fetcher.render(url, wait_for).await,
            #[cfg(feature = "browser")]
            PageSource::Browser(browser) => browser.render(url, wait_for).await,
        }
    }
}

async fn page_source(net: &NetworkArgs, browser: &BrowserArgs) -> Result<Throttled<PageSource>> {
    let source = if browser.browser {
        launch_browser(net.timeout(), browser.chrome_bin.clone()).await?
    } else {
        PageSource::Http(ReqwestFetcher::with_timeout(net.timeout())?)
    };
    Ok(Throttled::new(source, net.throttle()))
}

#[cfg(feature = "browser")]
async fn launch_browser(timeout: Duration, executable: Option<PathBuf>) -> Result<PageSource> {
    let browser = avtoscrape_client::BrowserRenderer::launch(timeout, executable)
        .await
        .context("Failed to launch headless browser")?;
    Ok(PageSource::Browser(browser))
}

#[cfg(not(feature = "browser"))]
async fn launch_browser(_timeout: Duration, _executable: Option<PathBuf>) -> Result<PageSource> {
    anyhow::bail!("--browser requires a build with `--features browser`")
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

async fn cmd_harvest(args: HarvestArgs) -> Result<()> {
    let site = args.site.config();
    let target = HarvestTarget::new(site, args.category)?;
    let template = match args.url.as_deref().or(site.category_url(args.category)) {
        Some(url) => url.to_string(),
        None => anyhow::bail!(
            "{} has no built-in {} results URL; pass --url",
            site.name,
            args.category
        ),
    };

    let db = if args.dry_run {
        None
    } else {
        Some(connect_db().await?)
    };

    let config = HarvestConfig::default()
        .with_batch_size(args.batch_size)
        .with_backoff(args.net.backoff(BackoffPolicy::default()))
        .with_refresh(args.refresh);
    let renderer = page_source(&args.net, &args.browser).await?;
    let parser = HtmlListingParser::new();

    tracing::info!(
        site = site.name,
        category = %args.category,
        start = args.start_page,
        end = args.end_page,
        "Starting harvest"
    );

    let summary = match db {
        None => {
            let service = HarvestService::<_, _, NullStore>::new(renderer, parser, config);
            let summary = service
                .run(&target, &template, args.start_page, args.end_page, &TracingHarvestReporter)
                .await;
            println!("{}", serde_json::to_string_pretty(&summary.records)?);
            summary
        }
        Some(db) => {
            let service = HarvestService::with_store(renderer, parser, db.vehicle_repo(), config);
            service
                .run(&target, &template, args.start_page, args.end_page, &TracingHarvestReporter)
                .await
        }
    };

    report_harvest(&summary);
    Ok(())
}

fn report_harvest(summary: &HarvestSummary) {
    let failed: Vec<u32> = summary
        .pages
        .iter()
        .filter(|(_, state)| **state == PageState::Failed)
        .map(|(page, _)| *page)
        .collect();

    tracing::info!(
        harvested = summary.count(PageState::Harvested),
        failed = failed.len(),
        new_records = summary.records.len(),
        inserted = summary.inserted,
        purged = ?summary.purged,
        "Harvest finished"
    );
    if !failed.is_empty() {
        tracing::warn!(pages = ?failed, "Some pages could not be harvested");
    }
}

async fn cmd_sync_api(site: Option<SiteId>, net: &NetworkArgs) -> Result<()> {
    let sites: Vec<&'static SiteConfig> = match site {
        Some(id) => vec![id.config()],
        None => SiteId::ALL
            .iter()
            .map(SiteId::config)
            .filter(|site| site.layout.is_none())
            .collect(),
    };

    let db = connect_db().await?;
    let fetcher = Throttled::new(ReqwestFetcher::with_timeout(net.timeout())?, net.throttle());
    let service = ApiSyncService::new(fetcher, db.vehicle_repo())
        .with_backoff(net.backoff(BackoffPolicy::default()));

    for site in sites {
        match service.sync(site).await {
            Ok(report) => println!(
                "{}: fetched {}, inserted {}, deleted {}",
                site.name,
                report.fetched,
                report.inserted,
                report
                    .deleted
                    .map_or_else(|| "-".to_string(), |n| n.to_string())
            ),
            Err(e) => tracing::error!(site = site.name, error = %e, "Sync failed"),
        }
    }
    Ok(())
}

async fn cmd_purge_stale(args: PurgeArgs) -> Result<()> {
    let sites: Vec<&'static SiteConfig> = match args.site {
        Some(id) => vec![id.config()],
        None => SiteId::ALL
            .iter()
            .map(SiteId::config)
            .filter(|site| site.probe_enabled)
            .collect(),
    };

    let db = connect_db().await?;
    let renderer = page_source(&args.net, &args.browser).await?;
    let permits = Arc::new(Semaphore::new(args.permits.max(1)));
    let config = ProbeConfig::default()
        .with_batch_size(args.batch_size)
        .with_backoff(args.net.backoff(BackoffPolicy::probe()));
    let reconciler = StalenessReconciler::new(renderer, db.vehicle_repo(), permits, config);
    let only = args.category;

    let results = join_all(sites.iter().map(|site| {
        let reconciler = &reconciler;
        async move {
            let reports = match only {
                Some(category) => vec![(category, reconciler.purge_category(site, category).await)],
                None => reconciler.purge_site(site).await,
            };
            (*site, reports)
        }
    }))
    .await;

    for (site, reports) in results {
        for (category, result) in reports {
            print_purge(site, category, result);
        }
    }
    Ok(())
}

fn print_purge(site: &SiteConfig, category: VehicleCategory, result: Result<PurgeReport, AppError>) {
    match result {
        Ok(report) => println!(
            "{} {}: probed {}, invalid {}, deleted {}",
            site.name, category, report.probed, report.invalid, report.deleted
        ),
        Err(e) => tracing::error!(site = site.name, %category, error = %e, "Purge failed"),
    }
}

async fn cmd_dedupe(site: Option<SiteId>) -> Result<()> {
    let db = connect_db().await?;
    let repo = db.vehicle_repo();
    let namespace = site.map(|id| id.config().namespace);

    for (category, result) in collapse_all(&repo, namespace).await {
        match result {
            Ok(deleted) => println!("{category}: deleted {deleted} duplicates"),
            Err(e) => tracing::error!(%category, error = %e, "Dedupe failed"),
        }
    }
    Ok(())
}
