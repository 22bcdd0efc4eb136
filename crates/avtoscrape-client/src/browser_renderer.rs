use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use avtoscrape_core::error::AppError;
use avtoscrape_core::models::RenderedPage;
use avtoscrape_core::traits::Renderer;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::Instant;

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Headless-browser renderer using Chromium via the Chrome DevTools Protocol.
///
/// Results pages on the supported marketplaces fill in their listings with
/// JavaScript, so they must be rendered before parsing. One Chromium process
/// is shared by all clones; each [`Renderer::render`] call opens a tab,
/// navigates, waits for one of the ready selectors, reads the DOM and closes
/// the tab.
///
/// The DevTools protocol does not surface the document's HTTP status through
/// this path, so a page that loads is reported with status 200. Removed
/// listings are recognized by their final URL or content instead.
#[derive(Clone)]
pub struct BrowserRenderer {
    browser: Arc<Browser>,
    timeout: Duration,
}

impl BrowserRenderer {
    /// Launches headless Chromium with a 60 s page timeout.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(60)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        Self::launch(timeout, None).await
    }

    /// Launches `executable`, or the first Chrome/Chromium found on this
    /// machine when `None`.
    pub async fn launch(timeout: Duration, executable: Option<PathBuf>) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        if let Some(bin) = executable.or_else(find_chrome_binary) {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--blink-settings=imagesEnabled=false")
            .build()
            .map_err(|e| AppError::Generic(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
        })
    }

    async fn load(&self, page: &Page, url: &str, wait_for: &[&str]) -> Result<RenderedPage, AppError> {
        page.goto(url)
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to navigate to {url}: {e}")))?;

        if !wait_for.is_empty() && !wait_for_any(page, wait_for, self.timeout / 2).await {
            tracing::debug!(url, ?wait_for, "Ready selectors never appeared");
        }

        let final_url = page
            .url()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read page URL: {e}")))?
            .unwrap_or_else(|| url.to_string());

        let html = page
            .content()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))?;

        Ok(RenderedPage {
            requested_url: url.to_string(),
            final_url,
            status: 200,
            html,
        })
    }
}

impl Renderer for BrowserRenderer {
    async fn render(&self, url: &str, wait_for: &[&str]) -> Result<RenderedPage, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::Generic(format!("Failed to open tab: {e}")))?;

        let result = tokio::time::timeout(self.timeout, self.load(&page, url, wait_for)).await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close tab: {e}");
        }

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}

/// Polls until any selector matches or `limit` elapses.
async fn wait_for_any(page: &Page, selectors: &[&str], limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        for selector in selectors {
            if page.find_element(*selector).await.is_ok() {
                return true;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(SELECTOR_POLL).await;
    }
}

/// Locates a real Chrome/Chromium binary, honouring `CHROME_BIN` first.
///
/// The snap wrapper at `/snap/bin/chromium` strips unknown flags and breaks
/// headless mode, so the binary inside the snap is preferred over it.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
