use std::time::Duration;

use avtoscrape_core::error::AppError;
use avtoscrape_core::models::RenderedPage;
use avtoscrape_core::traits::{Fetcher, Renderer};
use reqwest::Client;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// HTTP page source using reqwest.
///
/// As a [`Fetcher`] it returns the body of a successful response and fails on
/// any other status. As a [`Renderer`] it follows redirects and reports the
/// final URL and status as-is, leaving status handling to the caller. It does
/// not execute JavaScript, so `wait_for` selectors are ignored.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(60))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, AppError> {
        self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.get(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

impl Renderer for ReqwestFetcher {
    async fn render(&self, url: &str, _wait_for: &[&str]) -> Result<RenderedPage, AppError> {
        let response = self.get(url).await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let html = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(url, %final_url, status, bytes = html.len(), "Page loaded");

        Ok(RenderedPage {
            requested_url: url.to_string(),
            final_url,
            status,
            html,
        })
    }
}
