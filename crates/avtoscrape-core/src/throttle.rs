//! Per-domain politeness throttling.
//!
//! Wraps any [`Renderer`] or [`Fetcher`] so that requests to the same domain
//! start at least `delay` (plus random jitter) apart, even when a whole batch
//! of pages is issued concurrently.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use avtoscrape_core::throttle::{Throttled, ThrottleConfig};
//!
//! # use avtoscrape_core::error::AppError;
//! # use avtoscrape_core::models::RenderedPage;
//! # use avtoscrape_core::traits::Renderer;
//! # #[derive(Clone)] struct MyRenderer;
//! # impl Renderer for MyRenderer {
//! #     async fn render(&self, _: &str, _: &[&str]) -> Result<RenderedPage, AppError> { todo!() }
//! # }
//! let config = ThrottleConfig::new(Duration::from_secs(3))
//!     .with_jitter(Duration::from_secs(3));
//! let renderer = Throttled::new(MyRenderer, config);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::AppError;
use crate::models::RenderedPage;
use crate::traits::{Fetcher, Renderer};

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum gap between request starts on the same domain.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter)).
    pub jitter: Duration,
}

impl ThrottleConfig {
    /// Create a new config with the given per-domain delay and no jitter.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero() && self.jitter.is_zero()
    }

    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

impl Default for ThrottleConfig {
    /// 1 second delay, 500ms jitter.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
        }
    }
}

/// A [`Renderer`] / [`Fetcher`] wrapper enforcing per-domain spacing.
///
/// Each call reserves the next free start slot for its domain under a lock,
/// then sleeps until that slot outside the lock.
#[derive(Clone)]
pub struct Throttled<T> {
    inner: T,
    config: ThrottleConfig,
    /// Earliest start time of the next request, per domain key.
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<T> Throttled<T> {
    pub fn new(inner: T, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Extract the domain key from a URL (scheme://host:port).
    fn domain_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    async fn wait_turn(&self, url: &str) {
        let Some(domain) = Self::domain_key(url) else {
            return;
        };

        let start = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let start = slots.get(&domain).map_or(now, |slot| (*slot).max(now));
            slots.insert(domain.clone(), start + self.config.effective_delay());
            start
        };

        let wait = start.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(%domain, wait_ms = wait.as_millis() as u64, "Throttling request");
            tokio::time::sleep_until(start).await;
        }
    }
}

impl<R: Renderer> Renderer for Throttled<R> {
    async fn render(&self, url: &str, wait_for: &[&str]) -> Result<RenderedPage, AppError> {
        self.wait_turn(url).await;
        self.inner.render(url, wait_for).await
    }
}

impl<F: Fetcher> Fetcher for Throttled<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.wait_turn(url).await;
        self.inner.fetch(url).await
    }
}

// Jitter from a time-seeded xorshift; not crypto, just spreading requests.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
