//! Hidden rendering surface abstraction.
//!
//! Defines the `RenderSurface` and `SurfaceFactory` traits that abstract over
//! the browser engine, so scraping logic can run against a fake in tests and
//! against headless Chromium (`chromium` feature) in the app.

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod scrape;

use super::credentials::CredentialContext;
use super::types::SearchResult;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SurfaceError(pub String);

/// How a page load ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// Load completed; `url` is where the page ended up after redirects.
    Finished { url: String },
    Failed { reason: String },
}

/// One hidden page.
#[async_trait]
pub trait RenderSurface: Send {
    /// Start loading `url`.
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError>;
    /// Wait for the load started by `navigate` to complete or fail.
    async fn wait_for_load(&mut self) -> LoadEvent;
    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, SurfaceError>;
    /// Destroy the page.
    async fn close(&mut self);
}

/// Creates surfaces that share a source's cookie jar.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn spawn(&self, credentials: Arc<CredentialContext>) -> Result<Box<dyn RenderSurface>, SurfaceError>;
}

/// Factory used when no browser is available; every spawn fails.
pub struct NoopSurfaceFactory;

#[async_trait]
impl SurfaceFactory for NoopSurfaceFactory {
    async fn spawn(&self, _credentials: Arc<CredentialContext>) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        Err(SurfaceError("Browser not available".to_string()))
    }
}

/// Owns a surface and closes it exactly once.
///
/// `teardown` is idempotent. A handle dropped before teardown (its future was
/// cancelled) schedules the close on the runtime instead.
pub struct SurfaceHandle {
    surface: Option<Box<dyn RenderSurface>>,
}

impl SurfaceHandle {
    pub fn new(surface: Box<dyn RenderSurface>) -> Self {
        Self {
            surface: Some(surface),
        }
    }

    /// Drive `scraper` on the surface. A torn-down handle yields nothing.
    pub async fn scrape(&mut self, scraper: scrape::Scraper<'_>) -> Vec<SearchResult> {
        match self.surface.as_deref_mut() {
            Some(surface) => scraper.run(surface).await,
            None => Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.surface.is_some()
    }

    /// Close the surface. Returns `false` if it was already closed.
    pub async fn teardown(&mut self) -> bool {
        match self.surface.take() {
            Some(mut surface) => {
                surface.close().await;
                true
            }
            None => false,
        }
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                debug!("surface dropped while open, closing in background");
                runtime.spawn(async move { surface.close().await });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scriptable surface for tests.

    use super::*;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct Counters {
        pub spawned: AtomicUsize,
        pub closed: AtomicUsize,
        pub polls: AtomicUsize,
    }

    impl Counters {
        pub fn spawned(&self) -> usize {
            self.spawned.load(Ordering::SeqCst)
        }
        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
        pub fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    pub struct FakeSurface {
        pub load: LoadEvent,
        pub polls: VecDeque<Result<Value, SurfaceError>>,
        pub counters: Arc<Counters>,
        pub navigated: Option<String>,
    }

    impl FakeSurface {
        pub fn new(load: LoadEvent, polls: Vec<Result<Value, SurfaceError>>, counters: Arc<Counters>) -> Self {
            Self {
                load,
                polls: polls.into(),
                counters,
                navigated: None,
            }
        }
    }

    #[async_trait]
    impl RenderSurface for FakeSurface {
        async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
            self.navigated = Some(url.to_string());
            Ok(())
        }

        async fn wait_for_load(&mut self) -> LoadEvent {
            self.load.clone()
        }

        async fn evaluate(&mut self, _script: &str) -> Result<Value, SurfaceError> {
            self.counters.polls.fetch_add(1, Ordering::SeqCst);
            self.polls.pop_front().unwrap_or(Ok(Value::Null))
        }

        async fn close(&mut self) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out one pre-built surface, then fails.
    pub struct FakeFactory {
        pub next: Mutex<Option<FakeSurface>>,
        pub counters: Arc<Counters>,
    }

    impl FakeFactory {
        pub fn new(surface: FakeSurface) -> Self {
            let counters = surface.counters.clone();
            Self {
                next: Mutex::new(Some(surface)),
                counters,
            }
        }
    }

    #[async_trait]
    impl SurfaceFactory for FakeFactory {
        async fn spawn(&self, _credentials: Arc<CredentialContext>) -> Result<Box<dyn RenderSurface>, SurfaceError> {
            self.counters.spawned.fetch_add(1, Ordering::SeqCst);
            match self.next.lock().unwrap().take() {
                Some(surface) => Ok(Box::new(surface)),
                None => Err(SurfaceError("no more surfaces".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    #[tokio::test]
    async fn teardown_runs_once() {
        let counters = Arc::new(Counters::default());
        let surface = FakeSurface::new(
            LoadEvent::Finished { url: "about:blank".into() },
            vec![],
            counters.clone(),
        );
        let mut handle = SurfaceHandle::new(Box::new(surface));
        assert!(handle.teardown().await);
        assert!(!handle.teardown().await);
        assert!(!handle.is_open());
        drop(handle);
        assert_eq!(counters.closed(), 1);
    }

    #[tokio::test]
    async fn dropped_handle_closes_in_background() {
        let counters = Arc::new(Counters::default());
        let surface = FakeSurface::new(
            LoadEvent::Finished { url: "about:blank".into() },
            vec![],
            counters.clone(),
        );
        drop(SurfaceHandle::new(Box::new(surface)));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(counters.closed(), 1);
    }

    #[tokio::test]
    async fn scraping_a_closed_handle_yields_nothing() {
        let counters = Arc::new(Counters::default());
        let surface = FakeSurface::new(
            LoadEvent::Finished { url: "about:blank".into() },
            vec![Ok(serde_json::json!([{ "title": "t", "url": "https://x.com/a/status/1" }]))],
            counters.clone(),
        );
        let mut handle = SurfaceHandle::new(Box::new(surface));
        handle.teardown().await;

        let scraper = scrape::Scraper::new("https://x.com/search", "", &[], scrape::ScrapeConfig::default());
        assert!(handle.scrape(scraper).await.is_empty());
        assert_eq!(counters.polls(), 0);
    }

    #[tokio::test]
    async fn noop_factory_refuses() {
        let ctx = Arc::new(CredentialContext::ephemeral("x"));
        assert!(NoopSurfaceFactory.spawn(ctx).await.is_err());
    }
}
