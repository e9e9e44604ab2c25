//! Cursor pagination
//!
//! Feed and explore are unbounded and change continuously, so they follow
//! the server's page cursor. Each context owns a single-flight `loading`
//! gate; a second load while one is outstanding is a no-op.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::api::{FeedPage, FeedQuery, PostApi};
use crate::config::ApiConfig;
use crate::data::{PostStore, ViewItems, ViewKey};
use crate::error::{AppError, Result};
use crate::service::notify::Notifier;
use crate::service::visibility;

/// Result of a "load more" or refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Items were appended (possibly zero after filtering)
    Loaded { added: usize },
    /// Nothing left to load; no request was made
    Exhausted,
    /// A load for this context is already in flight; no request was made
    Busy,
    /// The request failed; cached items are untouched
    Failed,
    /// The context changed while the request was in flight; result dropped
    Superseded,
}

// =============================================================================
// Retry
// =============================================================================

/// Timeout and bounded retries for top-level fetches
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Per-attempt timeout; zero disables it
    pub timeout: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }

    /// Run `op`, retrying transient failures
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = if self.timeout.is_zero() {
                op().await
            } else {
                match tokio::time::timeout(self.timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout),
                }
            };

            match result {
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        %error,
                        label,
                        attempt,
                        max_retries = self.max_retries,
                        "Transient fetch failure, retrying"
                    );
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Cursor pager
// =============================================================================

/// Snapshot of a cursor context
#[derive(Debug, Clone)]
pub struct PageWindow {
    /// Next page to request
    pub page: u32,
    pub has_more: bool,
    pub loading: bool,
    pub items: ViewItems,
}

#[derive(Debug)]
struct CursorState {
    page: u32,
    has_more: bool,
    loading: bool,
    /// Bumped on reset so in-flight results can be recognised as stale
    generation: u64,
}

impl CursorState {
    fn fresh(generation: u64) -> Self {
        Self {
            page: 1,
            has_more: true,
            loading: false,
            generation,
        }
    }
}

/// Server cursor pagination for feed-like views
pub struct CursorPager {
    api: Arc<dyn PostApi>,
    store: Arc<PostStore>,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
    query: FeedQuery,
    key: ViewKey,
    state: Mutex<CursorState>,
}

impl CursorPager {
    pub fn new(
        api: Arc<dyn PostApi>,
        store: Arc<PostStore>,
        notifier: Arc<Notifier>,
        retry: RetryPolicy,
        query: FeedQuery,
    ) -> Self {
        let key = ViewKey::Feed(query.kind);
        Self {
            api,
            store,
            notifier,
            retry,
            query,
            key,
            state: Mutex::new(CursorState::fresh(0)),
        }
    }

    pub fn view_key(&self) -> &ViewKey {
        &self.key
    }

    /// Current state and items
    pub fn window(&self) -> PageWindow {
        let state = self.state.lock();
        PageWindow {
            page: state.page,
            has_more: state.has_more,
            loading: state.loading,
            items: self.store.view(&self.key).unwrap_or_default(),
        }
    }

    /// Fetch the next page and append it
    ///
    /// Makes no request when nothing is left or a load is in flight.
    pub async fn load_more(&self) -> LoadOutcome {
        let (page, generation) = {
            let mut state = self.state.lock();
            if state.loading {
                return LoadOutcome::Busy;
            }
            if !state.has_more {
                return LoadOutcome::Exhausted;
            }
            state.loading = true;
            (state.page, state.generation)
        };

        let result = self.fetch(page).await;
        self.settle(generation, result, false)
    }

    /// Reload from the first page, replacing the view on success
    ///
    /// Cached items stay in place when the refresh fails.
    pub async fn refresh(&self) -> LoadOutcome {
        let generation = {
            let mut state = self.state.lock();
            if state.loading {
                return LoadOutcome::Busy;
            }
            state.loading = true;
            state.generation
        };

        let result = self.fetch(1).await;
        self.settle(generation, result, true)
    }

    /// Forget all pages and items; in-flight results are discarded
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = CursorState::fresh(state.generation + 1);
        self.store.clear_view(&self.key);
        tracing::debug!(view = self.key.label(), "Cursor context reset");
    }

    async fn fetch(&self, page: u32) -> Result<FeedPage> {
        let query = self.query.at_page(page);
        let started = Instant::now();
        let result = self
            .retry
            .run(self.key.label(), || self.api.fetch_feed(&query))
            .await;

        let status = match &result {
            Ok(_) => "ok",
            Err(error) => error.kind(),
        };
        crate::metrics::FETCHES_TOTAL
            .with_label_values(&["cursor", status])
            .inc();
        crate::metrics::FETCH_DURATION_SECONDS
            .with_label_values(&["cursor"])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    fn settle(&self, generation: u64, result: Result<FeedPage>, replace: bool) -> LoadOutcome {
        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(view = self.key.label(), "Discarding superseded page");
            return LoadOutcome::Superseded;
        }
        state.loading = false;

        match result {
            Ok(feed_page) => {
                let has_more = feed_page.has_more();
                let fetched = feed_page.results.len();
                let visible = visibility::admit(&self.store, feed_page.results);

                let added = if replace {
                    let items = self.store.replace_view(self.key.clone(), visible);
                    state.page = 1;
                    items.len()
                } else {
                    self.store.extend_view(self.key.clone(), visible)
                };

                state.has_more = has_more;
                if has_more {
                    state.page += 1;
                }

                tracing::info!(
                    view = self.key.label(),
                    fetched,
                    added,
                    next_page = state.page,
                    has_more,
                    "Loaded feed page"
                );
                LoadOutcome::Loaded { added }
            }
            Err(error) => {
                state.has_more = false;
                drop(state);
                tracing::warn!(%error, view = self.key.label(), "Feed page load failed");
                self.notifier.error(error.user_message());
                LoadOutcome::Failed
            }
        }
    }
}

// =============================================================================
// Scroll throttle
// =============================================================================

/// Limits "load more" evaluations triggered by scrolling
pub struct ScrollThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ScrollThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Whether a scroll event should be evaluated now
    pub fn ready(&self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn ready_at(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
