//! Window-slice pagination
//!
//! Profile tabs and bookmarks are bounded collections the backend returns
//! whole. The first access fetches the collection once; every later "load
//! more" slices the cached ids locally after a short delay, without touching
//! the network. Only ids are cached so each window is materialized from the
//! current canonical entries and never shows a stale engagement state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::api::{CollectionSource, PostApi};
use crate::data::{PostId, PostStore, ViewItems, ViewKey};
use crate::error::Result;
use crate::service::notify::Notifier;
use crate::service::pagination::{LoadOutcome, RetryPolicy};
use crate::service::visibility;

/// Snapshot of a window-slice context
#[derive(Debug, Clone)]
pub struct SliceWindow {
    pub source: CollectionSource,
    /// Ids handed out so far
    pub served: usize,
    /// Size of the cached collection, once fetched
    pub total: Option<usize>,
    pub has_more: bool,
    pub loading: bool,
    pub items: ViewItems,
}

#[derive(Debug)]
struct SliceState {
    source: CollectionSource,
    full: Option<Arc<Vec<PostId>>>,
    served: usize,
    loading: bool,
    generation: u64,
}

impl SliceState {
    fn has_more(&self) -> bool {
        match &self.full {
            Some(full) => self.served < full.len(),
            None => true,
        }
    }
}

/// Fetch-once, slice-locally pager
pub struct WindowSlicer {
    api: Arc<dyn PostApi>,
    store: Arc<PostStore>,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
    window_size: usize,
    slice_delay: Duration,
    state: Mutex<SliceState>,
}

impl WindowSlicer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn PostApi>,
        store: Arc<PostStore>,
        notifier: Arc<Notifier>,
        retry: RetryPolicy,
        window_size: usize,
        slice_delay: Duration,
        source: CollectionSource,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            retry,
            window_size: window_size.max(1),
            slice_delay,
            state: Mutex::new(SliceState {
                source,
                full: None,
                served: 0,
                loading: false,
                generation: 0,
            }),
        }
    }

    pub fn source(&self) -> CollectionSource {
        self.state.lock().source.clone()
    }

    pub fn view_key(&self) -> ViewKey {
        self.state.lock().source.view_key()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more()
    }

    pub fn window(&self) -> SliceWindow {
        let state = self.state.lock();
        let key = state.source.view_key();
        SliceWindow {
            source: state.source.clone(),
            served: state.served,
            total: state.full.as_ref().map(|full| full.len()),
            has_more: state.has_more(),
            loading: state.loading,
            items: self.store.view(&key).unwrap_or_default(),
        }
    }

    /// Switch to another handle or tab
    ///
    /// Switching drops the cached collection and offset; any in-flight fetch
    /// for the previous source is discarded when it lands.
    pub fn open(&self, source: CollectionSource) {
        let mut state = self.state.lock();
        if state.source == source {
            return;
        }
        self.store.clear_view(&state.source.view_key());
        tracing::debug!(
            from = state.source.label(),
            to = source.label(),
            "Switching collection"
        );
        state.source = source;
        Self::invalidate(&mut state);
    }

    /// Drop the cache and fetch the collection again
    pub async fn refresh(&self) -> LoadOutcome {
        {
            let mut state = self.state.lock();
            self.store.clear_view(&state.source.view_key());
            Self::invalidate(&mut state);
        }
        self.load_more().await
    }

    /// Serve the next window
    pub async fn load_more(&self) -> LoadOutcome {
        let (source, generation, cached) = {
            let mut state = self.state.lock();
            if state.loading {
                return LoadOutcome::Busy;
            }
            if !state.has_more() {
                return LoadOutcome::Exhausted;
            }
            state.loading = true;
            (state.source.clone(), state.generation, state.full.is_some())
        };

        if cached {
            if !self.slice_delay.is_zero() {
                tokio::time::sleep(self.slice_delay).await;
            }
            crate::metrics::WINDOW_CACHE_HITS_TOTAL
                .with_label_values(&[source.label()])
                .inc();
            return self.serve_window(generation);
        }

        crate::metrics::WINDOW_CACHE_MISSES_TOTAL
            .with_label_values(&[source.label()])
            .inc();
        let result = self.fetch(&source).await;

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!(collection = source.label(), "Discarding superseded collection");
                return LoadOutcome::Superseded;
            }
            match result {
                Ok(mut posts) => {
                    if source == CollectionSource::Bookmarks {
                        // the backend list is the bookmarked set
                        for post in &mut posts {
                            post.flags.is_bookmarked = true;
                        }
                    }
                    let fetched = posts.len();
                    let ids: Vec<PostId> = visibility::admit(&self.store, posts)
                        .into_iter()
                        .map(|post| self.store.upsert(post).id.clone())
                        .collect();
                    tracing::info!(
                        collection = source.label(),
                        fetched,
                        visible = ids.len(),
                        "Cached collection"
                    );
                    state.full = Some(Arc::new(ids));
                    state.served = 0;
                }
                Err(error) => {
                    state.loading = false;
                    drop(state);
                    tracing::warn!(%error, collection = source.label(), "Collection fetch failed");
                    self.notifier.error(error.user_message());
                    return LoadOutcome::Failed;
                }
            }
        }

        self.serve_window(generation)
    }

    async fn fetch(&self, source: &CollectionSource) -> Result<Vec<crate::data::Post>> {
        let started = Instant::now();
        let result = self
            .retry
            .run(source.label(), || self.api.fetch_collection(source))
            .await;

        let status = match &result {
            Ok(_) => "ok",
            Err(error) => error.kind(),
        };
        crate::metrics::FETCHES_TOTAL
            .with_label_values(&["window", status])
            .inc();
        crate::metrics::FETCH_DURATION_SECONDS
            .with_label_values(&["window"])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    fn serve_window(&self, generation: u64) -> LoadOutcome {
        let mut state = self.state.lock();
        if state.generation != generation {
            return LoadOutcome::Superseded;
        }
        state.loading = false;

        let Some(full) = state.full.clone() else {
            return LoadOutcome::Exhausted;
        };
        let start = state.served.min(full.len());
        let end = (start + self.window_size).min(full.len());
        let key = state.source.view_key();
        let ids = &full[start..end];
        // bookmark membership follows the flag, which may have flipped
        // since the collection was cached
        let added = match state.source {
            CollectionSource::Bookmarks => self.store.append_known(key, ids, |post| {
                visibility::is_visible(post) && post.flags.is_bookmarked
            }),
            CollectionSource::Profile { .. } => {
                self.store.append_known(key, ids, visibility::is_visible)
            }
        };
        state.served = end;

        tracing::debug!(
            collection = state.source.label(),
            start,
            end,
            total = full.len(),
            added,
            "Served window"
        );
        LoadOutcome::Loaded { added }
    }

    fn invalidate(state: &mut SliceState) {
        state.full = None;
        state.served = 0;
        state.loading = false;
        state.generation += 1;
    }
}
