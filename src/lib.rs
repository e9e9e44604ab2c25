//! feedstore - client-side state core for a social feed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (reqwest)                     │
//! │  - PostApi trait                                            │
//! │  - REST DTOs and converters                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Optimistic mutations with rollback                       │
//! │  - Cursor and window-slice pagination                       │
//! │  - Consistency fan-out and visibility rules                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Canonical post store                                     │
//! │  - Materialized view arrays                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: backend contract and its reqwest implementation
//! - `service`: mutation, pagination, consistency and visibility logic
//! - `data`: domain model and post store
//! - `config`: Configuration management
//! - `metrics`: Prometheus instruments
//! - `error`: Error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

use api::{CollectionSource, FeedQuery, PostApi};
use data::{FeedKind, PostStore, ProfileTab};
use service::{
    ConsistencyResolver, CursorPager, MutationCoordinator, Notifier, PostService, RetryPolicy,
    ScrollThrottle, WindowSlicer,
};

/// Shared client state
///
/// Cloned freely; every clone works against the same store, so a mutation
/// made through one handle is visible in every view built from another.
#[derive(Clone)]
pub struct FeedClient {
    /// Client configuration
    pub config: Arc<config::AppConfig>,

    /// Backend API
    pub api: Arc<dyn PostApi>,

    /// Canonical post cache and view arrays
    pub store: Arc<PostStore>,

    /// Fan-out of committed changes
    pub resolver: Arc<ConsistencyResolver>,

    /// User-visible notifications
    pub notifier: Arc<Notifier>,

    /// Like / repost / bookmark protocol
    pub mutations: Arc<MutationCoordinator>,

    /// Single-post operations
    pub posts: Arc<PostService>,
}

impl FeedClient {
    /// Build a client talking to the configured REST backend
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let api = api::HttpPostApi::new(&config)?;
        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// Build a client around any `PostApi` implementation
    pub fn with_api(config: config::AppConfig, api: Arc<dyn PostApi>) -> Self {
        let store = Arc::new(PostStore::new());
        let notifier = Arc::new(Notifier::new(config.notifications.channel_capacity));
        let resolver = Arc::new(ConsistencyResolver::new(
            store.clone(),
            config.notifications.channel_capacity,
        ));
        let mutations = Arc::new(MutationCoordinator::new(
            api.clone(),
            resolver.clone(),
            notifier.clone(),
            config.mutations.serialize_per_target,
        ));
        let posts = Arc::new(PostService::new(
            api.clone(),
            resolver.clone(),
            mutations.clone(),
            notifier.clone(),
            RetryPolicy::from_config(&config.api),
        ));

        tracing::debug!(
            serialize_per_target = config.mutations.serialize_per_target,
            window_size = config.pagination.window_size,
            "Feed client initialized"
        );

        Self {
            config: Arc::new(config),
            api,
            store,
            resolver,
            notifier,
            mutations,
            posts,
        }
    }

    /// Query for a feed using the configured defaults
    pub fn feed_query(&self, kind: FeedKind) -> FeedQuery {
        FeedQuery {
            post_type: self.config.feed.post_type.clone(),
            following_only: self.config.feed.following_only,
            ..FeedQuery::new(kind)
        }
    }

    /// Cursor pager for the home feed or explore
    pub fn feed_pager(&self, query: FeedQuery) -> CursorPager {
        CursorPager::new(
            self.api.clone(),
            self.store.clone(),
            self.notifier.clone(),
            RetryPolicy::from_config(&self.config.api),
            query,
        )
    }

    /// Window slicer for a profile tab
    pub fn profile_tab(&self, handle: impl Into<String>, tab: ProfileTab) -> WindowSlicer {
        self.slicer(CollectionSource::profile(handle, tab))
    }

    /// Window slicer for the user's bookmarks
    pub fn bookmarks(&self) -> WindowSlicer {
        self.slicer(CollectionSource::Bookmarks)
    }

    /// Scroll throttle with the configured interval
    pub fn scroll_throttle(&self) -> ScrollThrottle {
        ScrollThrottle::new(self.config.pagination.scroll_throttle())
    }

    fn slicer(&self, source: CollectionSource) -> WindowSlicer {
        WindowSlicer::new(
            self.api.clone(),
            self.store.clone(),
            self.notifier.clone(),
            RetryPolicy::from_config(&self.config.api),
            self.config.pagination.window_size,
            self.config.pagination.slice_delay(),
            source,
        )
    }
}
