//! Network boundary
//!
//! `PostApi` is the contract the core consumes; `HttpPostApi` implements it
//! over the REST backend with reqwest.

mod client;
pub mod converters;
pub mod dto;

pub use client::HttpPostApi;

use async_trait::async_trait;

use crate::data::{FeedKind, Interaction, NewPost, Post, PostId, ProfileTab, ViewKey};
use crate::error::Result;

/// Query for one page of a cursor-paginated feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub kind: FeedKind,
    /// 1-based page number
    pub page: u32,
    pub post_type: Option<String>,
    pub following_only: bool,
}

impl FeedQuery {
    pub fn new(kind: FeedKind) -> Self {
        Self {
            kind,
            page: 1,
            post_type: None,
            following_only: false,
        }
    }

    pub fn at_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// One page of a feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Post>,
}

impl FeedPage {
    /// Whether the server reports a further page
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

/// Server answer to a toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleResponse {
    /// Authoritative flag after the toggle
    pub active: bool,
    /// Authoritative counter, when the server includes it
    pub count: Option<u64>,
}

/// Whole collections fetched once and sliced locally
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionSource {
    Profile { handle: String, tab: ProfileTab },
    Bookmarks,
}

impl CollectionSource {
    pub fn profile(handle: impl Into<String>, tab: ProfileTab) -> Self {
        CollectionSource::Profile {
            handle: handle.into(),
            tab,
        }
    }

    /// View the collection materializes into
    pub fn view_key(&self) -> ViewKey {
        match self {
            CollectionSource::Profile { handle, tab } => ViewKey::Profile {
                handle: handle.clone(),
                tab: *tab,
            },
            CollectionSource::Bookmarks => ViewKey::Bookmarks,
        }
    }

    /// Label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            CollectionSource::Profile { tab, .. } => tab.path(),
            CollectionSource::Bookmarks => "bookmarks",
        }
    }
}

/// Backend operations the core depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostApi: Send + Sync {
    /// `GET feed|explore?page&post_type&following_only`
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage>;

    /// `GET post/{author}/{id}`
    async fn fetch_post(&self, author: &str, id: &PostId) -> Result<Post>;

    /// `GET post/by-id/{id}`
    async fn fetch_post_by_id(&self, id: &PostId) -> Result<Post>;

    /// `POST post/{author}/{id}/like|repost|bookmark`
    async fn toggle(
        &self,
        author: &str,
        id: &PostId,
        interaction: Interaction,
    ) -> Result<ToggleResponse>;

    /// `DELETE post/{author}/{id}`
    async fn delete_post(&self, author: &str, id: &PostId) -> Result<()>;

    /// `POST post/`
    async fn create_post(&self, draft: &NewPost) -> Result<Post>;

    /// `GET user/{handle}/{tab}` or `GET post/bookmarks`, unpaginated
    async fn fetch_collection(&self, source: &CollectionSource) -> Result<Vec<Post>>;
}
