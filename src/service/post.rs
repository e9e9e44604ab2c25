//! Post service
//!
//! Single-post operations: direct fetch, create, reply and delete.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::PostApi;
use crate::data::{FeedKind, NewPost, Post, PostId, PostStore, ViewKey};
use crate::error::{AppError, Result};
use crate::service::mutation::MutationCoordinator;
use crate::service::notify::Notifier;
use crate::service::pagination::RetryPolicy;
use crate::service::resolver::ConsistencyResolver;
use crate::service::visibility;

/// Detail views kept materialized at once
const OPEN_DETAILS: usize = 8;

/// Post service
pub struct PostService {
    api: Arc<dyn PostApi>,
    resolver: Arc<ConsistencyResolver>,
    mutations: Arc<MutationCoordinator>,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
    /// Open detail views, oldest first
    details: Mutex<VecDeque<PostId>>,
}

impl PostService {
    /// Create new post service
    pub fn new(
        api: Arc<dyn PostApi>,
        resolver: Arc<ConsistencyResolver>,
        mutations: Arc<MutationCoordinator>,
        notifier: Arc<Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            resolver,
            mutations,
            notifier,
            retry,
            details: Mutex::new(VecDeque::new()),
        }
    }

    fn store(&self) -> &Arc<PostStore> {
        self.resolver.store()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch a post for its detail view
    ///
    /// # Errors
    /// Returns `AppError::Hidden` when moderation hides the post, or the
    /// fetch error.
    pub async fn get_post(&self, author: &str, id: &PostId) -> Result<Arc<Post>> {
        let post = self
            .retry
            .run("detail", || self.api.fetch_post(author, id))
            .await?;
        self.show_detail(post)
    }

    /// Fetch a post when only its id is known
    pub async fn get_post_by_id(&self, id: &PostId) -> Result<Arc<Post>> {
        let post = self
            .retry
            .run("detail", || self.api.fetch_post_by_id(id))
            .await?;
        self.show_detail(post)
    }

    /// Drop the materialized detail view of `id`
    pub fn close_detail(&self, id: &PostId) {
        self.details.lock().retain(|open| open != id);
        self.store().clear_view(&ViewKey::Detail(id.clone()));
    }

    fn show_detail(&self, post: Post) -> Result<Arc<Post>> {
        if !visibility::is_visible(&post) {
            // cached copies elsewhere must not outlive the hidden state
            let fetched = Arc::new(post.clone());
            visibility::absorb_hidden(self.store(), vec![post]);
            self.close_detail(&fetched.id);
            return visibility::ensure_visible(fetched);
        }

        let stored = self.store().upsert(post);
        let key = ViewKey::Detail(stored.id.clone());
        self.store().clear_view(&key);
        self.store()
            .append_known(key, std::slice::from_ref(&stored.id), visibility::is_visible);
        self.track_detail(&stored.id);
        Ok(stored)
    }

    fn track_detail(&self, id: &PostId) {
        let evicted = {
            let mut details = self.details.lock();
            details.retain(|open| open != id);
            details.push_back(id.clone());
            if details.len() > OPEN_DETAILS {
                details.pop_front()
            } else {
                None
            }
        };
        if let Some(oldest) = evicted {
            tracing::debug!(post_id = %oldest, "Closing oldest detail view");
            self.store().clear_view(&ViewKey::Detail(oldest));
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a post and put it at the top of the home feed
    ///
    /// # Errors
    /// Returns `AppError::Validation` for empty drafts and rejected requests;
    /// these are meant to be shown inline next to the composer.
    pub async fn create_post(&self, draft: NewPost) -> Result<Arc<Post>> {
        if draft.content.trim().is_empty() && draft.images.is_empty() {
            return Err(AppError::Validation(
                "post content or images are required".to_string(),
            ));
        }

        // the idempotency key makes retries safe
        let created = self
            .retry
            .run("create", || self.api.create_post(&draft))
            .await
            .inspect_err(|error| {
                if !matches!(error, AppError::Validation(_)) {
                    self.notifier.error(error.user_message());
                }
            })?;

        let stored = self
            .store()
            .prepend_to_view(ViewKey::Feed(FeedKind::Home), created);
        if let Some(parent_id) = &draft.parent_id {
            self.mutations.record_reply(parent_id);
        }

        tracing::info!(
            post_id = %stored.id,
            kind = stored.kind.as_str(),
            "Created post"
        );
        Ok(stored)
    }

    /// Reply to `parent_id`; the parent's reply count grows only once the
    /// reply exists on the server
    pub async fn submit_reply(
        &self,
        parent_id: &PostId,
        content: impl Into<String>,
    ) -> Result<Arc<Post>> {
        self.create_post(NewPost::reply(parent_id.clone(), content))
            .await
    }

    /// Delete one of the user's posts everywhere
    ///
    /// # Errors
    /// Returns `AppError::NotFound` when the post is not cached, or the
    /// request error. The post stays in place when the request fails.
    pub async fn delete_post(&self, id: &PostId) -> Result<()> {
        let author = self
            .store()
            .get(id)
            .map(|post| post.author.handle.clone())
            .ok_or(AppError::NotFound)?;

        if let Err(error) = self.api.delete_post(&author, id).await {
            tracing::warn!(%error, post_id = %id, "Delete failed");
            self.notifier.error("Failed to delete post");
            return Err(error);
        }

        let report = self.resolver.remove(id);
        self.close_detail(id);
        tracing::info!(
            post_id = %id,
            occurrences = report.occurrences,
            "Deleted post"
        );
        Ok(())
    }
}
