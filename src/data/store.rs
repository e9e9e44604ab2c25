//! Post store
//!
//! Single source of truth mapping `id -> Post`, plus the materialized,
//! ordered array every view context reads. Arrays are handed out as
//! `Arc<Vec<Arc<Post>>>`; any change to an array replaces the outer `Arc`
//! so consumers can detect changes with `Arc::ptr_eq`.
//!
//! All operations are synchronous and complete under a single lock, so a
//! caller never observes a partially propagated patch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::models::{FeedKind, Post, PostId, PostPatch, ProfileTab};

/// Materialized array of a view
pub type ViewItems = Arc<Vec<Arc<Post>>>;

/// Identity of a view context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Feed(FeedKind),
    Profile { handle: String, tab: ProfileTab },
    Bookmarks,
    Detail(PostId),
}

impl ViewKey {
    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ViewKey::Feed(FeedKind::Home) => "feed",
            ViewKey::Feed(FeedKind::Explore) => "explore",
            ViewKey::Profile { .. } => "profile",
            ViewKey::Bookmarks => "bookmarks",
            ViewKey::Detail(_) => "detail",
        }
    }
}

/// How far a write propagated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// View entries rewritten (direct or nested)
    pub occurrences: usize,
    /// View arrays replaced
    pub views_touched: usize,
}

#[derive(Default)]
struct Inner {
    posts: HashMap<PostId, Arc<Post>>,
    views: HashMap<ViewKey, ViewItems>,
}

/// Canonical post cache with per-view arrays
#[derive(Default)]
pub struct PostStore {
    inner: RwLock<Inner>,
}

impl PostStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get canonical post by ID
    pub fn get(&self, id: &PostId) -> Option<Arc<Post>> {
        self.inner.read().posts.get(id).cloned()
    }

    /// Number of canonical posts
    pub fn len(&self) -> usize {
        self.inner.read().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the post an interaction should act on
    ///
    /// A repost resolves to the canonical post it references; anything else
    /// resolves to itself.
    pub fn resolve_target(&self, id: &PostId) -> Option<Arc<Post>> {
        let inner = self.inner.read();
        let post = inner.posts.get(id)?;
        match (post.is_repost(), post.referenced_id()) {
            (true, Some(of)) => inner
                .posts
                .get(of)
                .cloned()
                .or_else(|| post.referenced.clone()),
            _ => Some(post.clone()),
        }
    }

    /// Insert or overwrite a post
    ///
    /// Embedded referenced posts are upserted first. Every view entry holding
    /// the post, directly or nested in a wrapper, is replaced.
    pub fn upsert(&self, post: Post) -> Arc<Post> {
        let mut inner = self.inner.write();
        let stored = Self::upsert_locked(&mut inner, post).0;
        Self::record_size(&inner);
        stored
    }

    /// Merge a patch into the canonical entry and every occurrence
    pub fn patch(&self, id: &PostId, patch: &PostPatch) -> PatchReport {
        let mut inner = self.inner.write();
        Self::patch_locked(&mut inner, id, patch)
    }

    /// Compute a patch from the current value and apply it atomically
    ///
    /// Returns `None` when the post is unknown.
    pub fn update<F>(&self, id: &PostId, f: F) -> Option<(PostPatch, PatchReport)>
    where
        F: FnOnce(&Post) -> PostPatch,
    {
        let mut inner = self.inner.write();
        let current = inner.posts.get(id)?.clone();
        let patch = f(&current);
        let report = Self::patch_locked(&mut inner, id, &patch);
        Some((patch, report))
    }

    /// Delete a post from the cache and from every view
    ///
    /// Wrappers referencing the post are dropped from views as well.
    pub fn remove(&self, id: &PostId) -> PatchReport {
        let mut inner = self.inner.write();
        inner.posts.remove(id);

        let mut report = PatchReport::default();
        for items in inner.views.values_mut() {
            let before = items.len();
            if !items.iter().any(|item| item.involves(id)) {
                continue;
            }
            let kept: Vec<Arc<Post>> = items
                .iter()
                .filter(|item| !item.involves(id))
                .cloned()
                .collect();
            report.occurrences += before - kept.len();
            report.views_touched += 1;
            *items = Arc::new(kept);
        }

        Self::record_size(&inner);
        tracing::debug!(
            post_id = %id,
            occurrences = report.occurrences,
            "Removed post from store"
        );
        report
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Current array of a view
    pub fn view(&self, key: &ViewKey) -> Option<ViewItems> {
        self.inner.read().views.get(key).cloned()
    }

    /// Keys of all materialized views
    pub fn view_keys(&self) -> Vec<ViewKey> {
        self.inner.read().views.keys().cloned().collect()
    }

    /// Replace a view's array with `posts`, upserting each
    pub fn replace_view(&self, key: ViewKey, posts: Vec<Post>) -> ViewItems {
        let mut inner = self.inner.write();
        let stored: Vec<Arc<Post>> = posts
            .into_iter()
            .map(|post| Self::upsert_locked(&mut inner, post).0)
            .collect();
        let items = Arc::new(stored);
        inner.views.insert(key, items.clone());
        Self::record_size(&inner);
        items
    }

    /// Append `posts` to a view, skipping ids already present
    ///
    /// Returns the number of entries appended.
    pub fn extend_view(&self, key: ViewKey, posts: Vec<Post>) -> usize {
        let mut inner = self.inner.write();
        let mut stored = Vec::with_capacity(posts.len());
        for post in posts {
            stored.push(Self::upsert_locked(&mut inner, post).0);
        }

        let mut next: Vec<Arc<Post>> = inner
            .views
            .get(&key)
            .map(|items| items.to_vec())
            .unwrap_or_default();
        let mut added = 0;
        for post in stored {
            if next.iter().any(|item| item.id == post.id) {
                continue;
            }
            next.push(post);
            added += 1;
        }
        inner.views.insert(key, Arc::new(next));
        Self::record_size(&inner);
        added
    }

    /// Append canonical posts by id, skipping unknown ids, ids already in
    /// the view, and posts rejected by `keep`
    ///
    /// Returns the number of entries appended.
    pub fn append_known<K>(&self, key: ViewKey, ids: &[PostId], keep: K) -> usize
    where
        K: Fn(&Post) -> bool,
    {
        let mut inner = self.inner.write();
        let mut next: Vec<Arc<Post>> = inner
            .views
            .get(&key)
            .map(|items| items.to_vec())
            .unwrap_or_default();
        let mut added = 0;
        for id in ids {
            let Some(post) = inner.posts.get(id) else {
                continue;
            };
            if !keep(&**post) || next.iter().any(|item| &item.id == id) {
                continue;
            }
            next.push(post.clone());
            added += 1;
        }
        inner.views.insert(key, Arc::new(next));
        added
    }

    /// Insert a post at the top of a view (new local posts)
    pub fn prepend_to_view(&self, key: ViewKey, post: Post) -> Arc<Post> {
        let mut inner = self.inner.write();
        let stored = Self::upsert_locked(&mut inner, post).0;
        let mut next: Vec<Arc<Post>> = inner
            .views
            .get(&key)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.id != stored.id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        next.insert(0, stored.clone());
        inner.views.insert(key, Arc::new(next));
        Self::record_size(&inner);
        stored
    }

    /// Drop a view's array
    pub fn clear_view(&self, key: &ViewKey) {
        self.inner.write().views.remove(key);
    }

    /// Remove direct entries of `id` from views selected by `select`
    ///
    /// Returns the `(view, index)` positions the entries occupied.
    pub fn detach<S>(&self, id: &PostId, select: S) -> Vec<(ViewKey, usize)>
    where
        S: Fn(&ViewKey) -> bool,
    {
        let mut inner = self.inner.write();
        let mut positions = Vec::new();
        for (key, items) in inner.views.iter_mut() {
            if !select(key) {
                continue;
            }
            let Some(index) = items.iter().position(|item| &item.id == id) else {
                continue;
            };
            let mut next = items.to_vec();
            next.remove(index);
            *items = Arc::new(next);
            positions.push((key.clone(), index));
        }
        positions
    }

    /// Put the canonical post back into a view at `index`
    ///
    /// Does nothing when the post is unknown or already present.
    pub fn reinsert(&self, key: &ViewKey, index: usize, id: &PostId) -> bool {
        let mut inner = self.inner.write();
        let Some(post) = inner.posts.get(id).cloned() else {
            return false;
        };
        let Some(items) = inner.views.get_mut(key) else {
            return false;
        };
        if items.iter().any(|item| &item.id == id) {
            return false;
        }
        let mut next = items.to_vec();
        next.insert(index.min(next.len()), post);
        *items = Arc::new(next);
        true
    }

    /// Keep only view entries satisfying `keep`
    ///
    /// Canonical entries are untouched. Returns the number of entries dropped.
    pub fn retain_in_views<K>(&self, keep: K) -> usize
    where
        K: Fn(&Post) -> bool,
    {
        let mut inner = self.inner.write();
        let mut dropped = 0;
        for items in inner.views.values_mut() {
            if items.iter().all(|item| keep(&**item)) {
                continue;
            }
            let kept: Vec<Arc<Post>> = items.iter().filter(|item| keep(&***item)).cloned().collect();
            dropped += items.len() - kept.len();
            *items = Arc::new(kept);
        }
        dropped
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn upsert_locked(inner: &mut Inner, mut post: Post) -> (Arc<Post>, PatchReport) {
        if let Some(referenced) = post.referenced.take() {
            let referenced = Arc::try_unwrap(referenced).unwrap_or_else(|arc| (*arc).clone());
            post.referenced = Some(Self::upsert_locked(inner, referenced).0);
        } else if let Some(of) = post.referenced_id() {
            post.referenced = inner.posts.get(of).cloned();
        }

        let post = Arc::new(post);
        inner.posts.insert(post.id.clone(), post.clone());
        let report = Self::rewire_locked(inner, &post);
        (post, report)
    }

    fn patch_locked(inner: &mut Inner, id: &PostId, patch: &PostPatch) -> PatchReport {
        let current = inner
            .posts
            .get(id)
            .cloned()
            .or_else(|| Self::find_occurrence(&*inner, id));
        let Some(current) = current else {
            tracing::debug!(post_id = %id, "Patch target not in store");
            return PatchReport::default();
        };

        let next = Arc::new(patch.apply(&current));
        inner.posts.insert(id.clone(), next.clone());
        Self::rewire_locked(inner, &next)
    }

    fn find_occurrence(inner: &Inner, id: &PostId) -> Option<Arc<Post>> {
        inner.views.values().flat_map(|items| items.iter()).find_map(|item| {
            if &item.id == id {
                Some(item.clone())
            } else if item.referenced_id() == Some(id) {
                item.referenced.clone()
            } else {
                None
            }
        })
    }

    /// Point every holder of `post.id` at the new `post`.
    fn rewire_locked(inner: &mut Inner, post: &Arc<Post>) -> PatchReport {
        let wrapper_ids: Vec<PostId> = inner
            .posts
            .values()
            .filter(|candidate| candidate.referenced_id() == Some(&post.id))
            .map(|candidate| candidate.id.clone())
            .collect();
        for wrapper_id in wrapper_ids {
            if let Some(wrapper) = inner.posts.get(&wrapper_id) {
                let rewired = Arc::new(with_referenced(wrapper, post));
                inner.posts.insert(wrapper_id, rewired);
            }
        }

        let mut report = PatchReport::default();
        for items in inner.views.values_mut() {
            if !items.iter().any(|item| item.involves(&post.id)) {
                continue;
            }
            let next: Vec<Arc<Post>> = items
                .iter()
                .map(|item| {
                    if item.id == post.id {
                        report.occurrences += 1;
                        post.clone()
                    } else if item.referenced_id() == Some(&post.id) {
                        report.occurrences += 1;
                        Arc::new(with_referenced(item, post))
                    } else {
                        item.clone()
                    }
                })
                .collect();
            *items = Arc::new(next);
            report.views_touched += 1;
        }
        report
    }

    fn record_size(inner: &Inner) {
        crate::metrics::STORE_POSTS.set(inner.posts.len() as i64);
    }
}

fn with_referenced(wrapper: &Post, referenced: &Arc<Post>) -> Post {
    Post {
        referenced: Some(referenced.clone()),
        ..wrapper.clone()
    }
}
