//! Consistency resolver
//!
//! Fans committed patches out to every view holding a copy of the post,
//! nested wrappers included, and publishes `{target_id, change}` events for
//! anything rendering those views.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::data::{PatchReport, Post, PostId, PostPatch, PostStore, ViewKey};
use crate::service::visibility;

/// What happened to a post
#[derive(Debug, Clone, PartialEq)]
pub enum PostChange {
    Patched(PostPatch),
    Removed,
}

/// Event published for every committed change
#[derive(Debug, Clone, PartialEq)]
pub struct PostUpdate {
    pub target_id: PostId,
    pub change: PostChange,
}

/// Broadcasts committed patches and applies view-specific rules
pub struct ConsistencyResolver {
    store: Arc<PostStore>,
    tx: broadcast::Sender<PostUpdate>,
    /// Bookmark-view positions of posts removed by an unbookmark
    parked: Mutex<HashMap<PostId, Vec<(ViewKey, usize)>>>,
}

impl ConsistencyResolver {
    pub fn new(store: Arc<PostStore>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            store,
            tx,
            parked: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<PostStore> {
        &self.store
    }

    /// Subscribe to committed changes.
    pub fn subscribe(&self) -> broadcast::Receiver<PostUpdate> {
        self.tx.subscribe()
    }

    /// Committed changes as a stream; lagged receivers skip missed events.
    pub fn updates(&self) -> BroadcastStream<PostUpdate> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Committed changes to a single post, e.g. for a detail view
    pub fn updates_for(&self, id: PostId) -> impl Stream<Item = PostUpdate> + Send + 'static {
        self.updates().filter_map(move |update| {
            let wanted = match update {
                Ok(update) if update.target_id == id => Some(update),
                Ok(_) => None,
                Err(error) => {
                    tracing::debug!(%error, "Post update stream lagged");
                    None
                }
            };
            futures::future::ready(wanted)
        })
    }

    /// Apply a patch everywhere and publish it
    pub fn commit(&self, id: &PostId, patch: PostPatch) -> PatchReport {
        if patch.is_empty() {
            return PatchReport::default();
        }

        let report = self.store.patch(id, &patch);
        self.apply_view_rules(id, &patch);
        tracing::debug!(
            post_id = %id,
            occurrences = report.occurrences,
            views = report.views_touched,
            "Committed patch"
        );
        self.publish(id, PostChange::Patched(patch));
        report
    }

    /// Derive a patch from the current canonical value and commit it
    /// atomically
    ///
    /// Returns `None` when the post is unknown.
    pub fn commit_with<F>(&self, id: &PostId, f: F) -> Option<PostPatch>
    where
        F: FnOnce(&Post) -> PostPatch,
    {
        let (patch, report) = self.store.update(id, f)?;
        self.apply_view_rules(id, &patch);
        tracing::debug!(
            post_id = %id,
            occurrences = report.occurrences,
            "Committed derived patch"
        );
        self.publish(id, PostChange::Patched(patch.clone()));
        Some(patch)
    }

    /// Forget the bookmark position parked for `id`
    ///
    /// Called once an unbookmark is confirmed and no rollback can follow.
    pub fn release_parked(&self, id: &PostId) -> bool {
        self.parked.lock().remove(id).is_some()
    }

    /// Posts whose bookmark position is parked
    pub fn parked_len(&self) -> usize {
        self.parked.lock().len()
    }

    /// Remove a post from every view and the cache, then publish it
    pub fn remove(&self, id: &PostId) -> PatchReport {
        self.parked.lock().remove(id);
        let report = self.store.remove(id);
        self.publish(id, PostChange::Removed);
        report
    }

    fn apply_view_rules(&self, id: &PostId, patch: &PostPatch) {
        match patch.is_bookmarked {
            // bookmark membership is the flag itself, so the list shrinks
            // before the server confirms
            Some(false) => {
                let positions = self.store.detach(id, |key| key == &ViewKey::Bookmarks);
                if !positions.is_empty() {
                    tracing::debug!(post_id = %id, "Removed unbookmarked post from bookmarks");
                    self.parked.lock().insert(id.clone(), positions);
                }
            }
            Some(true) => {
                let parked = self.parked.lock().remove(id);
                for (key, index) in parked.unwrap_or_default() {
                    self.store.reinsert(&key, index, id);
                }
            }
            None => {}
        }

        if patch.moderation.is_some() {
            let dropped = self.store.retain_in_views(visibility::is_visible);
            if dropped > 0 {
                tracing::info!(
                    post_id = %id,
                    dropped,
                    "Moderation change hid posts from views"
                );
            }
        }
    }

    fn publish(&self, id: &PostId, change: PostChange) {
        let update = PostUpdate {
            target_id: id.clone(),
            change,
        };
        if self.tx.send(update).is_err() {
            tracing::trace!("no subscribers for post update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Counts, FeedKind, Flags, Moderation, PostKind, UserRef};
    use chrono::Utc;

    fn post(id: &str) -> Post {
        Post {
            id: PostId::from(id),
            author: UserRef::new("alice"),
            content: "hello".to_string(),
            images: Vec::new(),
            kind: PostKind::Original,
            counts: Counts::default(),
            flags: Flags {
                is_bookmarked: true,
                ..Flags::default()
            },
            moderation: Moderation::default(),
            conversation_chain: Vec::new(),
            created_at: Utc::now(),
            referenced: None,
        }
    }

    fn resolver() -> ConsistencyResolver {
        ConsistencyResolver::new(Arc::new(PostStore::new()), 16)
    }

    fn ids(resolver: &ConsistencyResolver, key: &ViewKey) -> Vec<String> {
        resolver
            .store()
            .view(key)
            .unwrap()
            .iter()
            .map(|item| item.id.to_string())
            .collect()
    }

    fn bookmark(flag: bool) -> PostPatch {
        PostPatch {
            is_bookmarked: Some(flag),
            ..PostPatch::default()
        }
    }

    #[tokio::test]
    async fn commit_publishes_update() {
        let resolver = resolver();
        resolver.store().upsert(post("1"));
        let mut rx = resolver.subscribe();

        let patch = PostPatch {
            likes: Some(1),
            ..PostPatch::default()
        };
        resolver.commit(&PostId::from("1"), patch.clone());

        let update = rx.recv().await.unwrap();
        assert_eq!(update.target_id, PostId::from("1"));
        assert_eq!(update.change, PostChange::Patched(patch));
    }

    #[tokio::test]
    async fn updates_for_filters_by_target() {
        let resolver = resolver();
        resolver.store().upsert(post("1"));
        resolver.store().upsert(post("2"));
        let mut updates = Box::pin(resolver.updates_for(PostId::from("2")));

        resolver.commit(&PostId::from("1"), bookmark(false));
        resolver.remove(&PostId::from("2"));

        let update = updates.next().await.unwrap();
        assert_eq!(update.target_id, PostId::from("2"));
        assert_eq!(update.change, PostChange::Removed);
    }

    #[test]
    fn unbookmark_removes_from_bookmarks_only() {
        let resolver = resolver();
        resolver
            .store()
            .replace_view(ViewKey::Bookmarks, vec![post("1"), post("2")]);
        resolver
            .store()
            .replace_view(ViewKey::Feed(FeedKind::Home), vec![post("1")]);

        resolver.commit(&PostId::from("1"), bookmark(false));

        assert_eq!(ids(&resolver, &ViewKey::Bookmarks), vec!["2"]);
        let feed = resolver.store().view(&ViewKey::Feed(FeedKind::Home)).unwrap();
        assert_eq!(feed.len(), 1);
        assert!(!feed[0].flags.is_bookmarked);
    }

    #[test]
    fn rebookmark_restores_parked_position() {
        let resolver = resolver();
        resolver
            .store()
            .replace_view(ViewKey::Bookmarks, vec![post("1"), post("2"), post("3")]);

        resolver.commit(&PostId::from("2"), bookmark(false));
        assert_eq!(ids(&resolver, &ViewKey::Bookmarks), vec!["1", "3"]);

        resolver.commit(&PostId::from("2"), bookmark(true));
        assert_eq!(ids(&resolver, &ViewKey::Bookmarks), vec!["1", "2", "3"]);
    }

    #[test]
    fn moderation_patch_hides_post_and_its_reposts() {
        let resolver = resolver();
        let canonical = post("42");
        let repost = Post {
            id: PostId::from("7"),
            kind: PostKind::Repost {
                of: PostId::from("42"),
            },
            referenced: Some(Arc::new(canonical.clone())),
            ..post("7")
        };
        let key = ViewKey::Feed(FeedKind::Home);
        resolver
            .store()
            .replace_view(key.clone(), vec![post("1"), canonical, repost]);

        resolver.commit(
            &PostId::from("42"),
            PostPatch {
                moderation: Some(Moderation {
                    is_removed: true,
                    ..Moderation::default()
                }),
                ..PostPatch::default()
            },
        );

        assert_eq!(ids(&resolver, &key), vec!["1"]);
        // canonical entry survives; only the views drop it
        assert!(resolver.store().get(&PostId::from("42")).unwrap().moderation.is_removed);
    }

    #[test]
    fn commit_with_derives_from_current_value() {
        let resolver = resolver();
        resolver.store().upsert(post("1"));
        for _ in 0..3 {
            resolver.commit_with(&PostId::from("1"), |current| PostPatch {
                replies: Some(current.counts.replies + 1),
                ..PostPatch::default()
            });
        }
        assert_eq!(
            resolver.store().get(&PostId::from("1")).unwrap().counts.replies,
            3
        );
        assert!(resolver
            .commit_with(&PostId::from("missing"), |_| PostPatch::default())
            .is_none());
    }
}
