//! Visibility filter
//!
//! Read-time rules that hide moderated, deleted and invalid-chain posts from
//! every list and from direct fetches. Moderation flags are never modified
//! here.

use std::sync::Arc;

use crate::data::{Post, PostKind, PostStore};
use crate::error::AppError;

/// Why a post is hidden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenReason {
    Deleted,
    Removed,
    InvalidConversation,
    /// Repost or quote whose referenced post is gone or hidden
    ReferencesUnavailable,
}

impl HiddenReason {
    /// User-facing explanation shown in place of the post
    pub fn message(&self) -> &'static str {
        match self {
            HiddenReason::Deleted => "This post has been deleted by the author.",
            HiddenReason::Removed => "This post has been removed due to violations.",
            HiddenReason::InvalidConversation => "This post is part of an invalid conversation.",
            HiddenReason::ReferencesUnavailable => {
                "This post references content that has been deleted or removed."
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HiddenReason::Deleted => "deleted",
            HiddenReason::Removed => "removed",
            HiddenReason::InvalidConversation => "invalid_conversation",
            HiddenReason::ReferencesUnavailable => "references_unavailable",
        }
    }
}

fn own_reason(post: &Post) -> Option<HiddenReason> {
    if post.moderation.is_deleted {
        Some(HiddenReason::Deleted)
    } else if post.moderation.is_removed {
        Some(HiddenReason::Removed)
    } else if !post.moderation.is_conversation_chain_valid {
        Some(HiddenReason::InvalidConversation)
    } else {
        None
    }
}

/// Classify a post, `None` meaning visible
pub fn classify(post: &Post) -> Option<HiddenReason> {
    if let Some(reason) = own_reason(post) {
        return Some(reason);
    }

    match &post.kind {
        PostKind::Repost { .. } | PostKind::Quote { .. } => match &post.referenced {
            Some(referenced) if own_reason(referenced).is_none() => None,
            _ => Some(HiddenReason::ReferencesUnavailable),
        },
        PostKind::Original | PostKind::Reply { .. } => None,
    }
}

pub fn is_visible(post: &Post) -> bool {
    classify(post).is_none()
}

/// Drop hidden posts from a fetched list, keeping order
pub fn filter_visible(posts: Vec<Post>) -> Vec<Post> {
    let before = posts.len();
    let visible: Vec<Post> = posts
        .into_iter()
        .filter(|post| match classify(post) {
            Some(reason) => {
                crate::metrics::HIDDEN_POSTS_TOTAL
                    .with_label_values(&[reason.as_str()])
                    .inc();
                tracing::debug!(post_id = %post.id, reason = reason.as_str(), "Hiding post");
                false
            }
            None => true,
        })
        .collect();

    if visible.len() != before {
        tracing::debug!(
            hidden = before - visible.len(),
            kept = visible.len(),
            "Visibility filter excluded posts"
        );
    }
    visible
}

/// Filter a fetched list against the store
///
/// Hidden posts the store already holds, directly or as the target of a
/// wrapper, take their fetched state first so stale copies leave every view.
/// Returns the visible posts in order.
pub fn admit(store: &PostStore, posts: Vec<Post>) -> Vec<Post> {
    let stale: Vec<Post> = posts
        .iter()
        .filter(|post| !is_visible(post) && is_known(store, post))
        .cloned()
        .collect();
    absorb_hidden(store, stale);
    filter_visible(posts)
}

/// Store hidden posts the cache already knows and prune views
///
/// Unknown posts are ignored. Returns the number of view entries dropped.
pub fn absorb_hidden(store: &PostStore, posts: Vec<Post>) -> usize {
    let mut absorbed = 0;
    for post in posts {
        if !is_known(store, &post) {
            continue;
        }
        store.upsert(post);
        absorbed += 1;
    }
    if absorbed == 0 {
        return 0;
    }

    let dropped = store.retain_in_views(is_visible);
    if dropped > 0 {
        tracing::info!(absorbed, dropped, "Fetched moderation state hid cached posts");
    }
    dropped
}

fn is_known(store: &PostStore, post: &Post) -> bool {
    store.get(&post.id).is_some()
        || post
            .referenced_id()
            .is_some_and(|of| store.get(of).is_some())
}

/// Gate for direct single-post fetches
///
/// # Errors
/// Returns `AppError::Hidden` with the cause-specific reason.
pub fn ensure_visible(post: Arc<Post>) -> Result<Arc<Post>, AppError> {
    match classify(&post) {
        Some(reason) => {
            crate::metrics::HIDDEN_POSTS_TOTAL
                .with_label_values(&[reason.as_str()])
                .inc();
            Err(AppError::Hidden(reason))
        }
        None => Ok(post),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Counts, FeedKind, Flags, Moderation, PostId, UserRef, ViewKey};
    use chrono::Utc;

    fn post(id: &str) -> Post {
        Post {
            id: PostId::from(id),
            author: UserRef::new("alice"),
            content: "hello".to_string(),
            images: Vec::new(),
            kind: PostKind::Original,
            counts: Counts::default(),
            flags: Flags::default(),
            moderation: Moderation::default(),
            conversation_chain: Vec::new(),
            created_at: Utc::now(),
            referenced: None,
        }
    }

    fn wrapper(id: &str, kind: PostKind, referenced: Option<Post>) -> Post {
        Post {
            kind,
            referenced: referenced.map(Arc::new),
            ..post(id)
        }
    }

    #[test]
    fn own_flags_take_priority_in_order() {
        let mut p = post("1");
        p.moderation.is_removed = true;
        p.moderation.is_deleted = true;
        assert_eq!(classify(&p), Some(HiddenReason::Deleted));

        p.moderation.is_deleted = false;
        assert_eq!(classify(&p), Some(HiddenReason::Removed));

        p.moderation.is_removed = false;
        p.moderation.is_conversation_chain_valid = false;
        assert_eq!(classify(&p), Some(HiddenReason::InvalidConversation));

        p.moderation.is_conversation_chain_valid = true;
        assert_eq!(classify(&p), None);
    }

    #[test]
    fn repost_of_deleted_post_is_hidden() {
        let mut canonical = post("42");
        canonical.moderation.is_deleted = true;
        let repost = wrapper(
            "7",
            PostKind::Repost {
                of: PostId::from("42"),
            },
            Some(canonical),
        );

        let reason = classify(&repost).unwrap();
        assert_eq!(reason, HiddenReason::ReferencesUnavailable);
        assert!(reason
            .message()
            .contains("references content that has been deleted"));
    }

    #[test]
    fn quote_without_referenced_post_is_hidden() {
        let quote = wrapper(
            "8",
            PostKind::Quote {
                of: PostId::from("42"),
            },
            None,
        );
        assert_eq!(classify(&quote), Some(HiddenReason::ReferencesUnavailable));
    }

    #[test]
    fn filter_keeps_order_of_visible_posts() {
        let mut removed = post("2");
        removed.moderation.is_removed = true;
        let visible = filter_visible(vec![post("1"), removed, post("3")]);
        let ids: Vec<&str> = visible.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn ensure_visible_reports_removed_message() {
        let mut removed = post("2");
        removed.moderation.is_removed = true;
        let error = ensure_visible(Arc::new(removed)).unwrap_err();
        assert!(error.to_string().contains("removed due to violations"));
        assert!(ensure_visible(Arc::new(post("1"))).is_ok());
    }

    #[test]
    fn admit_prunes_cached_copies_of_newly_hidden_posts() {
        let store = PostStore::new();
        let target = post("42");
        let reposted = wrapper(
            "7",
            PostKind::Repost {
                of: PostId::from("42"),
            },
            Some(target.clone()),
        );
        store.replace_view(
            ViewKey::Feed(FeedKind::Home),
            vec![post("1"), target.clone(), reposted],
        );

        let mut removed = target;
        removed.moderation.is_removed = true;
        let mut unknown = post("99");
        unknown.moderation.is_deleted = true;
        let admitted = admit(&store, vec![removed, unknown, post("2")]);

        let ids: Vec<&str> = admitted.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
        let feed = store.view(&ViewKey::Feed(FeedKind::Home)).unwrap();
        let feed_ids: Vec<&str> = feed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(feed_ids, vec!["1"]);
        assert!(store.get(&PostId::from("42")).unwrap().moderation.is_removed);
        assert!(store.get(&PostId::from("99")).is_none());
    }

    #[test]
    fn absorb_ignores_posts_the_store_never_saw() {
        let store = PostStore::new();
        store.replace_view(ViewKey::Bookmarks, vec![post("1")]);
        let mut removed = post("5");
        removed.moderation.is_removed = true;

        assert_eq!(absorb_hidden(&store, vec![removed]), 0);
        assert_eq!(store.view(&ViewKey::Bookmarks).unwrap().len(), 1);
        assert!(store.get(&PostId::from("5")).is_none());
    }
}
