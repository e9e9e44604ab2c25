//! Data models
//!
//! Rust structs representing post entities and the partial updates
//! applied to them. Posts are shared as `Arc<Post>`; every change produces
//! a new `Arc` so identity-based change detection observes it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Stable post identifier
///
/// The server may send numeric or string ids; both are normalized to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for PostId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// Post
// =============================================================================

/// Author reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            display_name: None,
            avatar_url: None,
        }
    }
}

/// What kind of post this is
///
/// Reposts and quotes reference the canonical post by id; they never own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostKind {
    Original,
    Reply { parent: PostId },
    Repost { of: PostId },
    Quote { of: PostId },
}

impl PostKind {
    /// Id of the referenced post for reposts and quotes.
    pub fn referenced_id(&self) -> Option<&PostId> {
        match self {
            PostKind::Repost { of } | PostKind::Quote { of } => Some(of),
            PostKind::Original | PostKind::Reply { .. } => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Original => "original",
            PostKind::Reply { .. } => "reply",
            PostKind::Repost { .. } => "repost",
            PostKind::Quote { .. } => "quote",
        }
    }
}

/// Engagement counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
}

/// Viewer-relative engagement flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub is_liked: bool,
    pub is_reposted: bool,
    pub is_bookmarked: bool,
}

/// Moderation outcome flags supplied by the moderation subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moderation {
    pub is_deleted: bool,
    pub is_removed: bool,
    pub is_conversation_chain_valid: bool,
}

impl Default for Moderation {
    fn default() -> Self {
        Self {
            is_deleted: false,
            is_removed: false,
            is_conversation_chain_valid: true,
        }
    }
}

/// A post, reply, repost or quote
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author: UserRef,
    pub content: String,
    pub images: Vec<String>,
    pub kind: PostKind,
    pub counts: Counts,
    pub flags: Flags,
    pub moderation: Moderation,
    /// Ancestor ids, root first
    pub conversation_chain: Vec<PostId>,
    pub created_at: DateTime<Utc>,
    /// Embedded copy of the referenced post (reposts and quotes only)
    pub referenced: Option<Arc<Post>>,
}

impl Post {
    pub fn referenced_id(&self) -> Option<&PostId> {
        self.kind.referenced_id()
    }

    pub fn is_repost(&self) -> bool {
        matches!(self.kind, PostKind::Repost { .. })
    }

    /// Whether this post is `id` or wraps `id`.
    pub fn involves(&self, id: &PostId) -> bool {
        &self.id == id || self.referenced_id() == Some(id)
    }

    /// The post whose content should be rendered.
    ///
    /// A repost displays the referenced post; everything else displays itself.
    pub fn display(&self) -> &Post {
        match (&self.kind, &self.referenced) {
            (PostKind::Repost { .. }, Some(referenced)) => referenced,
            _ => self,
        }
    }
}

// =============================================================================
// Patch
// =============================================================================

/// Partial update merged into every occurrence of a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPatch {
    pub likes: Option<u64>,
    pub reposts: Option<u64>,
    pub replies: Option<u64>,
    pub is_liked: Option<bool>,
    pub is_reposted: Option<bool>,
    pub is_bookmarked: Option<bool>,
    pub moderation: Option<Moderation>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self == &PostPatch::default()
    }

    /// Produce the patched copy of `post`.
    ///
    /// The embedded referenced post is left untouched; the store rewires it.
    pub fn apply(&self, post: &Post) -> Post {
        let mut next = post.clone();
        if let Some(likes) = self.likes {
            next.counts.likes = likes;
        }
        if let Some(reposts) = self.reposts {
            next.counts.reposts = reposts;
        }
        if let Some(replies) = self.replies {
            next.counts.replies = replies;
        }
        if let Some(is_liked) = self.is_liked {
            next.flags.is_liked = is_liked;
        }
        if let Some(is_reposted) = self.is_reposted {
            next.flags.is_reposted = is_reposted;
        }
        if let Some(is_bookmarked) = self.is_bookmarked {
            next.flags.is_bookmarked = is_bookmarked;
        }
        if let Some(moderation) = self.moderation {
            next.moderation = moderation;
        }
        next
    }
}

// =============================================================================
// Collections
// =============================================================================

/// Server-paginated feed surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Home,
    Explore,
}

impl FeedKind {
    /// Path segment of the feed endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            FeedKind::Home => "feed",
            FeedKind::Explore => "explore",
        }
    }
}

/// Whole-collection profile tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileTab {
    Posts,
    Replies,
    Media,
    HumanArt,
    Likes,
}

impl ProfileTab {
    /// Path segment of the profile collection endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            ProfileTab::Posts => "posts",
            ProfileTab::Replies => "replies",
            ProfileTab::Media => "media",
            ProfileTab::HumanArt => "human-art",
            ProfileTab::Likes => "likes",
        }
    }
}

// =============================================================================
// Interactions
// =============================================================================

/// Toggle-style interaction on a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    Like,
    Repost,
    Bookmark,
}

/// Flag and counter an interaction controls, captured at one moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementSnapshot {
    pub active: bool,
    /// `None` for interactions without a public counter (bookmarks)
    pub count: Option<u64>,
}

impl EngagementSnapshot {
    /// The state after the user flips the interaction.
    pub fn toggled(&self) -> Self {
        let active = !self.active;
        let count = self.count.map(|count| {
            if active {
                count.saturating_add(1)
            } else {
                count.saturating_sub(1)
            }
        });
        Self { active, count }
    }
}

impl Interaction {
    /// Endpoint suffix and response flag key
    pub fn path(&self) -> &'static str {
        match self {
            Interaction::Like => "like",
            Interaction::Repost => "repost",
            Interaction::Bookmark => "bookmark",
        }
    }

    /// Name of the boolean the server returns
    pub fn response_flag(&self) -> &'static str {
        match self {
            Interaction::Like => "liked",
            Interaction::Repost => "reposted",
            Interaction::Bookmark => "bookmarked",
        }
    }

    /// Name of the optional authoritative counter in the response
    pub fn response_count(&self) -> Option<&'static str> {
        match self {
            Interaction::Like => Some("likes_count"),
            Interaction::Repost => Some("reposts_count"),
            Interaction::Bookmark => None,
        }
    }

    /// Message raised when the optimistic change is rolled back
    pub fn failure_message(&self) -> &'static str {
        match self {
            Interaction::Like => "Failed to update like",
            Interaction::Repost => "Failed to repost",
            Interaction::Bookmark => "Failed to update bookmark",
        }
    }

    /// Read the flag and counter this interaction controls.
    pub fn snapshot(&self, post: &Post) -> EngagementSnapshot {
        match self {
            Interaction::Like => EngagementSnapshot {
                active: post.flags.is_liked,
                count: Some(post.counts.likes),
            },
            Interaction::Repost => EngagementSnapshot {
                active: post.flags.is_reposted,
                count: Some(post.counts.reposts),
            },
            Interaction::Bookmark => EngagementSnapshot {
                active: post.flags.is_bookmarked,
                count: None,
            },
        }
    }

    /// Patch that writes `state` back into a post.
    pub fn patch(&self, state: EngagementSnapshot) -> PostPatch {
        match self {
            Interaction::Like => PostPatch {
                is_liked: Some(state.active),
                likes: state.count,
                ..PostPatch::default()
            },
            Interaction::Repost => PostPatch {
                is_reposted: Some(state.active),
                reposts: state.count,
                ..PostPatch::default()
            },
            Interaction::Bookmark => PostPatch {
                is_bookmarked: Some(state.active),
                ..PostPatch::default()
            },
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Draft of a post to be created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub content: String,
    pub images: Vec<String>,
    /// Parent post for replies
    pub parent_id: Option<PostId>,
    /// Quoted post
    pub quote_of: Option<PostId>,
    /// Idempotency token (ULID), sent once per draft
    #[serde(skip)]
    pub client_token: String,
}

impl NewPost {
    pub fn original(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            images: Vec::new(),
            parent_id: None,
            quote_of: None,
            client_token: ulid::Ulid::new().to_string(),
        }
    }

    pub fn reply(parent_id: PostId, content: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::original(content)
        }
    }
}
