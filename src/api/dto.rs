//! Wire types for the REST API
//!
//! These mirror the JSON the backend sends; `converters` turns them into
//! the domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Post as returned by every post-bearing endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostDto {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    pub author: AuthorDto,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default, deserialize_with = "opt_id_from_number_or_string")]
    pub parent_post_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_from_number_or_string")]
    pub referenced_post_id: Option<String>,
    #[serde(default)]
    pub referenced_post: Option<Box<PostDto>>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub reposts_count: u64,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_reposted: bool,
    #[serde(default)]
    pub is_bookmarked: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_removed: bool,
    #[serde(default = "default_true")]
    pub is_conversation_chain_valid: bool,
    #[serde(default)]
    pub conversation_chain: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Embedded author summary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthorDto {
    #[serde(alias = "handle")]
    pub username: String,
    pub display_name: Option<String>,
    #[serde(alias = "avatar_url")]
    pub profile_picture: Option<String>,
}

/// Paginated feed response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedPageDto {
    #[serde(default)]
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// Create request body
#[derive(Debug, Clone, Serialize)]
pub struct CreatePostRequest<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub images: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_post_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_post_id: Option<&'a str>,
    pub post_type: &'static str,
}

fn is_empty_slice(images: &&[String]) -> bool {
    images.is_empty()
}

fn default_post_type() -> String {
    "original".to_string()
}

fn default_true() -> bool {
    true
}

/// Render a JSON id (number or string) as text.
pub(crate) fn id_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    id_text(&value).ok_or_else(|| serde::de::Error::custom("id must be a string or number"))
}

fn opt_id_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => id_text(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("id must be a string or number")),
    }
}
