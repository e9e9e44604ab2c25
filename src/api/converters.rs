//! Conversion from wire DTOs to the domain model

use std::sync::Arc;

use super::dto::{id_text, FeedPageDto, PostDto};
use super::FeedPage;
use crate::data::{Counts, Flags, Moderation, Post, PostId, PostKind, UserRef};
use crate::error::AppError;

/// Convert a post DTO, including its embedded referenced post
///
/// # Errors
/// Returns `AppError::MalformedResponse` when the post type is unknown or a
/// repost/quote/reply lacks the id it depends on.
pub fn post_from_dto(dto: PostDto) -> Result<Post, AppError> {
    let referenced = match dto.referenced_post {
        Some(inner) => Some(Arc::new(post_from_dto(*inner)?)),
        None => None,
    };

    let conversation_chain: Vec<PostId> = dto
        .conversation_chain
        .iter()
        .filter_map(|entry| match entry {
            serde_json::Value::Object(map) => map.get("id").and_then(id_text),
            other => id_text(other),
        })
        .map(PostId)
        .collect();

    let referenced_id = dto
        .referenced_post_id
        .map(PostId)
        .or_else(|| referenced.as_ref().map(|post| post.id.clone()));

    let kind = match dto.post_type.to_ascii_lowercase().as_str() {
        "original" | "post" => PostKind::Original,
        "reply" => {
            let parent = dto
                .parent_post_id
                .map(PostId)
                .or_else(|| conversation_chain.last().cloned())
                .ok_or_else(|| {
                    AppError::MalformedResponse(format!("reply {} has no parent id", dto.id))
                })?;
            PostKind::Reply { parent }
        }
        "repost" => PostKind::Repost {
            of: referenced_id.ok_or_else(|| {
                AppError::MalformedResponse(format!("repost {} has no referenced post", dto.id))
            })?,
        },
        "quote" => PostKind::Quote {
            of: referenced_id.ok_or_else(|| {
                AppError::MalformedResponse(format!("quote {} has no referenced post", dto.id))
            })?,
        },
        other => {
            return Err(AppError::MalformedResponse(format!(
                "post {} has unknown post_type {other:?}",
                dto.id
            )));
        }
    };

    Ok(Post {
        id: PostId(dto.id),
        author: UserRef {
            handle: dto.author.username,
            display_name: dto.author.display_name,
            avatar_url: dto.author.profile_picture,
        },
        content: dto.content,
        images: dto.images,
        kind,
        counts: Counts {
            likes: dto.likes_count,
            reposts: dto.reposts_count,
            replies: dto.replies_count,
        },
        flags: Flags {
            is_liked: dto.is_liked,
            is_reposted: dto.is_reposted,
            is_bookmarked: dto.is_bookmarked,
        },
        moderation: Moderation {
            is_deleted: dto.is_deleted,
            is_removed: dto.is_removed,
            is_conversation_chain_valid: dto.is_conversation_chain_valid,
        },
        conversation_chain,
        created_at: dto.created_at,
        referenced,
    })
}

/// Convert a list of raw JSON posts, skipping entries that fail to decode
///
/// A single bad entry must not take down the whole page.
pub fn posts_from_values(values: Vec<serde_json::Value>) -> Vec<Post> {
    values
        .into_iter()
        .filter_map(|value| {
            let converted = serde_json::from_value::<PostDto>(value)
                .map_err(AppError::from)
                .and_then(post_from_dto);
            match converted {
                Ok(post) => Some(post),
                Err(error) => {
                    tracing::warn!(%error, "Skipping malformed post in response");
                    None
                }
            }
        })
        .collect()
}

/// Convert a feed page
pub fn feed_page_from_dto(dto: FeedPageDto) -> FeedPage {
    FeedPage {
        count: dto.count,
        next: dto.next,
        previous: dto.previous,
        results: posts_from_values(dto.results),
    }
}
