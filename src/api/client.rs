//! REST client
//!
//! Implements `PostApi` with reqwest. Status codes are mapped onto
//! `AppError` so the service layer can tell transient failures from
//! validation and not-found responses.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::{Method, RequestBuilder, Response};

use super::converters::{feed_page_from_dto, post_from_dto, posts_from_values};
use super::dto::{CreatePostRequest, FeedPageDto, PostDto};
use super::{CollectionSource, FeedPage, FeedQuery, PostApi, ToggleResponse};
use crate::config::AppConfig;
use crate::data::{Interaction, NewPost, Post, PostId};
use crate::error::{AppError, Result};

/// reqwest-backed API client
#[derive(Clone)]
pub struct HttpPostApi {
    http_client: Arc<reqwest::Client>,
    base_url: url::Url,
    auth_token: Option<String>,
}

impl HttpPostApi {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client
    /// cannot be constructed
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.api.user_agent.clone())
            .timeout(config.api.request_timeout())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            http_client: Arc::new(http_client),
            base_url: config.base_url()?,
            auth_token: config.api.auth_token.clone(),
        })
    }

    /// Build a client around an existing reqwest client.
    pub fn with_client(
        http_client: Arc<reqwest::Client>,
        base_url: url::Url,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            http_client,
            base_url,
            auth_token,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url> {
        let path = segments
            .iter()
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid request path {path}: {e}")))
    }

    fn request(&self, method: Method, url: url::Url) -> RequestBuilder {
        let request = self.http_client.request(method, url);
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout
            } else {
                AppError::HttpClient(e)
            }
        })?;
        check_status(response).await
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await.map_err(AppError::HttpClient)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Map non-success statuses to errors
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound);
    }
    if status.is_server_error() {
        return Err(AppError::Server {
            status: status.as_u16(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = validation_message(&body)
        .unwrap_or_else(|| format!("Request rejected: HTTP {}", status.as_u16()));
    Err(AppError::Validation(message))
}

/// Pull a human-readable message out of a 4xx body
fn validation_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["detail", "error", "message"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }
    // field errors: {"content": ["This field may not be blank."]}
    value.as_object()?.iter().find_map(|(field, errors)| {
        let first = errors.as_array()?.first()?.as_str()?;
        Some(format!("{field}: {first}"))
    })
}

fn parse_toggle(interaction: Interaction, value: &serde_json::Value) -> Result<ToggleResponse> {
    let active = value
        .get(interaction.response_flag())
        .and_then(|v| v.as_bool())
        .ok_or_else(|| {
            AppError::MalformedResponse(format!(
                "toggle response lacks boolean {:?}",
                interaction.response_flag()
            ))
        })?;
    let count = interaction
        .response_count()
        .and_then(|key| value.get(key))
        .and_then(|v| v.as_u64());
    Ok(ToggleResponse { active, count })
}

#[async_trait]
impl PostApi for HttpPostApi {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage> {
        let mut url = self.url(&[query.kind.path()])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &query.page.to_string());
            if let Some(post_type) = &query.post_type {
                pairs.append_pair("post_type", post_type);
            }
            if query.following_only {
                pairs.append_pair("following_only", "true");
            }
        }

        tracing::debug!(url = %url, "Fetching feed page");
        let response = self.send(self.request(Method::GET, url)).await?;
        let dto: FeedPageDto = Self::json(response).await?;
        Ok(feed_page_from_dto(dto))
    }

    async fn fetch_post(&self, author: &str, id: &PostId) -> Result<Post> {
        let url = self.url(&["post", author, id.as_str()])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let dto: PostDto = Self::json(response).await?;
        post_from_dto(dto)
    }

    async fn fetch_post_by_id(&self, id: &PostId) -> Result<Post> {
        let url = self.url(&["post", "by-id", id.as_str()])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let dto: PostDto = Self::json(response).await?;
        post_from_dto(dto)
    }

    async fn toggle(
        &self,
        author: &str,
        id: &PostId,
        interaction: Interaction,
    ) -> Result<ToggleResponse> {
        let url = self.url(&["post", author, id.as_str(), interaction.path()])?;
        let response = self.send(self.request(Method::POST, url)).await?;
        let value: serde_json::Value = Self::json(response).await?;
        parse_toggle(interaction, &value)
    }

    async fn delete_post(&self, author: &str, id: &PostId) -> Result<()> {
        let url = self.url(&["post", author, id.as_str()])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn create_post(&self, draft: &NewPost) -> Result<Post> {
        let mut url = self.url(&["post"])?;
        // trailing slash: `post/`
        url.set_path(&format!("{}/", url.path().trim_end_matches('/')));

        let post_type = match (&draft.parent_id, &draft.quote_of) {
            (Some(_), _) => "reply",
            (None, Some(_)) => "quote",
            (None, None) => "original",
        };
        let body = CreatePostRequest {
            content: &draft.content,
            images: &draft.images,
            parent_post_id: draft.parent_id.as_ref().map(PostId::as_str),
            referenced_post_id: draft.quote_of.as_ref().map(PostId::as_str),
            post_type,
        };

        let request = self
            .request(Method::POST, url)
            .header("Idempotency-Key", draft.client_token.as_str())
            .json(&body);
        let response = self.send(request).await?;
        let dto: PostDto = Self::json(response).await?;
        post_from_dto(dto)
    }

    async fn fetch_collection(&self, source: &CollectionSource) -> Result<Vec<Post>> {
        let url = match source {
            CollectionSource::Profile { handle, tab } => {
                self.url(&["user", handle.as_str(), tab.path()])?
            }
            CollectionSource::Bookmarks => self.url(&["post", "bookmarks"])?,
        };

        tracing::debug!(url = %url, "Fetching collection");
        let response = self.send(self.request(Method::GET, url)).await?;
        let value: serde_json::Value = Self::json(response).await?;
        let values = match value {
            serde_json::Value::Array(values) => values,
            // tolerate a paginated envelope
            serde_json::Value::Object(mut map) => match map.remove("results") {
                Some(serde_json::Value::Array(values)) => values,
                _ => {
                    return Err(AppError::MalformedResponse(
                        "collection response is not an array".to_string(),
                    ));
                }
            },
            _ => {
                return Err(AppError::MalformedResponse(
                    "collection response is not an array".to_string(),
                ));
            }
        };
        Ok(posts_from_values(values))
    }
}
