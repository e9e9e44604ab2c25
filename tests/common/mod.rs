//! Common test utilities for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use feedstore::api::{CollectionSource, FeedPage, FeedQuery, PostApi, ToggleResponse};
use feedstore::config::{
    ApiConfig, AppConfig, FeedConfig, LoggingConfig, MutationConfig, NotificationConfig,
    PaginationConfig,
};
use feedstore::data::{
    Counts, Flags, Interaction, Moderation, NewPost, Post, PostId, PostKind, UserRef,
};
use feedstore::error::{AppError, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;

// =============================================================================
// Configuration and builders
// =============================================================================

/// Configuration with no backoff and no synthetic slice delay
pub fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        api: ApiConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 5,
            max_retries: 2,
            retry_backoff_ms: 0,
            user_agent: "feedstore-test".to_string(),
            auth_token: None,
        },
        feed: FeedConfig::default(),
        pagination: PaginationConfig {
            window_size: 20,
            slice_delay_ms: 0,
            scroll_throttle_ms: 200,
        },
        mutations: MutationConfig {
            serialize_per_target: true,
        },
        notifications: NotificationConfig {
            channel_capacity: 64,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

pub fn post(id: impl Into<String>, author: &str, likes: u64) -> Post {
    Post {
        id: PostId::new(id),
        author: UserRef::new(author),
        content: "hello".to_string(),
        images: Vec::new(),
        kind: PostKind::Original,
        counts: Counts {
            likes,
            reposts: 0,
            replies: 0,
        },
        flags: Flags::default(),
        moderation: Moderation::default(),
        conversation_chain: Vec::new(),
        created_at: Utc::now(),
        referenced: None,
    }
}

pub fn repost(id: impl Into<String>, author: &str, of: &Post) -> Post {
    Post {
        kind: PostKind::Repost { of: of.id.clone() },
        referenced: Some(Arc::new(of.clone())),
        ..post(id, author, 0)
    }
}

pub fn page(results: Vec<Post>, has_next: bool) -> FeedPage {
    FeedPage {
        count: results.len() as u64,
        next: has_next.then(|| "next".to_string()),
        previous: None,
        results,
    }
}

// =============================================================================
// Fake API
// =============================================================================

#[derive(Default)]
struct FakeState {
    pages: HashMap<u32, Result<FeedPage>>,
    collections: HashMap<CollectionSource, Vec<Post>>,
    toggle_failures: HashSet<(PostId, Interaction)>,
    toggle_log: Vec<(PostId, Interaction)>,
    engagement: HashMap<(PostId, Interaction), bool>,
}

impl FakeState {
    fn find(&self, id: &PostId) -> Option<&Post> {
        self.pages
            .values()
            .filter_map(|result| result.as_ref().ok())
            .flat_map(|page| page.results.iter())
            .chain(self.collections.values().flatten())
            .find(|post| &post.id == id)
    }

    /// Server-side state before the first toggle, taken from scripted posts
    fn initial_flag(&self, id: &PostId, interaction: Interaction) -> bool {
        self.find(id).is_some_and(|post| match interaction {
            Interaction::Like => post.flags.is_liked,
            Interaction::Repost => post.flags.is_reposted,
            Interaction::Bookmark => post.flags.is_bookmarked,
        })
    }
}

/// Scriptable in-memory `PostApi`
#[derive(Default)]
pub struct FakePostApi {
    state: Mutex<FakeState>,
    feed_calls: AtomicUsize,
    collection_calls: AtomicUsize,
    toggle_calls: AtomicUsize,
    toggle_delay: Mutex<Option<Duration>>,
}

impl FakePostApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_page(&self, number: u32, result: Result<FeedPage>) {
        self.state.lock().pages.insert(number, result);
    }

    pub fn set_collection(&self, source: CollectionSource, posts: Vec<Post>) {
        self.state.lock().collections.insert(source, posts);
    }

    pub fn fail_toggle(&self, id: &PostId, interaction: Interaction) {
        self.state
            .lock()
            .toggle_failures
            .insert((id.clone(), interaction));
    }

    pub fn delay_toggles(&self, delay: Duration) {
        *self.toggle_delay.lock() = Some(delay);
    }

    pub fn feed_calls(&self) -> usize {
        self.feed_calls.load(Ordering::SeqCst)
    }

    pub fn collection_calls(&self) -> usize {
        self.collection_calls.load(Ordering::SeqCst)
    }

    pub fn toggle_calls(&self) -> usize {
        self.toggle_calls.load(Ordering::SeqCst)
    }

    pub fn toggle_log(&self) -> Vec<(PostId, Interaction)> {
        self.state.lock().toggle_log.clone()
    }
}

fn clone_result<T: Clone>(result: &Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(AppError::NotFound) => Err(AppError::NotFound),
        Err(AppError::Timeout) => Err(AppError::Timeout),
        Err(AppError::Server { status }) => Err(AppError::Server { status: *status }),
        Err(other) => Err(AppError::Validation(other.to_string())),
    }
}

#[async_trait]
impl PostApi for FakePostApi {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let state = self.state.lock();
        match state.pages.get(&query.page) {
            Some(result) => clone_result(result),
            None => Ok(page(Vec::new(), false)),
        }
    }

    async fn fetch_post(&self, _author: &str, id: &PostId) -> Result<Post> {
        self.fetch_post_by_id(id).await
    }

    async fn fetch_post_by_id(&self, id: &PostId) -> Result<Post> {
        self.state
            .lock()
            .find(id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn toggle(
        &self,
        _author: &str,
        id: &PostId,
        interaction: Interaction,
    ) -> Result<ToggleResponse> {
        self.toggle_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().toggle_log.push((id.clone(), interaction));

        let delay = *self.toggle_delay.lock();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let mut state = self.state.lock();
        if state.toggle_failures.contains(&(id.clone(), interaction)) {
            return Err(AppError::Server { status: 500 });
        }
        let seeded = state.initial_flag(id, interaction);
        let active = state
            .engagement
            .entry((id.clone(), interaction))
            .or_insert(seeded);
        *active = !*active;
        Ok(ToggleResponse {
            active: *active,
            count: None,
        })
    }

    async fn delete_post(&self, _author: &str, _id: &PostId) -> Result<()> {
        Ok(())
    }

    async fn create_post(&self, draft: &NewPost) -> Result<Post> {
        let mut created = post(format!("new-{}", draft.client_token), "me", 0);
        created.content = draft.content.clone();
        if let Some(parent) = &draft.parent_id {
            created.kind = PostKind::Reply {
                parent: parent.clone(),
            };
        }
        Ok(created)
    }

    async fn fetch_collection(&self, source: &CollectionSource) -> Result<Vec<Post>> {
        self.collection_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self
            .state
            .lock()
            .collections
            .get(source)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Stub HTTP backend
// =============================================================================

/// Route state of the stub backend
#[derive(Clone, Default)]
pub struct StubState {
    /// Responses served by `GET /api/feed`, popped front to back; the last
    /// one repeats
    pub feed_responses: Arc<Mutex<Vec<(u16, serde_json::Value)>>>,
    pub toggle_response: Arc<Mutex<(u16, serde_json::Value)>>,
    pub collection: Arc<Mutex<serde_json::Value>>,
    pub hits: Arc<AtomicUsize>,
    pub last_query: Arc<Mutex<Option<String>>>,
    pub last_auth: Arc<Mutex<Option<String>>>,
}

/// axum server standing in for the REST backend
pub struct StubServer {
    pub addr: String,
    pub state: StubState,
}

impl StubServer {
    pub async fn new() -> Self {
        use axum::Router;
        use axum::routing::{get, post};

        let state = StubState::default();
        *state.toggle_response.lock() = (200, serde_json::json!({"liked": true}));
        *state.collection.lock() = serde_json::json!([]);

        let app = Router::new()
            .route("/api/feed", get(feed_handler))
            .route("/api/explore", get(feed_handler))
            .route("/api/post/:author/:id", get(post_handler))
            .route("/api/post/:author/:id/:action", post(toggle_handler))
            .route("/api/user/:handle/:tab", get(collection_handler))
            .with_state(state.clone());

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}/api/", addr),
            state,
        }
    }

    pub fn push_feed(&self, status: u16, body: serde_json::Value) {
        self.state.feed_responses.lock().push((status, body));
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

type StubResponse = (axum::http::StatusCode, axum::Json<serde_json::Value>);

fn respond(status: u16, body: serde_json::Value) -> StubResponse {
    (
        axum::http::StatusCode::from_u16(status).unwrap(),
        axum::Json(body),
    )
}

async fn feed_handler(
    axum::extract::State(state): axum::extract::State<StubState>,
    axum::extract::RawQuery(query): axum::extract::RawQuery,
    headers: axum::http::HeaderMap,
) -> StubResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_query.lock() = query;
    *state.last_auth.lock() = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut responses = state.feed_responses.lock();
    let (status, body) = if responses.len() > 1 {
        responses.remove(0)
    } else {
        responses
            .first()
            .cloned()
            .unwrap_or((200, serde_json::json!({"count": 0, "next": null, "previous": null, "results": []})))
    };
    respond(status, body)
}

async fn post_handler(
    axum::extract::State(state): axum::extract::State<StubState>,
    axum::extract::Path((author, id)): axum::extract::Path<(String, String)>,
) -> StubResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if id == "missing" {
        return respond(404, serde_json::json!({"detail": "Not found."}));
    }
    respond(200, post_json(&id, &author, 3))
}

async fn toggle_handler(
    axum::extract::State(state): axum::extract::State<StubState>,
    axum::extract::Path((_author, _id, _action)): axum::extract::Path<(String, String, String)>,
) -> StubResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let (status, body) = state.toggle_response.lock().clone();
    respond(status, body)
}

async fn collection_handler(
    axum::extract::State(state): axum::extract::State<StubState>,
    axum::extract::Path((_handle, _tab)): axum::extract::Path<(String, String)>,
) -> StubResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    respond(200, state.collection.lock().clone())
}

/// JSON post as the backend sends it
pub fn post_json(id: &str, author: &str, likes: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id.parse::<u64>().map(serde_json::Value::from).unwrap_or_else(|_| id.into()),
        "author": {"username": author, "display_name": null, "profile_picture": null},
        "content": format!("post {id}"),
        "images": [],
        "post_type": "original",
        "likes_count": likes,
        "reposts_count": 0,
        "replies_count": 0,
        "is_liked": false,
        "is_reposted": false,
        "is_bookmarked": false,
        "is_deleted": false,
        "is_removed": false,
        "is_conversation_chain_valid": true,
        "conversation_chain": [],
        "created_at": "2024-05-01T12:00:00Z"
    })
}

pub fn feed_json(results: Vec<serde_json::Value>, next: bool) -> serde_json::Value {
    serde_json::json!({
        "count": results.len(),
        "next": if next { serde_json::Value::from("http://stub/api/feed?page=2") } else { serde_json::Value::Null },
        "previous": null,
        "results": results,
    })
}
