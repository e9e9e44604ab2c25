//! feedstore binary entry point

use feedstore::{FeedClient, config, data::FeedKind, service::LoadOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize metrics
/// 4. Build FeedClient
/// 5. Load the first home feed page and report it
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    tracing::info!("Starting feedstore...");
    tracing::info!(
        base_url = %config.api.base_url,
        window_size = config.pagination.window_size,
        "Configuration loaded"
    );

    // 3. Initialize metrics
    feedstore::metrics::init_metrics();

    // 4. Build client
    let client = FeedClient::new(config)?;

    // Surface notifications in the log
    let mut notifications = client.notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            tracing::info!(
                level = notification.level.as_str(),
                message = %notification.message,
                "Notification"
            );
        }
    });

    // 5. Load the first page
    let pager = client.feed_pager(client.feed_query(FeedKind::Home));
    let outcome = pager.load_more().await;
    let window = pager.window();

    match outcome {
        LoadOutcome::Loaded { added } => {
            tracing::info!(
                added,
                has_more = window.has_more,
                next_page = window.page,
                "Home feed loaded"
            );
            for post in window.items.iter() {
                let shown = post.display();
                tracing::info!(
                    post_id = %post.id,
                    kind = post.kind.as_str(),
                    author = %shown.author.handle,
                    likes = shown.counts.likes,
                    reposts = shown.counts.reposts,
                    replies = shown.counts.replies,
                    "Post"
                );
            }
        }
        other => tracing::warn!(outcome = ?other, "Home feed did not load"),
    }

    tracing::debug!(metrics = %feedstore::metrics::render(), "Metrics snapshot");
    Ok(())
}

/// RUST_LOG takes precedence over the configured level
fn init_tracing(logging: &config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("feedstore={}", logging.level).into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
