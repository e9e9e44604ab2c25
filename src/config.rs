//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    pub pagination: PaginationConfig,
    pub mutations: MutationConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API (e.g., "https://api.example.com/api/")
    pub base_url: String,
    /// Per-attempt timeout for feed requests in seconds (default: 15)
    pub request_timeout_secs: u64,
    /// Retries after the first attempt on transient failure (default: 2)
    pub max_retries: u32,
    /// Delay between retries in milliseconds (default: 500)
    pub retry_backoff_ms: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Optional bearer token for personalized feeds
    pub auth_token: Option<String>,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Default home feed query
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeedConfig {
    /// Restrict the feed to a post type (e.g., "original")
    pub post_type: Option<String>,
    /// Only include posts from followed accounts
    #[serde(default)]
    pub following_only: bool,
}

/// Pagination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Items served per window for whole-collection tabs (default: 20)
    pub window_size: usize,
    /// Synthetic delay before serving a cached window (default: 300)
    pub slice_delay_ms: u64,
    /// Minimum interval between scroll evaluations (default: 200)
    pub scroll_throttle_ms: u64,
}

impl PaginationConfig {
    pub fn slice_delay(&self) -> Duration {
        Duration::from_millis(self.slice_delay_ms)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            slice_delay_ms: 300,
            scroll_throttle_ms: 200,
        }
    }
}

/// Mutation coordinator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MutationConfig {
    /// Queue mutations on the same post so rollbacks restore the
    /// immediately preceding state (default: true)
    pub serialize_per_target: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            serialize_per_target: true,
        }
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Broadcast buffer size (default: 64)
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEEDSTORE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        Self::load_from(&["config/default", "config/local"])
    }

    /// Load configuration with explicit file stems instead of the default pair.
    pub fn load_from(files: &[&str]) -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            .set_default("api.request_timeout_secs", 15)?
            .set_default("api.max_retries", 2)?
            .set_default("api.retry_backoff_ms", 500)?
            .set_default("api.user_agent", "feedstore/0.1.0")?
            .set_default("feed.following_only", false)?
            .set_default("pagination.window_size", 20)?
            .set_default("pagination.slice_delay_ms", 300)?
            .set_default("pagination.scroll_throttle_ms", 200)?
            .set_default("mutations.serialize_per_target", true)?
            .set_default("notifications.channel_capacity", 64)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        for file in files {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("FEEDSTORE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Parsed API base URL, always ending with a slash so relative joins
    /// keep the path prefix.
    pub fn base_url(&self) -> Result<url::Url, crate::error::AppError> {
        let trimmed = self.api.base_url.trim();
        let with_slash = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        url::Url::parse(&with_slash).map_err(|e| {
            crate::error::AppError::Config(format!("api.base_url is not a valid URL: {e}"))
        })
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        let base_url = self.base_url()?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(crate::error::AppError::Config(
                "api.base_url must use http or https".to_string(),
            ));
        }

        if self.pagination.window_size == 0 {
            return Err(crate::error::AppError::Config(
                "pagination.window_size must be greater than 0".to_string(),
            ));
        }

        if self.notifications.channel_capacity == 0 {
            return Err(crate::error::AppError::Config(
                "notifications.channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.api.request_timeout_secs == 0 {
            tracing::warn!("api.request_timeout_secs=0 disables request timeouts");
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        api: ApiConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 15,
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
        mutations: MutationConfig::default(),
        notifications: NotificationConfig::default(),
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}
