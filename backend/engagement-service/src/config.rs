/// Configuration management for Engagement Service
///
/// Loads configuration from environment variables (a `.env` file is read first
/// when present).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration; `None` runs against the in-memory repository
    pub database: Option<DatabaseConfig>,
    /// Engagement rules and lock bounds
    pub engagement: EngagementConfig,
    /// Real-time fan-out settings
    pub notifier: NotifierConfig,
    /// Bearer token verification
    pub auth: AuthConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port (REST + WebSocket)
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Upper bound on waiting for a story row lock
    pub lock_timeout_ms: u64,
    pub max_comment_chars: usize,
    pub max_tip_message_chars: usize,
    pub max_tip_amount_cents: i64,
    /// Counter reconciliation period; 0 disables the worker
    pub reconcile_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Per-connection queue capacity before events are dropped
    pub subscriber_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer
    #[serde(skip_serializing)]
    pub jwt_secret: String,
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2000,
            max_comment_chars: 2000,
            max_tip_message_chars: 500,
            max_tip_amount_cents: 1_000_000,
            reconcile_interval_secs: 3600,
        }
    }
}

impl EngagementConfig {
    /// Never zero: PostgreSQL reads `lock_timeout = 0` as "wait forever"
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.max(1))
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 64,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8080),
        };

        let database = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| DatabaseConfig {
                url,
                max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections()),
                min_connections: env_or("DB_MIN_CONNECTIONS", default_min_connections()),
            });

        let defaults = EngagementConfig::default();
        let engagement = EngagementConfig {
            lock_timeout_ms: env_or("LOCK_TIMEOUT_MS", defaults.lock_timeout_ms).max(1),
            max_comment_chars: env_or("MAX_COMMENT_CHARS", defaults.max_comment_chars),
            max_tip_message_chars: env_or("MAX_TIP_MESSAGE_CHARS", defaults.max_tip_message_chars),
            max_tip_amount_cents: env_or("MAX_TIP_AMOUNT_CENTS", defaults.max_tip_amount_cents),
            reconcile_interval_secs: env_or(
                "RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            ),
        };

        let notifier = NotifierConfig {
            subscriber_queue_capacity: env_or(
                "WS_QUEUE_CAPACITY",
                NotifierConfig::default().subscriber_queue_capacity,
            )
            .max(1),
        };

        let auth = AuthConfig {
            jwt_secret: std::env::var("JWT_SECRET")
                .context("JWT_SECRET environment variable not set")?,
        };

        Ok(Config {
            app,
            database,
            engagement,
            notifier,
            auth,
        })
    }
}
