use std::time::Duration;

use clap::Args;

use crate::application::{EngineConfig, RetryPolicy};

/// Process configuration. Every field can be given as a flag or through the
/// environment variable named next to it.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Database URL (sqlite:<path> or postgres://...)
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:wallet.db?mode=rwc", global = true)]
    pub database_url: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0", global = true)]
    pub server_host: String,

    /// Port the HTTP server listens on
    #[arg(long, env = "SERVER_PORT", default_value_t = 8080, global = true)]
    pub server_port: u16,

    /// Upper bound on pooled database connections
    #[arg(long, env = "MAX_DB_CONNECTIONS", default_value_t = 50, global = true)]
    pub max_db_connections: u32,

    /// How long to wait for a pooled connection, or SQLite's writer lock (milliseconds)
    #[arg(long, env = "DB_ACQUIRE_TIMEOUT_MS", default_value_t = 3000, global = true)]
    pub db_acquire_timeout_ms: u64,

    /// Deadline for a single balance operation (milliseconds)
    #[arg(long, env = "OPERATION_TIMEOUT_MS", default_value_t = 5000, global = true)]
    pub operation_timeout_ms: u64,

    /// Attempts per operation when transactions conflict (1 disables retry)
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 3, global = true)]
    pub retry_attempts: u32,

    /// Initial backoff between conflicting attempts (milliseconds)
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 10, global = true)]
    pub retry_backoff_ms: u64,
}

impl Settings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.db_acquire_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
            retry: RetryPolicy::new(
                self.retry_attempts,
                Duration::from_millis(self.retry_backoff_ms),
            ),
        }
    }
}
