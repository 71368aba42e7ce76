// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Centralized collaboration server for concurrent scene graph editors.
#[derive(Debug, Clone, Parser)]
#[command(name = "scenehub", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "SCENEHUB_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP/WebSocket port to listen on.
    #[arg(long, env = "SCENEHUB_PORT", default_value_t = 7420)]
    pub port: u16,

    /// Directory holding per-session event logs and snapshots.
    #[arg(long, env = "SCENEHUB_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Bearer token required on HTTP requests and `/ws` connections.
    /// No auth is enforced when unset.
    #[arg(long, env = "SCENEHUB_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Maximum number of sessions live at once.
    #[arg(long, env = "SCENEHUB_GLOBAL_SESSION_CAP", default_value_t = 20)]
    pub global_session_cap: usize,

    /// Maximum number of distinct users in a single session.
    #[arg(long, env = "SCENEHUB_SESSION_USER_CAP", default_value_t = 10)]
    pub session_user_cap: usize,

    /// Per-connection egress queue capacity before a recipient is dropped
    /// with `OVERLOADED`.
    #[arg(long, env = "SCENEHUB_EGRESS_QUEUE_CAPACITY", default_value_t = 1024)]
    pub egress_queue_capacity: usize,

    /// Maximum inbound messages per second, per connection.
    #[arg(long, env = "SCENEHUB_MESSAGE_RATE_LIMIT", default_value_t = 100)]
    pub message_rate_limit: u32,

    /// Number of durable commands between event log compactions.
    #[arg(long, env = "SCENEHUB_COMPACTION_THRESHOLD", default_value_t = 1_000)]
    pub compaction_threshold: u64,

    /// Interval between server-initiated WebSocket pings, in seconds.
    #[arg(long, env = "SCENEHUB_PING_INTERVAL_SECS", default_value_t = 120)]
    pub ping_interval_secs: u64,

    /// How long to wait for a pong before closing a connection, in seconds.
    #[arg(long, env = "SCENEHUB_PONG_TIMEOUT_SECS", default_value_t = 30)]
    pub pong_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "SCENEHUB_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SCENEHUB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.global_session_cap == 0 {
            anyhow::bail!("--global-session-cap must be at least 1");
        }
        if self.session_user_cap == 0 {
            anyhow::bail!("--session-user-cap must be at least 1");
        }
        if self.egress_queue_capacity == 0 {
            anyhow::bail!("--egress-queue-capacity must be at least 1");
        }
        if self.message_rate_limit == 0 {
            anyhow::bail!("--message-rate-limit must be at least 1");
        }
        if self.compaction_threshold == 0 {
            anyhow::bail!("--compaction-threshold must be at least 1");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
