// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Process-level configuration: where the database lives, how verbose
//! logging is, and the defaults the worker pool starts with before it
//! has read the `settings` table for the first time.

use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// sqlx connection string, e.g. `sqlite://./queue.db`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// `tracing` filter directive, e.g. `info` or `queue_runtime=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long a stage worker sleeps after an empty claim before
    /// polling again.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often the recovery manager sweeps for stuck claims and
    /// retry-exhausted items.
    #[serde(default = "default_recovery_interval_seconds")]
    pub recovery_interval_seconds: u64,

    /// Items claimed per stage per poll, before the per-stage
    /// concurrency cap throttles how many run at once.
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: u32,

    /// Base URL of the external web-search provider the `web_search`
    /// tool calls out to.
    #[serde(default = "default_search_provider_url")]
    pub search_provider_url: String,

    /// Name of the environment variable holding the search provider's
    /// API key; resolved at call time, never cached.
    #[serde(default = "default_search_provider_api_key_env")]
    pub search_provider_api_key_env: String,
}

fn default_database_url() -> String {
    "sqlite://./queue-orchestrator.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_recovery_interval_seconds() -> u64 {
    30
}

fn default_claim_batch_size() -> u32 {
    16
}

fn default_search_provider_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_string()
}

fn default_search_provider_api_key_env() -> String {
    "BRAVE_API_KEY".to_string()
}

impl AppConfig {
    /// Load configuration from built-in defaults, an optional
    /// `queue-orchestrator` config file in the working directory, and
    /// `QUEUE_`-prefixed environment variables, in that precedence
    /// order.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("queue-orchestrator").required(false))
            .add_source(Environment::with_prefix("QUEUE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            log_level: default_log_level(),
            poll_interval_ms: default_poll_interval_ms(),
            recovery_interval_seconds: default_recovery_interval_seconds(),
            claim_batch_size: default_claim_batch_size(),
            search_provider_url: default_search_provider_url(),
            search_provider_api_key_env: default_search_provider_api_key_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_falls_back_to_defaults_with_no_file_or_env() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.claim_batch_size, 16);
    }
}
