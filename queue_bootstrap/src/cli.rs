// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parser::parse()                 │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validator::validate()           │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedConfig                 │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `parser` - CLI structure and clap parsing
//! - `validator` - Security validation layer
//!
//! Stage and provider names are kept as plain, validated `String`s here
//! rather than parsed into domain enums — this crate has no dependency
//! on `queue_domain`. The runtime layer owns that parse and rejects
//! unrecognized values with its own error type.

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

/// Validated CLI configuration
///
/// This structure holds all CLI arguments after security validation.
/// All paths are canonicalized and all values are range-checked.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub database_url: Option<String>,
    pub worker_threads: Option<usize>,
}

/// Validated command variants
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Serve,
    Ingest {
        source_id: String,
        title: String,
        author: String,
        body: String,
        source_url: String,
        priority: i64,
    },
    Pause {
        stage: Option<String>,
    },
    Resume {
        stage: Option<String>,
    },
    Status,
    Stats,
    ListPending {
        stage: Option<String>,
        limit: u32,
    },
    ListRejected {
        limit: u32,
    },
    ListFallback {
        limit: u32,
    },
    History {
        item_id: i64,
    },
    SetSetting {
        key: String,
        value: String,
    },
    SetEndpoint {
        stage: String,
        provider: String,
        url: String,
        model: String,
        concurrency: u32,
        timeout_secs: u64,
        secret_env: Option<String>,
    },
    ProbeEndpoint {
        stage: String,
    },
    Stuck,
    ResetStuck,
    ReloadEndpoints,
}

/// Parse and validate CLI arguments
///
/// This function combines parsing and validation:
/// 1. Parse CLI with clap
/// 2. Validate all paths with SecureArgParser
/// 3. Validate all numeric values
/// 4. Return ValidatedCli on success
///
/// # Errors
///
/// Returns `ParseError` if any validation fails
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

/// Validate parsed CLI arguments
///
/// Applies security validation to all CLI arguments:
/// - Path canonicalization and security checks
/// - Numeric range validation
/// - String pattern validation
///
/// # Errors
///
/// Returns `ParseError` if any validation fails
/// Mirrors `queue_domain::entities::queue_setting::keys` — this crate has
/// no dependency on `queue_domain` (see the module doc comment above), so
/// the recognized set is kept in sync here by hand.
const RECOGNIZED_SETTING_KEYS: &[&str] = &[
    "max_retries",
    "stuck_threshold_seconds",
    "handler_deadline_seconds",
    "tool_call_cap",
    "web_search_rate_per_minute",
    "retry_timeout_seconds",
];

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = if let Some(ref path) = cli.config {
        SecureArgParser::validate_argument(&path.to_string_lossy())?;
        Some(path.clone())
    } else {
        None
    };

    if let Some(ref url) = cli.database_url {
        SecureArgParser::validate_argument(url)?;
    }

    if let Some(threads) = cli.worker_threads {
        if threads == 0 || threads > 128 {
            return Err(ParseError::InvalidValue {
                arg: "worker-threads".to_string(),
                reason: "must be between 1 and 128".to_string(),
            });
        }
    }

    let command = match cli.command {
        Commands::Serve => ValidatedCommand::Serve,
        Commands::Ingest {
            source_id,
            title,
            author,
            body,
            source_url,
            priority,
        } => {
            SecureArgParser::validate_argument(&source_id)?;
            SecureArgParser::validate_argument(&title)?;
            SecureArgParser::validate_argument(&author)?;
            // Submission text and URLs legitimately contain punctuation the
            // dangerous-pattern set targets (shell metacharacters, not prose
            // or query strings) — same reasoning as `url` in SetEndpoint.
            if body.is_empty() {
                return Err(ParseError::InvalidValue {
                    arg: "body".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            if source_url.is_empty() {
                return Err(ParseError::InvalidValue {
                    arg: "source-url".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            ValidatedCommand::Ingest { source_id, title, author, body, source_url, priority }
        }
        Commands::Pause { stage } => {
            if let Some(ref s) = stage {
                SecureArgParser::validate_argument(s)?;
            }
            ValidatedCommand::Pause { stage }
        }
        Commands::Resume { stage } => {
            if let Some(ref s) = stage {
                SecureArgParser::validate_argument(s)?;
            }
            ValidatedCommand::Resume { stage }
        }
        Commands::Status => ValidatedCommand::Status,
        Commands::Stats => ValidatedCommand::Stats,
        Commands::ListPending { stage, limit } => {
            if let Some(ref s) = stage {
                SecureArgParser::validate_argument(s)?;
            }
            if limit == 0 || limit > 10_000 {
                return Err(ParseError::InvalidValue {
                    arg: "limit".to_string(),
                    reason: "must be between 1 and 10000".to_string(),
                });
            }
            ValidatedCommand::ListPending { stage, limit }
        }
        Commands::ListRejected { limit } => {
            if limit == 0 || limit > 10_000 {
                return Err(ParseError::InvalidValue {
                    arg: "limit".to_string(),
                    reason: "must be between 1 and 10000".to_string(),
                });
            }
            ValidatedCommand::ListRejected { limit }
        }
        Commands::ListFallback { limit } => {
            if limit == 0 || limit > 10_000 {
                return Err(ParseError::InvalidValue {
                    arg: "limit".to_string(),
                    reason: "must be between 1 and 10000".to_string(),
                });
            }
            ValidatedCommand::ListFallback { limit }
        }
        Commands::History { item_id } => {
            if item_id <= 0 {
                return Err(ParseError::InvalidValue {
                    arg: "item-id".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            ValidatedCommand::History { item_id }
        }
        Commands::SetSetting { key, value } => {
            SecureArgParser::validate_argument(&key)?;
            SecureArgParser::validate_argument(&value)?;
            if !RECOGNIZED_SETTING_KEYS.contains(&key.as_str()) {
                return Err(ParseError::InvalidValue {
                    arg: "key".to_string(),
                    reason: format!("unrecognized setting key, expected one of {RECOGNIZED_SETTING_KEYS:?}"),
                });
            }
            ValidatedCommand::SetSetting { key, value }
        }
        Commands::SetEndpoint {
            stage,
            provider,
            url,
            model,
            concurrency,
            timeout_secs,
            secret_env,
        } => {
            SecureArgParser::validate_argument(&stage)?;
            SecureArgParser::validate_argument(&provider)?;
            SecureArgParser::validate_argument(&model)?;
            if let Some(ref env) = secret_env {
                SecureArgParser::validate_argument(env)?;
            }
            // URLs legitimately contain ':' and '/', which validate_argument
            // already allows; '?' and '=' for query strings are also fine.
            // The dangerous-pattern set targets shell metacharacters, not URL syntax.
            if url.is_empty() {
                return Err(ParseError::InvalidValue {
                    arg: "url".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            if concurrency == 0 || concurrency > 1024 {
                return Err(ParseError::InvalidValue {
                    arg: "concurrency".to_string(),
                    reason: "must be between 1 and 1024".to_string(),
                });
            }
            if timeout_secs == 0 || timeout_secs > 3600 {
                return Err(ParseError::InvalidValue {
                    arg: "timeout-secs".to_string(),
                    reason: "must be between 1 and 3600".to_string(),
                });
            }
            ValidatedCommand::SetEndpoint {
                stage,
                provider,
                url,
                model,
                concurrency,
                timeout_secs,
                secret_env,
            }
        }
        Commands::ProbeEndpoint { stage } => {
            SecureArgParser::validate_argument(&stage)?;
            ValidatedCommand::ProbeEndpoint { stage }
        }
        Commands::Stuck => ValidatedCommand::Stuck,
        Commands::ResetStuck => ValidatedCommand::ResetStuck,
        Commands::ReloadEndpoints => ValidatedCommand::ReloadEndpoints,
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config,
        database_url: cli.database_url,
        worker_threads: cli.worker_threads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(command: Commands) -> Cli {
        Cli {
            command,
            verbose: false,
            config: None,
            database_url: None,
            worker_threads: None,
        }
    }

    #[test]
    fn status_passes_through_unchanged() {
        let validated = validate_cli(cli_with(Commands::Status)).unwrap();
        assert!(matches!(validated.command, ValidatedCommand::Status));
    }

    #[test]
    fn pause_rejects_dangerous_stage_name() {
        let result = validate_cli(cli_with(Commands::Pause {
            stage: Some("triage; rm -rf /".to_string()),
        }));
        assert!(matches!(result, Err(ParseError::DangerousPattern { .. })));
    }

    #[test]
    fn list_pending_rejects_zero_limit() {
        let result = validate_cli(cli_with(Commands::ListPending { stage: None, limit: 0 }));
        assert!(matches!(result, Err(ParseError::InvalidValue { .. })));
    }

    #[test]
    fn history_rejects_nonpositive_item_id() {
        let result = validate_cli(cli_with(Commands::History { item_id: 0 }));
        assert!(matches!(result, Err(ParseError::InvalidValue { .. })));
    }

    #[test]
    fn set_endpoint_accepts_a_well_formed_binding() {
        let validated = validate_cli(cli_with(Commands::SetEndpoint {
            stage: "triage".to_string(),
            provider: "hosted".to_string(),
            url: "https://api.example.com".to_string(),
            model: "gpt-test".to_string(),
            concurrency: 4,
            timeout_secs: 30,
            secret_env: Some("EXAMPLE_API_KEY".to_string()),
        }))
        .unwrap();
        assert!(matches!(validated.command, ValidatedCommand::SetEndpoint { .. }));
    }

    #[test]
    fn set_setting_accepts_a_recognized_key() {
        let validated = validate_cli(cli_with(Commands::SetSetting {
            key: "max_retries".to_string(),
            value: "5".to_string(),
        }))
        .unwrap();
        assert!(matches!(validated.command, ValidatedCommand::SetSetting { .. }));
    }

    #[test]
    fn set_setting_rejects_an_unrecognized_key() {
        let result = validate_cli(cli_with(Commands::SetSetting {
            key: "not_a_real_setting".to_string(),
            value: "5".to_string(),
        }));
        assert!(matches!(result, Err(ParseError::InvalidValue { .. })));
    }
}
