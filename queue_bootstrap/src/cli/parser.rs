// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Parser
//!
//! Command-line interface parsing using clap.
//!
//! This module defines the CLI structure and handles argument parsing.
//! Security validation happens in the validator module after parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser, Debug, Clone)]
#[command(name = "queue-orchestrator")]
#[command(about = concat!("Content analysis queue orchestrator v", env!("CARGO_PKG_VERSION")))]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the sqlx database connection string
    #[arg(long)]
    pub database_url: Option<String>,

    /// Override worker thread count for the tokio runtime
    #[arg(long)]
    pub worker_threads: Option<usize>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the orchestrator: poll every stage, dispatch to bound
    /// endpoints, and sweep for stuck/retry-exhausted items until a
    /// shutdown signal arrives.
    Serve,

    /// Ingest one submission at triage/pending. Re-ingesting the same
    /// source id is a no-op.
    Ingest {
        /// Globally-unique id from the originating platform
        #[arg(long)]
        source_id: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        author: String,

        #[arg(long)]
        body: String,

        #[arg(long)]
        source_url: String,

        /// Priority tier, higher claims first (default 5)
        #[arg(long, default_value = "5")]
        priority: i64,
    },

    /// Pause claiming for a stage, or every stage if none is given
    Pause {
        /// Stage to pause (triage, research, response, editorial,
        /// post-queue); omit to pause all stages
        stage: Option<String>,
    },

    /// Resume claiming for a stage, or every stage if none is given
    Resume {
        /// Stage to resume; omit to resume all stages
        stage: Option<String>,
    },

    /// Show per-stage item counts and pause state
    Status,

    /// Show aggregate throughput and fallback counters
    Stats,

    /// List pending items, optionally filtered to one stage
    ListPending {
        /// Restrict to a single stage
        #[arg(long)]
        stage: Option<String>,

        /// Maximum rows to return
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// List items in the terminal rejected state
    ListRejected {
        /// Maximum rows to return
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// List items routed to human review via fallback
    ListFallback {
        /// Maximum rows to return
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Show the full stage-artifact history for one item
    History {
        /// Item id
        item_id: i64,
    },

    /// Update an operator-tunable setting (max-retries,
    /// stuck-threshold-seconds, handler-deadline-seconds,
    /// tool-call-cap, web-search-rate-per-minute,
    /// retry-timeout-seconds)
    SetSetting {
        /// Setting key
        key: String,

        /// New value
        value: String,
    },

    /// Bind a stage to a remote endpoint
    SetEndpoint {
        /// Stage to bind (triage, research, response, editorial,
        /// post-queue)
        stage: String,

        /// Provider kind: hosted or custom
        #[arg(long)]
        provider: String,

        /// Base URL the handler will call
        #[arg(long)]
        url: String,

        /// Model identifier sent in each request
        #[arg(long)]
        model: String,

        /// Per-stage concurrent attempt cap
        #[arg(long, default_value = "4")]
        concurrency: u32,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        /// Name of the environment variable holding the bearer secret,
        /// for hosted providers
        #[arg(long)]
        secret_env: Option<String>,
    },

    /// Probe a stage's bound endpoint without running a full attempt
    ProbeEndpoint {
        /// Stage to probe
        stage: String,
    },

    /// Report claims that have been stuck past the configured threshold
    Stuck,

    /// Return stuck claims to pending so they can be claimed again
    ResetStuck,

    /// Re-read every endpoint binding from the store
    ReloadEndpoints,
}

/// Parse CLI arguments
///
/// This is the entry point for CLI parsing. It uses clap to parse
/// arguments and returns the parsed CLI structure.
///
/// # Panics
///
/// Clap will exit the process with appropriate error message if parsing fails
pub fn parse_cli() -> Cli {
    Cli::parse()
}
