// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Endpoint Binding
//!
//! Operator-managed configuration mapping a stage to the remote endpoint
//! that handles it. Bindings are read fresh at the head of each worker
//! loop iteration (never cached across an attempt), and secrets are never
//! stored on the binding itself — only an environment variable name to
//! resolve at call time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ProviderKind, Stage};

/// Which remote endpoint handles a given stage, and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointBinding {
    pub stage: Stage,
    pub provider: ProviderKind,
    pub url: String,
    /// Model identifier sent in the `model` field of every request.
    pub model: String,
    /// Per-call request timeout; the worker pool adds a small fixed
    /// grace period on top of this when enforcing its hard deadline.
    pub timeout: Duration,
    /// Name of the environment variable holding the bearer secret;
    /// resolved at call time, never persisted or cached.
    pub secret_env_var: Option<String>,
    /// Maximum concurrent in-flight handler invocations for this stage.
    pub concurrency_cap: u32,
    pub updated_at: DateTime<Utc>,
}

impl EndpointBinding {
    /// Resolve the bearer secret from the environment, if one is
    /// configured for this binding. Intentionally does not cache the
    /// result: secrets can rotate without a process restart.
    pub fn resolve_secret(&self) -> Option<String> {
        self.secret_env_var.as_ref().and_then(|var| std::env::var(var).ok())
    }
}
