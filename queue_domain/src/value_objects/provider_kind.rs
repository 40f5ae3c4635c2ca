// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Endpoint provider classification, used by the registry to pick a wire
//! adapter and by the CLI's `set-endpoint`/`probe-endpoint` commands.

use serde::{Deserialize, Serialize};

/// Which wire protocol an `EndpointBinding` speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// A self-hosted or third-party endpoint speaking the custom
    /// chat-completions-style protocol described in the external
    /// interfaces section.
    Custom,
    /// A named hosted provider (OpenAI-compatible, Anthropic-compatible)
    /// whose request/response shape the client already knows.
    Hosted,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Custom => "custom",
            ProviderKind::Hosted => "hosted",
        }
    }

    pub fn parse(s: &str) -> Option<ProviderKind> {
        match s {
            "custom" => Some(ProviderKind::Custom),
            "hosted" => Some(ProviderKind::Hosted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
