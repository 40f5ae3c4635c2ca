// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Closed fallback reason taxonomy. Kept closed (rather than a free-form
//! string) so operator tooling and alerting can match on it reliably; the
//! accompanying `detail` field on `FallbackRecord` carries whatever
//! free-form context a specific failure adds.

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The endpoint could not be reached at all (DNS, connection refused,
    /// TLS handshake failure).
    EndpointUnreachable,
    /// The handler's configured deadline elapsed with no directive.
    DeadlineExceeded,
    /// The endpoint responded with a 5xx status.
    Endpoint5xx,
    /// The response did not conform to the expected wire protocol.
    ModelProtocolError,
    /// The `web_search` tool's rate limit was hit repeatedly enough to
    /// exhaust the stage's retry budget.
    ToolRateLimited,
    /// The stage's retry budget was exhausted for reasons not captured
    /// by a more specific variant above.
    RetryExhausted,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::EndpointUnreachable => "endpoint_unreachable",
            FallbackReason::DeadlineExceeded => "deadline_exceeded",
            FallbackReason::Endpoint5xx => "endpoint_5xx",
            FallbackReason::ModelProtocolError => "model_protocol_error",
            FallbackReason::ToolRateLimited => "tool_rate_limited",
            FallbackReason::RetryExhausted => "retry_exhausted",
        }
    }

    /// The reason a failed attempt falls into, for threading the cause of
    /// the attempt that finally exhausted the retry budget into its
    /// `FallbackRecord` rather than recording a generic exhaustion.
    pub fn from_error(error: &QueueError) -> FallbackReason {
        match error {
            QueueError::EndpointUnreachable(_) => FallbackReason::EndpointUnreachable,
            QueueError::DeadlineExceeded(_) | QueueError::Timeout(_) => FallbackReason::DeadlineExceeded,
            QueueError::EndpointServerError(_) => FallbackReason::Endpoint5xx,
            QueueError::ModelProtocolError(_) => FallbackReason::ModelProtocolError,
            QueueError::ToolRateLimited(_) => FallbackReason::ToolRateLimited,
            QueueError::Store(_)
            | QueueError::ItemNotFound(_)
            | QueueError::EndpointNotBound(_)
            | QueueError::ToolRejected(_)
            | QueueError::UnknownKey(_)
            | QueueError::InvalidConfiguration(_)
            | QueueError::Serialization(_)
            | QueueError::Internal(_) => FallbackReason::RetryExhausted,
        }
    }

    pub fn parse(s: &str) -> Option<FallbackReason> {
        match s {
            "endpoint_unreachable" => Some(FallbackReason::EndpointUnreachable),
            "deadline_exceeded" => Some(FallbackReason::DeadlineExceeded),
            "endpoint_5xx" => Some(FallbackReason::Endpoint5xx),
            "model_protocol_error" => Some(FallbackReason::ModelProtocolError),
            "tool_rate_limited" => Some(FallbackReason::ToolRateLimited),
            "retry_exhausted" => Some(FallbackReason::RetryExhausted),
            _ => None,
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
