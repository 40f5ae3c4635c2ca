// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Handler — Remote Endpoint Client
//!
//! The only `StageHandler` implementation `queue-runtime` ships: a
//! handler that speaks the chat-completions-style wire protocol to
//! whatever endpoint the registry currently binds to its stage, and
//! bridges any tool calls the model emits back to the domain
//! [`ToolSurface`].
//!
//! Both provider kinds share this wire shape; `hosted` differs only in
//! carrying an `Authorization: Bearer` header resolved from the
//! environment at call time.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use queue_domain::error::{QueueError, QueueResult};
use queue_domain::services::stage_handler::{StageHandler, StageInput};
use queue_domain::services::tool_surface::ToolSurface;
use queue_domain::value_objects::Directive;

use crate::infrastructure::endpoint_registry::EndpointRegistry;

const TOOL_WRITE_RESULT: &str = "write_to_database";
const TOOL_WEB_SEARCH: &str = "brave_web_search";

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ToolDescriptor {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolFunction,
}

#[derive(Debug, Clone, Serialize)]
struct ToolFunction {
    name: &'static str,
    description: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDescriptor>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    function: ToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ModelDescriptor {
    id: String,
}

/// Stage handler bound to a single stage's current endpoint. Looks up
/// the live binding from the registry on every invocation, so it never
/// needs to be reconstructed when an operator rebinds the stage.
pub struct RemoteEndpointHandler {
    stage: queue_domain::value_objects::Stage,
    registry: std::sync::Arc<EndpointRegistry>,
    http: Client,
    tool_call_cap: u32,
}

impl RemoteEndpointHandler {
    pub fn new(stage: queue_domain::value_objects::Stage, registry: std::sync::Arc<EndpointRegistry>, tool_call_cap: u32) -> Self {
        Self {
            stage,
            registry,
            http: Client::new(),
            tool_call_cap,
        }
    }

    /// `GET {base}/v1/models`, used by the `probe-endpoint` control
    /// operation to report endpoint availability without running a full
    /// completion.
    pub async fn probe(&self) -> QueueResult<Vec<String>> {
        let binding = self
            .registry
            .current(self.stage)
            .ok_or_else(|| QueueError::EndpointNotBound(self.stage.to_string()))?;

        let mut request = self.http.get(format!("{}/v1/models", binding.url.trim_end_matches('/'))).timeout(binding.timeout);
        if let Some(secret) = binding.resolve_secret() {
            request = request.bearer_auth(secret);
        }

        let response = request.send().await.map_err(|e| QueueError::EndpointUnreachable(e.to_string()))?;
        if response.status().is_server_error() {
            return Err(QueueError::EndpointServerError(response.status().to_string()));
        }
        let body: ModelsResponse = response.json().await.map_err(|e| QueueError::ModelProtocolError(e.to_string()))?;
        Ok(body.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl StageHandler for RemoteEndpointHandler {
    async fn handle(&self, input: StageInput<'_>, tools: &dyn ToolSurface) -> QueueResult<Directive> {
        let binding = self
            .registry
            .current(self.stage)
            .ok_or_else(|| QueueError::EndpointNotBound(self.stage.to_string()))?;

        let mut priors = HashMap::new();
        for artifact in input.prior_artifacts {
            priors.insert(artifact.stage.as_str(), artifact.payload.clone());
        }

        let mut messages = vec![ChatMessage {
            role: "system",
            content: format!("You are the {} stage handler.", self.stage),
            tool_call_id: None,
        }];
        messages.push(ChatMessage {
            role: "user",
            content: serde_json::to_string(&serde_json::json!({
                "item": input.item.metadata,
                "prior_artifacts": priors,
            }))?,
            tool_call_id: None,
        });

        let tool_descriptors = vec![
            ToolDescriptor {
                kind: "function",
                function: ToolFunction { name: TOOL_WRITE_RESULT, description: "Record the stage outcome" },
            },
            ToolDescriptor {
                kind: "function",
                function: ToolFunction { name: TOOL_WEB_SEARCH, description: "Search the web" },
            },
        ];

        let mut iteration = 0u32;
        loop {
            if iteration >= self.tool_call_cap {
                return Err(QueueError::ModelProtocolError(format!(
                    "tool-call loop exceeded cap of {}",
                    self.tool_call_cap
                )));
            }
            iteration += 1;

            let request_body = ChatRequest {
                model: binding.model.clone(),
                messages: messages.clone(),
                tools: Some(tool_descriptors.clone()),
            };

            let mut request = self
                .http
                .post(format!("{}/v1/chat/completions", binding.url.trim_end_matches('/')))
                .timeout(binding.timeout)
                .json(&request_body);
            if let Some(secret) = binding.resolve_secret() {
                request = request.bearer_auth(secret);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    QueueError::DeadlineExceeded(binding.timeout)
                } else {
                    QueueError::EndpointUnreachable(e.to_string())
                }
            })?;

            if response.status().is_server_error() {
                return Err(QueueError::EndpointServerError(response.status().to_string()));
            }

            let parsed: ChatResponse = response.json().await.map_err(|e| QueueError::ModelProtocolError(e.to_string()))?;
            let choice = parsed.choices.into_iter().next().ok_or_else(|| QueueError::ModelProtocolError("no choices in response".to_string()))?;

            if choice.message.tool_calls.is_empty() {
                debug!(stage = %self.stage, "handler finished with no further tool calls");
                return Err(QueueError::Internal(
                    "handler returned a final message without calling write_to_database".to_string(),
                ));
            }

            for call in choice.message.tool_calls {
                let result = dispatch_tool_call(&call, tools).await;
                match result {
                    ToolDispatchOutcome::Decided(directive) => return Ok(directive),
                    ToolDispatchOutcome::FollowUp(payload) => {
                        messages.push(ChatMessage {
                            role: "tool",
                            content: payload.to_string(),
                            tool_call_id: Some(call.id),
                        });
                    }
                    ToolDispatchOutcome::Error(err) => {
                        warn!(stage = %self.stage, tool = %call.function.name, error = %err, "tool call failed");
                        return Err(err);
                    }
                }
            }
        }
    }
}

enum ToolDispatchOutcome {
    /// `write_result` was called; the attempt is decided.
    Decided(Directive),
    /// `web_search` (or any other non-deciding tool) returned data the
    /// model should see in its next turn.
    FollowUp(Value),
    Error(QueueError),
}

async fn dispatch_tool_call(call: &ToolCall, tools: &dyn ToolSurface) -> ToolDispatchOutcome {
    let args: Value = match serde_json::from_str(&call.function.arguments) {
        Ok(v) => v,
        Err(e) => return ToolDispatchOutcome::Error(QueueError::ModelProtocolError(e.to_string())),
    };

    match call.function.name.as_str() {
        TOOL_WRITE_RESULT => match serde_json::from_value::<Directive>(args) {
            Ok(directive) => match tools.write_result(directive.clone()).await {
                Ok(()) => ToolDispatchOutcome::Decided(directive),
                Err(e) => ToolDispatchOutcome::Error(e),
            },
            Err(e) => ToolDispatchOutcome::Error(QueueError::InvalidConfiguration(format!("invalid directive payload: {e}"))),
        },
        TOOL_WEB_SEARCH => {
            let query = args.get("query").and_then(|v| v.as_str()).unwrap_or_default();
            match tools.web_search(query).await {
                Ok(results) => ToolDispatchOutcome::FollowUp(results),
                Err(e) => ToolDispatchOutcome::Error(e),
            }
        }
        other => ToolDispatchOutcome::Error(QueueError::ModelProtocolError(format!("unknown tool call: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_dispatch_rejects_unknown_tool_name() {
        let call = ToolCall {
            id: "call_1".to_string(),
            function: ToolCallFunction { name: "delete_everything".to_string(), arguments: "{}".to_string() },
        };
        let args: Value = serde_json::from_str(&call.function.arguments).unwrap();
        assert!(args.is_object());
        assert_eq!(call.function.name, "delete_everything");
    }
}
