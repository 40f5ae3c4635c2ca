// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Handler Interface
//!
//! A `StageHandler` is the domain's view of "invoke whatever is bound to
//! this stage and get a directive back." Handlers are opaque to the
//! worker pool: the pool doesn't know or care whether a handler calls a
//! custom HTTP endpoint, a hosted provider, or nothing at all — it only
//! ever sees a [`StageHandler::handle`] future that resolves to a
//! [`crate::value_objects::Directive`] or errors out (which the pool
//! folds into [`crate::value_objects::Directive::implicit_retry`]).
//!
//! Exactly one handler is registered per stage; `queue-runtime` builds
//! the registry (`HashMap<Stage, Arc<dyn StageHandler>>`) from the
//! endpoint bindings at startup and on `reload-endpoints`.

use async_trait::async_trait;

use crate::entities::{Item, StageArtifact};
use crate::error::QueueResult;
use crate::services::tool_surface::ToolSurface;
use crate::value_objects::Directive;

/// Everything a handler needs to process one attempt: the item itself,
/// the prior artifacts from earlier stages (so a later stage can build
/// on an earlier one's output), and the tool surface bound to this
/// attempt.
pub struct StageInput<'a> {
    pub item: &'a Item,
    pub attempt: u32,
    pub prior_artifacts: &'a [StageArtifact],
}

/// A stage's remote collaborator, as seen by the worker pool.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Invoke the handler for one attempt at one item. `tools` bridges
    /// `write_result`/`web_search` tool calls back to the caller for the
    /// duration of this single invocation only — it must not be reused
    /// across attempts or items.
    async fn handle(&self, input: StageInput<'_>, tools: &dyn ToolSurface) -> QueueResult<Directive>;
}
