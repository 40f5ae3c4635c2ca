// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Queue Domain
//!
//! Pure business logic for the content-analysis queue orchestrator:
//! entities, value objects, and the repository/handler/tool ports that
//! infrastructure implements. This crate has no tokio runtime, no sqlx,
//! no HTTP client — every I/O-bound concern here is a trait, following
//! the same domain/infrastructure split the rest of the workspace uses.
//!
//! ## Layout
//!
//! - [`value_objects`] — `Stage`, `Status`, `Directive`, `ProviderKind`,
//!   `FallbackReason`: the closed enums the rest of the system pattern
//!   matches on.
//! - [`entities`] — `Item`, `StageArtifact`, `EndpointBinding`,
//!   `QueueSetting`, `PauseFlag`, `FallbackRecord`: the persisted shapes.
//! - [`repositories`] — `ItemRepository`: the durable store's contract.
//! - [`services`] — `StageHandler`, `ToolSurface`: the remote-endpoint
//!   and tool-call ports.
//! - [`error`] — `QueueError`, the single error type every port returns.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::{QueueError, QueueResult};
