// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Queue Orchestrator Runtime
//!
//! The orchestrator's application and infrastructure layers: the
//! sqlite-backed [`queue_domain::repositories::ItemRepository`]
//! implementation, the endpoint registry, the per-stage worker pool, the
//! recovery manager, the remote-endpoint stage handler, and the control
//! API the CLI drives. Depends on `queue-domain` for its ports and value
//! types and `queue-bootstrap` for shutdown coordination; has no
//! knowledge of CLI parsing or process entry, which stay in the binary
//! crate that links this one.
//!
//! ## Architecture Position
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │       APPLICATION LAYER (this crate)        │
//! │  - StageWorkerPool, RecoveryManager,         │
//! │    ControlApi                                │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │           DOMAIN LAYER (queue-domain)        │
//! │  - ItemRepository, StageHandler, ToolSurface │
//! │  - Item, Stage, Status, Directive            │
//! └─────────────────────────────────────────────┘
//!                      ▲
//!                      │
//! ┌─────────────────────────────────────────────┐
//! │     INFRASTRUCTURE LAYER (this crate)        │
//! │  - SqliteItemRepository, EndpointRegistry    │
//! │  - RemoteEndpointHandler, RemoteToolSurface  │
//! │  - MetricsService, AppConfig                 │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - `application` — worker pool, recovery manager, control API
//! - `infrastructure` — sqlite store, endpoint registry, remote stage
//!   handler, tool surface, config, logging, metrics

pub mod application;
pub mod infrastructure;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory

pub use application::{ControlApi, RecoveryManager, StageWorkerPool};
pub use infrastructure::repositories::SqliteItemRepository;
