// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Layer
//!
//! Orchestration that sits above the domain ports and infrastructure
//! adapters: the per-stage worker loop, the recovery/retry sweep, and
//! the control surface the CLI drives. Nothing here talks to sqlx or
//! reqwest directly — it depends only on `queue_domain`'s traits and the
//! infrastructure types built on top of them.

pub mod control;
pub mod recovery;
pub mod settings;
pub mod worker_pool;

pub use control::ControlApi;
pub use recovery::RecoveryManager;
pub use worker_pool::StageWorkerPool;
