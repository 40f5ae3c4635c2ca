// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Structured logging and observability, built on `tracing` +
//! `tracing-subscriber` for the former and Prometheus (via
//! [`crate::infrastructure::metrics`]) for the latter.

pub mod observability;
pub use observability::*;
