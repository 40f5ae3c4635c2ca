// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete [`queue_domain::repositories::ItemRepository`] implementation
//! and the schema/migration helpers it depends on.

pub mod schema;
pub mod sqlite_item_repository;

pub use sqlite_item_repository::SqliteItemRepository;
