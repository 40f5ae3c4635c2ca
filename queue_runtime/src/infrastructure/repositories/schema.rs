// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite schema helpers shared by repository implementations.
//!
//! Applies migrations on start-up so the running orchestrator and
//! integration tests always see a consistent schema.

use sqlx::migrate::MigrateDatabase;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Runs pending migrations against the provided SQLite pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("ensuring database schema is up to date");
    sqlx::migrate!("../migrations").run(pool).await?;
    info!("database schema is up to date");
    Ok(())
}

/// Creates a new SQLite database file if it doesn't exist.
///
/// `SqlitePool::connect` fails if the file is missing unless the
/// connect options set `create_if_missing`, so callers that want a
/// plain connection string go through this first.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    if !sqlx::Sqlite::database_exists(database_url).await? {
        debug!("database does not exist, creating: {}", database_url);
        sqlx::Sqlite::create_database(database_url).await?;
        info!("created new SQLite database: {}", database_url);
    } else {
        debug!("database already exists: {}", database_url);
    }
    Ok(())
}

/// Creates the database if needed, connects, and applies migrations —
/// the one call `main` needs to get a ready-to-use pool.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    create_database_if_missing(database_url).await?;
    let pool = SqlitePool::connect(database_url).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}
