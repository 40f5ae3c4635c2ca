// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Endpoint Registry
//!
//! Materializes the current stage-to-endpoint bindings and publishes a
//! reload signal. Workers snapshot the registry once at the top of each
//! loop iteration — never mid-attempt — so a rebind never invalidates an
//! in-flight handler invocation, only the *next* one.
//!
//! The reload signal itself carries no payload, just a generation
//! counter; readers always re-fetch the current bindings from the store
//! rather than trust a cached copy, so a missed tick of the watch
//! channel is harmless.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use queue_domain::entities::EndpointBinding;
use queue_domain::error::QueueResult;
use queue_domain::repositories::ItemRepository;
use queue_domain::value_objects::Stage;

/// Shared, live view of `stage -> EndpointBinding`, with a reload signal
/// workers can subscribe to.
pub struct EndpointRegistry {
    repository: Arc<dyn ItemRepository>,
    bindings: Arc<std::sync::RwLock<HashMap<Stage, EndpointBinding>>>,
    reload_tx: watch::Sender<u64>,
}

impl EndpointRegistry {
    /// Load the current bindings from the store and start a registry at
    /// generation 0.
    pub async fn load(repository: Arc<dyn ItemRepository>) -> QueueResult<Self> {
        let initial = repository.list_endpoints().await?;
        let mut bindings = HashMap::new();
        for binding in initial {
            bindings.insert(binding.stage, binding);
        }
        let (reload_tx, _) = watch::channel(0);
        Ok(Self {
            repository,
            bindings: Arc::new(std::sync::RwLock::new(bindings)),
            reload_tx,
        })
    }

    /// A channel that ticks (carrying an incrementing generation number)
    /// every time the bindings change. Workers don't need to inspect the
    /// value — any change means "re-snapshot at your next iteration."
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.reload_tx.subscribe()
    }

    /// Snapshot the binding currently in effect for a stage. Returns
    /// `None` when no endpoint has been configured for it yet.
    pub fn current(&self, stage: Stage) -> Option<EndpointBinding> {
        self.bindings.read().expect("endpoint registry lock poisoned").get(&stage).cloned()
    }

    pub fn all(&self) -> Vec<EndpointBinding> {
        self.bindings.read().expect("endpoint registry lock poisoned").values().cloned().collect()
    }

    /// Persist a new binding and reload the in-memory view. Called from
    /// the `set-endpoint` control operation.
    pub async fn rebind(&self, binding: EndpointBinding) -> QueueResult<()> {
        self.repository.upsert_endpoint(binding.clone()).await?;
        self.bindings.write().expect("endpoint registry lock poisoned").insert(binding.stage, binding.clone());
        self.bump_generation();
        info!(stage = %binding.stage, provider = %binding.provider, "endpoint rebound");
        Ok(())
    }

    /// Re-read every binding from the store, discarding the in-memory
    /// view. Used by the `reload-endpoints` control operation when
    /// bindings were changed out-of-band (another process, direct SQL).
    pub async fn reload(&self) -> QueueResult<()> {
        let fresh = self.repository.list_endpoints().await?;
        let mut bindings = self.bindings.write().expect("endpoint registry lock poisoned");
        bindings.clear();
        for binding in fresh {
            bindings.insert(binding.stage, binding);
        }
        drop(bindings);
        self.bump_generation();
        info!("endpoint registry reloaded from store");
        Ok(())
    }

    fn bump_generation(&self) {
        let next = *self.reload_tx.borrow() + 1;
        let _ = self.reload_tx.send(next);
    }
}
