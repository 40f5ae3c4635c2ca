// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Observability Service
//!
//! Combines the Prometheus [`MetricsService`] with a small in-process
//! performance tracker and threshold-based health scoring, so `status`
//! and `stats` can report something richer than a raw metrics dump.
//!
//! The centerpiece is [`OperationTracker`]: a handle returned by
//! [`ObservabilityService::start_operation`] for one handler invocation.
//! If the caller never calls [`OperationTracker::complete`] — because the
//! task panicked or was cancelled — `Drop` spawns a task that records the
//! operation as failed, so a crashed handler still shows up in the error
//! rate instead of vanishing silently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::infrastructure::metrics::MetricsService;

#[derive(Clone)]
pub struct ObservabilityService {
    metrics_service: Arc<MetricsService>,
    performance_tracker: Arc<RwLock<PerformanceTracker>>,
    alert_thresholds: AlertThresholds,
}

/// Real-time performance tracking across handler invocations.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    pub active_operations: u32,
    pub total_operations: u64,
    pub error_rate_percent: f64,
    pub last_update: Instant,
}

/// Thresholds past which [`ObservabilityService::get_system_health`]
/// downgrades the reported status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub max_error_rate_percent: f64,
    pub max_active_operations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub score: f64,
    pub active_operations: u32,
    pub error_rate_percent: f64,
    pub uptime_seconds: u64,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: String,
    pub metric_name: String,
    pub current_value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_error_rate_percent: 10.0,
            max_active_operations: 64,
        }
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self {
            active_operations: 0,
            total_operations: 0,
            error_rate_percent: 0.0,
            last_update: Instant::now(),
        }
    }
}

impl ObservabilityService {
    pub fn new(metrics_service: Arc<MetricsService>) -> Self {
        Self {
            metrics_service,
            performance_tracker: Arc::new(RwLock::new(PerformanceTracker::default())),
            alert_thresholds: AlertThresholds::default(),
        }
    }

    /// Begin tracking one handler invocation.
    pub async fn start_operation(&self, operation_name: &str) -> OperationTracker {
        let mut tracker = self.performance_tracker.write().await;
        tracker.active_operations += 1;
        tracker.total_operations += 1;
        tracker.last_update = Instant::now();
        self.metrics_service.handler_started();

        debug!("started operation: {} (active: {})", operation_name, tracker.active_operations);

        OperationTracker {
            operation_name: operation_name.to_string(),
            start_time: Instant::now(),
            observability_service: self.clone(),
            completed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    async fn complete_operation(&self, operation_name: &str, duration: Duration, success: bool) {
        let mut tracker = self.performance_tracker.write().await;

        if tracker.active_operations > 0 {
            tracker.active_operations -= 1;
        }

        let total_ops = tracker.total_operations as f64;
        if total_ops > 0.0 {
            let error_contribution = if success { 0.0 } else { 100.0 };
            tracker.error_rate_percent = (tracker.error_rate_percent * (total_ops - 1.0) + error_contribution) / total_ops;
        }
        tracker.last_update = Instant::now();

        self.metrics_service.handler_finished();
        self.metrics_service.record_handler_duration(duration);

        info!(
            operation = operation_name,
            duration_secs = duration.as_secs_f64(),
            success,
            "completed handler invocation"
        );

        self.check_alerts(&tracker).await;
    }

    pub async fn get_system_health(&self) -> SystemHealth {
        let tracker = self.performance_tracker.read().await;
        let uptime = tracker.last_update.elapsed().as_secs();

        let mut score: f64 = 100.0;
        let mut alerts = Vec::new();

        if tracker.error_rate_percent > self.alert_thresholds.max_error_rate_percent {
            score -= 30.0;
            alerts.push(Alert {
                severity: AlertSeverity::Warning,
                message: format!("high handler error rate: {:.1}%", tracker.error_rate_percent),
                timestamp: chrono::Utc::now().to_rfc3339(),
                metric_name: "error_rate_percent".to_string(),
                current_value: tracker.error_rate_percent,
                threshold: self.alert_thresholds.max_error_rate_percent,
            });
        }

        if tracker.active_operations > self.alert_thresholds.max_active_operations {
            score -= 20.0;
            alerts.push(Alert {
                severity: AlertSeverity::Warning,
                message: format!("high concurrent handler load: {}", tracker.active_operations),
                timestamp: chrono::Utc::now().to_rfc3339(),
                metric_name: "active_operations".to_string(),
                current_value: tracker.active_operations as f64,
                threshold: self.alert_thresholds.max_active_operations as f64,
            });
        }

        let status = if score >= 90.0 {
            HealthStatus::Healthy
        } else if score >= 70.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        };

        SystemHealth {
            status,
            score,
            active_operations: tracker.active_operations,
            error_rate_percent: tracker.error_rate_percent,
            uptime_seconds: uptime,
            alerts,
        }
    }

    async fn check_alerts(&self, tracker: &PerformanceTracker) {
        if tracker.error_rate_percent > self.alert_thresholds.max_error_rate_percent {
            warn!(
                error_rate_percent = tracker.error_rate_percent,
                threshold = self.alert_thresholds.max_error_rate_percent,
                "handler error rate above threshold"
            );
        }
        if tracker.active_operations > self.alert_thresholds.max_active_operations {
            warn!(active_operations = tracker.active_operations, "handler concurrency above threshold");
        }
    }

    pub async fn get_performance_summary(&self) -> String {
        let tracker = self.performance_tracker.read().await;
        let health = self.get_system_health().await;

        format!(
            "active_operations={} total_operations={} error_rate={:.1}% health_score={:.1} status={:?} alerts={}",
            tracker.active_operations,
            tracker.total_operations,
            tracker.error_rate_percent,
            health.score,
            health.status,
            health.alerts.len()
        )
    }
}

/// Handle for one in-flight handler invocation.
pub struct OperationTracker {
    operation_name: String,
    start_time: Instant,
    observability_service: ObservabilityService,
    completed: std::sync::atomic::AtomicBool,
}

impl OperationTracker {
    pub async fn complete(self, success: bool) {
        self.completed.store(true, std::sync::atomic::Ordering::Relaxed);
        let duration = self.start_time.elapsed();
        self.observability_service
            .complete_operation(&self.operation_name, duration, success)
            .await;
    }
}

impl Drop for OperationTracker {
    fn drop(&mut self) {
        if !self.completed.load(std::sync::atomic::Ordering::Relaxed) {
            let observability_service = self.observability_service.clone();
            let operation_name = self.operation_name.clone();
            let duration = self.start_time.elapsed();
            tokio::spawn(async move {
                observability_service.complete_operation(&operation_name, duration, false).await;
            });
        }
    }
}
