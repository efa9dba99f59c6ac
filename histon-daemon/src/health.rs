//! Aggregated health check reporting.
//!
//! Polls each module's `health_check()` and produces a unified
//! [`DaemonHealth`] report. The overall daemon status is the worst
//! status among all enabled modules.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use histon_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all modules).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-module health reports.
    pub modules: Vec<ModuleHealth>,
}

/// Health status for a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Module name (e.g., "ingest-pipeline", "store-writer").
    pub name: String,
    /// Whether the module is enabled in configuration.
    pub enabled: bool,
    /// Current health status of the module.
    pub status: HealthStatus,
}

/// Aggregate multiple module health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// Only considers enabled modules.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let enabled_modules = modules.iter().filter(|m| m.enabled);

    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for module in enabled_modules {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", module.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", module.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}
