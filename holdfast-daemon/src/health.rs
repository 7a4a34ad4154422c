//! Aggregated health check reporting.
//!
//! Collects each pipeline's `health_check()` result into a unified
//! [`DaemonHealth`] report. The overall daemon status is the worst status
//! among all pipelines.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use holdfast_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all pipelines).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-pipeline health reports.
    pub pipelines: Vec<PipelineHealth>,
}

/// Health status for a single pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineHealth {
    /// Pipeline name (e.g., "intake", "policy-engine").
    pub name: String,
    /// Current health status of the pipeline.
    pub status: HealthStatus,
}

/// Aggregate multiple pipeline health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
pub fn aggregate_status(pipelines: &[PipelineHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for pipeline in pipelines {
        match &pipeline.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", pipeline.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", pipeline.name, reason));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn health(name: &str, status: HealthStatus) -> PipelineHealth {
        PipelineHealth {
            name: name.to_owned(),
            status,
        }
    }

    #[test]
    fn all_healthy_aggregates_healthy() {
        let pipelines = vec![
            health("intake", HealthStatus::Healthy),
            health("policy-engine", HealthStatus::Healthy),
        ];
        assert!(aggregate_status(&pipelines).is_healthy());
    }

    #[test]
    fn degraded_dominates_healthy() {
        let pipelines = vec![
            health("intake", HealthStatus::Healthy),
            health(
                "policy-engine",
                HealthStatus::Degraded("runtime unreachable".to_owned()),
            ),
        ];
        let status = aggregate_status(&pipelines);
        assert!(status.is_degraded());
        assert!(status.to_string().contains("policy-engine"));
    }

    #[test]
    fn unhealthy_dominates_degraded() {
        let pipelines = vec![
            health("intake", HealthStatus::Unhealthy("stopped".to_owned())),
            health(
                "policy-engine",
                HealthStatus::Degraded("runtime unreachable".to_owned()),
            ),
        ];
        let status = aggregate_status(&pipelines);
        assert!(status.is_unhealthy());
        assert!(status.to_string().contains("intake"));
    }

    #[test]
    fn empty_is_healthy() {
        assert!(aggregate_status(&[]).is_healthy());
    }

    #[test]
    fn daemon_health_serializes() {
        let report = DaemonHealth {
            status: HealthStatus::Healthy,
            uptime_secs: 42,
            pipelines: vec![health("intake", HealthStatus::Healthy)],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"uptime_secs\":42"));
        assert!(json.contains("intake"));
    }
}
