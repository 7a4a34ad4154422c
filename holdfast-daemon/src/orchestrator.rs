//! Module orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `holdfast-daemon`.
//! It resolves configuration, creates the inter-module channels, detects the
//! container runtime, builds the pipelines, manages startup/shutdown
//! ordering, and runs the main event loop.
//!
//! # Startup Order
//!
//! 1. Alert Receiver (produces AlertEvents; the channel buffers until the
//!    engine task is running)
//! 2. Policy Engine (consumes AlertEvents, produces ActionEvents)
//!
//! # Shutdown Order (producers first)
//!
//! 1. Alert Receiver (stop accepting submissions)
//! 2. Policy Engine (drain remaining AlertEvents)
//!
//! Shutdown is propagated through a `CancellationToken` and every background
//! task is awaited to completion before the process exits.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use holdfast_core::config::HoldfastConfig;
use holdfast_core::event::ActionEvent;
use holdfast_core::pipeline::PipelineRegistry;
use holdfast_intake::{AlertReceiver, IntakeConfig, ReceiverInfo, ReceiverState};
use holdfast_policy_engine::{PolicyEngineBuilder, WebhookNotifier};
use holdfast_runtime_guard::{BollardRuntimeClient, detect_runtime};

use crate::health::{DaemonHealth, PipelineHealth, aggregate_status};
use crate::metrics_server;

/// The main daemon orchestrator.
///
/// Manages the complete lifecycle of the holdfast pipelines: configuration
/// resolution, channel wiring, ordered startup, health aggregation, and
/// graceful shutdown.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: HoldfastConfig,
    /// Registry of all pipelines (ordered for start/stop).
    registry: PipelineRegistry,
    /// Shutdown token propagated to all background tasks.
    cancel: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
    /// Action event receiver (audit logging).
    action_rx: Option<mpsc::Receiver<ActionEvent>>,
}

impl Orchestrator {
    /// Load configuration from a file and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = HoldfastConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// This performs the two-phase configuration build: the raw config is
    /// validated, then resolved into the immutable engine configuration
    /// (built-in default policies substituted) before any pipeline component
    /// is constructed.
    pub async fn build_from_config(config: HoldfastConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before pipeline initialization
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let resolved = config.resolve_engine();
        let needs_runtime = resolved
            .policies
            .iter()
            .any(|rule| rule.action.requires_runtime());

        // Runtime detection: enforcement rules fail fast when no runtime is
        // reachable; passive rule sets run in degraded mode.
        let (runtime, runtime_name) = match detect_runtime(&config.runtime) {
            Ok(detected) => {
                tracing::info!(
                    kind = %detected.kind,
                    socket = %detected.socket_path,
                    "container runtime attached"
                );
                (
                    Some(Arc::new(detected.client)),
                    detected.kind.to_string(),
                )
            }
            Err(e) if needs_runtime => {
                return Err(anyhow::anyhow!(
                    "policy declares enforcement actions but no container runtime is available: {}",
                    e
                ));
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "container runtime unavailable, enforcement actions disabled"
                );
                (None, "none".to_owned())
            }
        };

        tracing::debug!("creating inter-module channels");
        let (alert_tx, alert_rx) = mpsc::channel(config.receiver.channel_capacity);

        let notifier = WebhookNotifier::new(
            resolved.default_webhook_url.clone(),
            Duration::from_secs(resolved.action_timeout_secs),
        )
        .map_err(|e| anyhow::anyhow!("failed to build webhook notifier: {}", e))?;

        let policy_count = resolved.policies.len();

        tracing::info!(policies = policy_count, dry_run = resolved.dry_run, "initializing policy engine");
        let mut engine_builder = PolicyEngineBuilder::<BollardRuntimeClient, WebhookNotifier>::new()
            .config(resolved)
            .notifier(notifier)
            .alert_receiver(alert_rx);
        if let Some(rt) = runtime {
            engine_builder = engine_builder.runtime(rt);
        }
        let (engine, action_rx) = engine_builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build policy engine: {}", e))?;

        tracing::info!("initializing alert receiver");
        let receiver_state = ReceiverState::new(
            alert_tx,
            engine.metrics(),
            ReceiverInfo {
                runtime: runtime_name,
                policies: policy_count,
            },
        );
        let receiver = AlertReceiver::new(
            IntakeConfig::from_core(&config.receiver),
            receiver_state,
        )
        .map_err(|e| anyhow::anyhow!("failed to build alert receiver: {}", e))?;

        let mut registry = PipelineRegistry::new();
        registry
            .register(Box::new(receiver))
            .map_err(|e| anyhow::anyhow!("failed to register alert receiver: {}", e))?;
        registry
            .register(Box::new(engine))
            .map_err(|e| anyhow::anyhow!("failed to register policy engine: {}", e))?;

        tracing::info!(pipelines = registry.count(), "orchestrator initialized");

        if config.metrics.enabled {
            record_daemon_metrics(registry.count());
        }

        Ok(Self {
            config,
            registry,
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
            action_rx,
        })
    }

    /// Start all pipelines and enter the main event loop.
    ///
    /// This method blocks until a shutdown signal is received.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        if !self.config.general.pid_file.is_empty() {
            write_pid_file(Path::new(&self.config.general.pid_file))?;
        }

        tracing::info!("starting all pipelines");
        if let Err(e) = self.registry.start_all().await {
            // Rollback: stop any pipelines that were successfully started
            tracing::warn!("startup failed, rolling back already-started pipelines");
            if let Err(stop_err) = self.registry.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            self.cleanup_pid_file();
            return Err(e.into());
        }

        // Spawn audit logger for completed actions
        let mut action_logger_task = self
            .action_rx
            .take()
            .map(|rx| spawn_action_logger(rx, self.cancel.clone()));

        // Spawn uptime updater
        let mut uptime_updater_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(self.start_time, self.cancel.clone()))
        } else {
            None
        };

        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        // Propagate shutdown and wait for every background task
        self.cancel.cancel();
        if let Some(task) = action_logger_task.take() {
            let _ = task.await;
        }
        if let Some(task) = uptime_updater_task.take() {
            let _ = task.await;
        }

        let result = self.shutdown().await;
        self.cleanup_pid_file();
        result
    }

    /// Perform graceful shutdown of all pipelines.
    ///
    /// Stops pipelines in registration order (producers first, consumers
    /// last) so the engine can drain remaining alerts from its channel.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all pipelines");
        self.registry.stop_all().await.map_err(|e| e.into())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let statuses = self.registry.health_check_all().await;
        let pipelines: Vec<PipelineHealth> = statuses
            .into_iter()
            .map(|(name, status)| PipelineHealth { name, status })
            .collect();

        let overall_status = aggregate_status(&pipelines);
        let uptime_secs = self.start_time.elapsed().as_secs();

        if self.config.metrics.enabled {
            use holdfast_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: overall_status,
            uptime_secs,
            pipelines,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &HoldfastConfig {
        &self.config
    }

    fn cleanup_pid_file(&self) {
        if !self.config.general.pid_file.is_empty() {
            remove_pid_file(Path::new(&self.config.general.pid_file));
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances. The file is created
/// atomically (`create_new`) and verified to be a regular file.
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        file.set_permissions(permissions)?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Spawn a background task that logs completed ActionEvents for audit.
fn spawn_action_logger(
    mut action_rx: mpsc::Receiver<ActionEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                action_result = action_rx.recv() => {
                    match action_result {
                        Some(action) => {
                            tracing::info!(
                                action_id = %action.id,
                                action_type = %action.action_type,
                                target = %action.target,
                                success = action.success,
                                trace_id = %action.metadata.trace_id,
                                "response action completed"
                            );
                        }
                        None => {
                            tracing::debug!("action channel closed, exiting audit logger");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("audit logger shutting down");
                    break;
                }
            }
        }
    })
}

/// Record daemon-level metrics (build info, registered pipelines).
fn record_daemon_metrics(pipeline_count: usize) {
    use holdfast_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PIPELINES_REGISTERED).set(pipeline_count as f64);

    tracing::debug!(
        pipeline_count = pipeline_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Spawn a background task that periodically updates the uptime metric.
///
/// Updates every 10 seconds to keep the metric fresh for Prometheus scrapes.
fn spawn_uptime_updater(
    start_time: Instant,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    use holdfast_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
