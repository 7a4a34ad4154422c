//! Startup-time container runtime detection.
//!
//! Probes well-known socket paths to pick the runtime in use. Docker Desktop
//! and OrbStack are Docker-API-compatible, so detection only selects a socket
//! path — both are served by the single [`BollardRuntimeClient`] type. The
//! discovery helper is shared by both variants (composition, not a type
//! hierarchy).

use std::fmt;
use std::path::PathBuf;

use tracing::{info, warn};

use holdfast_core::config::RuntimeConfig;

use crate::client::BollardRuntimeClient;
use crate::error::RuntimeGuardError;

/// Supported runtime variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Docker (Docker Engine or Docker Desktop).
    Docker,
    /// OrbStack (Docker-compatible, macOS).
    Orbstack,
}

impl RuntimeKind {
    /// Parses the `runtime.runtime_type` config value.
    pub fn from_config_value(value: &str) -> Option<Self> {
        match value {
            "docker" => Some(Self::Docker),
            "orbstack" => Some(Self::Orbstack),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Orbstack => write!(f, "orbstack"),
        }
    }
}

/// A detected, connected runtime.
#[derive(Debug)]
pub struct DetectedRuntime {
    /// Which variant was selected.
    pub kind: RuntimeKind,
    /// The socket path in use.
    pub socket_path: String,
    /// Connected client.
    pub client: BollardRuntimeClient,
}

/// Candidate socket paths for a runtime variant, most specific first.
pub fn socket_candidates(kind: RuntimeKind) -> Vec<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_default();
    match kind {
        RuntimeKind::Orbstack => vec![PathBuf::from(format!("{home}/.orbstack/run/docker.sock"))],
        RuntimeKind::Docker => vec![
            PathBuf::from("/var/run/docker.sock"),
            PathBuf::from(format!("{home}/.docker/run/docker.sock")),
            PathBuf::from(format!(
                "{home}/Library/Containers/com.docker.docker/Data/docker.sock"
            )),
        ],
    }
}

/// Returns the first existing candidate socket for a runtime variant.
pub fn discover_socket(kind: RuntimeKind) -> Option<PathBuf> {
    socket_candidates(kind).into_iter().find(|p| p.exists())
}

/// Detects and connects to the container runtime.
///
/// Resolution order:
/// 1. An explicit `docker_socket` override wins; `runtime_type` (default
///    docker) only labels the connection.
/// 2. An explicit `runtime_type` limits discovery to that variant's sockets.
/// 3. Otherwise OrbStack is probed first (its socket is more specific), then
///    Docker.
///
/// # Errors
///
/// Returns `RuntimeGuardError::Connection` when no socket can be found or the
/// client cannot be constructed.
pub fn detect_runtime(config: &RuntimeConfig) -> Result<DetectedRuntime, RuntimeGuardError> {
    if !config.docker_socket.is_empty() {
        let kind =
            RuntimeKind::from_config_value(&config.runtime_type).unwrap_or(RuntimeKind::Docker);
        let client = BollardRuntimeClient::connect_with_socket(&config.docker_socket)?;
        info!(kind = %kind, socket = %config.docker_socket, "using configured runtime socket");
        return Ok(DetectedRuntime {
            kind,
            socket_path: config.docker_socket.clone(),
            client,
        });
    }

    if let Some(kind) = RuntimeKind::from_config_value(&config.runtime_type) {
        let socket = discover_socket(kind).ok_or_else(|| {
            RuntimeGuardError::Connection(format!("no socket found for runtime '{kind}'"))
        })?;
        return connect_discovered(kind, socket);
    }

    if !config.auto_detect {
        return Err(RuntimeGuardError::Connection(
            "runtime auto-detection disabled and no runtime configured".to_owned(),
        ));
    }

    // OrbStack first: its socket path never belongs to another runtime.
    if let Some(socket) = discover_socket(RuntimeKind::Orbstack) {
        return connect_discovered(RuntimeKind::Orbstack, socket);
    }

    if let Some(socket) = discover_socket(RuntimeKind::Docker) {
        return connect_discovered(RuntimeKind::Docker, socket);
    }

    warn!("no container runtime socket found");
    Err(RuntimeGuardError::Connection(
        "no container runtime socket found".to_owned(),
    ))
}

fn connect_discovered(
    kind: RuntimeKind,
    socket: PathBuf,
) -> Result<DetectedRuntime, RuntimeGuardError> {
    let socket_path = socket.display().to_string();
    let client = BollardRuntimeClient::connect_with_socket(&socket_path)?;
    info!(kind = %kind, socket = %socket_path, "container runtime detected");
    Ok(DetectedRuntime {
        kind,
        socket_path,
        client,
    })
}
