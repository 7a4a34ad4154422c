//! Container runtime abstraction for testability.
//!
//! The [`RuntimeClient`] trait abstracts the Docker API, allowing production
//! code to use [`BollardRuntimeClient`] while tests use [`MockRuntimeClient`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ ActionDispatcher │
//! └────────┬─────────┘
//!          │
//!          ▼
//!   ┌───────────────┐
//!   │ RuntimeClient │ (trait)
//!   └───────────────┘
//!        │      │
//!        ▼      ▼
//!   ┌───────┐ ┌──────┐
//!   │Bollard│ │ Mock │
//!   └───┬───┘ └──────┘
//!       │
//!       ▼
//!  Docker daemon
//! ```
//!
//! # Container ID Validation
//!
//! All methods that accept container IDs perform validation:
//! - Must be 1-64 characters
//! - Must contain only ASCII hex digits ([0-9a-fA-F])
//!
//! # Quarantine Semantics
//!
//! [`disconnect_all_networks`](RuntimeClient::disconnect_all_networks) returns
//! the number of networks actually detached. A container with zero attachments
//! yields `Ok(0)` — the desired end state already holds, so the caller treats
//! it as success (with a distinct log line).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use holdfast_core::types::ContainerInfo;

use crate::error::RuntimeGuardError;

/// Validates a container ID before it reaches the runtime API.
///
/// Docker container IDs are 64-character hex strings (or shorter prefix
/// forms). Anything else is rejected up front.
fn validate_container_id(id: &str) -> Result<(), RuntimeGuardError> {
    if id.is_empty() || id.len() > 64 {
        return Err(RuntimeGuardError::Api(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RuntimeGuardError::Api(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Trait abstracting the container runtime operations the dispatcher invokes.
///
/// The trait is `Send + Sync + 'static`, allowing safe sharing across async
/// contexts via `Arc`.
///
/// # Implementations
///
/// - [`BollardRuntimeClient`]: production implementation over the `bollard`
///   Docker API
/// - [`MockRuntimeClient`]: configurable test double, also used by downstream
///   crates' tests
pub trait RuntimeClient: Send + Sync + 'static {
    /// Lists running containers.
    fn list_containers(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerInfo>, RuntimeGuardError>> + Send;

    /// Inspects a specific container.
    ///
    /// # Errors
    ///
    /// - `RuntimeGuardError::NotFound`: container does not exist (404)
    /// - `RuntimeGuardError::Api`: invalid ID or other API errors
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerInfo, RuntimeGuardError>> + Send;

    /// Forcibly terminates a container (SIGKILL).
    ///
    /// # Errors
    ///
    /// - `RuntimeGuardError::NotFound`: container does not exist
    /// - `RuntimeGuardError::ActionFailed`: the runtime reported an error
    fn kill_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), RuntimeGuardError>> + Send;

    /// Detaches a container from every network it is connected to.
    ///
    /// Returns the number of networks detached. `Ok(0)` means the container
    /// had no attachments — nothing to do, not a failure.
    ///
    /// # Errors
    ///
    /// - `RuntimeGuardError::NotFound`: container does not exist
    /// - `RuntimeGuardError::ActionFailed`: one or more disconnect calls
    ///   failed (all networks are still attempted before reporting)
    fn disconnect_all_networks(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<usize, RuntimeGuardError>> + Send;

    /// Checks runtime daemon connectivity.
    ///
    /// Used by the policy engine's `health_check()` implementation.
    fn ping(&self) -> impl Future<Output = Result<(), RuntimeGuardError>> + Send;
}

/// Production runtime client over the `bollard` Docker API.
///
/// Communicates with the daemon via a Unix socket. Internally uses
/// `Arc<bollard::Docker>` for safe sharing across async tasks. The same type
/// serves Docker Desktop and OrbStack — only the socket path differs (see
/// [`crate::detect`]).
#[derive(Debug)]
pub struct BollardRuntimeClient {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntimeClient {
    /// Connects using the platform default socket.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeGuardError::Connection` if the client cannot be
    /// constructed (socket missing, permission denied).
    pub fn connect_local() -> Result<Self, RuntimeGuardError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            RuntimeGuardError::Connection(format!("failed to connect to runtime: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, RuntimeGuardError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    RuntimeGuardError::Connection(format!(
                        "failed to connect to runtime at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }
}

impl RuntimeClient for BollardRuntimeClient {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeGuardError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: false, // Only running containers are actionable
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeGuardError::Api(format!("list containers failed: {e}")))?;

        let mut result = Vec::with_capacity(containers.len());
        for container in containers {
            let id = container.id.unwrap_or_default();
            let names = container.names.unwrap_or_default();
            let name = names
                .first()
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default();
            let image = container.image.unwrap_or_default();
            let status = container.state.unwrap_or_default();
            let created = container.created.unwrap_or_default();
            let created_at = SystemTime::UNIX_EPOCH
                + std::time::Duration::from_secs(u64::try_from(created).unwrap_or(0));

            result.push(ContainerInfo {
                id,
                name,
                image,
                status,
                created_at,
            });
        }

        Ok(result)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, RuntimeGuardError> {
        validate_container_id(id)?;

        let details = self.docker.inspect_container(id, None).await.map_err(|e| {
            if e.to_string().contains("404") {
                RuntimeGuardError::NotFound(id.to_owned())
            } else {
                RuntimeGuardError::Api(format!("inspect container failed: {e}"))
            }
        })?;

        let container_id = details.id.unwrap_or_default();
        let name = details
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let image = details.config.and_then(|c| c.image).unwrap_or_default();
        let status = details
            .state
            .and_then(|s| s.status)
            .map(|s| format!("{s:?}"))
            .unwrap_or_else(|| "unknown".to_owned());

        Ok(ContainerInfo {
            id: container_id,
            name,
            image,
            status,
            created_at: SystemTime::now(),
        })
    }

    async fn kill_container(&self, id: &str) -> Result<(), RuntimeGuardError> {
        validate_container_id(id)?;

        use bollard::container::KillContainerOptions;

        self.docker
            .kill_container(id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
            .map_err(|e| {
                if e.to_string().contains("404") {
                    RuntimeGuardError::NotFound(id.to_owned())
                } else {
                    RuntimeGuardError::ActionFailed {
                        container_id: id.to_owned(),
                        reason: format!("kill failed: {e}"),
                    }
                }
            })
    }

    async fn disconnect_all_networks(&self, id: &str) -> Result<usize, RuntimeGuardError> {
        validate_container_id(id)?;

        use bollard::network::DisconnectNetworkOptions;

        // Enumerate attachments first; the inspect doubles as the NotFound check.
        let details = self.docker.inspect_container(id, None).await.map_err(|e| {
            if e.to_string().contains("404") {
                RuntimeGuardError::NotFound(id.to_owned())
            } else {
                RuntimeGuardError::Api(format!("inspect container failed: {e}"))
            }
        })?;

        let networks: Vec<String> = details
            .network_settings
            .and_then(|ns| ns.networks)
            .map(|nets| nets.into_keys().collect())
            .unwrap_or_default();

        // Attempt every network even if some fail, to avoid leaving a
        // partially-connected container behind.
        let mut detached = 0usize;
        let mut errors = Vec::new();
        for network in &networks {
            let result = self
                .docker
                .disconnect_network(
                    network,
                    DisconnectNetworkOptions {
                        container: id.to_owned(),
                        force: true,
                    },
                )
                .await;
            match result {
                Ok(()) => {
                    tracing::info!(
                        container_id = id,
                        network = network.as_str(),
                        "disconnected container from network"
                    );
                    detached += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        container_id = id,
                        network = network.as_str(),
                        error = %e,
                        "failed to disconnect container from network"
                    );
                    errors.push(format!("{network}: {e}"));
                }
            }
        }

        if errors.is_empty() {
            Ok(detached)
        } else {
            Err(RuntimeGuardError::ActionFailed {
                container_id: id.to_owned(),
                reason: format!(
                    "failed to disconnect from {} network(s): {}",
                    errors.len(),
                    errors.join("; ")
                ),
            })
        }
    }

    async fn ping(&self) -> Result<(), RuntimeGuardError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeGuardError::Connection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// Configurable test double for [`RuntimeClient`].
///
/// Exported (not test-gated) because the policy engine's test suite drives
/// the dispatcher against it. Records every kill/quarantine call so tests can
/// assert which containers were acted on.
#[derive(Default)]
pub struct MockRuntimeClient {
    /// Containers returned by list/inspect.
    containers: Vec<ContainerInfo>,
    /// Networks each container is attached to (empty = no attachments).
    networks: HashMap<String, Vec<String>>,
    /// Simulate action failures.
    fail_actions: bool,
    /// Simulate an unreachable daemon.
    fail_ping: bool,
    /// Container IDs passed to kill_container.
    killed: Mutex<Vec<String>>,
    /// Container IDs passed to disconnect_all_networks.
    quarantined: Mutex<Vec<String>>,
}

impl MockRuntimeClient {
    /// Creates an empty mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds containers visible to list/inspect.
    pub fn with_containers(mut self, containers: Vec<ContainerInfo>) -> Self {
        self.containers = containers;
        self
    }

    /// Sets the networks a container is attached to.
    pub fn with_networks(mut self, container_id: &str, networks: Vec<String>) -> Self {
        self.networks.insert(container_id.to_owned(), networks);
        self
    }

    /// Makes every enforcement action fail.
    pub fn with_failing_actions(mut self) -> Self {
        self.fail_actions = true;
        self
    }

    /// Makes ping fail (unreachable daemon).
    pub fn with_failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    /// Container IDs that were passed to `kill_container`.
    pub fn killed(&self) -> Vec<String> {
        self.killed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Container IDs that were passed to `disconnect_all_networks`.
    pub fn quarantined(&self) -> Vec<String> {
        self.quarantined
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl RuntimeClient for MockRuntimeClient {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeGuardError> {
        Ok(self.containers.clone())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, RuntimeGuardError> {
        self.containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| RuntimeGuardError::NotFound(id.to_owned()))
    }

    async fn kill_container(&self, id: &str) -> Result<(), RuntimeGuardError> {
        if self.fail_actions {
            return Err(RuntimeGuardError::ActionFailed {
                container_id: id.to_owned(),
                reason: "mock failure".to_owned(),
            });
        }
        self.inspect_container(id).await?;
        self.killed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(id.to_owned());
        Ok(())
    }

    async fn disconnect_all_networks(&self, id: &str) -> Result<usize, RuntimeGuardError> {
        if self.fail_actions {
            return Err(RuntimeGuardError::ActionFailed {
                container_id: id.to_owned(),
                reason: "mock failure".to_owned(),
            });
        }
        self.inspect_container(id).await?;
        self.quarantined
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(id.to_owned());
        Ok(self.networks.get(id).map_or(0, Vec::len))
    }

    async fn ping(&self) -> Result<(), RuntimeGuardError> {
        if self.fail_ping {
            return Err(RuntimeGuardError::Connection("mock ping failure".to_owned()));
        }
        Ok(())
    }
}
