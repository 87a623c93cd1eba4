use async_trait::async_trait;

use super::types::{ContainerConfig, RuntimeError};

/// Container engine as seen by a worker.
///
/// Implementations own no orchestration state. Callers bound every call with
/// their own deadline.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Pull, create and start a container, returning its id.
    async fn start(&self, config: &ContainerConfig) -> Result<String, RuntimeError>;

    /// Stop and remove a container. Stopping an id that is already gone
    /// succeeds.
    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError>;
}
