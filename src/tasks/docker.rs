use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions,
        StartContainerOptions,
    },
    errors::Error as BollardError,
    image::CreateImageOptions,
    models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum},
};
use futures_util::stream::StreamExt;

use super::runtime::Runtime;
use super::types::{self, ContainerConfig, RuntimeError};

impl From<BollardError> for RuntimeError {
    fn from(err: BollardError) -> Self {
        RuntimeError::Failed(err.to_string())
    }
}

/// 404 means the container no longer exists, 304 that it was already stopped.
fn is_gone(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 304 | 404,
            ..
        }
    )
}

fn restart_policy(policy: types::RestartPolicy) -> RestartPolicy {
    let name = match policy {
        types::RestartPolicy::No => RestartPolicyNameEnum::NO,
        types::RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        types::RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        types::RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    };

    RestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

fn port_key(port: &str) -> String {
    if port.contains('/') {
        port.to_string()
    } else {
        format!("{}/tcp", port)
    }
}

fn container_config(config: &ContainerConfig) -> Config<String> {
    let host_config = HostConfig {
        restart_policy: Some(restart_policy(config.restart_policy)),
        memory: (config.memory > 0).then_some(config.memory),
        nano_cpus: (config.cpu > 0.0).then(|| (config.cpu * 1_000_000_000.0) as i64),
        port_bindings: (!config.port_bindings.is_empty()).then(|| {
            config
                .port_bindings
                .iter()
                .map(|(container, host)| {
                    (
                        port_key(container),
                        Some(vec![PortBinding {
                            host_ip: None,
                            host_port: Some(host.clone()),
                        }]),
                    )
                })
                .collect()
        }),
        publish_all_ports: Some(true),
        ..Default::default()
    };

    Config {
        image: Some(config.image.clone()),
        cmd: (!config.cmd.is_empty()).then(|| config.cmd.clone()),
        env: Some(config.env.clone()),
        exposed_ports: Some(
            config
                .exposed_ports
                .iter()
                .map(|port| (format!("{}/tcp", port), HashMap::new()))
                .collect(),
        ),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Runtime backed by the local Docker engine.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_local_defaults()?;
        Ok(DockerRuntime { client })
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        tracing::info!(image, "Pulling image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            let info = msg.map_err(|e| {
                tracing::error!(image, error = %e, "Image pull failed");
                RuntimeError::from(e)
            })?;
            if let Some(status) = info.status {
                tracing::debug!(image, status = %status, "Pull progress");
            }
        }

        tracing::info!(image, "Image pulled");
        Ok(())
    }

    async fn remove(&self, container_id: &str, force: bool) -> Result<(), BollardError> {
        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    v: true,
                    force,
                    ..Default::default()
                }),
            )
            .await
    }

    /// Forward the container's stdout/stderr to the tracing sink until it exits.
    fn follow_logs(&self, container_id: &str) {
        let client = self.client.clone();
        let container_id = container_id.to_string();

        tokio::spawn(async move {
            let mut logs = client.logs(
                &container_id,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    ..Default::default()
                }),
            );

            while let Some(line) = logs.next().await {
                match line {
                    Ok(output) => {
                        let text = output.to_string();
                        tracing::info!(target: "container", container_id = %container_id, "{}", text.trim_end());
                    }
                    Err(e) => {
                        tracing::debug!(container_id = %container_id, error = %e, "Log stream closed");
                        break;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn start(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        self.pull(&config.image).await?;

        let options = Some(CreateContainerOptions {
            name: config.name.clone(),
            ..Default::default()
        });

        let container_id = match self
            .client
            .create_container(options, container_config(config))
            .await
        {
            Ok(resp) => {
                tracing::info!(container_id = %resp.id, name = %config.name, "Container created");
                resp.id
            }
            Err(e) => {
                tracing::error!(image = %config.image, error = %e, "Error creating container");
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .client
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
        {
            tracing::error!(container_id = %container_id, error = %e, "Error starting container");
            if let Err(cleanup) = self.remove(&container_id, true).await {
                tracing::warn!(container_id = %container_id, error = %cleanup, "Cleanup after failed start did not complete");
            }
            return Err(e.into());
        }

        tracing::info!(container_id = %container_id, "Container started");
        self.follow_logs(&container_id);

        Ok(container_id)
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        tracing::info!(container_id, "Stopping container");

        match self.client.stop_container(container_id, None).await {
            Ok(()) => {}
            Err(e) if is_gone(&e) => {
                tracing::debug!(container_id, error = %e, "Container already stopped");
            }
            Err(e) => {
                tracing::error!(container_id, error = %e, "Error stopping container");
                return Err(e.into());
            }
        }

        match self.remove(container_id, false).await {
            Ok(()) => {}
            Err(e) if is_gone(&e) => {
                tracing::debug!(container_id, error = %e, "Container already removed");
            }
            Err(e) => {
                tracing::error!(container_id, error = %e, "Error removing container");
                return Err(e.into());
            }
        }

        tracing::info!(container_id, "Container stopped and removed");
        Ok(())
    }
}
