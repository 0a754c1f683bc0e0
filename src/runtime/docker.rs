//! Docker adapter over the bollard Engine API client

use std::io;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::ContainerStateStatusEnum;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

use super::{ContainerRuntime, RuntimeUnit, ShellStream, UnitStatus};

/// Docker runtime backing the host agent
pub struct DockerRuntime {
    client: Docker,
    image: String,
    idle_command: Vec<String>,
    shell: String,
    stop_timeout_secs: i64,
}

impl DockerRuntime {
    /// Connect to the configured socket, or the engine default when none is set
    pub fn connect(config: &AgentConfig) -> Result<Self> {
        let client = match config.docker_socket.as_deref() {
            Some(socket) => {
                Docker::connect_with_socket(socket, 120, bollard::API_DEFAULT_VERSION)
                    .with_context(|| format!("Failed to connect to Docker socket {}", socket))?
            }
            None => Docker::connect_with_socket_defaults()
                .context("Failed to connect to Docker socket")?,
        };

        Ok(Self {
            client,
            image: config.image.clone(),
            idle_command: config.idle_command.clone(),
            shell: config.shell.clone(),
            stop_timeout_secs: config.stop_timeout_secs as i64,
        })
    }

    /// Engine version string, used at startup to verify the daemon is reachable
    pub async fn version(&self) -> Result<String> {
        let version = self.client.version().await.context("Docker daemon not reachable")?;
        Ok(format!(
            "Docker {} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        ))
    }

    fn parse_status(status: Option<ContainerStateStatusEnum>) -> UnitStatus {
        match status {
            Some(ContainerStateStatusEnum::CREATED) => UnitStatus::Created,
            Some(ContainerStateStatusEnum::RUNNING) => UnitStatus::Running,
            Some(ContainerStateStatusEnum::PAUSED) => UnitStatus::Paused,
            Some(ContainerStateStatusEnum::RESTARTING) => UnitStatus::Restarting,
            Some(ContainerStateStatusEnum::REMOVING) => UnitStatus::Removing,
            Some(ContainerStateStatusEnum::EXITED) => UnitStatus::Exited,
            Some(ContainerStateStatusEnum::DEAD) => UnitStatus::Dead,
            _ => UnitStatus::Unknown,
        }
    }

    async fn create_container(&self, name: &str) -> Result<String, bollard::errors::Error> {
        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(self.idle_command.clone()),
            tty: Some(true),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let response = self.client.create_container(Some(options), config).await?;
        Ok(response.id)
    }

    async fn pull_image(&self) -> Result<()> {
        info!(image = %self.image, "Pulling image");

        let options = CreateImageOptions {
            from_image: self.image.clone(),
            ..Default::default()
        };
        let mut progress = self.client.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            step.with_context(|| format!("Failed to pull image {}", self.image))?;
        }

        Ok(())
    }
}

fn log_bytes(output: LogOutput) -> Vec<u8> {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message.to_vec(),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_unit(&self, name: &str) -> Result<RuntimeUnit> {
        let id = match self.create_container(name).await {
            Ok(id) => id,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                self.pull_image().await?;
                self.create_container(name)
                    .await
                    .context("Failed to create container")?
            }
            Err(e) => return Err(e).context("Failed to create container"),
        };

        if let Err(e) = self
            .client
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
        {
            // Leave nothing behind for a unit that never became registered
            if let Err(cleanup) = self.force_remove(&id).await {
                warn!(
                    container_id = %id,
                    error = %cleanup,
                    "Cleanup of unstarted container failed"
                );
            }
            return Err(e).context("Failed to start container");
        }

        info!(container_id = %id, name = %name, "Container started");

        Ok(RuntimeUnit {
            id,
            name: name.to_string(),
        })
    }

    async fn status(&self, id: &str) -> Result<UnitStatus> {
        match self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => Ok(Self::parse_status(inspect.state.and_then(|s| s.status))),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(UnitStatus::Missing),
            Err(e) => Err(e.into()),
        }
    }

    async fn stop_and_remove(&self, id: &str) -> Result<()> {
        let options = StopContainerOptions {
            t: self.stop_timeout_secs,
        };
        self.client
            .stop_container(id, Some(options))
            .await
            .context("Failed to stop container")?;

        self.client
            .remove_container(id, None::<RemoveContainerOptions>)
            .await
            .context("Failed to remove container")?;

        info!(container_id = %id, "Container stopped and removed");
        Ok(())
    }

    async fn force_remove(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.client.remove_container(id, Some(options)).await?;
        debug!(container_id = %id, "Container force-removed");
        Ok(())
    }

    async fn exec(&self, id: &str, command: &str) -> Result<String> {
        let exec_options = CreateExecOptions {
            cmd: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                command.to_string(),
            ]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.client.create_exec(id, exec_options).await?;
        let mut output = Vec::new();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self.client.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => output.extend_from_slice(&log_bytes(chunk)),
                    Err(e) => {
                        warn!(container_id = %id, error = %e, "Exec output stream failed");
                        return Err(e.into());
                    }
                }
            }
        }

        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn attach_shell(&self, id: &str) -> Result<ShellStream> {
        let exec_options = CreateExecOptions {
            cmd: Some(vec![self.shell.clone()]),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            ..Default::default()
        };

        let exec = self.client.create_exec(id, exec_options).await?;

        match self.client.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { output, input } => {
                let output = output.map(|chunk| {
                    chunk
                        .map(log_bytes)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                });
                debug!(container_id = %id, exec_id = %exec.id, "Shell attached");
                Ok(ShellStream::new(input, Box::pin(output)))
            }
            StartExecResults::Detached => {
                anyhow::bail!("Shell exec started detached; no stream to attach")
            }
        }
    }
}
