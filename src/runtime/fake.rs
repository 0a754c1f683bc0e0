//! In-memory container runtime for tests
//!
//! Containers are plain map entries; shells are duplex pipes served by a tiny
//! line-oriented interpreter that understands `echo` and `pwd`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio_util::io::ReaderStream;

use super::{ContainerRuntime, RuntimeUnit, ShellStream, UnitStatus};

#[derive(Default)]
pub(crate) struct FakeRuntime {
    containers: Mutex<HashMap<String, (String, UnitStatus)>>,
    next_id: AtomicU64,
    create_delay: Option<Duration>,
    fail_create: Option<String>,
    pub removed: Mutex<Vec<String>>,
    shells: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.fail_create = Some(message.to_string());
        self
    }

    /// Force the status of every container named `name`
    pub fn set_status(&self, name: &str, status: UnitStatus) {
        let mut containers = self.containers.lock().unwrap();
        for (container_name, state) in containers.values_mut() {
            if container_name == name {
                *state = status;
            }
        }
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    /// Kill every attached shell process, leaving their sessions dangling
    pub fn kill_shells(&self) {
        for shell in self.shells.lock().unwrap().drain(..) {
            shell.abort();
        }
    }

    fn lookup(&self, id: &str) -> Result<UnitStatus> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .map(|(_, status)| *status)
            .ok_or_else(|| anyhow::anyhow!("No such container: {}", id))
    }
}

async fn serve_shell(shell_side: DuplexStream) {
    let (reader, mut writer) = tokio::io::split(shell_side);
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut reply = format!("/ # {}\r\n", line);
        if let Some(text) = line.strip_prefix("echo ") {
            reply.push_str(text);
            reply.push_str("\r\n");
        } else if line.trim() == "pwd" {
            reply.push_str("/\r\n");
        }
        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_unit(&self, name: &str) -> Result<RuntimeUnit> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref message) = self.fail_create {
            anyhow::bail!("{}", message);
        }

        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("{:0>64}", format!("c{}", n));
        self.containers
            .lock()
            .unwrap()
            .insert(id.clone(), (name.to_string(), UnitStatus::Running));

        Ok(RuntimeUnit {
            id,
            name: name.to_string(),
        })
    }

    async fn status(&self, id: &str) -> Result<UnitStatus> {
        Ok(self.lookup(id).unwrap_or(UnitStatus::Missing))
    }

    async fn stop_and_remove(&self, id: &str) -> Result<()> {
        self.lookup(id)?;
        self.containers.lock().unwrap().remove(id);
        self.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn force_remove(&self, id: &str) -> Result<()> {
        self.stop_and_remove(id).await
    }

    async fn exec(&self, id: &str, command: &str) -> Result<String> {
        self.lookup(id)?;
        match command.trim() {
            "pwd" => Ok("/\n".to_string()),
            other => Ok(format!("ran: {}\n", other)),
        }
    }

    async fn attach_shell(&self, id: &str) -> Result<ShellStream> {
        let status = self.lookup(id)?;
        if !status.is_running() {
            anyhow::bail!("Container {} is not running", id);
        }

        let (agent_side, shell_side) = tokio::io::duplex(64 * 1024);
        self.shells
            .lock()
            .unwrap()
            .push(tokio::spawn(serve_shell(shell_side)));

        let (reader, writer) = tokio::io::split(agent_side);
        let output = ReaderStream::new(reader).map(|chunk| chunk.map(|bytes| bytes.to_vec()));

        Ok(ShellStream::new(Box::pin(writer), Box::pin(output)))
    }
}
