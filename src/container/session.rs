//! Interactive shell sessions attached to units
//!
//! A session is a raw byte stream to a shell running inside a unit. Input is
//! written line by line; output is polled with a short timeout, because callers
//! reach the agent over plain request/response HTTP with no push channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{Fuse, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::runtime::{ContainerRuntime, ShellInput, ShellOutput};

use super::{ContainerError, UnitManager};

/// Read half of a session plus bytes received but not yet handed out
struct OutputState {
    stream: Fuse<ShellOutput>,
    pending: Vec<u8>,
}

/// One interactive shell attached to a unit
pub struct Session {
    /// Unique session ID
    pub session_id: Uuid,

    /// Name of the unit the shell runs in. Not an ownership link: the unit may
    /// be deleted while the session is still registered.
    pub unit_name: String,

    /// When the session was opened
    pub created_at: DateTime<Utc>,

    /// Set once the session is closed; later I/O reports NotFound
    closed: AtomicBool,

    input: Mutex<ShellInput>,

    output: Mutex<OutputState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("unit_name", &self.unit_name)
            .field("created_at", &self.created_at)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Session {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Thread-safe session handle
pub type SessionHandle = Arc<Session>;

/// Session registry of one agent
pub struct SessionManager {
    units: Arc<UnitManager>,
    runtime: Arc<dyn ContainerRuntime>,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    read_timeout: Duration,
    chunk_size: usize,
}

impl SessionManager {
    pub fn new(
        units: Arc<UnitManager>,
        runtime: Arc<dyn ContainerRuntime>,
        read_timeout: Duration,
        chunk_size: usize,
    ) -> Self {
        Self {
            units,
            runtime,
            sessions: RwLock::new(HashMap::new()),
            read_timeout,
            chunk_size,
        }
    }

    /// Attach a new shell to a unit and register it under a fresh ID
    pub async fn open(&self, unit_name: &str) -> Result<Uuid, ContainerError> {
        let unit = self.units.get(unit_name).await?;

        let stream = self
            .runtime
            .attach_shell(&unit.container_id)
            .await
            .map_err(ContainerError::runtime)?;

        let session_id = {
            let mut sessions = self.sessions.write().await;
            let mut session_id = Uuid::new_v4();
            while sessions.contains_key(&session_id) {
                session_id = Uuid::new_v4();
            }

            sessions.insert(
                session_id,
                Arc::new(Session {
                    session_id,
                    unit_name: unit.name.clone(),
                    created_at: Utc::now(),
                    closed: AtomicBool::new(false),
                    input: Mutex::new(stream.input),
                    output: Mutex::new(OutputState {
                        stream: stream.output.fuse(),
                        pending: Vec::new(),
                    }),
                }),
            );
            session_id
        };

        metrics::record_session_opened();
        info!(session_id = %session_id, unit = %unit.name, "Shell session opened");

        Ok(session_id)
    }

    /// Send one line of input to the shell. A trailing newline is appended.
    ///
    /// Success means the bytes reached the stream, not that the command ran.
    pub async fn write(&self, session_id: &Uuid, text: &str) -> Result<(), ContainerError> {
        let session = self.lookup(session_id).await?;

        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');

        let mut input = session.input.lock().await;
        if session.is_closed() {
            return Err(session_not_found(session_id));
        }

        let written = async {
            input.write_all(&line).await?;
            input.flush().await
        }
        .await;

        written.map_err(|e| {
            warn!(session_id = %session_id, error = %e, "Shell input failed");
            ContainerError::Runtime(format!("Shell input failed: {}", e))
        })
    }

    /// Poll for output: wait up to the read timeout and return whatever arrived,
    /// at most one chunk. Empty means nothing arrived in time.
    ///
    /// Bytes beyond the chunk size stay buffered for the next poll; bytes that
    /// arrive between polls wait in the transport.
    pub async fn read(&self, session_id: &Uuid) -> Result<Vec<u8>, ContainerError> {
        let session = self.lookup(session_id).await?;

        let mut output = session.output.lock().await;
        if session.is_closed() {
            return Err(session_not_found(session_id));
        }

        if output.pending.is_empty() {
            match tokio::time::timeout(self.read_timeout, output.stream.next()).await {
                Err(_) => return Ok(Vec::new()),
                Ok(None) => {
                    debug!(session_id = %session_id, "Shell output stream ended");
                    return Err(ContainerError::Runtime(
                        "Shell stream closed by the unit".to_string(),
                    ));
                }
                Ok(Some(Err(e))) => {
                    warn!(session_id = %session_id, error = %e, "Shell output failed");
                    return Err(ContainerError::Runtime(format!("Shell output failed: {}", e)));
                }
                Ok(Some(Ok(chunk))) => output.pending.extend_from_slice(&chunk),
            }
        }

        let take = output.pending.len().min(self.chunk_size);
        Ok(output.pending.drain(..take).collect())
    }

    /// Deregister a session and close its stream. A second close is NotFound.
    ///
    /// Shutting the input down waits for the input lock, so a write stuck on a
    /// stalled stream holds up the close until that write finishes.
    pub async fn close(&self, session_id: &Uuid) -> Result<(), ContainerError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| session_not_found(session_id))?;

        session.closed.store(true, Ordering::Release);

        if let Err(e) = session.input.lock().await.shutdown().await {
            debug!(session_id = %session_id, error = %e, "Shell input shutdown failed; ignored");
        }

        metrics::record_session_closed();
        info!(
            session_id = %session_id,
            unit = %session.unit_name,
            "Shell session closed"
        );

        Ok(())
    }

    /// Number of registered sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn lookup(&self, session_id: &Uuid) -> Result<SessionHandle, ContainerError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }
}

fn session_not_found(session_id: &Uuid) -> ContainerError {
    ContainerError::NotFound(format!("Session {} not found", session_id))
}
