//! Daemon side of the control socket.
//!
//! One long-lived listener accepts connections, reads a single trigger
//! request per connection and streams events back while the coordinator
//! runs the job. Connections are handled on their own tasks; the
//! single-flight guard, not the listener, decides whether a second
//! trigger gets through.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream, unix::OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::coordinator::RunCoordinator;
use crate::control::protocol::{ControlEvent, TriggerRequest};
use crate::domain::events::{ProgressUpdate, TriggerOutcome};

/// Progress updates buffered per connection before `try_send` drops them.
const PROGRESS_BUFFER: usize = 32;
/// Bind attempts before the stale socket file is force-removed.
const BIND_ATTEMPTS: u32 = 3;

pub struct ControlListener {
    coordinator: Arc<RunCoordinator>,
    socket_path: PathBuf,
    shutdown: CancellationToken,
}

impl ControlListener {
    pub fn new(
        coordinator: Arc<RunCoordinator>,
        socket_path: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            socket_path,
            shutdown,
        }
    }

    /// Bind and serve until the shutdown token fires, then remove the
    /// socket file.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        tracing::info!("Control socket listening at {}", self.socket_path.display());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let session = Uuid::new_v4();
                            let coordinator = self.coordinator.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, coordinator, session).await {
                                    tracing::warn!("Control session {} failed: {:#}", session, e);
                                }
                            });
                        }
                        Err(e) => tracing::warn!("Control socket accept failed: {}", e),
                    }
                }
            }
        }

        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            tracing::debug!("Control socket already gone at shutdown: {}", e);
        }
        tracing::info!("Control socket closed");
        Ok(())
    }

    /// Bind the socket, recovering from a stale file left by an
    /// uncleanly-terminated predecessor. A path that answers connections
    /// belongs to a live daemon and is left alone.
    async fn bind(&self) -> Result<UnixListener> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating socket directory {}", parent.display()))?;
        }

        for attempt in 1..=BIND_ATTEMPTS {
            match UnixListener::bind(&self.socket_path) {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    if UnixStream::connect(&self.socket_path).await.is_ok() {
                        bail!(
                            "another instance is listening on {}",
                            self.socket_path.display()
                        );
                    }
                    tracing::warn!(
                        "Removing stale control socket {} (attempt {})",
                        self.socket_path.display(),
                        attempt
                    );
                    let _ = tokio::fs::remove_file(&self.socket_path).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("binding control socket {}", self.socket_path.display())
                    });
                }
            }
        }

        let _ = tokio::fs::remove_file(&self.socket_path).await;
        UnixListener::bind(&self.socket_path).with_context(|| {
            format!(
                "binding control socket {} after cleanup",
                self.socket_path.display()
            )
        })
    }
}

async fn handle_connection(
    stream: UnixStream,
    coordinator: Arc<RunCoordinator>,
    session: Uuid,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let Some(line) = lines.next_line().await? else {
        tracing::debug!("Control session {}: closed without a request", session);
        return Ok(());
    };

    let request: TriggerRequest = match serde_json::from_str(&line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Control session {}: unreadable request: {}", session, e);
            write_event(&mut writer, &ControlEvent::Unsupported).await?;
            return Ok(());
        }
    };

    let Some(kind) = request.kind() else {
        tracing::info!(
            "Control session {}: unsupported command {:?}",
            session,
            request.trigger
        );
        write_event(&mut writer, &ControlEvent::Unsupported).await?;
        return Ok(());
    };

    tracing::info!("Control session {}: triggering {} check", session, kind);

    let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(PROGRESS_BUFFER);
    let trigger = coordinator.trigger(kind, Some(tx));
    tokio::pin!(trigger);

    let mut progress_open = true;
    let outcome = loop {
        tokio::select! {
            outcome = &mut trigger => break outcome,
            update = rx.recv(), if progress_open => {
                match update {
                    Some(update) => {
                        write_event(&mut writer, &ControlEvent::progress(update)).await?;
                    }
                    None => progress_open = false,
                }
            }
        }
    };

    // Flush progress the run emitted after the last poll.
    while let Ok(update) = rx.try_recv() {
        write_event(&mut writer, &ControlEvent::progress(update)).await?;
    }

    let event = match outcome {
        TriggerOutcome::AlreadyRunning => ControlEvent::AlreadyRunning,
        TriggerOutcome::Finished(outcome) => ControlEvent::from_outcome(outcome),
    };
    tracing::info!("Control session {}: {} check resolved", session, kind);
    write_event(&mut writer, &event).await?;
    Ok(())
}

async fn write_event(writer: &mut OwnedWriteHalf, event: &ControlEvent) -> Result<()> {
    let mut line = serde_json::to_string(event).context("encoding control event")?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}
