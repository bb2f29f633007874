//! Client side of the control socket.
//!
//! Connects, writes one trigger request and reads events until a
//! terminal one arrives. Progress lines are handed to a callback so the
//! binary can render them without owning the wire format.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::control::protocol::{ControlEvent, TriggerRequest};

pub struct ControlClient {
    socket_path: PathBuf,
}

impl ControlClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send `command` and wait for the run to resolve. Every progress
    /// event is passed to `on_progress` as it arrives; the first
    /// non-progress event ends the exchange.
    pub async fn trigger(
        &self,
        command: &str,
        mut on_progress: impl FnMut(&str),
    ) -> Result<ControlEvent> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| {
                format!(
                    "connecting to control socket {} (is the daemon running?)",
                    self.socket_path.display()
                )
            })?;
        let (reader, mut writer) = stream.into_split();

        let mut request = serde_json::to_string(&TriggerRequest::new(command))
            .context("encoding trigger request")?;
        request.push('\n');
        writer
            .write_all(request.as_bytes())
            .await
            .context("sending trigger request")?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let event: ControlEvent = serde_json::from_str(&line)
                .with_context(|| format!("unreadable control event: {line}"))?;
            match event {
                ControlEvent::Progress { text } => on_progress(&text),
                terminal => return Ok(terminal),
            }
        }
        bail!("daemon closed the connection before a terminal event")
    }
}
