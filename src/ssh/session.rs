//! SSH session: a persistent shell channel that runs one command at a time
//! and returns its captured output, bounded by a per-call timeout.

use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::client::ClientHandler;
use super::error::SshError;

/// Maximum bytes buffered for a single command's output before it is
/// truncated; well above anything the metric battery or fingerprinter emits.
const MAX_OUTPUT_SIZE: usize = 65_536;

/// Result of running one command on the remote shell.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
}

/// A live SSH connection with one persistent shell channel, shared across
/// sequential `run` calls. Each call writes a command followed by a unique
/// end-of-output marker and reads until that marker reappears in the echo.
pub struct SshSession {
    handle: Handle<ClientHandler>,
    channel: Mutex<Option<Channel<Msg>>>,
}

impl SshSession {
    pub fn new(handle: Handle<ClientHandler>) -> Self {
        Self {
            handle,
            channel: Mutex::new(None),
        }
    }

    /// Open the persistent shell channel, disabling the prompt/echo so output
    /// is unambiguous. Idempotent: a second call is a no-op if already open.
    pub async fn open(&self, timeout_budget: Duration) -> Result<(), SshError> {
        let mut guard = self.channel.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let channel = timeout(timeout_budget, self.handle.channel_open_session())
            .await
            .map_err(|_| SshError::Timeout("timed out opening shell channel".to_string()))?
            .map_err(|e| SshError::ChannelError(format!("failed to open channel: {}", e)))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::ChannelError(format!("failed to request shell: {}", e)))?;

        let init_cmd = "export PS1=''; export PS2=''; stty -echo 2>/dev/null; export LANG=C\n";
        channel
            .data(init_cmd.as_bytes())
            .await
            .map_err(|e| SshError::ChannelError(format!("failed to init shell: {}", e)))?;

        tokio::time::sleep(Duration::from_millis(200)).await;

        *guard = Some(channel);
        Ok(())
    }

    /// Run a single command on the persistent shell, returning its output up
    /// to (not including) the marker line. A timeout ends the read but does
    /// not invalidate the session — a later `run` call can reuse it.
    pub async fn run(&self, command: &str, command_timeout: Duration) -> Result<CommandOutput, SshError> {
        let mut guard = self.channel.lock().await;
        let channel = guard
            .as_mut()
            .ok_or_else(|| SshError::ChannelError("shell channel not open".to_string()))?;

        let marker = format!("__END_{}__", uuid::Uuid::new_v4().simple());
        let full_command = format!("{}\necho {}\n", command, marker);

        channel
            .data(full_command.as_bytes())
            .await
            .map_err(|e| SshError::ChannelError(format!("failed to write command: {}", e)))?;

        let mut stdout = Vec::new();
        let result = timeout(command_timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.extend_from_slice(&data);
                        if stdout.len() > MAX_OUTPUT_SIZE {
                            stdout.truncate(MAX_OUTPUT_SIZE);
                            break;
                        }
                        if let Ok(s) = std::str::from_utf8(&stdout) {
                            if s.contains(&marker) {
                                break;
                            }
                        }
                    }
                    Some(ChannelMsg::ExtendedData { .. }) => {}
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => {
                        return Err(SshError::ChannelError("shell channel closed".to_string()));
                    }
                    Some(_) => {}
                    None => {
                        return Err(SshError::ChannelError("shell channel returned no message".to_string()));
                    }
                }
            }
            Ok(())
        })
        .await;

        match result {
            Err(_) => Err(SshError::Timeout(format!("command timed out: {}", command))),
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => {
                let full = String::from_utf8_lossy(&stdout).into_owned();
                let trimmed = match full.find(&marker) {
                    Some(end) => full[..end].to_string(),
                    None => full,
                };
                // Drop the echoed command line itself, if the remote shell echoed it.
                let cleaned = trimmed
                    .lines()
                    .filter(|l| !l.trim().is_empty() && *l != command)
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(CommandOutput { stdout: cleaned })
            }
        }
    }

    /// Close the persistent channel. Idempotent.
    pub async fn close(&self) {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.take() {
            debug!("closing persistent shell channel");
            let _ = channel.eof().await;
            let _ = channel.close().await;
        }
    }
}
