//! Control socket: server (during `packfetch start`) and client (for `pause` / `cancel`).
//! Protocol: one line per command, "pause <job>" or "cancel <job>"; the listener
//! answers each with one line: "ok", "unknown-job" (another job is running here) or
//! "error" (malformed command).

use anyhow::Result;
use packfetch_core::JobController;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVerb {
    Pause,
    Cancel,
}

impl ControlVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlVerb::Pause => "pause",
            ControlVerb::Cancel => "cancel",
        }
    }
}

pub const REPLY_OK: &str = "ok";
pub const REPLY_UNKNOWN_JOB: &str = "unknown-job";
pub const REPLY_ERROR: &str = "error";

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse one protocol line. Malformed lines yield None.
pub fn parse_command(line: &str) -> Option<(ControlVerb, &str)> {
    let (verb, job) = line.trim().split_once(' ')?;
    let job = job.trim();
    if job.is_empty() {
        return None;
    }
    match verb {
        "pause" => Some((ControlVerb::Pause, job)),
        "cancel" => Some((ControlVerb::Cancel, job)),
        _ => None,
    }
}

async fn apply(controller: &JobController, verb: ControlVerb) {
    let res = match verb {
        ControlVerb::Pause => controller.request_pause().await.map(|_| ()),
        ControlVerb::Cancel => controller.cancel().await,
    };
    if let Err(e) = res {
        tracing::warn!(job = %controller.spec().name, "control {}: {:#}", verb.as_str(), e);
    }
}

/// Listener bound for the lifetime of a foreground run; removes the socket file on drop.
pub struct ControlListener {
    path: PathBuf,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Bind `path` and forward "pause <job>" / "cancel <job>" lines addressed to this
/// controller's job. Lines for other jobs are answered "unknown-job" and not applied.
pub fn spawn_control_listener(
    controller: JobController,
    path: impl AsRef<Path>,
) -> Result<ControlListener> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let controller = controller.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut reader = BufReader::new(read).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            let reply = match parse_command(&line) {
                                Some((verb, job)) if job == controller.spec().name => {
                                    tracing::info!(job, "control socket: {}", verb.as_str());
                                    apply(&controller, verb).await;
                                    REPLY_OK
                                }
                                Some((_, job)) => {
                                    tracing::debug!(job, "control socket: not our job");
                                    REPLY_UNKNOWN_JOB
                                }
                                None => {
                                    tracing::debug!("control socket: ignored {:?}", line);
                                    REPLY_ERROR
                                }
                            };
                            let reply = format!("{}\n", reply);
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(ControlListener { path, task })
}

/// Send "<verb> <job>\n" to the control socket. Returns true only when the listener
/// answers "ok": false when nobody is listening (no socket file, or a stale one left
/// by a crashed process) or the foreground run belongs to another job.
pub async fn send_command(socket_path: &Path, verb: ControlVerb, job: &str) -> Result<bool> {
    if !socket_path.exists() {
        return Ok(false);
    }
    let mut stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound) => {
            return Ok(false)
        }
        Err(e) => return Err(e.into()),
    };
    let msg = format!("{} {}\n", verb.as_str(), job);
    stream.write_all(msg.as_bytes()).await?;
    stream.shutdown().await?;

    let mut reply = String::new();
    let mut reader = BufReader::new(stream);
    match tokio::time::timeout(REPLY_TIMEOUT, reader.read_line(&mut reply)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            tracing::warn!(path = %socket_path.display(), "control socket: no reply");
            return Ok(false);
        }
    }
    let reply = reply.trim();
    if reply != REPLY_OK {
        tracing::debug!(job, reply, "control socket: command not applied");
    }
    Ok(reply == REPLY_OK)
}
