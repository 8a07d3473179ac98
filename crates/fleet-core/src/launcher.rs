//! Orchestrator process launch.
//!
//! [`LaunchPlan`] is the fully resolved invocation (arguments and
//! environment); a [`ProcessLauncher`] turns it into a running
//! [`RunProcess`] whose combined stdout/stderr can be read line by line.

use std::io::PipeReader;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::FleetConfig;

/// Lines buffered between the pipe reader and the session.
const PIPE_BUFFER_LINES: usize = 64;

/// Errors raised before any output is produced.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("playbook not found: {path}")]
    PlaybookNotFound { path: String },

    #[error("orchestrator executable not found: {program}")]
    ExecutableNotFound { program: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

/// Trim a restriction; blank means "no restriction".
pub fn normalize_restriction(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A resolved orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub playbook_path: PathBuf,
    pub inventory_path: PathBuf,
    /// Host/group expression passed as `--limit`, already trimmed.
    pub limit: Option<String>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchPlan {
    pub fn new(
        config: &FleetConfig,
        playbook_path: impl Into<PathBuf>,
        inventory_path: impl Into<PathBuf>,
        host_restriction: Option<&str>,
    ) -> Self {
        let env = vec![
            ("ANSIBLE_HOST_KEY_CHECKING".to_string(), "False".to_string()),
            ("ANSIBLE_NOCOLOR".to_string(), "1".to_string()),
            ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
            (
                "ANSIBLE_CONFIG".to_string(),
                config.ansible_config.display().to_string(),
            ),
        ];
        Self {
            program: config.ansible_playbook_bin.clone(),
            playbook_path: playbook_path.into(),
            inventory_path: inventory_path.into(),
            limit: normalize_restriction(host_restriction),
            env,
        }
    }

    /// `-i <inventory> <playbook> [--limit <expr>]`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.inventory_path.display().to_string(),
            self.playbook_path.display().to_string(),
        ];
        if let Some(limit) = &self.limit {
            args.push("--limit".to_string());
            args.push(limit.clone());
        }
        args
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A running orchestrator process.
#[async_trait]
pub trait RunProcess: Send {
    /// Next output line without its terminator, or `None` once every
    /// output stream has closed.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;

    /// Wait for exit. Processes killed by a signal report `-1`.
    async fn wait(&mut self) -> std::io::Result<i32>;

    /// Kill the process and reap it.
    async fn terminate(&mut self) -> std::io::Result<()>;
}

/// Starts orchestrator processes.
pub trait ProcessLauncher: Send + Sync {
    /// Start `plan`. Must fail with [`LaunchError::PlaybookNotFound`]
    /// before spawning anything when the playbook is absent.
    fn launch(&self, plan: &LaunchPlan) -> LaunchResult<Box<dyn RunProcess>>;
}

/// Launches the real `ansible-playbook` executable via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsibleLauncher;

impl ProcessLauncher for AnsibleLauncher {
    fn launch(&self, plan: &LaunchPlan) -> LaunchResult<Box<dyn RunProcess>> {
        if !plan.playbook_path.exists() {
            return Err(LaunchError::PlaybookNotFound {
                path: plan.playbook_path.display().to_string(),
            });
        }
        Ok(Box::new(ChildProcess::spawn(plan)?))
    }
}

/// Child process writing stdout and stderr into one shared pipe.
///
/// Both descriptors refer to the same pipe, so lines are read back in the
/// order the process wrote them.
pub struct ChildProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
    pump: JoinHandle<()>,
}

impl ChildProcess {
    pub fn spawn(plan: &LaunchPlan) -> LaunchResult<Self> {
        let spawn_err = |source: std::io::Error| LaunchError::Spawn {
            program: plan.program.clone(),
            source,
        };
        let (reader, writer) = std::io::pipe().map_err(spawn_err)?;
        let writer_err = writer.try_clone().map_err(spawn_err)?;

        let mut cmd = Command::new(&plan.program);
        cmd.args(plan.args())
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err)
            .kill_on_drop(true);

        debug!(
            program = %plan.program,
            args = ?plan.args(),
            "spawning orchestrator"
        );

        let spawned = cmd.spawn();
        // The command owns the parent's copies of the write end; EOF only
        // arrives once they are closed.
        drop(cmd);
        let child = spawned.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LaunchError::ExecutableNotFound {
                    program: plan.program.clone(),
                }
            } else {
                spawn_err(e)
            }
        })?;

        let (tx, lines) = mpsc::channel(PIPE_BUFFER_LINES);
        let pump = spawn_pump(reader, tx).map_err(spawn_err)?;

        Ok(Self { child, lines, pump })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[cfg(unix)]
fn spawn_pump(reader: PipeReader, tx: mpsc::Sender<String>) -> std::io::Result<JoinHandle<()>> {
    let file = std::fs::File::from(std::os::fd::OwnedFd::from(reader));
    let receiver = tokio::net::unix::pipe::Receiver::from_file(file)?;
    Ok(tokio::spawn(pump_lines(receiver, tx)))
}

#[cfg(not(unix))]
fn spawn_pump(reader: PipeReader, tx: mpsc::Sender<String>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::task::spawn_blocking(move || {
        let mut reader = std::io::BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match std::io::BufRead::read_until(&mut reader, b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.blocking_send(decode_line(&buf)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "orchestrator output read failed");
                    break;
                }
            }
        }
    }))
}

/// Strip the terminator; invalid UTF-8 is replaced rather than ending the
/// stream.
fn decode_line(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Forward lines from `reader` until EOF or until the receiver is gone.
async fn pump_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(decode_line(&buf)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "orchestrator output read failed");
                break;
            }
        }
    }
}

#[async_trait]
impl RunProcess for ChildProcess {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        Ok(self.lines.recv().await)
    }

    async fn wait(&mut self) -> std::io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        self.pump.abort();
        self.child.kill().await
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Resolve the orchestrator binary name against `PATH` for diagnostics.
pub fn describe_program(program: &str) -> String {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.display().to_string();
    }
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|candidate| candidate.is_file())
        })
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| format!("{program} (not on PATH)"))
}
