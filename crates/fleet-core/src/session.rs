//! Run sessions: one spawned task per requested playbook run.
//!
//! ```text
//! Starting ──(playbook missing)──────────────┐
//!    │                                       v
//!    └──> Streaming ──(exit code)──> Finished(Success|Failure) ──> Reported
//! ```
//!
//! A session pushes [`ClassifiedLine`]s into a bounded channel held by the
//! client as a [`RunFeed`]. Lines arrive in process-output order, each
//! exactly once. The feed is closed before the outcome is handed to the
//! history recorder, so a recorder failure can never hide delivered output.

use std::sync::Arc;
use std::time::Instant;

use fleet_state::{validate_playbook_id, HistoryRecorder, PlaybookCatalog, RunOutcome, RunStatus};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::admission::Admission;
use crate::classifier::{Category, ClassifiedLine};
use crate::config::FleetConfig;
use crate::inventory::InventoryStore;
use crate::launcher::{normalize_restriction, LaunchError, LaunchPlan, ProcessLauncher, RunProcess};
use crate::metrics::METRICS;
use crate::obs;

/// Errors returned to the caller of [`RunService::start`].
///
/// Once a session is running, problems become feed lines and a `Failure`
/// outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid run request: {field}: {reason}")]
    InvalidRequest { field: &'static str, reason: String },

    #[error("run task aborted: {0}")]
    Aborted(String),
}

/// A client's request to run one playbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub playbook_id: String,
    pub requested_by: String,
    #[serde(default)]
    pub host_restriction: Option<String>,
}

impl RunRequest {
    pub fn new(playbook_id: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            playbook_id: playbook_id.into(),
            requested_by: requested_by.into(),
            host_restriction: None,
        }
    }

    pub fn restricted_to(mut self, expr: impl Into<String>) -> Self {
        self.host_restriction = Some(expr.into());
        self
    }

    /// Trim every field and reject malformed ids. A blank restriction
    /// becomes `None`.
    pub fn validate(self) -> Result<Self, RunError> {
        let playbook_id = self.playbook_id.trim().to_string();
        validate_playbook_id(&playbook_id).map_err(|e| RunError::InvalidRequest {
            field: "playbook_id",
            reason: e.to_string(),
        })?;

        let requested_by = self.requested_by.trim().to_string();
        if requested_by.is_empty() {
            return Err(RunError::InvalidRequest {
                field: "requested_by",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            playbook_id,
            requested_by,
            host_restriction: normalize_restriction(self.host_restriction.as_deref()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Streaming,
    Finished(RunStatus),
    Reported,
}

/// Receiving end of a session's line channel.
#[derive(Debug)]
pub struct RunFeed {
    rx: mpsc::Receiver<ClassifiedLine>,
}

impl RunFeed {
    /// Next line, or `None` once the session has stopped emitting.
    pub async fn next(&mut self) -> Option<ClassifiedLine> {
        self.rx.recv().await
    }

    /// Drain every remaining line.
    pub async fn collect(mut self) -> Vec<ClassifiedLine> {
        let mut lines = Vec::new();
        while let Some(line) = self.next().await {
            lines.push(line);
        }
        lines
    }

    pub fn into_stream(self) -> impl Stream<Item = ClassifiedLine> + Send {
        futures::stream::unfold(self, |mut feed| async move {
            feed.next().await.map(|line| (line, feed))
        })
    }
}

/// Summary returned by a finished session task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub playbook_id: String,
    pub requested_by: String,
    pub state: SessionState,
    pub status: RunStatus,
    /// `None` when no process was started.
    pub exit_code: Option<i32>,
    /// Lines delivered to the feed, synthetic lines included.
    pub lines_emitted: u64,
    /// Classified process-output lines delivered.
    pub output_lines: u64,
    /// The client went away before the run finished.
    pub cancelled: bool,
    /// Set when the history write failed; the run result still stands.
    pub recorder_error: Option<String>,
}

/// Join handle for a session task.
#[derive(Debug)]
pub struct RunTask(JoinHandle<RunReport>);

impl RunTask {
    pub async fn join(self) -> Result<RunReport, RunError> {
        self.0.await.map_err(|e| RunError::Aborted(e.to_string()))
    }
}

/// A started run: its id, its feed and its task.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: Uuid,
    feed: RunFeed,
    task: RunTask,
}

impl RunHandle {
    pub fn into_parts(self) -> (RunFeed, RunTask) {
        (self.feed, self.task)
    }

    /// Drain the feed, then wait for the report.
    pub async fn collect(self) -> Result<(Vec<ClassifiedLine>, RunReport), RunError> {
        let lines = self.feed.collect().await;
        let report = self.task.join().await?;
        Ok((lines, report))
    }
}

struct Collaborators {
    config: FleetConfig,
    inventory: InventoryStore,
    catalog: Arc<dyn PlaybookCatalog>,
    history: Arc<dyn HistoryRecorder>,
    launcher: Arc<dyn ProcessLauncher>,
    admission: Admission,
}

/// Entry point for starting runs. Cheap to clone.
#[derive(Clone)]
pub struct RunService {
    inner: Arc<Collaborators>,
}

impl RunService {
    /// Runs target `config.inventory_file` and share one admission pool
    /// of `config.max_concurrent_runs` slots.
    pub fn new(
        config: FleetConfig,
        catalog: Arc<dyn PlaybookCatalog>,
        history: Arc<dyn HistoryRecorder>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let inventory = InventoryStore::new(config.inventory_file.clone());
        let admission = Admission::new(config.max_concurrent_runs);
        Self {
            inner: Arc::new(Collaborators {
                config,
                inventory,
                catalog,
                history,
                launcher,
                admission,
            }),
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.inner.config
    }

    pub fn admission(&self) -> &Admission {
        &self.inner.admission
    }

    /// Validate `request` and spawn its session.
    ///
    /// Invalid requests are rejected here, before any line is emitted or
    /// any process started. Must be called inside a tokio runtime.
    pub fn start(&self, request: RunRequest) -> Result<RunHandle, RunError> {
        let request = request.validate()?;
        let run_id = Uuid::new_v4();
        let run_id_str = run_id.to_string();

        {
            let _span = obs::RunSpan::enter(&run_id_str, &request.playbook_id);
            obs::emit_run_started(&run_id_str, &request.playbook_id, &request.requested_by);
        }
        METRICS.inc_runs_started();

        let (tx, rx) = mpsc::channel(self.inner.config.feed_capacity.max(1));
        let span = obs::run_span(&run_id_str, &request.playbook_id);
        let session = RunSession {
            run_id,
            request,
            ctx: Arc::clone(&self.inner),
            tx,
            state: SessionState::Starting,
            lines_emitted: 0,
            output_lines: 0,
        };
        let task = tokio::spawn(session.run().instrument(span));

        Ok(RunHandle {
            run_id,
            feed: RunFeed { rx },
            task: RunTask(task),
        })
    }
}

/// The feed's receiver was dropped.
struct Disconnected;

struct Completion {
    status: RunStatus,
    exit_code: Option<i32>,
    cancelled: bool,
}

struct RunSession {
    run_id: Uuid,
    request: RunRequest,
    ctx: Arc<Collaborators>,
    tx: mpsc::Sender<ClassifiedLine>,
    state: SessionState,
    lines_emitted: u64,
    output_lines: u64,
}

impl RunSession {
    async fn run(mut self) -> RunReport {
        let started = Instant::now();
        let completion = self.drive().await;
        self.state = SessionState::Finished(completion.status);

        let run_id = self.run_id.to_string();
        let success = completion.status == RunStatus::Success;
        obs::emit_run_finished(
            &run_id,
            completion.exit_code,
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            self.lines_emitted,
            success,
        );
        METRICS.record_run_result(success);

        // Closing the feed here guarantees nothing is emitted once Reported.
        drop(self.tx);
        self.state = SessionState::Reported;

        let outcome = RunOutcome::new(
            self.request.requested_by.clone(),
            self.request.playbook_id.clone(),
            completion.status,
        );
        let recorder_error = match self.ctx.history.record(&outcome).await {
            Ok(()) => {
                obs::emit_outcome_recorded(&run_id, completion.status.as_str());
                None
            }
            Err(e) => {
                obs::emit_recorder_error(&run_id, &e);
                METRICS.inc_recorder_failures();
                Some(e.to_string())
            }
        };

        RunReport {
            run_id: self.run_id,
            playbook_id: self.request.playbook_id,
            requested_by: self.request.requested_by,
            state: self.state,
            status: completion.status,
            exit_code: completion.exit_code,
            lines_emitted: self.lines_emitted,
            output_lines: self.output_lines,
            cancelled: completion.cancelled,
            recorder_error,
        }
    }

    async fn drive(&mut self) -> Completion {
        let playbook_id = self.request.playbook_id.clone();
        let begin = ClassifiedLine::new(format!("starting run: {playbook_id}"), Category::Info);
        if self.emit(begin).await.is_err() {
            return self.cancelled_before_spawn();
        }

        let playbook_path = match self.ctx.catalog.exists(&playbook_id).await {
            Ok(true) => match self.ctx.catalog.path_of(&playbook_id) {
                Ok(path) => path,
                Err(e) => return self.fail_before_spawn(format!("error: {e}")).await,
            },
            Ok(false) => {
                return self
                    .fail_before_spawn(format!("error: playbook {playbook_id} not found"))
                    .await
            }
            Err(e) => return self.fail_before_spawn(format!("error: {e}")).await,
        };

        let admitted = tokio::select! {
            biased;
            permit = self.ctx.admission.acquire() => Some(permit),
            _ = self.tx.closed() => None,
        };
        let _permit = match admitted {
            Some(Ok(permit)) => {
                debug!(
                    free_slots = self.ctx.admission.available(),
                    limit = self.ctx.admission.limit(),
                    "run admitted"
                );
                permit
            }
            Some(Err(_)) => {
                return self
                    .fail_before_spawn("error: run admission is closed".to_string())
                    .await
            }
            None => return self.cancelled_before_spawn(),
        };

        let plan = LaunchPlan::new(
            &self.ctx.config,
            playbook_path,
            self.ctx.inventory.path(),
            self.request.host_restriction.as_deref(),
        );
        let process = match self.ctx.launcher.launch(&plan) {
            Ok(process) => process,
            Err(LaunchError::PlaybookNotFound { path }) => {
                return self
                    .fail_before_spawn(format!("error: playbook {path} not found"))
                    .await
            }
            Err(e) => return self.fail_before_spawn(format!("error: {e}")).await,
        };

        self.stream(process, plan.limit.as_deref()).await
    }

    async fn stream(
        &mut self,
        mut process: Box<dyn RunProcess>,
        limit: Option<&str>,
    ) -> Completion {
        self.state = SessionState::Streaming;

        if let Some(limit) = limit {
            obs::emit_run_restricted(&self.run_id.to_string(), limit);
            let line =
                ClassifiedLine::new(format!("target restricted to: {limit}"), Category::Info);
            if self.emit(line).await.is_err() {
                return self.cancel(process).await;
            }
        }

        loop {
            let next = tokio::select! {
                biased;
                line = process.next_line() => Some(line),
                _ = self.tx.closed() => None,
            };
            let raw = match next {
                None => return self.cancel(process).await,
                Some(Ok(Some(raw))) => raw,
                Some(Ok(None)) => break,
                Some(Err(e)) => {
                    warn!(error = %e, "reading orchestrator output failed");
                    break;
                }
            };
            let Some(line) = ClassifiedLine::from_output(&raw) else {
                continue;
            };
            if self.emit(line).await.is_err() {
                return self.cancel(process).await;
            }
            self.output_lines += 1;
        }

        let exit_code = match process.wait().await {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "waiting for orchestrator failed");
                -1
            }
        };
        let status = RunStatus::from_exit_code(exit_code);
        self.state = SessionState::Finished(status);

        let terminal =
            ClassifiedLine::new(format!("finished (exit code: {exit_code})"), Category::Info);
        if self.emit(terminal).await.is_err() {
            debug!("client left before the terminal line");
        }

        Completion {
            status,
            exit_code: Some(exit_code),
            cancelled: false,
        }
    }

    async fn emit(&mut self, line: ClassifiedLine) -> Result<(), Disconnected> {
        self.tx.send(line).await.map_err(|_| Disconnected)?;
        self.lines_emitted += 1;
        METRICS.inc_lines_streamed();
        Ok(())
    }

    async fn fail_before_spawn(&mut self, message: String) -> Completion {
        let cancelled = self
            .emit(ClassifiedLine::new(message, Category::Failed))
            .await
            .is_err();
        Completion {
            status: RunStatus::Failure,
            exit_code: None,
            cancelled,
        }
    }

    fn cancelled_before_spawn(&self) -> Completion {
        obs::emit_run_cancelled(&self.run_id.to_string(), self.lines_emitted);
        Completion {
            status: RunStatus::Failure,
            exit_code: None,
            cancelled: true,
        }
    }

    async fn cancel(&mut self, mut process: Box<dyn RunProcess>) -> Completion {
        if let Err(e) = process.terminate().await {
            warn!(error = %e, "failed to terminate orchestrator");
        }
        let exit_code = process.wait().await.ok();
        obs::emit_run_cancelled(&self.run_id.to_string(), self.lines_emitted);
        Completion {
            status: RunStatus::Failure,
            exit_code,
            cancelled: true,
        }
    }
}
