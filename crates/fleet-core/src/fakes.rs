//! Scripted process launcher (testing only)
//!
//! `ScriptedLauncher` hands out `ScriptedProcess`es that replay a fixed list
//! of output lines and then exit with a fixed code, so sessions can be
//! driven without an orchestrator installed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::launcher::{LaunchError, LaunchPlan, LaunchResult, ProcessLauncher, RunProcess};

/// Launcher that records every plan and replays a script.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    script: Vec<String>,
    exit_code: i32,
    line_delay: Option<Duration>,
    hold_open: bool,
    playbook_missing: bool,
    plans: Mutex<Vec<LaunchPlan>>,
    terminated: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    /// Every launched process prints `lines` then exits with `exit_code`.
    pub fn new<I, S>(lines: I, exit_code: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: lines.into_iter().map(Into::into).collect(),
            exit_code,
            ..Self::default()
        }
    }

    /// Launches fail with `PlaybookNotFound`, as if the file vanished.
    pub fn missing_playbook() -> Self {
        Self {
            playbook_missing: true,
            ..Self::default()
        }
    }

    /// Sleep before each line.
    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = Some(delay);
        self
    }

    /// After the script, keep the output open until terminated.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Plans passed to `launch`, in call order.
    pub fn plans(&self) -> Vec<LaunchPlan> {
        self.plans.lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        self.plans.lock().unwrap().len()
    }

    /// How many processes were terminated.
    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(&self, plan: &LaunchPlan) -> LaunchResult<Box<dyn RunProcess>> {
        if self.playbook_missing {
            return Err(LaunchError::PlaybookNotFound {
                path: plan.playbook_path.display().to_string(),
            });
        }
        self.plans.lock().unwrap().push(plan.clone());
        Ok(Box::new(ScriptedProcess {
            lines: self.script.iter().cloned().collect(),
            exit_code: self.exit_code,
            line_delay: self.line_delay,
            hold_open: self.hold_open,
            killed: false,
            terminated: Arc::clone(&self.terminated),
        }))
    }
}

/// Replays its lines; `wait` returns the scripted code, or `-1` if killed.
#[derive(Debug)]
pub struct ScriptedProcess {
    lines: VecDeque<String>,
    exit_code: i32,
    line_delay: Option<Duration>,
    hold_open: bool,
    killed: bool,
    terminated: Arc<AtomicUsize>,
}

#[async_trait]
impl RunProcess for ScriptedProcess {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        if self.killed {
            return Ok(None);
        }
        if let Some(delay) = self.line_delay {
            tokio::time::sleep(delay).await;
        }
        match self.lines.pop_front() {
            Some(line) => Ok(Some(line)),
            None if self.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn wait(&mut self) -> std::io::Result<i32> {
        Ok(if self.killed { -1 } else { self.exit_code })
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        self.killed = true;
        self.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
