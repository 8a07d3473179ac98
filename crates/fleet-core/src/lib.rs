//! fleetrun core library
//!
//! Inventory management and streaming playbook execution:
//!
//! - [`inventory`]: INI host file model and the locked file store
//! - [`launcher`]: orchestrator invocation and process handles
//! - [`classifier`]: per-line output categories
//! - [`session`]: run state machine, client feed and run service
//! - [`admission`]: bound on concurrently running playbooks

pub mod admission;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fakes;
pub mod inventory;
pub mod launcher;
pub mod metrics;
pub mod obs;
pub mod session;
pub mod telemetry;

pub use admission::Admission;
pub use classifier::{classify, Category, ClassifiedLine};
pub use config::{ConfigError, FleetConfig};
pub use error::{FleetError, Result};
pub use inventory::{AddHostRequest, HostRecord, Inventory, InventoryError, InventoryStore};
pub use launcher::{
    AnsibleLauncher, ChildProcess, LaunchError, LaunchPlan, ProcessLauncher, RunProcess,
};
pub use session::{
    RunError, RunFeed, RunHandle, RunReport, RunRequest, RunService, RunTask, SessionState,
};

pub use fleet_state::{
    FsPlaybookCatalog, HistoryRecorder, PlaybookCatalog, PlaybookEntry, RunOutcome, RunStatus,
    StorageError, SurrealHistoryRecorder,
};

pub use metrics::METRICS;
pub use obs::{
    emit_inventory_mutated, emit_outcome_recorded, emit_recorder_error, emit_run_cancelled,
    emit_run_finished, emit_run_restricted, emit_run_started, RunSpan,
};
pub use telemetry::init_tracing;

/// fleetrun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
