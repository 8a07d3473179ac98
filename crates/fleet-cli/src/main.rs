//! fleetrun - inventory management and streaming playbook runs
//!
//! ## Commands
//!
//! - `inventory`: list, add, remove, show or replace hosts in the INI inventory
//! - `playbook`: list, save or delete playbooks
//! - `run`: execute a playbook and stream classified output
//! - `history`: show the most recent run outcomes
//! - `config`: print the effective configuration

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use fleet_core::inventory::AddHostRequest;
use fleet_core::launcher::describe_program;
use fleet_core::{
    AnsibleLauncher, Category, FleetConfig, InventoryStore, RunRequest, RunService, METRICS,
};
use fleet_state::{
    FsPlaybookCatalog, HistoryRecorder, PlaybookCatalog, RunStatus, SurrealHistoryRecorder,
    DEFAULT_HISTORY_URL,
};

#[derive(Parser)]
#[command(name = "fleetrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ansible inventory management and streaming playbook runs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON: NDJSON run lines, JSON listings and JSON log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "FLEETRUN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage inventory hosts
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },

    /// Manage playbooks
    Playbook {
        #[command(subcommand)]
        action: PlaybookAction,
    },

    /// Run a playbook against the inventory
    Run {
        /// Playbook id, e.g. `site.yml`
        playbook: String,

        /// Identity recorded in run history
        #[arg(short, long, env = "USER")]
        user: String,

        /// Restrict the run to a host or group expression
        #[arg(short, long)]
        limit: Option<String>,
    },

    /// Show recent run outcomes
    History {
        /// Maximum number of outcomes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum InventoryAction {
    /// List every host with its group and address
    List,

    /// Append a host under a new group header
    Add {
        hostname: String,
        ip: String,

        /// Group name (default: all)
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Remove every line for a host
    Remove { hostname: String },

    /// Print the raw inventory file
    Show,

    /// Replace the inventory file with new content
    Write {
        /// File to read content from (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PlaybookAction {
    /// List playbooks with their content digest
    List,

    /// Create or overwrite a playbook
    Save {
        /// Playbook name; `.yml` is appended when missing
        name: String,

        /// File to read content from (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Delete a playbook
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fleet_core::init_tracing(cli.json, level);

    let config = FleetConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let json = cli.json;

    let code = match cli.command {
        Commands::Inventory { action } => {
            let store = InventoryStore::new(config.inventory_file.clone());
            match action {
                InventoryAction::List => cmd_inventory_list(&store, json).await?,
                InventoryAction::Add {
                    hostname,
                    ip,
                    group,
                } => cmd_inventory_add(&store, hostname, ip, group, json).await?,
                InventoryAction::Remove { hostname } => {
                    cmd_inventory_remove(&store, &hostname, json).await?
                }
                InventoryAction::Show => cmd_inventory_show(&store).await?,
                InventoryAction::Write { file } => {
                    cmd_inventory_write(&store, file.as_deref()).await?
                }
            }
            ExitCode::SUCCESS
        }
        Commands::Playbook { action } => {
            let catalog = open_catalog(&config)?;
            match action {
                PlaybookAction::List => cmd_playbook_list(&catalog, json).await?,
                PlaybookAction::Save { name, file } => {
                    cmd_playbook_save(&catalog, &name, file.as_deref(), json).await?
                }
                PlaybookAction::Delete { id } => cmd_playbook_delete(&catalog, &id).await?,
            }
            ExitCode::SUCCESS
        }
        Commands::Run {
            playbook,
            user,
            limit,
        } => cmd_run(config, playbook, user, limit, json).await?,
        Commands::History { limit } => {
            let history = open_history(&config).await?;
            cmd_history(&history, limit, json).await?;
            ExitCode::SUCCESS
        }
        Commands::Config => {
            cmd_config(&config, json)?;
            ExitCode::SUCCESS
        }
    };

    METRICS.flush();
    Ok(code)
}

fn open_catalog(config: &FleetConfig) -> Result<FsPlaybookCatalog> {
    FsPlaybookCatalog::new(&config.playbooks_dir).with_context(|| {
        format!(
            "Failed to open playbook directory {}",
            config.playbooks_dir.display()
        )
    })
}

async fn open_history(config: &FleetConfig) -> Result<SurrealHistoryRecorder> {
    let url = config.history_url.as_deref().unwrap_or(DEFAULT_HISTORY_URL);
    SurrealHistoryRecorder::connect(url)
        .await
        .with_context(|| format!("Failed to open run history at {url}"))
}

/// Read `file`, or stdin when no file is given.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_inventory_list(store: &InventoryStore, json: bool) -> Result<()> {
    let hosts = store.list().await?;
    if json {
        return print_json(&hosts);
    }
    if hosts.is_empty() {
        println!("No hosts in {}", store.path().display());
        return Ok(());
    }
    for host in hosts {
        println!("{:<24} {:<20} {}", host.hostname, host.ip_or_alias, host.group);
    }
    Ok(())
}

async fn cmd_inventory_add(
    store: &InventoryStore,
    hostname: String,
    ip: String,
    group: Option<String>,
    json: bool,
) -> Result<()> {
    let mut request = AddHostRequest::new(hostname, ip);
    request.group = group;
    let record = store
        .add(request)
        .await
        .with_context(|| format!("Failed to add host to {}", store.path().display()))?;
    if json {
        return print_json(&record);
    }
    println!(
        "Added {} ({}) to [{}]",
        record.hostname, record.ip_or_alias, record.group
    );
    Ok(())
}

async fn cmd_inventory_remove(store: &InventoryStore, hostname: &str, json: bool) -> Result<()> {
    let removed = store
        .remove(hostname)
        .await
        .with_context(|| format!("Failed to remove '{hostname}'"))?;
    if json {
        return print_json(&serde_json::json!({ "hostname": hostname, "removed": removed }));
    }
    if removed == 0 {
        println!("Host '{hostname}' not found");
    } else {
        println!("Removed '{hostname}' ({removed} line(s))");
    }
    Ok(())
}

async fn cmd_inventory_show(store: &InventoryStore) -> Result<()> {
    print!("{}", store.read_raw().await?);
    Ok(())
}

async fn cmd_inventory_write(store: &InventoryStore, file: Option<&Path>) -> Result<()> {
    let content = read_input(file)?;
    store
        .write_raw(&content)
        .await
        .with_context(|| format!("Failed to write {}", store.path().display()))?;
    info!(bytes = content.len(), "inventory replaced");
    Ok(())
}

async fn cmd_playbook_list(catalog: &FsPlaybookCatalog, json: bool) -> Result<()> {
    let entries = catalog.list().await?;
    if json {
        let listing: Vec<_> = entries
            .iter()
            .map(|e| serde_json::json!({ "id": e.id, "name": e.name, "digest": e.digest.as_str() }))
            .collect();
        return print_json(&listing);
    }
    if entries.is_empty() {
        println!("No playbooks in {}", catalog.dir().display());
        return Ok(());
    }
    for entry in entries {
        println!("{}  {}", entry.digest.short(), entry.id);
    }
    Ok(())
}

async fn cmd_playbook_save(
    catalog: &FsPlaybookCatalog,
    name: &str,
    file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let content = read_input(file)?;
    let entry = catalog
        .save(name, &content)
        .await
        .with_context(|| format!("Failed to save playbook '{name}'"))?;
    if json {
        return print_json(&serde_json::json!({ "id": entry.id, "digest": entry.digest.as_str() }));
    }
    println!("Saved {} ({})", entry.id, entry.digest.short());
    Ok(())
}

async fn cmd_playbook_delete(catalog: &FsPlaybookCatalog, id: &str) -> Result<()> {
    catalog
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete playbook '{id}'"))?;
    println!("Deleted {id}");
    Ok(())
}

async fn cmd_run(
    config: FleetConfig,
    playbook: String,
    user: String,
    limit: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let catalog = Arc::new(open_catalog(&config)?);
    let url = config.history_url.as_deref().unwrap_or(DEFAULT_HISTORY_URL);
    let history = fleet_state::connect_or_unavailable(url).await;
    let service = RunService::new(config, catalog, history, Arc::new(AnsibleLauncher));

    let mut request = RunRequest::new(playbook, user);
    request.host_restriction = limit;
    let (mut feed, task) = service.start(request)?.into_parts();

    while let Some(line) = feed.next().await {
        if json {
            print!("{}", line.to_ndjson()?);
        } else if line.category == Category::Info {
            println!("// {}", line.text);
        } else {
            println!("{}", line.text);
        }
    }

    let report = task.join().await?;
    if let Some(err) = &report.recorder_error {
        eprintln!("warning: run outcome was not saved to history: {err}");
    }
    Ok(match report.status {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::Failure => ExitCode::FAILURE,
    })
}

async fn cmd_history(history: &dyn HistoryRecorder, limit: usize, json: bool) -> Result<()> {
    let outcomes = history.recent(limit).await?;
    if json {
        return print_json(&outcomes);
    }
    if outcomes.is_empty() {
        println!("No runs recorded yet");
        return Ok(());
    }
    for o in outcomes {
        println!(
            "{}  {:<8} {:<24} {}",
            o.timestamp.format("%Y-%m-%d %H:%M:%S"),
            o.status,
            o.playbook_id,
            o.requested_by
        );
    }
    Ok(())
}

fn cmd_config(config: &FleetConfig, json: bool) -> Result<()> {
    let orchestrator = describe_program(&config.ansible_playbook_bin);
    if json {
        return print_json(&serde_json::json!({ "config": config, "orchestrator": orchestrator }));
    }
    println!("playbooks_dir        {}", config.playbooks_dir.display());
    println!("inventory_file       {}", config.inventory_file.display());
    println!("ansible_config       {}", config.ansible_config.display());
    println!("ansible_playbook_bin {orchestrator}");
    println!("max_concurrent_runs  {}", config.max_concurrent_runs);
    println!("feed_capacity        {}", config.feed_capacity);
    println!(
        "history_url          {}",
        config.history_url.as_deref().unwrap_or(DEFAULT_HISTORY_URL)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_limit() {
        let cli = Cli::try_parse_from([
            "fleetrun", "run", "site.yml", "--user", "alice", "--limit", "web",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                playbook,
                user,
                limit,
            } => {
                assert_eq!(playbook, "site.yml");
                assert_eq!(user, "alice");
                assert_eq!(limit.as_deref(), Some("web"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parses_inventory_add_with_group() {
        let cli = Cli::try_parse_from([
            "fleetrun", "--json", "inventory", "add", "web1", "10.0.0.1", "--group", "web",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Inventory {
                action: InventoryAction::Add { hostname, ip, group },
            } => {
                assert_eq!(hostname, "web1");
                assert_eq!(ip, "10.0.0.1");
                assert_eq!(group.as_deref(), Some("web"));
            }
            _ => panic!("expected inventory add"),
        }
    }

    #[test]
    fn history_limit_defaults_to_twenty() {
        let cli = Cli::try_parse_from(["fleetrun", "history"]).unwrap();
        assert!(matches!(cli.command, Commands::History { limit: 20 }));
    }

    #[tokio::test]
    async fn run_proceeds_without_a_history_store() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let playbooks = dir.path().join("playbooks");
        std::fs::create_dir(&playbooks).unwrap();
        std::fs::write(playbooks.join("site.yml"), "- hosts: all\n").unwrap();

        let config = FleetConfig {
            playbooks_dir: playbooks,
            inventory_file: dir.path().join("hosts"),
            ansible_playbook_bin: dir.path().join("missing-bin").display().to_string(),
            history_url: Some(format!("surrealkv://{}/db", blocker.display())),
            ..FleetConfig::default()
        };
        // The orchestrator binary is absent, so the run itself fails, but it
        // is reported as a run result instead of a history error.
        cmd_run(config, "site.yml".into(), "alice".into(), None, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn history_command_reads_recorder() {
        let history = fleet_state::fakes::MemoryHistoryRecorder::new();
        history
            .record(&fleet_state::RunOutcome::new("alice", "site.yml", RunStatus::Success))
            .await
            .unwrap();
        cmd_history(&history, 5, true).await.unwrap();
    }
}
