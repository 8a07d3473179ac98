//! Run session behaviour against in-memory stores and a scripted process.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::fakes::ScriptedLauncher;
use fleet_core::{Category, FleetConfig, RunError, RunRequest, RunService, SessionState};
use fleet_state::fakes::{MemoryHistoryRecorder, MemoryPlaybookCatalog};
use fleet_state::{PlaybookCatalog, RunStatus, UnavailableHistory};

struct Harness {
    service: RunService,
    launcher: Arc<ScriptedLauncher>,
    history: Arc<MemoryHistoryRecorder>,
}

async fn harness(launcher: ScriptedLauncher, history: MemoryHistoryRecorder) -> Harness {
    let catalog = Arc::new(MemoryPlaybookCatalog::new());
    catalog.save("site", "- hosts: all\n").await.unwrap();

    let config = FleetConfig {
        inventory_file: "/tmp/fleetrun-test/hosts".into(),
        feed_capacity: 4,
        ..FleetConfig::default()
    };
    let launcher = Arc::new(launcher);
    let history = Arc::new(history);
    let service = RunService::new(config, catalog, history.clone(), launcher.clone());
    Harness {
        service,
        launcher,
        history,
    }
}

const SCRIPT: [&str; 4] = [
    "PLAY [x]",
    "ok: [h1]",
    "changed: [h1]",
    "fatal: [h2]: UNREACHABLE",
];

#[tokio::test]
async fn scripted_failure_streams_in_order_and_records_failure() {
    let h = harness(ScriptedLauncher::new(SCRIPT, 2), MemoryHistoryRecorder::new()).await;

    let handle = h
        .service
        .start(RunRequest::new("site.yml", "alice"))
        .unwrap();
    let (lines, report) = handle.collect().await.unwrap();

    let categories: Vec<Category> = lines.iter().map(|l| l.category).collect();
    assert_eq!(
        categories,
        vec![
            Category::Info,
            Category::SectionHeader,
            Category::Ok,
            Category::Changed,
            Category::Failed,
            Category::Info,
        ]
    );
    assert_eq!(lines[0].text, "starting run: site.yml");
    assert_eq!(lines[1].text, "PLAY [x]");
    assert!(lines.last().unwrap().text.contains("exit code: 2"));

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.exit_code, Some(2));
    assert_eq!(report.state, SessionState::Reported);
    assert_eq!(report.output_lines, 4);
    assert_eq!(report.lines_emitted, 6);
    assert!(!report.cancelled);
    assert_eq!(report.recorder_error, None);

    let outcomes = h.history.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, RunStatus::Failure);
    assert_eq!(outcomes[0].playbook_id, "site.yml");
    assert_eq!(outcomes[0].requested_by, "alice");
}

#[tokio::test]
async fn zero_exit_is_success() {
    let h = harness(
        ScriptedLauncher::new(["ok: [h1]", "", "   "], 0),
        MemoryHistoryRecorder::new(),
    )
    .await;

    let (lines, report) = h
        .service
        .start(RunRequest::new("site.yml", "bob"))
        .unwrap()
        .collect()
        .await
        .unwrap();

    // Blank process lines are dropped.
    assert_eq!(lines.len(), 3);
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(h.history.outcomes()[0].status, RunStatus::Success);
}

#[tokio::test]
async fn nonexistent_playbook_never_spawns() {
    let h = harness(ScriptedLauncher::new(SCRIPT, 0), MemoryHistoryRecorder::new()).await;

    let (lines, report) = h
        .service
        .start(RunRequest::new("missing.yml", "alice"))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(h.launcher.launches(), 0);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].category, Category::Info);
    assert_eq!(lines[1].category, Category::Failed);
    assert!(lines[1].text.contains("missing.yml"));

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.exit_code, None);
    assert_eq!(report.output_lines, 0);
    assert_eq!(h.history.outcomes()[0].status, RunStatus::Failure);
}

#[tokio::test]
async fn playbook_vanishing_before_launch_is_reported_once() {
    let h = harness(ScriptedLauncher::missing_playbook(), MemoryHistoryRecorder::new()).await;

    let (lines, report) = h
        .service
        .start(RunRequest::new("site.yml", "alice"))
        .unwrap()
        .collect()
        .await
        .unwrap();

    let failed: Vec<_> = lines
        .iter()
        .filter(|l| l.category == Category::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].text.contains("not found"));
    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.output_lines, 0);
}

#[tokio::test]
async fn restriction_is_announced_and_passed_as_limit() {
    let h = harness(ScriptedLauncher::new(["ok: [web1]"], 0), MemoryHistoryRecorder::new()).await;

    let (lines, _report) = h
        .service
        .start(RunRequest::new("site.yml", "alice").restricted_to("  web "))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(lines[1].category, Category::Info);
    assert_eq!(lines[1].text, "target restricted to: web");

    let plans = h.launcher.plans();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].limit.as_deref(), Some("web"));
    assert!(plans[0].args().ends_with(&["--limit".to_string(), "web".to_string()]));
    assert_eq!(
        plans[0].inventory_path,
        std::path::PathBuf::from("/tmp/fleetrun-test/hosts")
    );
}

#[tokio::test]
async fn whitespace_restriction_is_no_restriction() {
    let h = harness(ScriptedLauncher::new(["ok: [web1]"], 0), MemoryHistoryRecorder::new()).await;

    let (lines, _report) = h
        .service
        .start(RunRequest::new("site.yml", "alice").restricted_to(" \t "))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert!(!lines.iter().any(|l| l.text.starts_with("target restricted")));
    let plans = h.launcher.plans();
    assert_eq!(plans[0].limit, None);
    assert!(!plans[0].args().iter().any(|a| a == "--limit"));
}

#[tokio::test]
async fn recorder_failure_keeps_delivered_output() {
    let h = harness(ScriptedLauncher::new(SCRIPT, 0), MemoryHistoryRecorder::failing()).await;

    let (lines, report) = h
        .service
        .start(RunRequest::new("site.yml", "alice"))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(lines.len(), 6);
    assert!(lines.last().unwrap().text.contains("exit code: 0"));
    assert_eq!(report.status, RunStatus::Success);
    assert!(report
        .recorder_error
        .as_deref()
        .unwrap()
        .contains("unavailable"));
    assert!(h.history.outcomes().is_empty());
}

#[tokio::test]
async fn unreachable_history_store_still_runs() {
    let catalog = Arc::new(MemoryPlaybookCatalog::new());
    catalog.save("site", "- hosts: all\n").await.unwrap();
    let service = RunService::new(
        FleetConfig::default(),
        catalog,
        Arc::new(UnavailableHistory::new("ws://history.invalid:8000: connection refused")),
        Arc::new(ScriptedLauncher::new(SCRIPT, 0)),
    );

    let (lines, report) = service
        .start(RunRequest::new("site.yml", "alice"))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(lines.len(), 6);
    assert_eq!(report.status, RunStatus::Success);
    let err = report.recorder_error.unwrap();
    assert!(err.contains("history store unavailable"), "{err}");
    assert!(err.contains("connection refused"), "{err}");
}

#[tokio::test]
async fn finished_runs_release_their_admission_slot() {
    let h = harness(ScriptedLauncher::new(SCRIPT, 0), MemoryHistoryRecorder::new()).await;
    let admission = h.service.admission();
    let limit = admission.limit();
    assert_eq!(admission.available(), limit);

    for _ in 0..limit + 1 {
        h.service
            .start(RunRequest::new("site.yml", "alice"))
            .unwrap()
            .collect()
            .await
            .unwrap();
    }
    assert_eq!(admission.available(), limit);
}

#[tokio::test]
async fn dropped_feed_terminates_the_process() {
    let launcher = ScriptedLauncher::new(SCRIPT, 0)
        .with_line_delay(Duration::from_millis(5))
        .hold_open();
    let h = harness(launcher, MemoryHistoryRecorder::new()).await;

    let handle = h
        .service
        .start(RunRequest::new("site.yml", "alice"))
        .unwrap();
    let (mut feed, task) = handle.into_parts();
    assert_eq!(feed.next().await.unwrap().category, Category::Info);
    drop(feed);

    let report = tokio::time::timeout(Duration::from_secs(5), task.join())
        .await
        .expect("session ends after the client leaves")
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(h.launcher.terminated(), 1);
    assert_eq!(h.history.outcomes().len(), 1);
    assert_eq!(h.history.outcomes()[0].status, RunStatus::Failure);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_any_side_effect() {
    let h = harness(ScriptedLauncher::new(SCRIPT, 0), MemoryHistoryRecorder::new()).await;

    let err = h
        .service
        .start(RunRequest::new("../../etc/passwd", "alice"))
        .unwrap_err();
    assert!(matches!(err, RunError::InvalidRequest { field: "playbook_id", .. }));

    let err = h.service.start(RunRequest::new("site.yml", "")).unwrap_err();
    assert!(matches!(err, RunError::InvalidRequest { field: "requested_by", .. }));

    assert_eq!(h.launcher.launches(), 0);
    assert!(h.history.outcomes().is_empty());
}

#[tokio::test]
async fn sessions_are_independent() {
    let h = harness(
        ScriptedLauncher::new(SCRIPT, 0).with_line_delay(Duration::from_millis(2)),
        MemoryHistoryRecorder::new(),
    )
    .await;

    let a = h.service.start(RunRequest::new("site.yml", "alice")).unwrap();
    let b = h.service.start(RunRequest::new("missing.yml", "bob")).unwrap();
    let (a_lines, a_report) = a.collect().await.unwrap();
    let (b_lines, b_report) = b.collect().await.unwrap();

    assert_eq!(a_lines.len(), 6);
    assert_eq!(a_report.status, RunStatus::Success);
    assert_eq!(b_lines.len(), 2);
    assert_eq!(b_report.status, RunStatus::Failure);
    assert_ne!(a_report.run_id, b_report.run_id);
    assert_eq!(h.history.outcomes().len(), 2);
}

#[tokio::test]
async fn feed_works_as_a_stream() {
    use futures::StreamExt;

    let h = harness(ScriptedLauncher::new(SCRIPT, 2), MemoryHistoryRecorder::new()).await;
    let (feed, task) = h
        .service
        .start(RunRequest::new("site.yml", "alice"))
        .unwrap()
        .into_parts();

    let ndjson: Vec<String> = feed.into_stream().map(|l| l.to_ndjson().unwrap()).collect().await;
    assert_eq!(ndjson.len(), 6);
    assert_eq!(
        ndjson[2],
        "{\"text\":\"ok: [h1]\",\"category\":\"ok\"}\n"
    );
    task.join().await.unwrap();
}
