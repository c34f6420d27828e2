//! Integration tests for topdown-core.
//!
//! These drive the full pipeline with a fake perf:
//! catalog → scheduling → perf command → output file → parsing → reconciliation.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use topdown_core::{
    CollectBy, CollectError, MetricData, MetricInstance, MultiRunConflict, PerfOptions,
    PerfRunner, RunOutcome, ScheduleError, collect_events,
};

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data")
}

fn catalog() -> MetricData {
    MetricData::for_cpu(&data_dir(), "sample-cpu").unwrap()
}

/// Stands in for perf: writes one output row per requested event, repeated
/// twice when `-I` is given. Counts default to 1000; `counts` overrides them
/// by the name the event was passed to perf as. `max_rows` cuts the output
/// short, the way an interrupted perf can.
#[derive(Default)]
struct FakePerf {
    counts: HashMap<String, String>,
    outcome: Option<RunOutcome>,
    max_rows: Option<usize>,
    commands: Vec<Vec<String>>,
}

impl FakePerf {
    fn with_count(mut self, event: &str, count: &str) -> Self {
        self.counts.insert(event.to_string(), count.to_string());
        self
    }
}

impl PerfRunner for FakePerf {
    fn run(&mut self, command: &[String], output: &Path) -> std::io::Result<RunOutcome> {
        self.commands.push(command.to_vec());

        let events_pos = command.iter().position(|a| a == "-e").unwrap() + 1;
        let events: Vec<String> = command[events_pos]
            .replace(['{', '}'], "")
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let interval = command.iter().any(|a| a == "-I");

        let mut text = String::from("# started on Thu Jan  1 00:00:00 2026\n\n");
        let samples: &[f64] = if interval { &[0.1, 0.2] } else { &[0.0] };
        let mut rows = 0;
        for t in samples {
            for e in &events {
                if self.max_rows.is_some_and(|max| rows >= max) {
                    break;
                }
                rows += 1;
                let count = self.counts.get(e).map_or("1000", String::as_str);
                if interval {
                    text.push_str(&format!("{t};{count};;{e}:u;1000000;100.00;;\n"));
                } else {
                    text.push_str(&format!("{count};;{e}:u;1000000;100.00;;\n"));
                }
            }
        }
        std::fs::write(output, text)?;

        Ok(self
            .outcome
            .unwrap_or_else(|| RunOutcome::Exited(success_status())))
    }
}

fn success_status() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(0)
}

fn failure_status() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1 << 8)
}

fn options(tmp: &tempfile::TempDir) -> PerfOptions {
    PerfOptions {
        command: vec!["sleep".to_string(), "1".to_string()],
        perf_output: tmp.path().join("perf.stat.txt"),
        ..Default::default()
    }
}

fn group(data: &MetricData, name: &str) -> Vec<MetricInstance> {
    data.metrics_for_group(name).unwrap()
}

#[test]
fn all_metrics_by_metric_need_two_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();

    let result = collect_events(&data.all_metrics(), &options(&tmp), &mut perf).unwrap();

    // Five metrics of two events each, six counters per run.
    assert_eq!(result.len(), 2);
    assert_eq!(perf.commands.len(), 2);
    let total: usize = result.iter().map(|(_, counts)| counts.len()).sum();
    assert_eq!(total, 10);
    for (time, counts) in &result {
        assert!(time.is_none());
        assert!(counts.iter().all(|c| c.value == Some(1000.0)));
        assert!(counts.iter().all(|c| c.event.metric.is_some()));
    }
    assert!(perf.commands[0][3].starts_with('{'));
}

#[test]
fn one_run_when_limit_allows() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();
    let opts = PerfOptions {
        collect_by: CollectBy::None,
        ..options(&tmp)
    };

    let result = collect_events(&group(&data, "Cycle_Accounting"), &opts, &mut perf).unwrap();
    assert_eq!(result.len(), 1);
    // Groups are taken from the back of the list.
    assert_eq!(perf.commands[0][3], "r24,r11,r23");
    let names: Vec<String> = result[0].1.iter().map(|c| c.event.qualified_name()).collect();
    assert_eq!(names, vec!["STALL_BACKEND", "CPU_CYCLES", "STALL_FRONTEND"]);
}

#[test]
fn symbolic_event_names_are_reconciled() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();
    let opts = PerfOptions {
        use_event_names: true,
        collect_by: CollectBy::Group,
        ..options(&tmp)
    };

    let result = collect_events(&group(&data, "General"), &opts, &mut perf).unwrap();
    assert_eq!(perf.commands[0][3], "{INST_RETIRED,CPU_CYCLES}");
    let names: Vec<String> = result[0].1.iter().map(|c| c.event.qualified_name()).collect();
    assert_eq!(
        names,
        vec!["General.ipc.INST_RETIRED", "General.ipc.CPU_CYCLES"]
    );
}

#[test]
fn interval_samples_map_back_to_the_same_events() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();
    let opts = PerfOptions {
        interval: Some(100),
        ..options(&tmp)
    };

    let result = collect_events(&group(&data, "Cycle_Accounting"), &opts, &mut perf).unwrap();
    assert_eq!(result.len(), 1);
    let (time, counts) = &result[0];
    assert_eq!(*time, Some(0.1));
    assert_eq!(counts.len(), 8);
    for i in 0..4 {
        assert_eq!(counts[i].event, counts[i + 4].event);
        assert_eq!(counts[i + 4].time, Some(0.2));
    }
    assert!(perf.commands[0].windows(2).any(|w| w[0] == "-I" && w[1] == "100"));
}

#[test]
fn system_wide_multi_run_is_rejected_before_perf_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();
    let opts = PerfOptions {
        command: Vec::new(),
        all_cpus: true,
        max_events: Some(2),
        ..options(&tmp)
    };

    let err = collect_events(&data.all_metrics(), &opts, &mut perf).unwrap_err();
    assert!(matches!(
        err,
        CollectError::MultiRun(MultiRunConflict::SystemWide)
    ));
    assert!(perf.commands.is_empty());
    assert!(!opts.perf_output.exists());
}

#[test]
fn pid_multi_run_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();
    let opts = PerfOptions {
        command: Vec::new(),
        pids: vec![1234],
        max_events: Some(2),
        ..options(&tmp)
    };

    let err = collect_events(&data.all_metrics(), &opts, &mut perf).unwrap_err();
    assert!(matches!(err, CollectError::MultiRun(MultiRunConflict::Pids)));
    assert!(perf.commands.is_empty());
}

#[test]
fn oversized_group_fails_before_perf_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();
    let opts = PerfOptions {
        collect_by: CollectBy::Group,
        max_events: Some(2),
        ..options(&tmp)
    };

    let err = collect_events(&group(&data, "Cycle_Accounting"), &opts, &mut perf).unwrap_err();
    match err {
        CollectError::Schedule(ScheduleError::Group {
            group,
            events,
            available,
        }) => {
            assert_eq!(group, "Cycle Accounting");
            assert_eq!(events, vec!["CPU_CYCLES", "STALL_BACKEND", "STALL_FRONTEND"]);
            assert_eq!(available, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(perf.commands.is_empty());
}

#[test]
fn zero_cycles_invalidates_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default().with_count("r11", "0");

    let err = collect_events(&group(&data, "General"), &options(&tmp), &mut perf).unwrap_err();
    assert!(matches!(err, CollectError::ZeroCycles));
}

#[test]
fn unsupported_event_is_reported_by_name() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default().with_count("r22", "<not supported>");

    let err = collect_events(&group(&data, "Branch_Effectiveness"), &options(&tmp), &mut perf)
        .unwrap_err();
    match err {
        CollectError::UncountedEvents(names) => assert_eq!(names, vec!["BR_MIS_PRED_RETIRED"]),
        other => panic!("unexpected error: {other:?}"),
    }
    // The output file is kept for diagnosis.
    assert!(tmp.path().join("perf.stat.txt").exists());
}

#[test]
fn interrupted_run_is_still_analysed() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf {
        outcome: Some(RunOutcome::Interrupted),
        ..Default::default()
    };

    let result = collect_events(&group(&data, "General"), &options(&tmp), &mut perf).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].1.len(), 2);
}

#[test]
fn truncated_output_reports_the_missing_events() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf {
        outcome: Some(RunOutcome::Interrupted),
        max_rows: Some(1),
        ..Default::default()
    };

    // General/ipc is passed as {r8,r11}; only the r8 row is written.
    let err = collect_events(&group(&data, "General"), &options(&tmp), &mut perf).unwrap_err();
    match err {
        CollectError::UncountedEvents(names) => assert_eq!(names, vec!["CPU_CYCLES"]),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn failing_perf_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf {
        outcome: Some(RunOutcome::Exited(failure_status())),
        ..Default::default()
    };

    let err = collect_events(&group(&data, "General"), &options(&tmp), &mut perf).unwrap_err();
    match err {
        CollectError::ToolFailed { command, status } => {
            assert!(command.starts_with("perf stat -e"));
            assert!(!status.success());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn counts_serialize_to_json() {
    let tmp = tempfile::tempdir().unwrap();
    let data = catalog();
    let mut perf = FakePerf::default();

    let result = collect_events(&group(&data, "General"), &options(&tmp), &mut perf).unwrap();
    let json = serde_json::to_value(&result[0].1).unwrap();
    assert_eq!(json[0]["event"]["qualified_name"], "ipc.INST_RETIRED");
    assert_eq!(json[0]["event"]["code"], "0x8");
    assert_eq!(json[0]["value"], 1000.0);
    assert!(json[0]["time"].is_null());
}
