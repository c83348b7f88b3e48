mod common;

use std::fs;
use std::path::Path;

use adjustment_automator::batch::{BatchProcessor, BatchRequest, RunOutcome, RunPhase};
use adjustment_automator::events::{CancellationFlag, Event, EventSender, Severity};
use adjustment_automator::layout::Layout;
use common::{
    ENTRIES_SHEET, read_sheet, text_at, write_adjustments, write_entity_workbook,
    write_path_table,
};
use tempfile::tempdir;

fn request(folder: &Path) -> BatchRequest {
    BatchRequest {
        folder: folder.to_path_buf(),
        path_table: folder.join("路径表.xlsx"),
        adjustments: folder.join("调整分录.xlsx"),
    }
}

fn run_batch(folder: &Path, cancel: CancellationFlag) -> (RunOutcome, Vec<Event>) {
    let (events, receiver) = EventSender::channel();
    let mut processor = BatchProcessor::new(request(folder), Layout::default(), events, cancel);
    assert_eq!(processor.phase(), RunPhase::Idle);
    let outcome = processor.run();
    assert_eq!(processor.phase(), outcome.phase());
    (outcome, receiver.try_iter().collect())
}

fn logs_with(events: &[Event], wanted: Severity) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Log { message, severity } if *severity == wanted => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn summary_files(folder: &Path) -> Vec<String> {
    fs::read_dir(folder)
        .expect("folder listed")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("录入结果_"))
        .collect()
}

#[test]
fn end_to_end_patches_entity_and_refreshes_tier_workbook() {
    let temp_dir = tempdir().expect("temporary directory");
    let folder = temp_dir.path();
    fs::create_dir(folder.join("TB文件")).expect("workbook folder");

    write_path_table(
        &folder.join("路径表.xlsx"),
        &[("A", "", "TB文件/A.xlsx"), ("B", "小合并", "TB文件/B.xlsx")],
    );
    write_adjustments(
        &folder.join("调整分录.xlsx"),
        &[
            ("A", 1.0, "1001", 100.0),
            ("A", 2.0, "2001", -50.0),
            ("A", 1.0, "1002", -100.0),
        ],
    );
    let a_path = folder.join("TB文件/A.xlsx");
    let b_path = folder.join("TB文件/B.xlsx");
    write_entity_workbook(&a_path, 1250.5, 9, &[(7, 4, "keep")]);
    write_entity_workbook(&b_path, 99.0, 5, &[(5, 0, "untouched")]);

    let (outcome, events) = run_batch(folder, CancellationFlag::new());

    let RunOutcome::Completed(summary) = outcome else {
        panic!("run should complete");
    };
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.failure_count, 0);
    assert_eq!(summary.recalculation_failures, 0);
    assert!(!summary.recalculation_interrupted);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].entity, "A");

    let entries = read_sheet(&a_path, ENTRIES_SHEET);
    assert_eq!(text_at(&entries, 5, 0), "");
    assert_eq!(text_at(&entries, 6, 0), "1");
    assert_eq!(text_at(&entries, 6, 1), "1001");
    assert_eq!(text_at(&entries, 6, 2), "100");
    assert_eq!(text_at(&entries, 7, 1), "1002");
    assert_eq!(text_at(&entries, 8, 0), "");
    assert_eq!(text_at(&entries, 8, 1), "");
    assert_eq!(text_at(&entries, 9, 1), "2001");
    assert_eq!(text_at(&entries, 9, 2), "-50");
    assert_eq!(text_at(&entries, 10, 0), "");
    assert_eq!(text_at(&entries, 7, 4), "keep");
    assert_eq!(text_at(&entries, 0, 0), "header 1");

    let untouched = read_sheet(&b_path, ENTRIES_SHEET);
    assert_eq!(text_at(&untouched, 5, 0), "untouched");

    let summaries = summary_files(folder);
    assert_eq!(summaries.len(), 1);
    let summary_sheet = read_sheet(&summary.summary_path, "汇总数据");
    assert_eq!(text_at(&summary_sheet, 0, 0), "账套名称");
    assert_eq!(text_at(&summary_sheet, 1, 0), "A");
    assert_eq!(text_at(&summary_sheet, 1, 1), "1250.5");
    assert_eq!(text_at(&summary_sheet, 1, 2), "平");
    assert_eq!(text_at(&summary_sheet, 1, 3), "1250.5");
    assert_eq!(text_at(&summary_sheet, 2, 0), "");

    let successes = logs_with(&events, Severity::Success);
    assert!(successes.iter().any(|message| message.contains("TB文件/B.xlsx")));
    assert!(logs_with(&events, Severity::Error).is_empty());

    let progress: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|event| match event {
            Event::Progress { completed, total } => Some((*completed, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.last(), Some(&(4, 4)));

    assert!(matches!(
        events.last(),
        Some(Event::Completed {
            success_count: 1,
            failure_count: 0,
            ..
        })
    ));

    let run_log = fs::read_to_string(folder.join("日志.txt")).expect("run log");
    assert_eq!(run_log.lines().count(), 1);
}

#[test]
fn cancellation_before_first_entity_leaves_workbooks_alone() {
    let temp_dir = tempdir().expect("temporary directory");
    let folder = temp_dir.path();

    write_path_table(&folder.join("路径表.xlsx"), &[("A", "", "A.xlsx")]);
    write_adjustments(&folder.join("调整分录.xlsx"), &[("A", 1.0, "1001", 10.0)]);
    let a_path = folder.join("A.xlsx");
    write_entity_workbook(&a_path, 1.0, 8, &[]);
    let original = fs::read(&a_path).expect("workbook bytes");

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let (outcome, events) = run_batch(folder, cancel);

    assert_eq!(
        outcome,
        RunOutcome::Cancelled {
            success_count: 0,
            failure_count: 0,
            results: Vec::new(),
        }
    );
    assert_eq!(logs_with(&events, Severity::Warning).len(), 1);
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, Event::Completed { .. }))
    );
    assert_eq!(fs::read(&a_path).expect("workbook bytes"), original);
    assert!(summary_files(folder).is_empty());
}

#[test]
fn cancellation_during_refresh_skips_remaining_tier_workbooks() {
    let temp_dir = tempdir().expect("temporary directory");
    let folder = temp_dir.path();

    write_path_table(
        &folder.join("路径表.xlsx"),
        &[("S", "小合并", "S.xlsx"), ("L", "大合并", "L.xlsx")],
    );
    write_adjustments(&folder.join("调整分录.xlsx"), &[]);
    let s_path = folder.join("S.xlsx");
    write_entity_workbook(&s_path, 12.0, 6, &[]);
    write_entity_workbook(&folder.join("L.xlsx"), 34.0, 6, &[]);
    let original = fs::read(&s_path).expect("workbook bytes");

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let (outcome, events) = run_batch(folder, cancel);

    let RunOutcome::Completed(summary) = outcome else {
        panic!("run should complete");
    };
    assert!(summary.recalculation_interrupted);
    assert_eq!(summary.recalculation_failures, 0);
    assert_eq!(summary.success_count, 0);
    assert!(summary.summary_path.exists());

    assert_eq!(logs_with(&events, Severity::Warning).len(), 1);
    assert!(logs_with(&events, Severity::Error).is_empty());
    assert!(
        !logs_with(&events, Severity::Success)
            .iter()
            .any(|message| message.contains("refreshed"))
    );
    assert!(matches!(
        events.last(),
        Some(Event::Completed {
            success_count: 0,
            failure_count: 0,
            ..
        })
    ));
    assert_eq!(fs::read(&s_path).expect("workbook bytes"), original);
}

#[test]
fn unresolvable_entity_fails_alone() {
    let temp_dir = tempdir().expect("temporary directory");
    let folder = temp_dir.path();

    write_path_table(
        &folder.join("路径表.xlsx"),
        &[("A", "", "A.xlsx"), ("C", "", "C.xlsx")],
    );
    write_adjustments(
        &folder.join("调整分录.xlsx"),
        &[
            ("B", 1.0, "1001", 10.0),
            ("A", 1.0, "1001", 10.0),
            ("C", 1.0, "1001", 10.0),
        ],
    );
    write_entity_workbook(&folder.join("A.xlsx"), 1.0, 6, &[]);
    write_entity_workbook(&folder.join("C.xlsx"), 2.0, 6, &[]);

    let (outcome, events) = run_batch(folder, CancellationFlag::new());

    let RunOutcome::Completed(summary) = outcome else {
        panic!("run should complete");
    };
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    let entities: Vec<&str> = summary
        .results
        .iter()
        .map(|result| result.entity.as_str())
        .collect();
    assert_eq!(entities, ["A", "C"]);

    let errors = logs_with(&events, Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("B failed"));

    let run_log = fs::read_to_string(folder.join("日志.txt")).expect("run log");
    assert_eq!(run_log.lines().count(), 2);
    assert!(
        run_log
            .lines()
            .nth(1)
            .is_some_and(|line| line.starts_with("B 调整分录录入有误"))
    );
}

#[test]
fn missing_workbook_and_missing_tier_file_are_isolated() {
    let temp_dir = tempdir().expect("temporary directory");
    let folder = temp_dir.path();

    write_path_table(
        &folder.join("路径表.xlsx"),
        &[
            ("A", "", "absent.xlsx"),
            ("M", "中合并", "merge-missing.xlsx"),
            ("L", "大合并", "merge-large.xlsx"),
        ],
    );
    write_adjustments(&folder.join("调整分录.xlsx"), &[("A", 1.0, "1001", 10.0)]);
    write_entity_workbook(&folder.join("merge-large.xlsx"), 0.0, 6, &[]);

    let (outcome, events) = run_batch(folder, CancellationFlag::new());

    let RunOutcome::Completed(summary) = outcome else {
        panic!("run should complete");
    };
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.recalculation_failures, 1);

    let errors = logs_with(&events, Severity::Error);
    assert_eq!(errors.len(), 2);
    assert!(errors[1].contains("merge-missing.xlsx"));
    assert!(
        logs_with(&events, Severity::Success)
            .iter()
            .any(|message| message.contains("merge-large.xlsx"))
    );

    let summary_sheet = read_sheet(&summary.summary_path, "汇总数据");
    assert_eq!(text_at(&summary_sheet, 1, 0), "");
}

#[test]
fn unreadable_inputs_abort_the_run() {
    let temp_dir = tempdir().expect("temporary directory");
    let folder = temp_dir.path();
    write_path_table(&folder.join("路径表.xlsx"), &[("A", "", "A.xlsx")]);

    let (outcome, events) = run_batch(folder, CancellationFlag::new());

    assert!(matches!(outcome, RunOutcome::GlobalFailed(_)));
    assert!(matches!(events.last(), Some(Event::GlobalError(_))));
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, Event::Completed { .. }))
    );
    assert!(summary_files(folder).is_empty());
}

#[test]
fn spawned_run_streams_events_until_completion() {
    let temp_dir = tempdir().expect("temporary directory");
    let folder = temp_dir.path();

    write_path_table(&folder.join("路径表.xlsx"), &[("A", "", "A.xlsx")]);
    write_adjustments(&folder.join("调整分录.xlsx"), &[("A", 7.0, "1001", 10.0)]);
    write_entity_workbook(&folder.join("A.xlsx"), 3.0, 6, &[]);

    let handle = BatchProcessor::spawn(request(folder), Layout::default()).expect("worker");
    let events: Vec<Event> = handle.events.iter().collect();
    let outcome = handle.join();

    assert_eq!(outcome.phase(), RunPhase::Completed);
    assert!(matches!(
        events.last(),
        Some(Event::Completed {
            success_count: 1,
            failure_count: 0,
            ..
        })
    ));
}
