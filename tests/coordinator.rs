mod common;

use assert_matches::assert_matches;

use common::{Behavior, MockSource, no_delay, seed_report, temp_root};
use vahan_harvest::coordinator::{Coordinator, CoordinatorOptions, RunStatus};
use vahan_harvest::domain::{Month, Period, ReportLevel, UnitOfWork, Year};
use vahan_harvest::error::HarvestError;
use vahan_harvest::executor::FetchExecutor;
use vahan_harvest::output::JsonOutput;
use vahan_harvest::store::ArtifactStore;

fn period() -> Period {
    Period::new(Year::new(2024).unwrap(), Month::Jan)
}

fn oem_units() -> Vec<UnitOfWork> {
    let mut units = Vec::new();
    for state in ["Goa", "Kerala"] {
        for category in ["MOTOR CAR", "GOODS CARRIER", "BUS"] {
            units.push(UnitOfWork::oem(state, category, period()));
        }
    }
    units
}

fn executor(temp: &tempfile::TempDir, behavior: Behavior) -> FetchExecutor<MockSource> {
    FetchExecutor::new(
        MockSource::new(behavior),
        ArtifactStore::new(temp_root(temp)),
        no_delay(3),
    )
}

fn options() -> CoordinatorOptions {
    CoordinatorOptions {
        workers: 4,
        ..CoordinatorOptions::default()
    }
}

#[test]
fn fetches_only_the_missing_unit() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::Succeed);
    let units = oem_units();
    for unit in &units[..5] {
        seed_report(executor.store(), unit);
    }

    let report = Coordinator::new(&executor, options())
        .run(ReportLevel::Oem, units.clone(), &JsonOutput)
        .unwrap();

    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.passes, 2);
    assert_eq!(report.dispatches, vec![1]);
    assert_eq!(report.total, 6);
    assert_eq!(report.satisfied, 6);
    assert!(report.unresolved.is_empty());
    assert!(report.is_complete());
    assert_eq!(executor.source().performed(), vec![units[5].clone()]);
}

#[test]
fn second_run_dispatches_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::Succeed);
    let coordinator = Coordinator::new(&executor, options());

    let first = coordinator
        .run(ReportLevel::Oem, oem_units(), &JsonOutput)
        .unwrap();
    assert_eq!(first.dispatched(), 6);
    assert!(first.is_complete());

    let second = coordinator
        .run(ReportLevel::Oem, oem_units(), &JsonOutput)
        .unwrap();
    assert_eq!(second.dispatched(), 0);
    assert_eq!(second.passes, 1);
    assert_eq!(second.status, RunStatus::Complete);
    assert_eq!(executor.source().perform_count(), 6);
}

#[test]
fn permanent_failures_stop_after_one_idle_pass() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::AlwaysFatal);

    let report = Coordinator::new(&executor, options())
        .run(ReportLevel::Oem, oem_units(), &JsonOutput)
        .unwrap();

    assert_eq!(report.status, RunStatus::Stalled);
    assert_eq!(report.passes, 2);
    assert_eq!(report.dispatches, vec![6]);
    assert_eq!(report.satisfied, 0);
    assert_eq!(report.unresolved.len(), 6);
    assert!(report.unresolved.iter().all(|item| item.reason.starts_with("failed")));
}

#[test]
fn transient_failures_are_reported_with_their_budget() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::AlwaysTransient);
    let units = vec![UnitOfWork::state("Goa", period())];

    let report = Coordinator::new(&executor, options())
        .run(ReportLevel::State, units, &JsonOutput)
        .unwrap();

    assert_eq!(report.status, RunStatus::Stalled);
    assert_eq!(executor.source().perform_count(), 3);
    assert!(report.unresolved[0].reason.contains("3 attempts"));
}

#[test]
fn pass_limit_stops_a_progressing_run() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::FailState("Kerala"));
    let options = CoordinatorOptions {
        max_passes: 1,
        ..options()
    };

    let report = Coordinator::new(&executor, options)
        .run(ReportLevel::Oem, oem_units(), &JsonOutput)
        .unwrap();

    assert_eq!(report.status, RunStatus::PassLimit);
    assert_eq!(report.passes, 2);
    assert_eq!(report.dispatches, vec![6]);
    assert_eq!(report.satisfied, 3);
    assert_eq!(report.unresolved.len(), 3);
}

#[test]
fn partial_progress_retries_the_remainder_once_more() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::FailState("Kerala"));

    let report = Coordinator::new(&executor, options())
        .run(ReportLevel::Oem, oem_units(), &JsonOutput)
        .unwrap();

    assert_eq!(report.status, RunStatus::Stalled);
    assert_eq!(report.passes, 3);
    assert_eq!(report.dispatches, vec![6, 3]);
    assert_eq!(report.satisfied, 3);
    assert!(report.unresolved.iter().all(|item| item.unit.state == "Kerala"));
}

#[test]
fn malformed_labels_are_unresolved_without_dispatch() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::Succeed);
    let units = vec![
        UnitOfWork::rto("Goa", "PANAJI - GA1( 01-JAN-2004 )", period()),
        UnitOfWork::rto("Goa", "All Vahan4 Running Office", period()),
    ];

    let report = Coordinator::new(&executor, options())
        .run(ReportLevel::Rto, units, &JsonOutput)
        .unwrap();

    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.satisfied, 1);
    assert_eq!(report.dispatches, vec![1]);
    assert_eq!(report.unresolved.len(), 1);
    assert!(report.unresolved[0].path.is_unresolvable());
    assert_eq!(executor.source().perform_count(), 1);
    assert!(!report.is_complete());
}

#[test]
fn dry_run_only_probes() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::Succeed);
    let units = oem_units();
    seed_report(executor.store(), &units[0]);
    let options = CoordinatorOptions {
        dry_run: true,
        ..options()
    };

    let report = Coordinator::new(&executor, options)
        .run(ReportLevel::Oem, units, &JsonOutput)
        .unwrap();

    assert_eq!(report.status, RunStatus::DryRun);
    assert_eq!(report.satisfied, 1);
    assert_eq!(report.unresolved.len(), 5);
    assert!(report.unresolved.iter().all(|item| item.reason == "pending"));
    assert_eq!(executor.source().opens(), 0);
}

#[test]
fn force_refetches_existing_reports() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::Succeed);
    let units = oem_units();
    for unit in &units {
        seed_report(executor.store(), unit);
    }
    let options = CoordinatorOptions {
        force: true,
        ..options()
    };

    let report = Coordinator::new(&executor, options)
        .run(ReportLevel::Oem, units, &JsonOutput)
        .unwrap();

    assert_eq!(report.dispatches, vec![6]);
    assert!(report.is_complete());
}

#[test]
fn duplicate_units_are_fetched_once() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::Succeed);
    let unit = UnitOfWork::state("Goa", period());

    let report = Coordinator::new(&executor, options())
        .run(ReportLevel::State, vec![unit.clone(), unit], &JsonOutput)
        .unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(executor.source().perform_count(), 1);
}

#[test]
fn colliding_folder_names_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let executor = executor(&temp, Behavior::Succeed);
    let units = vec![
        UnitOfWork::oem("Goa", "MOTOR CAR/JEEP", period()),
        UnitOfWork::oem("Goa", "MOTOR CAR JEEP", period()),
    ];

    let result = Coordinator::new(&executor, options()).run(ReportLevel::Oem, units, &JsonOutput);
    assert_matches!(result, Err(HarvestError::NamingCollision(_)));
    assert_eq!(executor.source().opens(), 0);
}
