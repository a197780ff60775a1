//! Batch integration tests
//!
//! Covers:
//! - Worker pool bound: never more hospitals in flight than `max_concurrent_plans`
//! - One failing hospital does not abort the batch
//! - Aggregates: success rate, source coverage, most common source
//! - Progress events for every hospital

mod helpers;

use helpers::*;
use hpi_common::events::{EventBus, IntegrationEvent};
use hpi_integrator::types::{HospitalDescriptor, OverallStatus, SourceKind};
use hpi_integrator::{CollectorError, OrchestratorSettings};
use std::sync::Arc;
use std::time::Duration;

fn hospitals(count: usize) -> Vec<HospitalDescriptor> {
    (1..=count).map(|i| hospital(&format!("H-{:02}", i))).collect()
}

#[tokio::test]
async fn test_batch_respects_pool_size() {
    let tracker = CallTracker::new();
    let gov = Arc::new(
        ScriptedCollector::returning(SourceKind::GovernmentApi, gov_record())
            .delay(Duration::from_millis(20))
            .tracked(tracker.clone()),
    );
    let survey = Arc::new(
        ScriptedCollector::returning(SourceKind::Survey, survey_record())
            .delay(Duration::from_millis(20))
            .tracked(tracker.clone()),
    );
    let orchestrator = create_test_orchestrator_with(
        registry(vec![gov.clone(), survey.clone()]),
        OrchestratorSettings {
            max_concurrent_plans: 5,
            ..fast_settings()
        },
    );

    let result = orchestrator.batch_hospital_integration(hospitals(20)).await;

    assert_eq!(result.total_hospitals, 20);
    assert_eq!(result.successful, 20);
    assert_eq!(result.failed, 0);
    assert_eq!(result.success_rate, 100.0);
    assert_eq!(gov.calls(), 20);
    assert_eq!(survey.calls(), 20);

    let max = tracker.max_concurrent_hospitals();
    assert!(max <= 5, "{} hospitals in flight with a pool of 5", max);
    assert!(max > 1, "batch ran sequentially");
}

#[tokio::test]
async fn test_failing_hospital_does_not_abort_batch() {
    let gov = Arc::new(
        ScriptedCollector::returning(SourceKind::GovernmentApi, gov_record()).script(
            "H-02",
            vec![Step::Fail(CollectorError::Unavailable(
                "hospital not listed".into(),
            ))],
        ),
    );
    let survey = Arc::new(
        ScriptedCollector::returning(SourceKind::Survey, survey_record()).script(
            "H-02",
            vec![Step::Fail(CollectorError::InvalidResponse("empty body".into()))],
        ),
    );
    let hms = Arc::new(
        ScriptedCollector::returning(SourceKind::HmsApi, hms_record()).only_for(&["H-01"]),
    );
    let orchestrator = create_test_orchestrator(registry(vec![gov, survey, hms]));

    let result = orchestrator.batch_hospital_integration(hospitals(3)).await;

    assert_eq!(result.total_hospitals, 3);
    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 1);

    // Outcomes follow input order
    let ids: Vec<&str> = result.outcomes.iter().map(|o| o.hospital_id.as_str()).collect();
    assert_eq!(ids, vec!["H-01", "H-02", "H-03"]);

    let failed = &result.outcomes[1];
    assert_eq!(failed.status, OverallStatus::Failed);
    assert!(failed.error.is_some());
    assert!(failed.overall_quality.is_none());
    assert_eq!(
        failed.failed_sources,
        vec![SourceKind::GovernmentApi, SourceKind::Survey]
    );

    let first = &result.outcomes[0];
    assert_eq!(
        first.completed_sources,
        vec![SourceKind::GovernmentApi, SourceKind::HmsApi, SourceKind::Survey]
    );
    assert_eq!(first.benchmark_readiness, Some(100.0));

    // Coverage is per hospital in the batch
    let round2 = |pct: f64| (pct * 100.0).round() / 100.0;
    assert_eq!(round2(result.source_coverage[&SourceKind::GovernmentApi]), 66.67);
    assert_eq!(round2(result.source_coverage[&SourceKind::HmsApi]), 33.33);
    assert_eq!(result.source_coverage[&SourceKind::PartnerNetwork], 0.0);
    assert_eq!(result.most_common_source, Some(SourceKind::GovernmentApi));
    assert!(result.average_quality.is_some());
}

#[tokio::test]
async fn test_batch_emits_progress_per_hospital() {
    let gov = Arc::new(ScriptedCollector::returning(
        SourceKind::GovernmentApi,
        gov_record(),
    ));
    let bus = EventBus::new(1024);
    let mut rx = bus.subscribe();
    let orchestrator = create_test_orchestrator(registry(vec![gov])).with_event_bus(bus);

    let result = orchestrator.batch_hospital_integration(hospitals(4)).await;

    let mut progress = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let IntegrationEvent::BatchProgress {
            batch_id,
            completed,
            total,
            ..
        } = event
        {
            assert_eq!(batch_id, result.batch_id);
            assert_eq!(total, 4);
            progress.push(completed);
        }
    }
    assert_eq!(progress, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_empty_batch() {
    let orchestrator = create_test_orchestrator(registry(vec![]));
    let result = orchestrator.batch_hospital_integration(Vec::new()).await;

    assert_eq!(result.total_hospitals, 0);
    assert_eq!(result.success_rate, 0.0);
    assert!(result.outcomes.is_empty());
    assert!(orchestrator.store().is_empty().await);
}
