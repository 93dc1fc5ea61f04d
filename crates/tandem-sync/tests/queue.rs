//! Job queue: lane priority, failure ledger and worker lifecycle.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{detect, engine, seed_agent, seed_product, source_agent, synced_agent};
use tandem_core::{ConflictType, JobStatus, Severity, SyncLane, SyncTask};
use tandem_sync::JobOutcome;

fn completed_id(outcome: JobOutcome) -> String {
    match outcome {
        JobOutcome::Completed { job_id } => job_id,
        other => panic!("expected a completed job, got {:?}", other),
    }
}

#[tokio::test]
async fn test_compliance_lane_drains_first() {
    let svc = engine().await;
    seed_product(&svc, "X1", "Maize Flour 2kg", 350).await;
    seed_agent(&svc, &source_agent(7, "Amina Yusuf")).await;

    let stock = svc
        .enqueue_sync(
            SyncTask::StockAllocation {
                agent_id: 7,
                sku: "X1".to_string(),
                quantity: 12,
                allocation_id: None,
            },
            None,
        )
        .await
        .unwrap();
    let agent = svc.enqueue_sync(SyncTask::Agent { agent_id: 7 }, None).await.unwrap();
    let compliance = svc
        .enqueue_sync(
            SyncTask::ComplianceAction {
                agent_id: 7,
                action_type: "warning".to_string(),
                severity: Severity::Medium,
                reason: "missed check-in".to_string(),
                action_id: None,
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(stock.lane, SyncLane::Normal);
    assert_eq!(agent.lane, SyncLane::High);
    assert_eq!(compliance.lane, SyncLane::Compliance);

    assert_eq!(completed_id(svc.process_next_job().await.unwrap()), compliance.id);
    assert_eq!(completed_id(svc.process_next_job().await.unwrap()), agent.id);
    assert_eq!(completed_id(svc.process_next_job().await.unwrap()), stock.id);
    assert!(matches!(svc.process_next_job().await.unwrap(), JobOutcome::Idle));

    let bins = svc.context().mirror.bins().list_all().await.unwrap();
    assert_eq!(bins[0].current_stock, 12);
}

#[tokio::test]
async fn test_explicit_lane_overrides_default() {
    let svc = engine().await;
    seed_agent(&svc, &source_agent(7, "Amina Yusuf")).await;

    let job = svc
        .enqueue_sync(SyncTask::Agent { agent_id: 7 }, Some(SyncLane::Normal))
        .await
        .unwrap();

    assert_eq!(job.lane, SyncLane::Normal);
}

#[tokio::test]
async fn test_failed_job_is_detected() {
    let svc = engine().await;
    let job = svc.enqueue_sync(SyncTask::Agent { agent_id: 404 }, None).await.unwrap();

    let outcome = svc.process_next_job().await.unwrap();

    match outcome {
        JobOutcome::Failed { job_id, .. } => assert_eq!(job_id, job.id),
        other => panic!("expected a failed job, got {:?}", other),
    }
    let stored = svc.context().mirror.jobs().get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);

    let conflicts = detect(&svc).await;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].conflict_type, ConflictType::FailedSyncJob);
    assert_eq!(conflicts[0].job_id.as_deref(), Some(job.id.as_str()));
}

#[tokio::test]
async fn test_interrupted_jobs_are_requeued() {
    let svc = engine().await;
    seed_agent(&svc, &source_agent(7, "Amina Yusuf")).await;
    let job = svc.enqueue_sync(SyncTask::Agent { agent_id: 7 }, None).await.unwrap();
    svc.context().mirror.jobs().claim_next(Utc::now()).await.unwrap().unwrap();

    let requeued = svc.requeue_interrupted_jobs().await.unwrap();

    assert_eq!(requeued, 1);
    let stored = svc.context().mirror.jobs().get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(completed_id(svc.process_next_job().await.unwrap()), job.id);
}

#[tokio::test]
async fn test_workers_drain_queue_and_stop() {
    let svc = engine().await;
    seed_agent(&svc, &source_agent(7, "Amina Yusuf")).await;
    svc.enqueue_sync(SyncTask::Agent { agent_id: 7 }, None).await.unwrap();

    let handles = svc.spawn_workers();
    let mut synced = false;
    for _ in 0..100 {
        if svc.context().mirror.agents().get_by_external_id(7).await.unwrap().is_some() {
            synced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(synced, "workers never ran the queued job");

    svc.shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_dashboard_reflects_queue_and_alerts() {
    let svc = engine().await;
    synced_agent(&svc, &source_agent(7, "Amina Yusuf")).await;
    svc.enqueue_sync(SyncTask::Agent { agent_id: 7 }, None).await.unwrap();

    let dashboard = svc.get_dashboard_data().await.unwrap();

    let high = dashboard
        .queue
        .iter()
        .find(|d| d.lane == SyncLane::High)
        .unwrap();
    assert_eq!(high.pending, 1);
    assert_eq!(dashboard.conflicts.total, 0);
    assert!(dashboard.open_alerts.is_empty());
    assert!(dashboard.recent_enforcement.is_empty());
}
