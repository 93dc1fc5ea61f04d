//! Shared fixtures for the engine tests. Every engine runs on in-memory
//! stores and the in-memory cache.

#![allow(dead_code)]

use chrono::Utc;
use tandem_core::{Conflict, SourceAgent};
use tandem_sync::{ReconConfig, ReconService};

pub async fn engine() -> ReconService {
    ReconService::in_memory(ReconConfig::default()).await.unwrap()
}

/// An active agent in the coastal zone with a clean record.
pub fn source_agent(id: i64, name: &str) -> SourceAgent {
    SourceAgent {
        id,
        name: name.to_string(),
        location: "Harbour Road, Port District".to_string(),
        status: "active".to_string(),
        rating: 4.2,
        compliance_score: 90,
        allocation_restricted: false,
        updated_at: Utc::now(),
    }
}

pub async fn seed_agent(svc: &ReconService, agent: &SourceAgent) {
    svc.context().source.agents().upsert(agent).await.unwrap();
}

pub async fn seed_product(svc: &ReconService, sku: &str, name: &str, unit_price_cents: i64) {
    svc.context()
        .source
        .products()
        .upsert(sku, name, unit_price_cents)
        .await
        .unwrap();
}

/// Seeds and syncs one agent, returning the mirror agent id.
pub async fn synced_agent(svc: &ReconService, agent: &SourceAgent) -> i64 {
    seed_agent(svc, agent).await;
    let outcome = svc.sync_agent(agent.id).await;
    assert!(outcome.success, "sync failed: {:?}", outcome.error);
    outcome.mirror_agent_id.unwrap()
}

/// Runs detection and returns every conflict found.
pub async fn detect(svc: &ReconService) -> Vec<Conflict> {
    let report = svc.detect_all_conflicts().await.unwrap();
    report.all().cloned().collect()
}
