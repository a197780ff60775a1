//! Keyed in-memory plan store
//!
//! `plan_id → IntegrationPlan`, plus an archive that finished plans move to
//! once they outlive the retention window. Archived plans are dropped once
//! they also outlive the archive window. Snapshots persist both maps as a
//! single JSON document.

use crate::models::IntegrationPlan;
use chrono::{DateTime, Duration, Utc};
use hpi_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a retention sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub archived: Vec<Uuid>,
    /// Archived plans removed for good
    #[serde(default)]
    pub purged: Vec<Uuid>,
    pub remaining: usize,
    pub swept_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    plans: Vec<IntegrationPlan>,
    #[serde(default)]
    archived: Vec<IntegrationPlan>,
}

#[derive(Debug, Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<Uuid, IntegrationPlan>>,
    archive: RwLock<HashMap<Uuid, IntegrationPlan>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a plan
    pub async fn put(&self, plan: IntegrationPlan) {
        debug!(plan_id = %plan.plan_id, status = plan.overall_status.as_str(), "Storing plan");
        self.plans.write().await.insert(plan.plan_id, plan);
    }

    /// Look up a live or archived plan
    pub async fn get(&self, plan_id: Uuid) -> Result<IntegrationPlan> {
        if let Some(plan) = self.plans.read().await.get(&plan_id) {
            return Ok(plan.clone());
        }
        self.archive
            .read()
            .await
            .get(&plan_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plan {}", plan_id)))
    }

    /// Plans that have not reached a terminal status
    pub async fn list_active(&self) -> Vec<IntegrationPlan> {
        let mut plans: Vec<IntegrationPlan> = self
            .plans
            .read()
            .await
            .values()
            .filter(|p| !p.is_finished())
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.created_at);
        plans
    }

    /// Every live (non-archived) plan
    pub async fn list_all(&self) -> Vec<IntegrationPlan> {
        let mut plans: Vec<IntegrationPlan> = self.plans.read().await.values().cloned().collect();
        plans.sort_by_key(|p| p.created_at);
        plans
    }

    pub async fn list_archived(&self) -> Vec<IntegrationPlan> {
        let mut plans: Vec<IntegrationPlan> =
            self.archive.read().await.values().cloned().collect();
        plans.sort_by_key(|p| p.created_at);
        plans
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }

    /// Archive finished plans completed more than `max_age` ago, and purge
    /// archived plans completed more than `max_age + archive_age` ago
    pub async fn cleanup(&self, max_age: Duration, archive_age: Duration) -> CleanupSummary {
        self.cleanup_at(Utc::now(), max_age, archive_age).await
    }

    pub async fn cleanup_at(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
        archive_age: Duration,
    ) -> CleanupSummary {
        let cutoff = now - max_age;
        let purge_cutoff = cutoff - archive_age;
        let mut plans = self.plans.write().await;
        let mut archive = self.archive.write().await;

        let expired: Vec<Uuid> = plans
            .values()
            .filter(|p| p.is_finished() && p.completed_at.is_some_and(|at| at < cutoff))
            .map(|p| p.plan_id)
            .collect();

        for plan_id in &expired {
            if let Some(plan) = plans.remove(plan_id) {
                archive.insert(*plan_id, plan);
            }
        }

        let purged: Vec<Uuid> = archive
            .values()
            .filter(|p| p.completed_at.map_or(true, |at| at < purge_cutoff))
            .map(|p| p.plan_id)
            .collect();
        for plan_id in &purged {
            archive.remove(plan_id);
        }

        if !expired.is_empty() || !purged.is_empty() {
            info!(
                archived = expired.len(),
                purged = purged.len(),
                remaining = plans.len(),
                "Swept expired plans"
            );
        }

        CleanupSummary {
            archived: expired,
            purged,
            remaining: plans.len(),
            swept_at: Some(now),
        }
    }

    /// Write every plan to `path` as JSON (temp file + rename)
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            plans: self.list_all().await,
            archived: self.list_archived().await,
        };
        let content = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        info!(
            path = %path.display(),
            plans = snapshot.plans.len(),
            archived = snapshot.archived.len(),
            "Saved plan snapshot"
        );
        Ok(())
    }

    /// Rebuild a store from a snapshot written by [`PlanStore::save_snapshot`]
    pub async fn load_snapshot(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;

        let store = Self::new();
        {
            let mut plans = store.plans.write().await;
            for plan in snapshot.plans {
                plans.insert(plan.plan_id, plan);
            }
            let mut archive = store.archive.write().await;
            for plan in snapshot.archived {
                archive.insert(plan.plan_id, plan);
            }
        }
        debug!(path = %path.display(), saved_at = %snapshot.saved_at, "Loaded plan snapshot");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HospitalDescriptor, OverallStatus, PlanPhase};

    fn finished_plan(hospital_id: &str, completed_at: DateTime<Utc>) -> IntegrationPlan {
        let mut plan = IntegrationPlan::new(HospitalDescriptor::new(hospital_id, "Test"), vec![]);
        plan.begin().unwrap();
        plan.advance_phase(PlanPhase::DataCollection).unwrap();
        plan.finish_failed("no data");
        plan.completed_at = Some(completed_at);
        plan
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = PlanStore::new();
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_active_excludes_finished() {
        let store = PlanStore::new();
        let pending = IntegrationPlan::new(HospitalDescriptor::new("H-1", "A"), vec![]);
        let done = finished_plan("H-2", Utc::now());
        store.put(pending.clone()).await;
        store.put(done).await;

        let active = store.list_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].plan_id, pending.plan_id);
        assert_eq!(store.list_all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_archives_only_old_finished_plans() {
        let store = PlanStore::new();
        let now = Utc::now();
        let old = finished_plan("H-old", now - Duration::hours(30));
        let recent = finished_plan("H-new", now - Duration::hours(1));
        let running = IntegrationPlan::new(HospitalDescriptor::new("H-run", "R"), vec![]);
        let old_id = old.plan_id;

        store.put(old).await;
        store.put(recent).await;
        store.put(running).await;

        let summary = store
            .cleanup_at(now, Duration::hours(24), Duration::hours(168))
            .await;
        assert_eq!(summary.archived, vec![old_id]);
        assert!(summary.purged.is_empty());
        assert_eq!(summary.remaining, 2);

        // Archived plans stay addressable
        let archived = store.get(old_id).await.unwrap();
        assert_eq!(archived.overall_status, OverallStatus::Failed);
        assert_eq!(store.list_archived().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_purges_plans_past_archive_window() {
        let store = PlanStore::new();
        let now = Utc::now();
        let ancient = finished_plan("H-ancient", now - Duration::hours(24 + 200));
        let archived = finished_plan("H-archived", now - Duration::hours(30));
        let ancient_id = ancient.plan_id;
        let archived_id = archived.plan_id;
        store.put(ancient).await;
        store.put(archived).await;

        // First sweep archives both; the ancient one is already past both windows
        let summary = store
            .cleanup_at(now, Duration::hours(24), Duration::hours(168))
            .await;
        assert_eq!(summary.archived.len(), 2);
        assert_eq!(summary.purged, vec![ancient_id]);
        assert!(matches!(store.get(ancient_id).await, Err(Error::NotFound(_))));

        let later = now + Duration::hours(168);
        let summary = store
            .cleanup_at(later, Duration::hours(24), Duration::hours(168))
            .await;
        assert!(summary.archived.is_empty());
        assert_eq!(summary.purged, vec![archived_id]);
        assert!(store.list_archived().await.is_empty());
    }
}
