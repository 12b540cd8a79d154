//! Retention and archival engine
//!
//! Evaluates per-tenant retention policies: selects records older than
//! the policy cutoff across the registered entity stores, archives them
//! when configured (always before deletion), deletes them from primary
//! storage, and accumulates execution statistics back onto the policy.
//!
//! Failure isolation: one policy's failure never blocks the others; an
//! archive-write failure aborts that policy's execution before any
//! deletion.

pub mod archive;
pub mod policy;

pub use policy::{
    ArchiveFormat, ArchiveResult, ExecutionRecord, Frequency, LegalHold, PeriodUnit,
    PolicyStats, RetentionPeriod, RetentionPolicy, Schedule,
};

use crate::error::{AuditError, Result};
use crate::ingest::AuditLogger;
use crate::store::{PolicyStore, RecordStore};
use crate::types::{
    AuditCategory, AuditContext, AuditStatus, EntityType, EventType, NewAuditEvent,
    Severity,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Deadline applied to every store call inside a policy execution.
/// A timeout counts as that policy's execution failure.
const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Deleting more than this many records in one run raises the severity
/// of the summary audit event.
const BULK_DELETE_THRESHOLD: u64 = 1000;

/// Retention policy execution engine
///
/// Constructed once at process start with the policy store, the audit
/// logger, and a record store per entity type it is allowed to sweep.
pub struct RetentionEngine {
    policies: Arc<dyn PolicyStore>,
    records: HashMap<EntityType, Arc<dyn RecordStore>>,
    logger: Arc<AuditLogger>,
    store_timeout: Duration,
}

impl RetentionEngine {
    pub fn new(policies: Arc<dyn PolicyStore>, logger: Arc<AuditLogger>) -> Self {
        Self {
            policies,
            records: HashMap::new(),
            logger,
            store_timeout: STORE_CALL_TIMEOUT,
        }
    }

    /// Register the record store serving one entity type
    pub fn with_record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.records.insert(store.entity_type(), store);
        self
    }

    /// Override the per-store-call deadline
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    // ── Policy CRUD ─────────────────────────────────────────────────

    /// Create a policy, enforcing per-tenant name uniqueness
    pub async fn create_policy(&self, policy: RetentionPolicy) -> Result<RetentionPolicy> {
        if self
            .policies
            .find_by_name(&policy.tenant_id, &policy.name)
            .await?
            .is_some()
        {
            return Err(AuditError::PolicyExists(policy.name));
        }
        self.policies.save(&policy).await?;
        tracing::info!(
            tenant = %policy.tenant_id,
            policy = %policy.name,
            policy_id = %policy.id,
            "Retention policy created"
        );
        Ok(policy)
    }

    pub async fn get_policy(&self, id: &str) -> Result<Option<RetentionPolicy>> {
        self.policies.load(id).await
    }

    pub async fn list_policies(&self, tenant_id: Option<&str>) -> Result<Vec<RetentionPolicy>> {
        self.policies.list(tenant_id).await
    }

    /// Save an edited policy, refreshing its update timestamp
    pub async fn update_policy(&self, mut policy: RetentionPolicy) -> Result<RetentionPolicy> {
        policy.updated_at = Utc::now();
        self.policies.save(&policy).await?;
        Ok(policy)
    }

    /// Flip a policy's active flag, returning the new state
    pub async fn toggle_active(&self, id: &str) -> Result<RetentionPolicy> {
        let mut policy = self
            .policies
            .load(id)
            .await?
            .ok_or_else(|| AuditError::NotFound(format!("policy {}", id)))?;
        policy.active = !policy.active;
        policy.updated_at = Utc::now();
        self.policies.save(&policy).await?;

        tracing::info!(
            policy_id = %policy.id,
            active = policy.active,
            "Retention policy toggled"
        );
        Ok(policy)
    }

    pub async fn delete_policy(&self, id: &str) -> Result<()> {
        self.policies.delete(id).await
    }

    /// Execution history for a policy, newest first
    pub async fn execution_history(
        &self,
        policy_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        self.policies.load_executions(policy_id, limit).await
    }

    // ── Execution ───────────────────────────────────────────────────

    /// Execute one policy to completion
    ///
    /// Never returns an error: failures land in the result's `error`
    /// field and in the policy's error stats. A legal hold that exempts
    /// deletion short-circuits without touching any store.
    pub async fn execute_policy(&self, policy: &RetentionPolicy) -> ArchiveResult {
        if policy.legal_hold.blocks_execution() {
            tracing::info!(
                tenant = %policy.tenant_id,
                policy = %policy.name,
                "Policy under legal hold; skipped"
            );
            return ArchiveResult::default();
        }

        let started_at = Utc::now();
        let outcome = self.sweep(policy, started_at).await;

        let mut updated = policy.clone();
        let result = match outcome {
            Ok(result) => {
                updated.stats.records_archived += result.records_archived;
                updated.stats.records_deleted += result.records_deleted;
                updated.stats.bytes_archived += result.archive_size;
                updated.stats.last_executed = Some(started_at);

                tracing::info!(
                    tenant = %policy.tenant_id,
                    policy = %policy.name,
                    processed = result.records_processed,
                    archived = result.records_archived,
                    deleted = result.records_deleted,
                    "Retention policy executed"
                );
                result
            }
            Err(e) => {
                updated.stats.error_count += 1;
                updated.stats.last_error = Some(e.to_string());

                tracing::error!(
                    tenant = %policy.tenant_id,
                    policy = %policy.name,
                    error = %e,
                    "Retention policy execution failed"
                );
                ArchiveResult {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };

        if let Err(e) = self.policies.save(&updated).await {
            tracing::error!(
                policy_id = %policy.id,
                error = %e,
                "Failed to persist policy stats"
            );
        }
        let record = ExecutionRecord::new(policy, started_at, result.clone());
        if let Err(e) = self.policies.save_execution(&record).await {
            tracing::error!(
                policy_id = %policy.id,
                error = %e,
                "Failed to persist execution record"
            );
        }

        self.log_execution(policy, &result).await;
        result
    }

    /// Execute every due policy serially
    ///
    /// One policy's failure does not block the others; results are
    /// returned per policy id.
    pub async fn execute_ready_policies(&self) -> Vec<(String, ArchiveResult)> {
        let now = Utc::now();
        let policies = match self.policies.list(None).await {
            Ok(policies) => policies,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list retention policies");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for policy in policies.into_iter().filter(|p| p.is_due(now)) {
            let result = self.execute_policy(&policy).await;
            results.push((policy.id, result));
        }
        results
    }

    /// Report what a policy execution would touch, without mutating
    /// anything
    pub async fn dry_run(&self, policy: &RetentionPolicy) -> Result<ArchiveResult> {
        if policy.legal_hold.blocks_execution() {
            return Ok(ArchiveResult::default());
        }

        let now = Utc::now();
        let cutoff = self.cutoff_for(policy, now)?;
        let mut result = ArchiveResult::default();

        for (entity_type, store) in self.stores_for(policy)? {
            let records = self
                .with_timeout(
                    "find_expired",
                    store.find_expired(&policy.tenant_id, cutoff, &policy.conditions),
                )
                .await?;
            tracing::debug!(
                policy = %policy.name,
                entity_type = %entity_type,
                matched = records.len(),
                "Dry run matched records"
            );
            result.records_processed += records.len() as u64;
        }
        Ok(result)
    }

    /// Archive and delete one policy's matching records
    async fn sweep(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<ArchiveResult> {
        let cutoff = self.cutoff_for(policy, now)?;
        let mut total = ArchiveResult::default();

        for (entity_type, store) in self.stores_for(policy)? {
            let partial = self
                .sweep_entity(policy, store, entity_type, cutoff, now)
                .await?;
            total.absorb(partial);
        }
        Ok(total)
    }

    async fn sweep_entity(
        &self,
        policy: &RetentionPolicy,
        store: &Arc<dyn RecordStore>,
        entity_type: EntityType,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ArchiveResult> {
        let records = self
            .with_timeout(
                "find_expired",
                store.find_expired(&policy.tenant_id, cutoff, &policy.conditions),
            )
            .await?;

        if records.is_empty() {
            return Ok(ArchiveResult::default());
        }

        let mut result = ArchiveResult {
            records_processed: records.len() as u64,
            ..Default::default()
        };

        // Archive must complete before any deletion
        if policy.archive_before_delete {
            let (path, size) = archive::write_archive(
                &policy.archive_location,
                &policy.tenant_id,
                entity_type,
                policy.archive_format,
                &records,
                now,
            )
            .await?;
            result.records_archived = records.len() as u64;
            result.archive_size = size;
            result.archive_location = Some(path.display().to_string());
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let deleted = self
            .with_timeout("delete", store.delete(&policy.tenant_id, &ids))
            .await?;
        result.records_deleted = deleted;

        Ok(result)
    }

    fn cutoff_for(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        policy.cutoff(now).ok_or_else(|| {
            AuditError::Config(format!(
                "retention period of policy '{}' leaves the calendar",
                policy.name
            ))
        })
    }

    /// Resolve the record stores a policy sweeps
    ///
    /// `All` expands to every registered concrete store; a concrete
    /// entity type with no registered store is an error.
    fn stores_for(
        &self,
        policy: &RetentionPolicy,
    ) -> Result<Vec<(EntityType, &Arc<dyn RecordStore>)>> {
        if policy.entity_type == EntityType::All {
            return Ok(EntityType::CONCRETE
                .iter()
                .filter_map(|et| self.records.get(et).map(|store| (*et, store)))
                .collect());
        }

        let store = self.records.get(&policy.entity_type).ok_or_else(|| {
            AuditError::NotFound(format!(
                "no record store registered for entity type {}",
                policy.entity_type
            ))
        })?;
        Ok(vec![(policy.entity_type, store)])
    }

    async fn with_timeout<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuditError::Timeout(format!(
                "store call '{}' exceeded {:?}",
                op, self.store_timeout
            ))),
        }
    }

    /// Emit the summary audit event for one policy run
    async fn log_execution(&self, policy: &RetentionPolicy, result: &ArchiveResult) {
        let severity = if result.records_deleted > BULK_DELETE_THRESHOLD {
            Severity::High
        } else {
            Severity::Low
        };
        let status = if result.error.is_some() {
            AuditStatus::Failure
        } else {
            AuditStatus::Success
        };

        let mut data = NewAuditEvent::new(
            EventType::Delete,
            "retention_policy_executed",
            AuditCategory::Data,
            format!(
                "Retention policy '{}' processed {} records ({} archived, {} deleted)",
                policy.name,
                result.records_processed,
                result.records_archived,
                result.records_deleted
            ),
        )
        .with_severity(severity)
        .with_status(status)
        .with_details(serde_json::json!({
            "policyId": policy.id,
            "entityType": policy.entity_type,
            "recordsProcessed": result.records_processed,
            "recordsArchived": result.records_archived,
            "recordsDeleted": result.records_deleted,
            "archiveSize": result.archive_size,
            "archiveLocation": result.archive_location,
        }));
        if let Some(error) = &result.error {
            data.error_message = Some(error.clone());
        }

        let ctx = AuditContext::new(&policy.tenant_id);
        if let Err(e) = self.logger.log_event(&ctx, data).await {
            tracing::warn!(
                policy_id = %policy.id,
                error = %e,
                "Failed to log retention execution event"
            );
        }
    }
}
