//! In-memory store backends
//!
//! Reference implementations of the storage seams for testing and
//! single-process use. State lives behind `tokio::sync::RwLock`; the
//! audit store enforces a max capacity by draining oldest events.

use crate::error::{AuditError, Result};
use crate::retention::policy::{ExecutionRecord, RetentionPolicy};
use crate::store::{AuditQuery, AuditStore, PolicyStore, RecordStore, StoreInfo};
use crate::types::{AuditEvent, EntityRecord, EntityType, FieldCondition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory audit event store
pub struct MemoryAuditStore {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    max_events: usize,
}

impl MemoryAuditStore {
    /// Create a store bounded at the given capacity (0 = unbounded)
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            max_events,
        }
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, event: &AuditEvent) -> Result<()> {
        let mut events = self.events.write().await;
        events.push(event.clone());

        // Enforce max capacity, oldest first
        if self.max_events > 0 && events.len() > self.max_events {
            let drain_count = events.len() - self.max_events;
            events.drain(..drain_count);
        }

        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<AuditEvent> =
            events.iter().filter(|e| query.matches(e)).cloned().collect();

        // Newest first
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count(&self, query: &AuditQuery) -> Result<u64> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| query.matches(e)).count() as u64)
    }

    async fn delete(&self, tenant_id: &str, ids: &[String]) -> Result<u64> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| !(e.tenant_id == tenant_id && ids.contains(&e.id)));
        Ok((before - events.len()) as u64)
    }

    async fn info(&self) -> Result<StoreInfo> {
        let events = self.events.read().await;
        Ok(StoreInfo {
            backend: "memory".to_string(),
            events: events.len() as u64,
        })
    }
}

/// Adapter exposing an `AuditStore` as the retention engine's
/// `RecordStore` for the auditLog entity type
pub struct AuditLogRecordStore {
    store: Arc<dyn AuditStore>,
}

impl AuditLogRecordStore {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecordStore for AuditLogRecordStore {
    fn entity_type(&self) -> EntityType {
        EntityType::AuditLog
    }

    async fn find_expired(
        &self,
        tenant_id: &str,
        cutoff: DateTime<Utc>,
        conditions: &[FieldCondition],
    ) -> Result<Vec<EntityRecord>> {
        let mut query = AuditQuery::for_tenant(tenant_id).until(cutoff);
        query.limit = usize::MAX;

        let events = self.store.query(&query).await?;
        let mut records = Vec::with_capacity(events.len());
        for event in events {
            let fields = serde_json::to_value(&event)?;
            let record = EntityRecord {
                id: event.id,
                created_at: event.timestamp,
                fields,
            };
            if conditions.iter().all(|c| c.matches(&record.fields)) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn delete(&self, tenant_id: &str, ids: &[String]) -> Result<u64> {
        self.store.delete(tenant_id, ids).await
    }
}

/// In-memory primary store for one entity type
///
/// Test double for the form/report/user/template/dashboard stores the
/// real deployment wires in.
pub struct MemoryRecordStore {
    entity_type: EntityType,
    records: Arc<RwLock<HashMap<String, Vec<EntityRecord>>>>,
}

impl MemoryRecordStore {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seed a record for a tenant
    pub async fn insert(&self, tenant_id: &str, record: EntityRecord) {
        let mut records = self.records.write().await;
        records
            .entry(tenant_id.to_string())
            .or_default()
            .push(record);
    }

    /// Count records held for a tenant
    pub async fn len(&self, tenant_id: &str) -> usize {
        let records = self.records.read().await;
        records.get(tenant_id).map_or(0, Vec::len)
    }

    pub async fn is_empty(&self, tenant_id: &str) -> bool {
        self.len(tenant_id).await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn find_expired(
        &self,
        tenant_id: &str,
        cutoff: DateTime<Utc>,
        conditions: &[FieldCondition],
    ) -> Result<Vec<EntityRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(tenant_id)
            .map(|tenant_records| {
                tenant_records
                    .iter()
                    .filter(|r| r.created_at < cutoff)
                    .filter(|r| conditions.iter().all(|c| c.matches(&r.fields)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, tenant_id: &str, ids: &[String]) -> Result<u64> {
        let mut records = self.records.write().await;
        let Some(tenant_records) = records.get_mut(tenant_id) else {
            return Ok(0);
        };
        let before = tenant_records.len();
        tenant_records.retain(|r| !ids.contains(&r.id));
        Ok((before - tenant_records.len()) as u64)
    }
}

/// In-memory retention policy store
#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: Arc<RwLock<HashMap<String, RetentionPolicy>>>,
    executions: Arc<RwLock<HashMap<String, Vec<ExecutionRecord>>>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn save(&self, policy: &RetentionPolicy) -> Result<()> {
        // Enforce per-tenant name uniqueness
        let mut policies = self.policies.write().await;
        let taken = policies.values().any(|p| {
            p.tenant_id == policy.tenant_id && p.name == policy.name && p.id != policy.id
        });
        if taken {
            return Err(AuditError::PolicyExists(policy.name.clone()));
        }
        policies.insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<RetentionPolicy>> {
        let policies = self.policies.read().await;
        Ok(policies.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut policies = self.policies.write().await;
        if policies.remove(id).is_none() {
            return Err(AuditError::NotFound(format!("policy {}", id)));
        }
        drop(policies);

        let mut executions = self.executions.write().await;
        executions.remove(id);
        Ok(())
    }

    async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<RetentionPolicy>> {
        let policies = self.policies.read().await;
        let mut result: Vec<RetentionPolicy> = policies
            .values()
            .filter(|p| tenant_id.map_or(true, |t| p.tenant_id == t))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn find_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<RetentionPolicy>> {
        let policies = self.policies.read().await;
        Ok(policies
            .values()
            .find(|p| p.tenant_id == tenant_id && p.name == name)
            .cloned())
    }

    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let mut executions = self.executions.write().await;
        executions
            .entry(record.policy_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn load_executions(
        &self,
        policy_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        let executions = self.executions.read().await;
        Ok(executions
            .get(policy_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
