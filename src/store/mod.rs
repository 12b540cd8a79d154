//! Storage trait seams for the audit core
//!
//! All persistence goes through pluggable backends: `AuditStore` for the
//! append-only event collection, `RecordStore` for the primary-entity
//! stores the retention engine sweeps, and `PolicyStore` for retention
//! policies and their execution history. In-memory implementations live
//! in `memory` for tests and single-process use.

use crate::error::Result;
use crate::retention::policy::{ExecutionRecord, RetentionPolicy};
use crate::types::{
    AuditCategory, AuditEvent, AuditStatus, ComplianceTag, EntityRecord, EntityType,
    EventType, FieldCondition, Severity,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;

pub use memory::{
    AuditLogRecordStore, MemoryAuditStore, MemoryPolicyStore, MemoryRecordStore,
};

/// Filter for audit event queries
///
/// Every field except `tenant_id` is optional; unset fields do not
/// constrain the result. `search` is a case-insensitive substring match
/// over action and description.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub tenant_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category: Option<AuditCategory>,
    pub event_type: Option<EventType>,
    pub severity: Option<Severity>,
    pub min_severity: Option<Severity>,
    pub status: Option<AuditStatus>,
    pub actor: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub compliance_tag: Option<ComplianceTag>,
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl AuditQuery {
    /// Query for a tenant with the default page size
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            from: None,
            to: None,
            category: None,
            event_type: None,
            severity: None,
            min_severity: None,
            status: None,
            actor: None,
            resource_type: None,
            resource_id: None,
            compliance_tag: None,
            search: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn in_category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn with_tag(mut self, tag: ComplianceTag) -> Self {
        self.compliance_tag = Some(tag);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Check a single event against this filter, ignoring paging
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if event.tenant_id != self.tenant_id {
            return false;
        }
        if let Some(from) = self.from {
            if event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.timestamp >= to {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category != category {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if event.severity != severity {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        if let Some(status) = self.status {
            if event.status != status {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            let matched = event
                .actor
                .as_ref()
                .map_or(false, |a| a.key() == Some(actor.as_str()));
            if !matched {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            let matched = event
                .resource
                .as_ref()
                .map_or(false, |r| &r.resource_type == resource_type);
            if !matched {
                return false;
            }
        }
        if let Some(resource_id) = &self.resource_id {
            let matched = event
                .resource
                .as_ref()
                .map_or(false, |r| r.resource_id.as_deref() == Some(resource_id));
            if !matched {
                return false;
            }
        }
        if let Some(tag) = self.compliance_tag {
            if !event.compliance_tags.contains(&tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let matched = event.action.to_lowercase().contains(&needle)
                || event.description.to_lowercase().contains(&needle);
            if !matched {
                return false;
            }
        }
        true
    }
}

/// Store status information
#[derive(Debug, Clone)]
pub struct StoreInfo {
    /// Backend name (e.g. "memory")
    pub backend: String,
    /// Total events stored across all tenants
    pub events: u64,
}

/// Append-only, time-indexed audit event collection
///
/// Partitioned by tenant. The only deletion path is the retention
/// engine's cutoff-scoped sweep (through the `RecordStore` adapter) or
/// store-level expiry.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one immutable event
    async fn insert(&self, event: &AuditEvent) -> Result<()>;

    /// Fetch events matching a filter, newest first, paginated
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>>;

    /// Count events matching a filter, ignoring paging
    async fn count(&self, query: &AuditQuery) -> Result<u64>;

    /// Delete events by id within a tenant, returning the deleted count
    async fn delete(&self, tenant_id: &str, ids: &[String]) -> Result<u64>;

    /// Get store info (backend, event count)
    async fn info(&self) -> Result<StoreInfo>;

    /// Health check; defaults to delegating to `info()`
    async fn health(&self) -> Result<bool> {
        self.info().await.map(|_| true)
    }
}

/// Primary store for one entity type, as seen by the retention engine
///
/// Implementations reduce their native models to `EntityRecord` so the
/// sweep can archive and delete any entity type through one seam.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The concrete entity type this store serves
    fn entity_type(&self) -> EntityType;

    /// Records created strictly before the cutoff that satisfy every
    /// condition, for one tenant
    async fn find_expired(
        &self,
        tenant_id: &str,
        cutoff: DateTime<Utc>,
        conditions: &[FieldCondition],
    ) -> Result<Vec<EntityRecord>>;

    /// Delete records by id within a tenant, returning the deleted count
    async fn delete(&self, tenant_id: &str, ids: &[String]) -> Result<u64>;
}

/// Persistence for retention policies and their execution history
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Save (insert or update) a policy
    async fn save(&self, policy: &RetentionPolicy) -> Result<()>;

    /// Load a policy by id
    async fn load(&self, id: &str) -> Result<Option<RetentionPolicy>>;

    /// Delete a policy and its execution history
    async fn delete(&self, id: &str) -> Result<()>;

    /// List policies, optionally scoped to one tenant
    async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<RetentionPolicy>>;

    /// Find a policy by its per-tenant unique name
    async fn find_by_name(&self, tenant_id: &str, name: &str)
        -> Result<Option<RetentionPolicy>>;

    /// Append an execution record
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()>;

    /// Load execution history for a policy, newest first
    async fn load_executions(
        &self,
        policy_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>>;
}
