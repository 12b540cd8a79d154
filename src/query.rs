//! Read-side query surface over the audit event store
//!
//! Serves the collaborator-facing views: filtered history, aggregate
//! summaries, security alert feeds, compliance reports, and bulk export.
//! Everything here is read-only.

use crate::error::Result;
use crate::retention::archive::csv_escape;
use crate::store::{AuditQuery, AuditStore};
use crate::types::{AuditEvent, AuditStatus, AuditSummary, ComplianceTag, Severity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Hard cap on bulk export size
const EXPORT_CAP: usize = 10_000;

/// Events fetched when building aggregate views
const AGGREGATE_FETCH_LIMIT: usize = 10_000;

/// Bulk export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

/// Compliance-tag report over a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub tag: ComplianceTag,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total: u64,
    pub by_severity: HashMap<String, u64>,
    pub by_status: HashMap<String, u64>,
}

/// Query service over the audit event store
pub struct AuditQueryService {
    store: Arc<dyn AuditStore>,
}

impl AuditQueryService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Filtered, paginated event listing
    pub async fn query_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        self.store.query(query).await
    }

    /// Count events matching a filter, ignoring paging
    pub async fn count_events(&self, query: &AuditQuery) -> Result<u64> {
        self.store.count(query).await
    }

    /// Aggregate counts by category, event type, and status
    pub async fn summary(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AuditSummary> {
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .until(to)
                    .with_limit(AGGREGATE_FETCH_LIMIT),
            )
            .await?;

        let mut summary = AuditSummary::default();
        for event in &events {
            *summary
                .by_category
                .entry(event.category.to_string())
                .or_insert(0) += 1;
            *summary
                .by_event_type
                .entry(event.event_type.to_string())
                .or_insert(0) += 1;
            *summary
                .by_status
                .entry(event.status.to_string())
                .or_insert(0) += 1;
            summary.total += 1;
        }
        Ok(summary)
    }

    /// Recent high-severity or failed events over a trailing window
    pub async fn security_alerts(
        &self,
        tenant_id: &str,
        window_hours: u32,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        let from = Utc::now() - Duration::hours(i64::from(window_hours));
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .with_limit(AGGREGATE_FETCH_LIMIT),
            )
            .await?;

        Ok(events
            .into_iter()
            .filter(|e| e.severity >= Severity::High || e.status == AuditStatus::Failure)
            .take(limit)
            .collect())
    }

    /// Events carrying a compliance tag, grouped by severity and status
    pub async fn compliance_report(
        &self,
        tenant_id: &str,
        tag: ComplianceTag,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ComplianceReport> {
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .until(to)
                    .with_tag(tag)
                    .with_limit(AGGREGATE_FETCH_LIMIT),
            )
            .await?;

        let mut report = ComplianceReport {
            tag,
            from,
            to,
            total: 0,
            by_severity: HashMap::new(),
            by_status: HashMap::new(),
        };
        for event in &events {
            *report
                .by_severity
                .entry(event.severity.to_string())
                .or_insert(0) += 1;
            *report
                .by_status
                .entry(event.status.to_string())
                .or_insert(0) += 1;
            report.total += 1;
        }
        Ok(report)
    }

    /// Bulk dump of filtered events, capped at 10,000 records
    pub async fn export_events(
        &self,
        query: &AuditQuery,
        format: ExportFormat,
    ) -> Result<String> {
        let mut capped = query.clone();
        capped.limit = capped.limit.min(EXPORT_CAP);
        let events = self.store.query(&capped).await?;

        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&events)?),
            ExportFormat::Csv => Ok(events_to_csv(&events)),
        }
    }
}

fn events_to_csv(events: &[AuditEvent]) -> String {
    let mut out = String::from(
        "id,timestamp,eventType,action,category,severity,riskLevel,status,actor,resourceType,resourceId,description\n",
    );

    for event in events {
        let actor = event
            .actor
            .as_ref()
            .and_then(|a| a.key())
            .unwrap_or_default();
        let (resource_type, resource_id) = event
            .resource
            .as_ref()
            .map(|r| {
                (
                    r.resource_type.as_str(),
                    r.resource_id.as_deref().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        let row = [
            csv_escape(&event.id),
            csv_escape(&event.timestamp.to_rfc3339()),
            csv_escape(&event.event_type.to_string()),
            csv_escape(&event.action),
            csv_escape(&event.category.to_string()),
            csv_escape(&event.severity.to_string()),
            csv_escape(&event.risk_level.to_string()),
            csv_escape(&event.status.to_string()),
            csv_escape(actor),
            csv_escape(resource_type),
            csv_escape(resource_id),
            csv_escape(&event.description),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}
