//! Threat detection over the audit event store
//!
//! A read-only analytical layer: five independent rules mine a trailing
//! window of events for attack patterns and emit transient alerts. Each
//! alert is re-logged as a security audit event for traceability; alerts
//! are recomputed fresh on every sweep with no deduplication store.

use crate::error::Result;
use crate::ingest::AuditLogger;
use crate::store::{AuditQuery, AuditStore};
use crate::types::{
    ActorRole, AuditCategory, AuditContext, AuditEvent, AuditStatus, EventType,
    NewAuditEvent, Severity,
};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on events fetched per rule query
const RULE_QUERY_LIMIT: usize = 10_000;

/// Contributing events kept on an alert
const MAX_EVIDENCE: usize = 5;

/// Kind of attack pattern an alert describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    BruteForce,
    AnomalousAccess,
    SuspiciousActivity,
    DataExfiltration,
    PrivilegeEscalation,
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BruteForce => "brute_force",
            Self::AnomalousAccess => "anomalous_access",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::DataExfiltration => "data_exfiltration",
            Self::PrivilegeEscalation => "privilege_escalation",
        };
        write!(f, "{}", s)
    }
}

/// Bounded reference to a contributing event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
}

impl From<&AuditEvent> for EvidenceEvent {
    fn from(event: &AuditEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            timestamp: event.timestamp,
            action: event.action.clone(),
        }
    }
}

/// A detected attack pattern
///
/// Transient analytical output; persisted only in re-expressed form as a
/// security audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatAlert {
    /// Synthetic identifier (thr-<uuid>)
    pub id: String,

    pub threat_type: ThreatType,

    pub severity: Severity,

    /// 0-100
    pub confidence: u8,

    pub title: String,

    pub description: String,

    /// IPs and emails implicated in the pattern
    pub indicators: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,

    pub detected_at: DateTime<Utc>,

    /// First/last sample of contributing events, never the full set
    pub evidence: Vec<EvidenceEvent>,
}

/// Threat detection engine
pub struct ThreatDetector {
    store: Arc<dyn AuditStore>,
    logger: Arc<AuditLogger>,
}

impl ThreatDetector {
    pub fn new(store: Arc<dyn AuditStore>, logger: Arc<AuditLogger>) -> Self {
        Self { store, logger }
    }

    /// Run every detection rule over the trailing window
    ///
    /// Rules are order-independent; a single rule's query failure is
    /// logged and skipped, so the call always returns whatever alerts
    /// were successfully computed.
    pub async fn analyze_threats(&self, tenant_id: &str, window_hours: u32) -> Vec<ThreatAlert> {
        let from = Utc::now() - Duration::hours(i64::from(window_hours));
        let mut alerts = Vec::new();

        match self.detect_brute_force(tenant_id, from).await {
            Ok(mut found) => alerts.append(&mut found),
            Err(e) => rule_failed("brute_force", tenant_id, &e),
        }
        match self.detect_anomalous_access(tenant_id, from).await {
            Ok(mut found) => alerts.append(&mut found),
            Err(e) => rule_failed("anomalous_access", tenant_id, &e),
        }
        match self.detect_suspicious_activity(tenant_id, from).await {
            Ok(mut found) => alerts.append(&mut found),
            Err(e) => rule_failed("suspicious_activity", tenant_id, &e),
        }
        match self.detect_data_exfiltration(tenant_id, from).await {
            Ok(mut found) => alerts.append(&mut found),
            Err(e) => rule_failed("data_exfiltration", tenant_id, &e),
        }
        match self.detect_privilege_escalation(tenant_id, from).await {
            Ok(mut found) => alerts.append(&mut found),
            Err(e) => rule_failed("privilege_escalation", tenant_id, &e),
        }

        for alert in &alerts {
            self.log_alert(tenant_id, alert).await;
        }

        alerts
    }

    /// Repeated failed authentication from one (source, account) pair
    pub async fn detect_brute_force(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<ThreatAlert>> {
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .in_category(AuditCategory::Authentication)
                    .with_status(AuditStatus::Failure)
                    .with_limit(RULE_QUERY_LIMIT),
            )
            .await?;

        let mut groups: HashMap<(String, String), Vec<&AuditEvent>> = HashMap::new();
        for event in &events {
            let source = event
                .source_address
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            let account = event
                .actor
                .as_ref()
                .and_then(|a| a.email.clone())
                .unwrap_or_else(|| "unknown".to_string());
            groups.entry((source, account)).or_default().push(event);
        }

        let mut alerts = Vec::new();
        for ((source, account), group) in groups {
            let count = group.len();
            if count < 5 {
                continue;
            }
            let severity = match count {
                n if n >= 50 => Severity::Critical,
                n if n >= 20 => Severity::High,
                n if n >= 10 => Severity::Medium,
                _ => Severity::Low,
            };
            alerts.push(ThreatAlert {
                id: format!("thr-{}", Uuid::new_v4()),
                threat_type: ThreatType::BruteForce,
                severity,
                confidence: (count * 10).min(95) as u8,
                title: format!("Brute force attempt against {}", account),
                description: format!(
                    "{} failed authentication attempts for {} from {}",
                    count, account, source
                ),
                indicators: vec![source.clone(), account.clone()],
                affected_user: Some(account),
                source_address: Some(source),
                detected_at: Utc::now(),
                evidence: evidence_sample(&group),
            });
        }
        Ok(alerts)
    }

    /// Repeated data reads/exports outside business hours
    ///
    /// Each event's own timestamp is tested against business hours
    /// (08:00-18:00 Mon-Fri), so detections do not depend on when the
    /// sweep happens to run.
    pub async fn detect_anomalous_access(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<ThreatAlert>> {
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .in_category(AuditCategory::Data)
                    .with_limit(RULE_QUERY_LIMIT),
            )
            .await?;

        let mut groups: HashMap<String, Vec<&AuditEvent>> = HashMap::new();
        for event in &events {
            if !matches!(event.event_type, EventType::Read | EventType::Export) {
                continue;
            }
            if within_business_hours(event.timestamp) {
                continue;
            }
            let Some(actor) = event.actor.as_ref().and_then(|a| a.key()) else {
                continue;
            };
            groups.entry(actor.to_string()).or_default().push(event);
        }

        let mut alerts = Vec::new();
        for (actor, group) in groups {
            let count = group.len();
            if count < 3 {
                continue;
            }
            alerts.push(ThreatAlert {
                id: format!("thr-{}", Uuid::new_v4()),
                threat_type: ThreatType::AnomalousAccess,
                severity: Severity::Medium,
                confidence: 75,
                title: format!("Off-hours data access by {}", actor),
                description: format!(
                    "{} data reads/exports outside business hours by {}",
                    count, actor
                ),
                indicators: vec![actor.clone()],
                affected_user: Some(actor),
                source_address: group.iter().find_map(|e| e.source_address.clone()),
                detected_at: Utc::now(),
                evidence: evidence_sample(&group),
            });
        }
        Ok(alerts)
    }

    /// Bursts of actions faster than a human operator
    pub async fn detect_suspicious_activity(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<ThreatAlert>> {
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .with_limit(RULE_QUERY_LIMIT),
            )
            .await?;

        let mut groups: HashMap<String, Vec<&AuditEvent>> = HashMap::new();
        for event in &events {
            let Some(actor) = event.actor.as_ref().and_then(|a| a.key()) else {
                continue;
            };
            groups.entry(actor.to_string()).or_default().push(event);
        }

        let mut alerts = Vec::new();
        for (actor, mut group) in groups {
            group.sort_by_key(|e| e.timestamp);
            let rapid_pairs = group
                .windows(2)
                .filter(|pair| pair[1].timestamp - pair[0].timestamp < Duration::seconds(1))
                .count();
            if rapid_pairs < 5 {
                continue;
            }
            alerts.push(ThreatAlert {
                id: format!("thr-{}", Uuid::new_v4()),
                threat_type: ThreatType::SuspiciousActivity,
                severity: Severity::Medium,
                confidence: 70,
                title: format!("Rapid-fire activity by {}", actor),
                description: format!(
                    "{} sub-second action pairs by {}, faster than interactive use",
                    rapid_pairs, actor
                ),
                indicators: vec![actor.clone()],
                affected_user: Some(actor),
                source_address: group.iter().find_map(|e| e.source_address.clone()),
                detected_at: Utc::now(),
                evidence: evidence_sample(&group),
            });
        }
        Ok(alerts)
    }

    /// High-volume data export by one actor
    pub async fn detect_data_exfiltration(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<ThreatAlert>> {
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .of_type(EventType::Export)
                    .with_limit(RULE_QUERY_LIMIT),
            )
            .await?;

        let mut groups: HashMap<String, Vec<&AuditEvent>> = HashMap::new();
        for event in &events {
            let Some(actor) = event.actor.as_ref().and_then(|a| a.key()) else {
                continue;
            };
            groups.entry(actor.to_string()).or_default().push(event);
        }

        let mut alerts = Vec::new();
        for (actor, group) in groups {
            let count = group.len();
            if count < 10 {
                continue;
            }
            let severity = if count >= 20 {
                Severity::High
            } else {
                Severity::Medium
            };
            alerts.push(ThreatAlert {
                id: format!("thr-{}", Uuid::new_v4()),
                threat_type: ThreatType::DataExfiltration,
                severity,
                confidence: (count * 5).min(90) as u8,
                title: format!("Possible data exfiltration by {}", actor),
                description: format!("{} export operations by {} within the window", count, actor),
                indicators: vec![actor.clone()],
                affected_user: Some(actor),
                source_address: group.iter().find_map(|e| e.source_address.clone()),
                detected_at: Utc::now(),
                evidence: evidence_sample(&group),
            });
        }
        Ok(alerts)
    }

    /// Repeated denied privileged operations by non-admin actors
    pub async fn detect_privilege_escalation(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<ThreatAlert>> {
        let events = self
            .store
            .query(
                &AuditQuery::for_tenant(tenant_id)
                    .since(from)
                    .with_status(AuditStatus::Failure)
                    .with_limit(RULE_QUERY_LIMIT),
            )
            .await?;

        let mut groups: HashMap<String, Vec<&AuditEvent>> = HashMap::new();
        for event in &events {
            if !matches!(event.event_type, EventType::Access | EventType::Admin) {
                continue;
            }
            let Some(actor) = event.actor.as_ref() else {
                continue;
            };
            if !matches!(
                actor.role,
                Some(ActorRole::Technician) | Some(ActorRole::Manager)
            ) {
                continue;
            }
            let Some(key) = actor.key() else {
                continue;
            };
            groups.entry(key.to_string()).or_default().push(event);
        }

        let mut alerts = Vec::new();
        for (actor, group) in groups {
            let count = group.len();
            if count < 3 {
                continue;
            }
            alerts.push(ThreatAlert {
                id: format!("thr-{}", Uuid::new_v4()),
                threat_type: ThreatType::PrivilegeEscalation,
                severity: Severity::High,
                confidence: 85,
                title: format!("Privilege escalation attempts by {}", actor),
                description: format!(
                    "{} denied privileged operations by non-admin {}",
                    count, actor
                ),
                indicators: vec![actor.clone()],
                affected_user: Some(actor),
                source_address: group.iter().find_map(|e| e.source_address.clone()),
                detected_at: Utc::now(),
                evidence: evidence_sample(&group),
            });
        }
        Ok(alerts)
    }

    /// Re-log an alert as a security audit event; failures are logged,
    /// never propagated, so one bad write cannot hide other alerts
    async fn log_alert(&self, tenant_id: &str, alert: &ThreatAlert) {
        let ctx = AuditContext::new(tenant_id);
        let details = serde_json::json!({
            "alertId": alert.id,
            "threatType": alert.threat_type,
            "confidence": alert.confidence,
            "indicators": alert.indicators,
            "affectedUser": alert.affected_user,
            "evidence": alert.evidence,
        });
        let data = NewAuditEvent::new(
            EventType::System,
            "threat_detected",
            AuditCategory::Security,
            alert.title.clone(),
        )
        .with_severity(alert.severity)
        .with_details(details);

        if let Err(e) = self.logger.log_event(&ctx, data).await {
            tracing::warn!(
                tenant = %tenant_id,
                alert_id = %alert.id,
                error = %e,
                "Failed to log threat alert as audit event"
            );
        }
    }
}

fn rule_failed(rule: &str, tenant_id: &str, error: &crate::error::AuditError) {
    tracing::warn!(
        rule = rule,
        tenant = %tenant_id,
        error = %error,
        "Detection rule failed; continuing with remaining rules"
    );
}

/// 08:00-18:00, Monday through Friday
fn within_business_hours(t: DateTime<Utc>) -> bool {
    !matches!(t.weekday(), Weekday::Sat | Weekday::Sun) && (8..18).contains(&t.hour())
}

/// First/last sample of contributing events
fn evidence_sample(events: &[&AuditEvent]) -> Vec<EvidenceEvent> {
    if events.len() <= MAX_EVIDENCE {
        return events.iter().map(|e| EvidenceEvent::from(*e)).collect();
    }
    let head = events.iter().take(3);
    let tail = events.iter().skip(events.len() - 2);
    head.chain(tail).map(|e| EvidenceEvent::from(*e)).collect()
}
