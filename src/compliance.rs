//! Compliance policy evaluation
//!
//! Scores a batch of audit events against a per-tenant rule set,
//! producing a 0-100 compliance score and a violation list. Evaluation
//! is pure; the ingestion service runs it as a post-write check and the
//! query surface exposes it for reporting.

use crate::types::{AuditEvent, AuditStatus, ComplianceTag, Severity};
use serde::{Deserialize, Serialize};

/// Penalty subtracted from the score per violation
const VIOLATION_PENALTY: u32 = 5;

/// A single compliance rule, scoped to events carrying its tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRule {
    pub name: String,

    /// Only events tagged with this regime are evaluated
    pub tag: ComplianceTag,

    /// Events above this severity are violations
    pub max_severity: Severity,

    /// Whether a failed outcome is itself a violation
    pub deny_failures: bool,
}

/// Per-tenant compliance rule set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompliancePolicy {
    pub tenant_id: String,
    pub rules: Vec<ComplianceRule>,
}

impl CompliancePolicy {
    /// Baseline rule set applied when a tenant has not configured one
    pub fn baseline(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            rules: vec![
                ComplianceRule {
                    name: "gdpr-data-handling".to_string(),
                    tag: ComplianceTag::Gdpr,
                    max_severity: Severity::High,
                    deny_failures: true,
                },
                ComplianceRule {
                    name: "iso27001-access-control".to_string(),
                    tag: ComplianceTag::Iso27001,
                    max_severity: Severity::High,
                    deny_failures: true,
                },
                ComplianceRule {
                    name: "sox-change-management".to_string(),
                    tag: ComplianceTag::Sox,
                    max_severity: Severity::Medium,
                    deny_failures: false,
                },
            ],
        }
    }
}

/// One rule breach found during evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceViolation {
    pub rule: String,
    pub event_id: String,
    pub reason: String,
}

/// Result of scoring a batch of events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceScore {
    /// 0-100; 100 means no violations
    pub score: u8,
    pub events_evaluated: usize,
    pub violations: Vec<ComplianceViolation>,
}

/// Score a batch of events against a policy
pub fn evaluate(policy: &CompliancePolicy, events: &[AuditEvent]) -> ComplianceScore {
    let mut violations = Vec::new();

    for event in events {
        for rule in &policy.rules {
            if !event.compliance_tags.contains(&rule.tag) {
                continue;
            }
            if rule.deny_failures && event.status == AuditStatus::Failure {
                violations.push(ComplianceViolation {
                    rule: rule.name.clone(),
                    event_id: event.id.clone(),
                    reason: format!("failed {} action", event.action),
                });
                continue;
            }
            if event.severity > rule.max_severity {
                violations.push(ComplianceViolation {
                    rule: rule.name.clone(),
                    event_id: event.id.clone(),
                    reason: format!(
                        "severity {} exceeds allowed {}",
                        event.severity, rule.max_severity
                    ),
                });
            }
        }
    }

    let penalty = (violations.len() as u32).saturating_mul(VIOLATION_PENALTY);
    let score = 100u32.saturating_sub(penalty) as u8;

    ComplianceScore {
        score,
        events_evaluated: events.len(),
        violations,
    }
}
