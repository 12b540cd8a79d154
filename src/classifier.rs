//! Audit event classification
//!
//! Pure, deterministic functions deriving severity, risk level, compliance
//! tags, and data classification from an event's shape. Classification is
//! total: every input maps to a value, nothing here can fail.
//!
//! The ingestion service calls these identically for manually classified
//! and auto-classified events; caller-supplied values always win.

use crate::types::{
    AuditCategory, AuditStatus, ComplianceTag, DataClassification, EventType, RiskLevel,
    Severity,
};

/// Replacement value written over sensitive payload fields
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Field names redacted from event payloads, lowercase
const SENSITIVE_FIELDS: [&str; 7] = [
    "password",
    "token",
    "apikey",
    "key",
    "secret",
    "ssn",
    "creditcard",
];

/// Derive event severity from outcome, category, and event type
pub fn derive_severity(
    event_type: EventType,
    category: AuditCategory,
    status: AuditStatus,
) -> Severity {
    if status == AuditStatus::Failure && category == AuditCategory::Security {
        return Severity::Critical;
    }
    if event_type == EventType::Delete || category == AuditCategory::Security {
        return Severity::High;
    }
    if event_type == EventType::Update || category == AuditCategory::UserManagement {
        return Severity::Medium;
    }
    Severity::Low
}

/// Derive the risk attributed to the recorded action
pub fn derive_risk_level(
    event_type: EventType,
    category: AuditCategory,
    status: AuditStatus,
) -> RiskLevel {
    if category == AuditCategory::Authentication && status == AuditStatus::Failure {
        return RiskLevel::High;
    }
    if event_type == EventType::Delete || category == AuditCategory::Security {
        return RiskLevel::High;
    }
    let data_access = category == AuditCategory::Data
        && matches!(event_type, EventType::Read | EventType::Access);
    if event_type == EventType::Export || data_access {
        return RiskLevel::Medium;
    }
    if event_type == EventType::Update {
        return RiskLevel::Low;
    }
    RiskLevel::None
}

/// Derive the set of regulatory regimes an event falls under
///
/// Tags are additive; a single event may carry several.
pub fn derive_compliance_tags(
    event_type: EventType,
    category: AuditCategory,
    resource_type: Option<&str>,
) -> Vec<ComplianceTag> {
    let mut tags = Vec::new();

    if category == AuditCategory::Data || resource_type == Some("user") {
        tags.push(ComplianceTag::Gdpr);
    }
    if matches!(
        category,
        AuditCategory::Authentication | AuditCategory::Security
    ) {
        tags.push(ComplianceTag::Iso27001);
    }
    if category == AuditCategory::UserManagement || event_type == EventType::Admin {
        tags.push(ComplianceTag::Sox);
    }

    tags
}

/// Derive the data sensitivity classification
pub fn derive_data_classification(
    event_type: EventType,
    category: AuditCategory,
    resource_type: Option<&str>,
) -> DataClassification {
    if category == AuditCategory::Security {
        return DataClassification::Restricted;
    }
    if category == AuditCategory::UserManagement
        || event_type == EventType::Admin
        || resource_type == Some("user")
    {
        return DataClassification::Confidential;
    }
    DataClassification::Internal
}

/// Redact sensitive fields from a payload value
///
/// Replaces the value of every field whose name matches the sensitive
/// list (case-insensitive) with [`REDACTION_MARKER`], recursing into
/// nested objects and arrays. `None` passes through unchanged.
pub fn sanitize(value: Option<serde_json::Value>) -> Option<serde_json::Value> {
    value.map(sanitize_value)
}

fn sanitize_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sanitized = map
                .into_iter()
                .map(|(k, v)| {
                    if is_sensitive_field(&k) {
                        (k, serde_json::Value::String(REDACTION_MARKER.to_string()))
                    } else {
                        (k, sanitize_value(v))
                    }
                })
                .collect();
            serde_json::Value::Object(sanitized)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sanitize_value).collect())
        }
        other => other,
    }
}

fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_FIELDS.contains(&lower.as_str())
}
