//! Core types for the audit engine
//!
//! All types use camelCase JSON serialization for wire compatibility
//! with the FieldForm API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of action an audit event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Create,
    Read,
    Update,
    Delete,
    Login,
    Logout,
    Access,
    Export,
    Import,
    Admin,
    System,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Access => "access",
            Self::Export => "export",
            Self::Import => "import",
            Self::Admin => "admin",
            Self::System => "system",
        };
        write!(f, "{}", s)
    }
}

/// Functional area an audit event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Data,
    UserManagement,
    System,
    Security,
    Compliance,
    Integration,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authentication => "authentication",
            Self::Data => "data",
            Self::UserManagement => "user_management",
            Self::System => "system",
            Self::Security => "security",
            Self::Compliance => "compliance",
            Self::Integration => "integration",
        };
        write!(f, "{}", s)
    }
}

/// Event severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Risk attributed to the recorded action, ordered
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Regulatory regime a classified event falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceTag {
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "SOX")]
    Sox,
    #[serde(rename = "ISO27001")]
    Iso27001,
    #[serde(rename = "HIPAA")]
    Hipaa,
}

impl fmt::Display for ComplianceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gdpr => "GDPR",
            Self::Sox => "SOX",
            Self::Iso27001 => "ISO27001",
            Self::Hipaa => "HIPAA",
        };
        write!(f, "{}", s)
    }
}

/// Data sensitivity classification
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// Outcome of the recorded action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Warning,
    Pending,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Warning => "warning",
            Self::Pending => "pending",
        };
        write!(f, "{}", s)
    }
}

/// Role of the acting user within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Manager,
    Technician,
}

/// The user (or service) behind an audit event
///
/// System-generated events carry no actor at all; partially identified
/// actors are common (e.g. a failed login knows the email but no user id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ActorRole>,
}

impl Actor {
    /// Best identifier available for grouping (email, then user id)
    pub fn key(&self) -> Option<&str> {
        self.email.as_deref().or(self.user_id.as_deref())
    }
}

/// The entity an audit event targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: None,
            resource_name: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }
}

/// A single audit event, immutable once written
///
/// The only transformation applied after construction is the write-time
/// redaction of sensitive payload fields (see `classifier::sanitize`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event identifier (evt-<uuid>)
    pub id: String,

    /// Tenant (organization) the event belongs to
    pub tenant_id: String,

    /// Event time, not wall-clock of write
    pub timestamp: DateTime<Utc>,

    pub event_type: EventType,

    /// Free-text verb (e.g. "form.submit", "user.invite")
    pub action: String,

    pub category: AuditCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Human-readable description of what happened
    pub description: String,

    /// Arbitrary structured details, sanitized at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Pre-change snapshot for updates, sanitized at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<serde_json::Value>,

    /// Post-change snapshot for updates, sanitized at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<serde_json::Value>,

    pub severity: Severity,

    pub risk_level: RiskLevel,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compliance_tags: Vec<ComplianceTag>,

    pub data_classification: DataClassification,

    pub status: AuditStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Links causally related events into one chain
    pub correlation_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
}

/// Caller-supplied fields for a new audit event
///
/// Only `event_type`, `action`, `category`, and `description` are
/// required; every classifier output can be overridden and overrides
/// always win over derived values.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub event_type: EventType,
    pub action: String,
    pub category: AuditCategory,
    pub description: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub resource: Option<Resource>,
    pub details: Option<serde_json::Value>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub severity: Option<Severity>,
    pub risk_level: Option<RiskLevel>,
    pub compliance_tags: Option<Vec<ComplianceTag>>,
    pub data_classification: Option<DataClassification>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
    pub correlation_id: Option<String>,
    pub parent_event_id: Option<String>,
}

impl NewAuditEvent {
    /// Create a new event submission with the required fields
    pub fn new(
        event_type: EventType,
        action: impl Into<String>,
        category: AuditCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            action: action.into(),
            category,
            description: description.into(),
            timestamp: None,
            resource: None,
            details: None,
            old_values: None,
            new_values: None,
            severity: None,
            risk_level: None,
            compliance_tags: None,
            data_classification: None,
            status: AuditStatus::Success,
            error_message: None,
            duration_ms: None,
            correlation_id: None,
            parent_event_id: None,
        }
    }

    /// Set the event time (defaults to write time)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_old_values(mut self, values: serde_json::Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn with_new_values(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }

    /// Override the derived severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Override the derived risk level
    pub fn with_risk_level(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }

    /// Override the derived compliance tags
    pub fn with_compliance_tags(mut self, tags: Vec<ComplianceTag>) -> Self {
        self.compliance_tags = Some(tags);
        self
    }

    pub fn with_data_classification(mut self, dc: DataClassification) -> Self {
        self.data_classification = Some(dc);
        self
    }

    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.status = AuditStatus::Failure;
        self.error_message = Some(message.into());
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Inherit a correlation id from a parent event
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, event_id: impl Into<String>) -> Self {
        self.parent_event_id = Some(event_id.into());
        self
    }
}

/// Ambient request/actor metadata attached to every event a caller logs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    /// Tenant id. Required; `log_event` rejects an empty one.
    pub tenant_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Request metadata as extracted by the web layer
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub source_address: Option<String>,
    pub client_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub actor: Option<Actor>,
    pub session_id: Option<String>,
}

impl AuditContext {
    /// Create a minimal context for system-generated events
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Build a context from inbound request metadata
    pub fn from_request(tenant_id: impl Into<String>, request: &RequestInfo) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor: request.actor.clone(),
            session_id: request.session_id.clone(),
            source_address: request.source_address.clone(),
            client_agent: request.client_agent.clone(),
            endpoint: request.endpoint.clone(),
            method: request.method.clone(),
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_source_address(mut self, addr: impl Into<String>) -> Self {
        self.source_address = Some(addr.into());
        self
    }

    pub fn with_session_id(mut self, session: impl Into<String>) -> Self {
        self.session_id = Some(session.into());
        self
    }
}

/// Aggregate event counts over a query range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total: u64,
    pub by_category: HashMap<String, u64>,
    pub by_event_type: HashMap<String, u64>,
    pub by_status: HashMap<String, u64>,
}

/// Entity kinds subject to retention policies
///
/// `All` is sugar: the retention engine expands it to every concrete
/// entity type rather than treating it as its own code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Form,
    AuditLog,
    Report,
    User,
    Template,
    Dashboard,
    All,
}

impl EntityType {
    /// Every concrete entity type, in sweep order
    pub const CONCRETE: [EntityType; 6] = [
        EntityType::Form,
        EntityType::AuditLog,
        EntityType::Report,
        EntityType::User,
        EntityType::Template,
        EntityType::Dashboard,
    ];
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Form => "form",
            Self::AuditLog => "auditLog",
            Self::Report => "report",
            Self::User => "user",
            Self::Template => "template",
            Self::Dashboard => "dashboard",
            Self::All => "all",
        };
        write!(f, "{}", s)
    }
}

/// Comparison applied by a retention field condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
}

/// Field-level selection condition on a retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCondition {
    pub field: String,
    pub op: ConditionOp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl FieldCondition {
    /// Check whether a record's fields satisfy this condition
    ///
    /// `contains` is a case-insensitive substring match; numeric
    /// comparisons fall back to lexicographic string comparison so that
    /// RFC 3339 timestamps order correctly.
    pub fn matches(&self, fields: &serde_json::Value) -> bool {
        let actual = fields.get(&self.field);

        match self.op {
            ConditionOp::Exists => actual.map_or(false, |v| !v.is_null()),
            ConditionOp::Equals => match (&self.value, actual) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => false,
            },
            ConditionOp::NotEquals => match (&self.value, actual) {
                (Some(expected), Some(actual)) => expected != actual,
                (Some(_), None) => true,
                _ => false,
            },
            ConditionOp::Contains => match (&self.value, actual) {
                (Some(expected), Some(actual)) => {
                    let needle = value_as_string(expected).to_lowercase();
                    let haystack = value_as_string(actual).to_lowercase();
                    haystack.contains(&needle)
                }
                _ => false,
            },
            ConditionOp::GreaterThan => compare_values(actual, self.value.as_ref())
                .map_or(false, |o| o == std::cmp::Ordering::Greater),
            ConditionOp::LessThan => compare_values(actual, self.value.as_ref())
                .map_or(false, |o| o == std::cmp::Ordering::Less),
        }
    }
}

fn value_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(
    actual: Option<&serde_json::Value>,
    expected: Option<&serde_json::Value>,
) -> Option<std::cmp::Ordering> {
    let (actual, expected) = (actual?, expected?);

    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return a.partial_cmp(&b);
    }

    Some(value_as_string(actual).cmp(&value_as_string(expected)))
}

/// A primary-store record as seen by the retention engine
///
/// Entity stores reduce their native models to this shape so one sweep
/// implementation can archive and delete any entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: serde_json::Value,
}
