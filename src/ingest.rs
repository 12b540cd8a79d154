//! Audit event ingestion
//!
//! `AuditLogger` is the single write path into the audit event store:
//! it validates the caller's context, resolves classification (caller
//! overrides win over derived values), sanitizes payloads, persists
//! exactly one immutable record, and then runs compliance and
//! alert-threshold checks as detached best-effort tasks.

use crate::classifier;
use crate::compliance::{self, CompliancePolicy};
use crate::error::{AuditError, Result};
use crate::store::{AuditQuery, AuditStore};
use crate::types::{
    AuditCategory, AuditContext, AuditEvent, AuditStatus, EventType, NewAuditEvent,
    Resource, Severity,
};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Action name of the event emitted when the alert threshold trips.
/// Such events never re-trigger the post-write checks.
const ALERT_THRESHOLD_ACTION: &str = "alert_threshold_exceeded";

/// High/critical events per trailing hour before an alert event is raised
const ALERT_THRESHOLD: u64 = 10;

/// Compliance score below which the post-write check logs a warning
const COMPLIANCE_WARN_SCORE: u8 = 70;

/// Ingestion service for audit events
///
/// Constructed once at process start and shared by reference with every
/// route handler and background engine.
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    compliance_policies: RwLock<HashMap<String, CompliancePolicy>>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            compliance_policies: RwLock::new(HashMap::new()),
        }
    }

    /// Handle to the underlying event store
    pub fn store(&self) -> Arc<dyn AuditStore> {
        self.store.clone()
    }

    /// Register a tenant's compliance policy for post-write checks
    pub async fn set_compliance_policy(&self, policy: CompliancePolicy) {
        let mut policies = self.compliance_policies.write().await;
        policies.insert(policy.tenant_id.clone(), policy);
    }

    /// Record one audit event
    ///
    /// Persists exactly one record per call. Post-write compliance and
    /// alert checks run detached; their failures are logged locally and
    /// never surface to the caller, whose write already succeeded.
    pub async fn log_event(
        &self,
        ctx: &AuditContext,
        data: NewAuditEvent,
    ) -> Result<AuditEvent> {
        if ctx.tenant_id.trim().is_empty() {
            return Err(AuditError::Config(
                "audit context is missing a tenant id".to_string(),
            ));
        }

        let event = build_event(ctx, data);
        self.store.insert(&event).await?;

        tracing::debug!(
            tenant = %event.tenant_id,
            event_id = %event.id,
            action = %event.action,
            severity = %event.severity,
            "Audit event recorded"
        );

        self.spawn_post_write_checks(&event).await;
        Ok(event)
    }

    /// Fire-and-forget compliance and alert-threshold checks
    async fn spawn_post_write_checks(&self, event: &AuditEvent) {
        if event.action == ALERT_THRESHOLD_ACTION {
            return;
        }

        let store = self.store.clone();
        let policy = {
            let policies = self.compliance_policies.read().await;
            policies.get(&event.tenant_id).cloned()
        };
        let event = event.clone();

        tokio::spawn(async move {
            if let Err(e) = run_post_write_checks(store, policy, &event).await {
                tracing::warn!(
                    tenant = %event.tenant_id,
                    event_id = %event.id,
                    error = %e,
                    "Post-write audit checks failed"
                );
            }
        });
    }

    /// Record a login/logout attempt
    pub async fn log_authentication(
        &self,
        ctx: &AuditContext,
        action: &str,
        status: AuditStatus,
    ) -> Result<AuditEvent> {
        let event_type = if action.contains("logout") {
            EventType::Logout
        } else {
            EventType::Login
        };
        let description = match status {
            AuditStatus::Failure => format!("Authentication failed: {}", action),
            _ => format!("Authentication: {}", action),
        };
        self.log_event(
            ctx,
            NewAuditEvent::new(event_type, action, AuditCategory::Authentication, description)
                .with_status(status),
        )
        .await
    }

    /// Record a read of a protected resource
    pub async fn log_data_access(
        &self,
        ctx: &AuditContext,
        resource: Resource,
        description: impl Into<String>,
    ) -> Result<AuditEvent> {
        let action = format!("{}.read", resource.resource_type);
        self.log_event(
            ctx,
            NewAuditEvent::new(EventType::Read, action, AuditCategory::Data, description)
                .with_resource(resource),
        )
        .await
    }

    /// Record a create/update/delete of a resource, with optional
    /// before/after snapshots
    pub async fn log_data_modification(
        &self,
        ctx: &AuditContext,
        event_type: EventType,
        resource: Resource,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Result<AuditEvent> {
        let action = format!("{}.{}", resource.resource_type, event_type);
        let description = format!(
            "{} {}",
            event_type,
            resource
                .resource_name
                .as_deref()
                .unwrap_or(&resource.resource_type)
        );
        let mut data =
            NewAuditEvent::new(event_type, action, AuditCategory::Data, description)
                .with_resource(resource);
        if let Some(old) = old_values {
            data = data.with_old_values(old);
        }
        if let Some(new) = new_values {
            data = data.with_new_values(new);
        }
        self.log_event(ctx, data).await
    }

    /// Record an administrative action
    pub async fn log_admin_action(
        &self,
        ctx: &AuditContext,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<AuditEvent> {
        self.log_event(
            ctx,
            NewAuditEvent::new(
                EventType::Admin,
                action,
                AuditCategory::UserManagement,
                description,
            ),
        )
        .await
    }

    /// Record a security-relevant event (defaults to high severity)
    pub async fn log_security_event(
        &self,
        ctx: &AuditContext,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<AuditEvent> {
        self.log_event(
            ctx,
            NewAuditEvent::new(
                EventType::System,
                action,
                AuditCategory::Security,
                description,
            ),
        )
        .await
    }

    /// Record an actorless system event
    pub async fn log_system_event(
        &self,
        ctx: &AuditContext,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<AuditEvent> {
        let mut ctx = ctx.clone();
        ctx.actor = None;
        ctx.session_id = None;
        self.log_event(
            &ctx,
            NewAuditEvent::new(EventType::System, action, AuditCategory::System, description),
        )
        .await
    }
}

/// Assemble the immutable event record from context and submission
///
/// Classification resolution and payload sanitization happen here, so
/// manually and automatically classified events go down one path.
fn build_event(ctx: &AuditContext, data: NewAuditEvent) -> AuditEvent {
    let resource_type = data.resource.as_ref().map(|r| r.resource_type.as_str());

    let severity = data.severity.unwrap_or_else(|| {
        classifier::derive_severity(data.event_type, data.category, data.status)
    });
    let risk_level = data.risk_level.unwrap_or_else(|| {
        classifier::derive_risk_level(data.event_type, data.category, data.status)
    });
    let compliance_tags = data.compliance_tags.unwrap_or_else(|| {
        classifier::derive_compliance_tags(data.event_type, data.category, resource_type)
    });
    let data_classification = data.data_classification.unwrap_or_else(|| {
        classifier::derive_data_classification(data.event_type, data.category, resource_type)
    });

    AuditEvent {
        id: format!("evt-{}", Uuid::new_v4()),
        tenant_id: ctx.tenant_id.clone(),
        timestamp: data.timestamp.unwrap_or_else(Utc::now),
        event_type: data.event_type,
        action: data.action,
        category: data.category,
        actor: ctx.actor.clone(),
        session_id: ctx.session_id.clone(),
        resource: data.resource,
        source_address: ctx.source_address.clone(),
        client_agent: ctx.client_agent.clone(),
        endpoint: ctx.endpoint.clone(),
        method: ctx.method.clone(),
        description: data.description,
        details: classifier::sanitize(data.details),
        old_values: classifier::sanitize(data.old_values),
        new_values: classifier::sanitize(data.new_values),
        severity,
        risk_level,
        compliance_tags,
        data_classification,
        status: data.status,
        error_message: data.error_message,
        duration_ms: data.duration_ms,
        correlation_id: data
            .correlation_id
            .unwrap_or_else(|| format!("cor-{}", Uuid::new_v4())),
        parent_event_id: data.parent_event_id,
    }
}

/// Compliance and alert-threshold checks run after a successful write
async fn run_post_write_checks(
    store: Arc<dyn AuditStore>,
    policy: Option<CompliancePolicy>,
    event: &AuditEvent,
) -> Result<()> {
    let now = Utc::now();

    // Compliance: score the tenant's trailing day of tagged events
    let recent = store
        .query(
            &AuditQuery::for_tenant(&event.tenant_id)
                .since(now - Duration::hours(24))
                .with_limit(500),
        )
        .await?;
    let policy =
        policy.unwrap_or_else(|| CompliancePolicy::baseline(event.tenant_id.clone()));
    let score = compliance::evaluate(&policy, &recent);
    if score.score < COMPLIANCE_WARN_SCORE {
        tracing::warn!(
            tenant = %event.tenant_id,
            score = score.score,
            violations = score.violations.len(),
            "Compliance score below threshold"
        );
    }

    // Alert threshold: high/critical volume over the trailing hour
    let elevated = store
        .count(
            &AuditQuery::for_tenant(&event.tenant_id)
                .since(now - Duration::hours(1))
                .with_min_severity(Severity::High),
        )
        .await?;
    if elevated >= ALERT_THRESHOLD {
        let alert = build_event(
            &AuditContext::new(&event.tenant_id),
            NewAuditEvent::new(
                EventType::System,
                ALERT_THRESHOLD_ACTION,
                AuditCategory::Security,
                format!(
                    "{} high-severity events in the last hour (threshold {})",
                    elevated, ALERT_THRESHOLD
                ),
            )
            .with_severity(Severity::High)
            .with_correlation_id(event.correlation_id.clone()),
        );
        store.insert(&alert).await?;
        tracing::warn!(
            tenant = %event.tenant_id,
            elevated,
            "Alert threshold exceeded"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::REDACTION_MARKER;
    use crate::store::MemoryAuditStore;
    use crate::types::{ComplianceTag, RiskLevel};
    use serde_json::json;

    fn test_logger() -> AuditLogger {
        AuditLogger::new(Arc::new(MemoryAuditStore::default()))
    }

    #[tokio::test]
    async fn test_missing_tenant_rejected_before_write() {
        let logger = test_logger();
        let ctx = AuditContext::new("");

        let result = logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Create,
                    "form.create",
                    AuditCategory::Data,
                    "Created form",
                ),
            )
            .await;

        assert!(matches!(result, Err(AuditError::Config(_))));
        assert_eq!(logger.store().info().await.unwrap().events, 0);
    }

    #[tokio::test]
    async fn test_auto_classification() {
        let logger = test_logger();
        let ctx = AuditContext::new("org-1");

        let event = logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Access,
                    "vault.open",
                    AuditCategory::Security,
                    "Opened credential vault",
                )
                .with_status(AuditStatus::Failure),
            )
            .await
            .unwrap();

        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.risk_level, RiskLevel::High);
        assert!(event.compliance_tags.contains(&ComplianceTag::Iso27001));
    }

    #[tokio::test]
    async fn test_manual_classification_wins() {
        let logger = test_logger();
        let ctx = AuditContext::new("org-1");

        let event = logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Access,
                    "vault.open",
                    AuditCategory::Security,
                    "Opened credential vault",
                )
                .with_status(AuditStatus::Failure)
                .with_severity(Severity::Low)
                .with_compliance_tags(vec![ComplianceTag::Hipaa]),
            )
            .await
            .unwrap();

        assert_eq!(event.severity, Severity::Low);
        assert_eq!(event.compliance_tags, vec![ComplianceTag::Hipaa]);
    }

    #[tokio::test]
    async fn test_payload_sanitized_before_persistence() {
        let logger = test_logger();
        let ctx = AuditContext::new("org-1");

        logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Update,
                    "user.update",
                    AuditCategory::UserManagement,
                    "Updated user",
                )
                .with_details(json!({"password": "x", "notes": "y"}))
                .with_new_values(json!({"token": "t-123", "name": "Kim"})),
            )
            .await
            .unwrap();

        let stored = logger
            .store()
            .query(&AuditQuery::for_tenant("org-1"))
            .await
            .unwrap();
        let details = stored[0].details.as_ref().unwrap();
        assert_eq!(details["password"], REDACTION_MARKER);
        assert_eq!(details["notes"], "y");
        let new_values = stored[0].new_values.as_ref().unwrap();
        assert_eq!(new_values["token"], REDACTION_MARKER);
        assert_eq!(new_values["name"], "Kim");
    }

    #[tokio::test]
    async fn test_correlation_fresh_unless_inherited() {
        let logger = test_logger();
        let ctx = AuditContext::new("org-1");

        let parent = logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Create,
                    "form.create",
                    AuditCategory::Data,
                    "Created form",
                ),
            )
            .await
            .unwrap();
        assert!(parent.correlation_id.starts_with("cor-"));

        let child = logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Update,
                    "form.update",
                    AuditCategory::Data,
                    "Updated form",
                )
                .with_correlation_id(parent.correlation_id.clone())
                .with_parent(parent.id.clone()),
            )
            .await
            .unwrap();

        assert_eq!(child.correlation_id, parent.correlation_id);
        assert_eq!(child.parent_event_id, Some(parent.id));
    }

    #[tokio::test]
    async fn test_authentication_wrapper_defaults() {
        let logger = test_logger();
        let ctx = AuditContext::new("org-1");

        let event = logger
            .log_authentication(&ctx, "user.login", AuditStatus::Failure)
            .await
            .unwrap();

        assert_eq!(event.event_type, EventType::Login);
        assert_eq!(event.category, AuditCategory::Authentication);
        assert_eq!(event.risk_level, RiskLevel::High);

        let event = logger
            .log_authentication(&ctx, "user.logout", AuditStatus::Success)
            .await
            .unwrap();
        assert_eq!(event.event_type, EventType::Logout);
    }

    #[tokio::test]
    async fn test_system_wrapper_strips_actor() {
        let logger = test_logger();
        let ctx = AuditContext::new("org-1").with_actor(crate::types::Actor {
            user_id: Some("u-1".to_string()),
            ..Default::default()
        });

        let event = logger
            .log_system_event(&ctx, "index.rebuild", "Rebuilt search index")
            .await
            .unwrap();

        assert!(event.actor.is_none());
        assert_eq!(event.category, AuditCategory::System);
    }

    #[tokio::test]
    async fn test_modification_wrapper_snapshots() {
        let logger = test_logger();
        let ctx = AuditContext::new("org-1");

        let event = logger
            .log_data_modification(
                &ctx,
                EventType::Update,
                Resource::new("form").with_id("frm-7").with_name("Safety checklist"),
                Some(json!({"status": "draft"})),
                Some(json!({"status": "published"})),
            )
            .await
            .unwrap();

        assert_eq!(event.action, "form.update");
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.old_values.unwrap()["status"], "draft");
        assert_eq!(event.new_values.unwrap()["status"], "published");
    }
}
