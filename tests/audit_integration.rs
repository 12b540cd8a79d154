//! Audit pipeline integration tests
//!
//! End-to-end tests exercising ingestion, classification, threat
//! detection, and the query surface against the in-memory store.

use chrono::{Duration, Utc};
use fieldform_audit::{
    Actor, AuditCategory, AuditContext, AuditLogger, AuditQuery, AuditQueryService,
    AuditStatus, AuditStore, ComplianceTag, EventType, ExportFormat, MemoryAuditStore,
    NewAuditEvent, Resource, RiskLevel, Severity, ThreatDetector, ThreatType,
};
use std::sync::Arc;

struct Pipeline {
    store: Arc<MemoryAuditStore>,
    logger: Arc<AuditLogger>,
    detector: ThreatDetector,
    queries: AuditQueryService,
}

fn pipeline() -> Pipeline {
    let store = Arc::new(MemoryAuditStore::default());
    let logger = Arc::new(AuditLogger::new(store.clone()));
    let detector = ThreatDetector::new(store.clone(), logger.clone());
    let queries = AuditQueryService::new(store.clone());
    Pipeline {
        store,
        logger,
        detector,
        queries,
    }
}

fn actor(email: &str) -> Actor {
    Actor {
        email: Some(email.to_string()),
        ..Default::default()
    }
}

// ─── Classification Properties ───────────────────────────────────

#[tokio::test]
async fn test_security_failure_always_critical() {
    let p = pipeline();
    let ctx = AuditContext::new("org-1");

    for event_type in [EventType::Access, EventType::System, EventType::Login] {
        let event = p
            .logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    event_type,
                    "security.check",
                    AuditCategory::Security,
                    "Security check failed",
                )
                .with_status(AuditStatus::Failure),
            )
            .await
            .unwrap();
        assert_eq!(event.severity, Severity::Critical);
    }
}

#[tokio::test]
async fn test_sanitization_on_persisted_record() {
    let p = pipeline();
    let ctx = AuditContext::new("org-1");

    p.logger
        .log_event(
            &ctx,
            NewAuditEvent::new(
                EventType::Update,
                "user.update",
                AuditCategory::UserManagement,
                "Updated user profile",
            )
            .with_details(serde_json::json!({"password": "x", "notes": "y"})),
        )
        .await
        .unwrap();

    let stored = p
        .store
        .query(&AuditQuery::for_tenant("org-1"))
        .await
        .unwrap();
    let details = stored[0].details.as_ref().unwrap();
    assert_eq!(details["password"], "[REDACTED]");
    assert_eq!(details["notes"], "y");
}

// ─── Threat Detection Scenarios ──────────────────────────────────

async fn submit_failed_logins(p: &Pipeline, count: usize, source: &str, email: &str) {
    for i in 0..count {
        let ctx = AuditContext::new("org-1")
            .with_source_address(source)
            .with_actor(actor(email));
        // Spread event times out so only the brute-force pattern matches
        p.logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Login,
                    "user.login",
                    AuditCategory::Authentication,
                    "Login failed",
                )
                .with_status(AuditStatus::Failure)
                .with_timestamp(Utc::now() - Duration::minutes(i as i64 + 1)),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_brute_force_five_failures_alerts() {
    let p = pipeline();
    submit_failed_logins(&p, 5, "203.0.113.9", "victim@example.com").await;

    let alerts = p.detector.analyze_threats("org-1", 24).await;
    let brute: Vec<_> = alerts
        .iter()
        .filter(|a| a.threat_type == ThreatType::BruteForce)
        .collect();
    assert!(!brute.is_empty());
    assert!(brute[0].confidence >= 50);
}

#[tokio::test]
async fn test_brute_force_four_failures_silent() {
    let p = pipeline();
    submit_failed_logins(&p, 4, "203.0.113.9", "victim@example.com").await;

    let alerts = p.detector.analyze_threats("org-1", 24).await;
    assert!(alerts
        .iter()
        .all(|a| a.threat_type != ThreatType::BruteForce));
}

#[tokio::test]
async fn test_exfiltration_scenario_thresholds() {
    let p = pipeline();
    let ctx = AuditContext::new("org-1").with_actor(actor("u1@example.com"));

    // 3 exports within 24h: silent
    for i in 0..3 {
        p.logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Export,
                    "form.export",
                    AuditCategory::Data,
                    format!("Exported batch {}", i),
                ),
            )
            .await
            .unwrap();
    }
    let alerts = p
        .detector
        .detect_data_exfiltration("org-1", Utc::now() - Duration::hours(24))
        .await
        .unwrap();
    assert!(alerts.is_empty());

    // 10 total: exactly one medium alert
    for i in 3..10 {
        p.logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Export,
                    "form.export",
                    AuditCategory::Data,
                    format!("Exported batch {}", i),
                ),
            )
            .await
            .unwrap();
    }
    let alerts = p
        .detector
        .detect_data_exfiltration("org-1", Utc::now() - Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].threat_type, ThreatType::DataExfiltration);
    assert_eq!(alerts[0].severity, Severity::Medium);
}

#[tokio::test]
async fn test_alerts_traceable_in_audit_history() {
    let p = pipeline();
    submit_failed_logins(&p, 6, "203.0.113.9", "victim@example.com").await;

    let alerts = p.detector.analyze_threats("org-1", 24).await;
    assert_eq!(alerts.len(), 1);

    let security_events = p
        .store
        .query(
            &AuditQuery::for_tenant("org-1")
                .in_category(AuditCategory::Security),
        )
        .await
        .unwrap();
    assert_eq!(security_events.len(), 1);
    assert_eq!(security_events[0].action, "threat_detected");
    assert_eq!(
        security_events[0].details.as_ref().unwrap()["threatType"],
        "brute_force"
    );
}

#[tokio::test]
async fn test_tenants_isolated_in_detection() {
    let p = pipeline();
    submit_failed_logins(&p, 6, "203.0.113.9", "victim@example.com").await;

    // The other tenant sees nothing
    let alerts = p.detector.analyze_threats("org-2", 24).await;
    assert!(alerts.is_empty());
}

// ─── Query Surface ───────────────────────────────────────────────

async fn submit_mixed_history(p: &Pipeline) {
    let ctx = AuditContext::new("org-1").with_actor(actor("tech@example.com"));

    p.logger
        .log_data_modification(
            &ctx,
            EventType::Create,
            Resource::new("form").with_id("frm-1").with_name("Safety checklist"),
            None,
            Some(serde_json::json!({"status": "draft"})),
        )
        .await
        .unwrap();
    p.logger
        .log_data_access(
            &ctx,
            Resource::new("form").with_id("frm-1"),
            "Viewed safety checklist",
        )
        .await
        .unwrap();
    p.logger
        .log_authentication(&ctx, "user.login", AuditStatus::Failure)
        .await
        .unwrap();
    p.logger
        .log_admin_action(&ctx, "user.invite", "Invited new technician")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_filtered_listing_and_pagination() {
    let p = pipeline();
    submit_mixed_history(&p).await;

    let data_events = p
        .queries
        .query_events(&AuditQuery::for_tenant("org-1").in_category(AuditCategory::Data))
        .await
        .unwrap();
    assert_eq!(data_events.len(), 2);

    let mut paged = AuditQuery::for_tenant("org-1");
    paged.limit = 2;
    assert_eq!(p.queries.query_events(&paged).await.unwrap().len(), 2);
    paged.offset = 2;
    assert_eq!(p.queries.query_events(&paged).await.unwrap().len(), 2);
    paged.offset = 4;
    assert!(p.queries.query_events(&paged).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_summary_over_range() {
    let p = pipeline();
    submit_mixed_history(&p).await;

    let summary = p
        .queries
        .summary(
            "org-1",
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
        )
        .await
        .unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.by_category["data"], 2);
    assert_eq!(summary.by_category["authentication"], 1);
    assert_eq!(summary.by_category["user_management"], 1);
    assert_eq!(summary.by_status["failure"], 1);
}

#[tokio::test]
async fn test_security_alert_feed() {
    let p = pipeline();
    submit_mixed_history(&p).await;

    let alerts = p.queries.security_alerts("org-1", 24, 100).await.unwrap();
    // Only the failed login qualifies from this history
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AuditStatus::Failure);
}

#[tokio::test]
async fn test_compliance_report_by_tag() {
    let p = pipeline();
    submit_mixed_history(&p).await;

    let report = p
        .queries
        .compliance_report(
            "org-1",
            ComplianceTag::Sox,
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
        )
        .await
        .unwrap();

    // Only the admin action derives SOX in this history
    assert_eq!(report.total, 1);
    assert_eq!(report.by_status["success"], 1);
}

#[tokio::test]
async fn test_export_round_trip() {
    let p = pipeline();
    submit_mixed_history(&p).await;

    let json = p
        .queries
        .export_events(&AuditQuery::for_tenant("org-1"), ExportFormat::Json)
        .await
        .unwrap();
    let events: Vec<fieldform_audit::AuditEvent> = serde_json::from_str(&json).unwrap();
    assert_eq!(events.len(), 4);

    let csv = p
        .queries
        .export_events(&AuditQuery::for_tenant("org-1"), ExportFormat::Csv)
        .await
        .unwrap();
    assert_eq!(csv.lines().count(), 5);
    assert!(csv.lines().next().unwrap().starts_with("id,timestamp"));
}

// ─── Correlation ─────────────────────────────────────────────────

#[tokio::test]
async fn test_correlation_chain_queryable() {
    let p = pipeline();
    let ctx = AuditContext::new("org-1");

    let root = p
        .logger
        .log_event(
            &ctx,
            NewAuditEvent::new(
                EventType::Import,
                "worksite.import",
                AuditCategory::Integration,
                "Imported worksite bundle",
            ),
        )
        .await
        .unwrap();

    for i in 0..3 {
        p.logger
            .log_event(
                &ctx,
                NewAuditEvent::new(
                    EventType::Create,
                    "form.create",
                    AuditCategory::Data,
                    format!("Created form {}", i),
                )
                .with_correlation_id(root.correlation_id.clone())
                .with_parent(root.id.clone()),
            )
            .await
            .unwrap();
    }

    let all = p
        .store
        .query(&AuditQuery::for_tenant("org-1"))
        .await
        .unwrap();
    let chain: Vec<_> = all
        .iter()
        .filter(|e| e.correlation_id == root.correlation_id)
        .collect();
    assert_eq!(chain.len(), 4);
    assert_eq!(
        chain
            .iter()
            .filter(|e| e.parent_event_id.as_deref() == Some(root.id.as_str()))
            .count(),
        3
    );
}

// ─── Risk Levels ─────────────────────────────────────────────────

#[tokio::test]
async fn test_wrapper_risk_defaults() {
    let p = pipeline();
    let ctx = AuditContext::new("org-1").with_actor(actor("tech@example.com"));

    let read = p
        .logger
        .log_data_access(&ctx, Resource::new("report").with_id("rpt-1"), "Viewed report")
        .await
        .unwrap();
    assert_eq!(read.risk_level, RiskLevel::Medium);

    let login_ok = p
        .logger
        .log_authentication(&ctx, "user.login", AuditStatus::Success)
        .await
        .unwrap();
    assert_eq!(login_ok.risk_level, RiskLevel::None);
}
