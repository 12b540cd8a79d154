//! Performance benchmarks for fieldform-audit
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use fieldform_audit::{
    classifier, AuditCategory, AuditContext, AuditLogger, AuditStatus, EventType,
    MemoryAuditStore, NewAuditEvent,
};
use std::sync::Arc;

fn bench_classification(c: &mut Criterion) {
    c.bench_function("derive_severity", |b| {
        b.iter(|| {
            classifier::derive_severity(
                EventType::Delete,
                AuditCategory::Security,
                AuditStatus::Failure,
            )
        });
    });

    c.bench_function("derive_compliance_tags", |b| {
        b.iter(|| {
            classifier::derive_compliance_tags(
                EventType::Admin,
                AuditCategory::UserManagement,
                Some("user"),
            )
        });
    });
}

fn bench_sanitize(c: &mut Criterion) {
    let payload = serde_json::json!({
        "password": "hunter2",
        "profile": {"email": "a@b.c", "apiKey": "sk-123"},
        "attempts": [{"token": "t1"}, {"token": "t2"}, {"notes": "ok"}],
        "notes": "routine",
    });

    c.bench_function("sanitize nested payload", |b| {
        b.iter(|| classifier::sanitize(Some(payload.clone())));
    });
}

fn bench_log_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("AuditLogger log_event", |b| {
        b.to_async(&rt).iter(|| async {
            let logger = AuditLogger::new(Arc::new(MemoryAuditStore::default()));
            logger
                .log_event(
                    &AuditContext::new("org-1"),
                    NewAuditEvent::new(
                        EventType::Update,
                        "form.update",
                        AuditCategory::Data,
                        "Updated inspection form",
                    )
                    .with_details(serde_json::json!({"password": "x", "field": "y"})),
                )
                .await
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_classification, bench_sanitize, bench_log_event);
criterion_main!(benches);
