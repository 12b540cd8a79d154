//! # fieldform-audit
//!
//! Audit, threat detection, and data retention engine for the FieldForm
//! multi-tenant field-service platform.
//!
//! ## Overview
//!
//! Three components share one append-only data source (the audit event
//! store) and one execution model (periodic, idempotent, multi-tenant
//! background jobs):
//!
//! - **Ingestion** (`AuditLogger`) classifies and sanitizes every
//!   sensitive action, persists one immutable event per call, and runs
//!   compliance/alert checks as detached best-effort tasks.
//! - **Threat detection** (`ThreatDetector`) mines a trailing window of
//!   events with five independent rules and re-logs every alert as a
//!   security audit event.
//! - **Retention** (`RetentionEngine`) enforces per-tenant retention
//!   policies: archive-then-delete over pluggable entity stores, with
//!   legal-hold short-circuits and per-policy statistics.
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldform_audit::{
//!     AuditCategory, AuditContext, AuditLogger, EventType, MemoryAuditStore,
//!     NewAuditEvent,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> fieldform_audit::Result<()> {
//! let logger = AuditLogger::new(Arc::new(MemoryAuditStore::default()));
//!
//! let event = logger
//!     .log_event(
//!         &AuditContext::new("org-1"),
//!         NewAuditEvent::new(
//!             EventType::Create,
//!             "form.create",
//!             AuditCategory::Data,
//!             "Created inspection form",
//!         ),
//!     )
//!     .await?;
//!
//! println!("Recorded: {}", event.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **AuditStore / RecordStore / PolicyStore** traits — pluggable
//!   persistence seams with in-memory reference implementations
//! - **classifier** — pure severity/risk/tag derivation and payload
//!   sanitization
//! - **Scheduler** — hourly retention tick and 15-minute threat
//!   readiness tick over `tokio::time::interval`

pub mod classifier;
pub mod compliance;
pub mod error;
pub mod ingest;
pub mod query;
pub mod retention;
pub mod sched;
pub mod store;
pub mod threat;
pub mod types;

// Re-export core types
pub use error::{AuditError, Result};
pub use ingest::AuditLogger;
pub use query::{AuditQueryService, ComplianceReport, ExportFormat};
pub use retention::{
    ArchiveFormat, ArchiveResult, ExecutionRecord, Frequency, LegalHold, PeriodUnit,
    PolicyStats, RetentionEngine, RetentionPeriod, RetentionPolicy, Schedule,
};
pub use sched::{Scheduler, SchedulerConfig, SchedulerEvent};
pub use store::{
    AuditLogRecordStore, AuditQuery, AuditStore, MemoryAuditStore, MemoryPolicyStore,
    MemoryRecordStore, PolicyStore, RecordStore, StoreInfo,
};
pub use threat::{EvidenceEvent, ThreatAlert, ThreatDetector, ThreatType};
pub use types::{
    Actor, ActorRole, AuditCategory, AuditContext, AuditEvent, AuditStatus, AuditSummary,
    ComplianceTag, ConditionOp, DataClassification, EntityRecord, EntityType, EventType,
    FieldCondition, NewAuditEvent, RequestInfo, Resource, RiskLevel, Severity,
};
pub use compliance::{
    evaluate as evaluate_compliance, CompliancePolicy, ComplianceRule, ComplianceScore,
    ComplianceViolation,
};
