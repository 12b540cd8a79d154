//! Retention policy model and schedule math
//!
//! A policy names the records it covers (entity type + field conditions),
//! how long they live (retention period), what happens when they expire
//! (archive format/location, archive-before-delete), and when the sweep
//! runs (daily/weekly/monthly schedule). Legal hold overrides everything.

use crate::types::{EntityType, FieldCondition};
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit of a retention period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Days,
    Months,
    Years,
}

/// How long records are kept before becoming eligible for the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPeriod {
    pub value: u32,
    pub unit: PeriodUnit,
}

impl RetentionPeriod {
    pub fn days(value: u32) -> Self {
        Self {
            value,
            unit: PeriodUnit::Days,
        }
    }

    pub fn months(value: u32) -> Self {
        Self {
            value,
            unit: PeriodUnit::Months,
        }
    }

    pub fn years(value: u32) -> Self {
        Self {
            value,
            unit: PeriodUnit::Years,
        }
    }

    /// Cutoff instant: records strictly older are eligible
    ///
    /// Calendar-aware for months/years; if the subtraction would leave the
    /// calendar (overflow), no cutoff is produced and nothing is eligible.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.unit {
            PeriodUnit::Days => now.checked_sub_signed(Duration::days(i64::from(self.value))),
            PeriodUnit::Months => now.checked_sub_months(Months::new(self.value)),
            PeriodUnit::Years => now.checked_sub_months(Months::new(self.value * 12)),
        }
    }
}

/// Serialization target for archived record sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Json,
    Csv,
    Compressed,
}

impl ArchiveFormat {
    /// File extension for archives in this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Compressed => "json.gz",
        }
    }
}

/// Legal hold state of a policy
///
/// When both flags are set the policy is skipped entirely, regardless of
/// cutoff: no query, no archive, no deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalHold {
    pub enabled: bool,
    pub exempt_from_deletion: bool,
}

impl LegalHold {
    /// True when the policy must not touch any store
    pub fn blocks_execution(&self) -> bool {
        self.enabled && self.exempt_from_deletion
    }
}

/// Sweep cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// When a policy's sweep is due
///
/// Hours are matched in the policy's local clock, expressed as a fixed
/// UTC offset in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub frequency: Frequency,

    /// 0 = Sunday, matching only for weekly schedules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,

    /// 1-31, matching only for monthly schedules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,

    /// Hour of day, 0-23
    pub hour: u8,

    /// Fixed UTC offset of the tenant's local clock
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Schedule {
    pub fn daily(hour: u8) -> Self {
        Self {
            frequency: Frequency::Daily,
            day_of_week: None,
            day_of_month: None,
            hour,
            utc_offset_minutes: 0,
        }
    }

    pub fn weekly(day_of_week: u8, hour: u8) -> Self {
        Self {
            frequency: Frequency::Weekly,
            day_of_week: Some(day_of_week),
            day_of_month: None,
            hour,
            utc_offset_minutes: 0,
        }
    }

    pub fn monthly(day_of_month: u8, hour: u8) -> Self {
        Self {
            frequency: Frequency::Monthly,
            day_of_week: None,
            day_of_month: Some(day_of_month),
            hour,
            utc_offset_minutes: 0,
        }
    }

    /// Check whether an instant falls on this schedule
    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        let offset = Duration::minutes(i64::from(self.utc_offset_minutes));
        let local = instant + offset;

        if local.hour() != u32::from(self.hour) {
            return false;
        }

        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekly => {
                let dow = local.weekday().num_days_from_sunday();
                self.day_of_week.map_or(true, |d| dow == u32::from(d))
            }
            Frequency::Monthly => self
                .day_of_month
                .map_or(true, |d| local.day() == u32::from(d)),
        }
    }

    /// Next scheduled instant strictly after the given one
    ///
    /// Walks forward hour by hour, bounded at two years to handle
    /// impossible day-of-month values (e.g. 31 in February forever).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut current = Utc
            .with_ymd_and_hms(
                after.year(),
                after.month(),
                after.day(),
                after.hour(),
                0,
                0,
            )
            .single()?
            + Duration::hours(1);

        let max_iterations = 2 * 366 * 24;
        for _ in 0..max_iterations {
            if self.matches(current) {
                return Some(current);
            }
            current = current + Duration::hours(1);
        }

        None
    }
}

/// Cumulative execution statistics, accumulated across runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStats {
    pub records_archived: u64,
    pub records_deleted: u64,
    pub bytes_archived: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<DateTime<Utc>>,

    pub error_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A per-tenant retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// Unique policy identifier (pol-<uuid>)
    pub id: String,

    pub tenant_id: String,

    /// Unique per tenant
    pub name: String,

    pub entity_type: EntityType,

    pub retention_period: RetentionPeriod,

    pub archive_before_delete: bool,

    pub archive_format: ArchiveFormat,

    /// Base directory archives are written under
    pub archive_location: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<FieldCondition>,

    #[serde(default)]
    pub legal_hold: LegalHold,

    pub schedule: Schedule,

    /// Inactive policies are never picked up by the scheduler
    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub stats: PolicyStats,
}

impl RetentionPolicy {
    /// Create an active policy with a daily 02:00 schedule
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        entity_type: EntityType,
        retention_period: RetentionPeriod,
        archive_location: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("pol-{}", Uuid::new_v4()),
            tenant_id: tenant_id.into(),
            name: name.into(),
            entity_type,
            retention_period,
            archive_before_delete: true,
            archive_format: ArchiveFormat::Json,
            archive_location: archive_location.into(),
            conditions: Vec::new(),
            legal_hold: LegalHold::default(),
            schedule: Schedule::daily(2),
            active: true,
            created_at: now,
            updated_at: now,
            stats: PolicyStats::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_archive_format(mut self, format: ArchiveFormat) -> Self {
        self.archive_format = format;
        self
    }

    pub fn with_archive_before_delete(mut self, archive: bool) -> Self {
        self.archive_before_delete = archive;
        self
    }

    pub fn with_condition(mut self, condition: FieldCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_legal_hold(mut self, hold: LegalHold) -> Self {
        self.legal_hold = hold;
        self
    }

    /// Cutoff instant for this policy's retention period
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.retention_period.cutoff(now)
    }

    /// Whether the scheduler should execute this policy now
    ///
    /// Due when the next scheduled instant after the last execution (or
    /// after creation, for a never-run policy) has already passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        let basis = self.stats.last_executed.unwrap_or(self.created_at);
        match self.schedule.next_after(basis) {
            Some(next) => next <= now,
            None => false,
        }
    }
}

/// Outcome of one policy execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveResult {
    pub records_processed: u64,
    pub records_archived: u64,
    pub records_deleted: u64,

    /// Bytes written to archive storage
    pub archive_size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArchiveResult {
    /// Fold another entity sweep's counts into this result
    pub fn absorb(&mut self, other: ArchiveResult) {
        self.records_processed += other.records_processed;
        self.records_archived += other.records_archived;
        self.records_deleted += other.records_deleted;
        self.archive_size += other.archive_size;
        if other.archive_location.is_some() {
            self.archive_location = other.archive_location;
        }
    }
}

/// One recorded policy run, kept as execution history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Unique record identifier (run-<uuid>)
    pub id: String,

    pub policy_id: String,

    pub tenant_id: String,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,

    pub result: ArchiveResult,
}

impl ExecutionRecord {
    pub fn new(
        policy: &RetentionPolicy,
        started_at: DateTime<Utc>,
        result: ArchiveResult,
    ) -> Self {
        let duration = Utc::now() - started_at;
        Self {
            id: format!("run-{}", Uuid::new_v4()),
            policy_id: policy.id.clone(),
            tenant_id: policy.tenant_id.clone(),
            started_at,
            duration_ms: duration.num_milliseconds().max(0) as u64,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_cutoff_days() {
        let now = at(2026, 3, 31, 12);
        let cutoff = RetentionPeriod::days(30).cutoff(now).unwrap();
        assert_eq!(cutoff, at(2026, 3, 1, 12));
    }

    #[test]
    fn test_cutoff_months_calendar_aware() {
        let now = at(2026, 3, 31, 0);
        let cutoff = RetentionPeriod::months(1).cutoff(now).unwrap();
        // February has no 31st; chrono clamps to the 28th
        assert_eq!(cutoff, at(2026, 2, 28, 0));
    }

    #[test]
    fn test_cutoff_years() {
        let now = at(2026, 8, 5, 9);
        let cutoff = RetentionPeriod::years(2).cutoff(now).unwrap();
        assert_eq!(cutoff, at(2024, 8, 5, 9));
    }

    #[test]
    fn test_legal_hold_blocks_only_when_both_set() {
        assert!(!LegalHold::default().blocks_execution());
        assert!(!LegalHold {
            enabled: true,
            exempt_from_deletion: false
        }
        .blocks_execution());
        assert!(LegalHold {
            enabled: true,
            exempt_from_deletion: true
        }
        .blocks_execution());
    }

    #[test]
    fn test_daily_schedule_next_after() {
        let schedule = Schedule::daily(2);
        // 2026-08-05 is a Wednesday
        let next = schedule.next_after(at(2026, 8, 5, 10)).unwrap();
        assert_eq!(next, at(2026, 8, 6, 2));

        // Before today's slot: due today
        let next = schedule.next_after(at(2026, 8, 5, 1)).unwrap();
        assert_eq!(next, at(2026, 8, 5, 2));
    }

    #[test]
    fn test_weekly_schedule_next_after() {
        // Sunday (0) at 03:00
        let schedule = Schedule::weekly(0, 3);
        let next = schedule.next_after(at(2026, 8, 5, 10)).unwrap();
        assert_eq!(next, at(2026, 8, 9, 3));
        assert_eq!(next.weekday().num_days_from_sunday(), 0);
    }

    #[test]
    fn test_monthly_schedule_next_after() {
        let schedule = Schedule::monthly(1, 0);
        let next = schedule.next_after(at(2026, 8, 5, 10)).unwrap();
        assert_eq!(next, at(2026, 9, 1, 0));
    }

    #[test]
    fn test_schedule_respects_utc_offset() {
        // 08:00 local at UTC+2 is 06:00 UTC
        let schedule = Schedule {
            utc_offset_minutes: 120,
            ..Schedule::daily(8)
        };
        assert!(schedule.matches(at(2026, 8, 5, 6)));
        assert!(!schedule.matches(at(2026, 8, 5, 8)));
    }

    #[test]
    fn test_policy_is_due() {
        let mut policy = RetentionPolicy::new(
            "org-1",
            "forms-90d",
            EntityType::Form,
            RetentionPeriod::days(90),
            "/var/archives",
        );
        policy.created_at = at(2026, 8, 1, 0);
        policy.stats.last_executed = Some(at(2026, 8, 4, 2));

        // Next run is 2026-08-05 02:00
        assert!(policy.is_due(at(2026, 8, 5, 3)));
        assert!(!policy.is_due(at(2026, 8, 5, 1)));
    }

    #[test]
    fn test_inactive_policy_never_due() {
        let mut policy = RetentionPolicy::new(
            "org-1",
            "inactive",
            EntityType::Form,
            RetentionPeriod::days(1),
            "/var/archives",
        );
        policy.created_at = at(2026, 1, 1, 0);
        policy.active = false;
        assert!(!policy.is_due(at(2026, 8, 5, 12)));
    }

    #[test]
    fn test_never_run_policy_due_from_creation() {
        let mut policy = RetentionPolicy::new(
            "org-1",
            "fresh",
            EntityType::Form,
            RetentionPeriod::days(30),
            "/var/archives",
        );
        policy.created_at = at(2026, 8, 4, 12);
        // First 02:00 after creation is 08-05 02:00
        assert!(!policy.is_due(at(2026, 8, 5, 1)));
        assert!(policy.is_due(at(2026, 8, 5, 2)));
    }

    #[test]
    fn test_archive_result_absorb() {
        let mut total = ArchiveResult::default();
        total.absorb(ArchiveResult {
            records_processed: 3,
            records_archived: 3,
            records_deleted: 3,
            archive_size: 100,
            archive_location: Some("/a/form.json".to_string()),
            error: None,
        });
        total.absorb(ArchiveResult {
            records_processed: 2,
            records_archived: 2,
            records_deleted: 2,
            archive_size: 50,
            archive_location: Some("/a/report.json".to_string()),
            error: None,
        });

        assert_eq!(total.records_processed, 5);
        assert_eq!(total.archive_size, 150);
        assert_eq!(total.archive_location, Some("/a/report.json".to_string()));
    }

    #[test]
    fn test_archive_format_extensions() {
        assert_eq!(ArchiveFormat::Json.extension(), "json");
        assert_eq!(ArchiveFormat::Csv.extension(), "csv");
        assert_eq!(ArchiveFormat::Compressed.extension(), "json.gz");
    }
}
