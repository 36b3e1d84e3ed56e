use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// region: Products

/// A shift product the orchestrator plans.
///
/// Wire codes are the canonical snake_case strings; a few common aliases are
/// accepted on input and normalized on output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "product", rename_all = "snake_case")]
pub enum Product {
    Incidents,
    #[serde(alias = "standby", alias = "incidents-standby")]
    IncidentsStandby,
    #[serde(alias = "oncall", alias = "on_call")]
    Waakdienst,
}

impl Product {
    /// Fixed planning order: later products must see earlier products' load.
    pub const PLANNING_ORDER: [Product; 3] = [
        Product::Incidents,
        Product::IncidentsStandby,
        Product::Waakdienst,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Product::Incidents => "incidents",
            Product::IncidentsStandby => "incidents_standby",
            Product::Waakdienst => "waakdienst",
        }
    }

    /// Business-hours products run Mon-Fri 08:00-17:00; Waakdienst covers the rest.
    pub fn is_business_hours(self) -> bool {
        matches!(self, Product::Incidents | Product::IncidentsStandby)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incidents" => Ok(Product::Incidents),
            "incidents_standby" | "incidents-standby" | "standby" => Ok(Product::IncidentsStandby),
            "waakdienst" | "oncall" | "on_call" => Ok(Product::Waakdienst),
            other => Err(format!("Unknown product code: {other}")),
        }
    }
}

// endregion: Products

// region: Roster read-model

/// An engineer as exposed by the external user management service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub active: bool,
    pub available_for_incidents: bool,
    pub available_for_waakdienst: bool,
    pub skills: Vec<String>,
    pub seniority_start_date: NaiveDate,
    /// Optional cap on consecutive planning units per product.
    pub max_consecutive_weeks: Option<i16>,
}

impl Employee {
    pub fn available_for(&self, product: Product) -> bool {
        match product {
            Product::Incidents | Product::IncidentsStandby => self.available_for_incidents,
            Product::Waakdienst => self.available_for_waakdienst,
        }
    }

    pub fn has_skills(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.skills.contains(s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub department_id: Option<Uuid>,
}

/// Per-team orchestration switches, owned by this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamSettings {
    pub team_id: Uuid,
    pub auto_schedule: bool,
    pub incidents_enabled: bool,
    pub standby_enabled: bool,
    pub waakdienst_enabled: bool,
    /// Team policy override: keep planning business products on holidays.
    pub schedule_on_holidays: bool,
    /// Optional per-product floor on eligible engineers; a roster below the
    /// floor is reported as a staffing constraint on every run.
    pub incidents_min_staffing: Option<i16>,
    pub standby_min_staffing: Option<i16>,
    pub waakdienst_min_staffing: Option<i16>,
}

impl TeamSettings {
    pub fn product_enabled(&self, product: Product) -> bool {
        match product {
            Product::Incidents => self.incidents_enabled,
            Product::IncidentsStandby => self.standby_enabled,
            Product::Waakdienst => self.waakdienst_enabled,
        }
    }

    pub fn enabled_products(&self) -> Vec<Product> {
        Product::PLANNING_ORDER
            .into_iter()
            .filter(|p| self.product_enabled(*p))
            .collect()
    }

    pub fn min_staffing(&self, product: Product) -> Option<i16> {
        match product {
            Product::Incidents => self.incidents_min_staffing,
            Product::IncidentsStandby => self.standby_min_staffing,
            Product::Waakdienst => self.waakdienst_min_staffing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShiftTemplate {
    pub id: Uuid,
    pub team_id: Uuid,
    pub product: Product,
    pub required_skills: Vec<String>,
}

// endregion: Roster read-model

// region: Leave read-model

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "leave_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// How a leave type interacts with shift products.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "conflict_handling", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictHandling {
    /// Blocks every product for the leave interval.
    FullUnavailable,
    /// Blocks business-hours products only; Waakdienst stays available.
    DaytimeOnly,
    /// Advisory; never blocks.
    NoConflict,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub status: LeaveStatus,
    pub conflict_handling: ConflictHandling,
}

impl LeaveRequest {
    /// Only approved leave blocks; pending is informational.
    pub fn blocks(&self, product: Product) -> bool {
        if self.status != LeaveStatus::Approved {
            return false;
        }
        match self.conflict_handling {
            ConflictHandling::FullUnavailable => true,
            ConflictHandling::DaytimeOnly => product.is_business_hours(),
            ConflictHandling::NoConflict => false,
        }
    }

    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_ts < end && start < self.end_ts
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "recurring_coverage", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurringCoverage {
    Full,
    DaytimeOnly,
}

impl RecurringCoverage {
    pub fn blocks(self, product: Product) -> bool {
        match self {
            RecurringCoverage::Full => true,
            RecurringCoverage::DaytimeOnly => product.is_business_hours(),
        }
    }
}

/// A weekly repeating unavailability, e.g. "every Wednesday 08:00-17:00".
///
/// `weekday_mask` is a bitmask with bit 0 = Monday .. bit 6 = Sunday.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurringLeavePattern {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub weekday_mask: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
    pub coverage: RecurringCoverage,
}

impl RecurringLeavePattern {
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        if date < self.effective_from {
            return false;
        }
        if let Some(until) = self.effective_until
            && date > until
        {
            return false;
        }
        let bit = 1i16 << date.weekday().num_days_from_monday();
        self.weekday_mask & bit != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

// endregion: Leave read-model

// region: Shift write-model

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "shift_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftStatus {
    Planned,
    Applied,
    Superseded,
}

/// A persisted shift. `(team_id, product, start_ts)` is unique among
/// non-superseded rows and acts as the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shift {
    pub id: Uuid,
    pub team_id: Uuid,
    pub template_id: Option<Uuid>,
    pub product: Product,
    pub employee_id: Option<Uuid>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub run_id: Option<Uuid>,
    pub status: ShiftStatus,
}

impl Shift {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_ts < end && start < self.end_ts
    }
}

// endregion: Shift write-model

// region: Orchestration audit

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "run_mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Preview,
    Apply,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "run_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrchestrationRun {
    pub id: Uuid,
    pub team_id: Uuid,
    pub horizon_start: NaiveDate,
    pub horizon_end: NaiveDate,
    pub mode: RunMode,
    pub status: RunStatus,
    pub shifts_planned: i32,
    pub shifts_assigned: i32,
    pub shifts_unassigned: i32,
    pub violations: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "constraint_kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    RecurringLeave,
    ApprovedLeave,
    DoubleAssignment,
    SkillMismatch,
    Overtime,
    RestPeriod,
    MinimumStaffing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "constraint_severity", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintSeverity {
    Info,
    Warning,
    Violation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "constraint_resolution", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintResolution {
    Skipped,
    Reassigned,
    Split,
    Accepted,
}

/// Audit trail entry for a constraint that influenced a run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConstraintEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub product: Product,
    pub window_start: Option<DateTime<Utc>>,
    pub kind: ConstraintKind,
    pub severity: ConstraintSeverity,
    pub resolution: ConstraintResolution,
    pub note: String,
}

// endregion: Orchestration audit
