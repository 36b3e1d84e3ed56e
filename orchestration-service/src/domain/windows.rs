use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use shared::time::{end_of_day, local_instant, monday_of_week, start_of_day, waakdienst_anchor};
use shared::types::Product;
use std::collections::HashSet;

use crate::error::OrchestratorError;

/// Business-hours boundaries for Incidents and Incidents-Standby.
const BUSINESS_START: NaiveTime = NaiveTime::from_hms_opt(8, 0, 0).expect("valid time");
const BUSINESS_END: NaiveTime = NaiveTime::from_hms_opt(17, 0, 0).expect("valid time");

/// Evening blocks run from 17:00 to 08:00 the next day.
const EVENING_START: NaiveTime = BUSINESS_END;
const EVENING_END: NaiveTime = BUSINESS_START;

/// A single employee-independent shift window, in canonical form.
///
/// Windows are never clipped to the horizon: the idempotency key of the
/// persisted shift is its start instant, so a window must come out identical
/// no matter which horizon produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftWindow {
    pub product: Product,
    /// Canonical Monday (business products) or Wednesday (Waakdienst) of the
    /// planning unit this window belongs to.
    pub unit_anchor: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ShiftWindow {
    /// Duration as the zone actually produced it (DST weeks differ from the
    /// nominal pattern).
    pub fn duration_hours(&self) -> f64 {
        shared::time::elapsed_hours(self.start, self.end)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        shared::time::overlaps(self.start, self.end, start, end)
    }
}

/// The atomic assignment granularity: one business week or one on-call week,
/// carrying every window of that week that intersects the horizon.
#[derive(Debug, Clone)]
pub struct PlanningUnit {
    pub product: Product,
    pub anchor: NaiveDate,
    pub windows: Vec<ShiftWindow>,
}

impl PlanningUnit {
    pub fn total_hours(&self) -> f64 {
        self.windows.iter().map(ShiftWindow::duration_hours).sum()
    }
}

/// Produce the canonical planning units for a product over the horizon.
///
/// Deterministic and pure: the same inputs always generate the same windows,
/// independent of any employee. Partial weeks at the horizon edges keep their
/// canonical anchor so the intended assignee stays stable across runs.
pub fn generate_units(
    product: Product,
    tz: Tz,
    horizon_start: NaiveDate,
    horizon_end: NaiveDate,
    holidays: &HashSet<NaiveDate>,
    schedule_on_holidays: bool,
) -> Result<Vec<PlanningUnit>, OrchestratorError> {
    if horizon_end < horizon_start {
        return Err(OrchestratorError::InvalidHorizon {
            start: horizon_start,
            end: horizon_end,
            reason: "horizon end before start".to_string(),
        });
    }

    let units = match product {
        Product::Incidents | Product::IncidentsStandby => business_week_units(
            product,
            tz,
            horizon_start,
            horizon_end,
            holidays,
            schedule_on_holidays,
        ),
        Product::Waakdienst => waakdienst_units(tz, horizon_start, horizon_end),
    };

    Ok(units)
}

/// Mon-Fri weeks of daily 08:00-17:00 windows. Holidays drop the day unless
/// team policy schedules through them; Waakdienst never consults holidays.
fn business_week_units(
    product: Product,
    tz: Tz,
    horizon_start: NaiveDate,
    horizon_end: NaiveDate,
    holidays: &HashSet<NaiveDate>,
    schedule_on_holidays: bool,
) -> Vec<PlanningUnit> {
    let mut units = Vec::new();
    let mut monday = monday_of_week(horizon_start);

    while monday <= horizon_end {
        let mut windows = Vec::with_capacity(5);
        for offset in 0..5 {
            let date = monday + Duration::days(offset);
            if date < horizon_start || date > horizon_end {
                continue;
            }
            if !schedule_on_holidays && holidays.contains(&date) {
                continue;
            }
            windows.push(ShiftWindow {
                product,
                unit_anchor: monday,
                start: local_instant(tz, date, BUSINESS_START),
                end: local_instant(tz, date, BUSINESS_END),
            });
        }
        if !windows.is_empty() {
            units.push(PlanningUnit {
                product,
                anchor: monday,
                windows,
            });
        }
        monday += Duration::days(7);
    }

    units
}

/// On-call weeks Wednesday 17:00 through next Wednesday 08:00.
///
/// Per week: Wed/Thu/Fri evening blocks (17:00 to 08:00 next day), Saturday
/// and Sunday full civil days (00:00 to 24:00), Mon/Tue evening blocks.
/// Nominal durations are 15/15/15/24/24/15/15 hours; a DST week yields what
/// the zone yields.
fn waakdienst_units(tz: Tz, horizon_start: NaiveDate, horizon_end: NaiveDate) -> Vec<PlanningUnit> {
    let h_start = start_of_day(tz, horizon_start);
    let h_end = end_of_day(tz, horizon_end);

    let mut units = Vec::new();
    // The previous week's tail can still reach into the horizon's first day.
    let mut anchor = waakdienst_anchor(horizon_start) - Duration::days(7);

    while anchor <= horizon_end {
        let windows: Vec<ShiftWindow> = waakdienst_blocks(tz, anchor)
            .into_iter()
            .filter(|w| w.overlaps(h_start, h_end))
            .collect();
        if !windows.is_empty() {
            units.push(PlanningUnit {
                product: Product::Waakdienst,
                anchor,
                windows,
            });
        }
        anchor += Duration::days(7);
    }

    units
}

/// The seven canonical blocks of the on-call week anchored at `wednesday`.
fn waakdienst_blocks(tz: Tz, wednesday: NaiveDate) -> Vec<ShiftWindow> {
    let evening = |day_offset: i64| {
        let date = wednesday + Duration::days(day_offset);
        ShiftWindow {
            product: Product::Waakdienst,
            unit_anchor: wednesday,
            start: local_instant(tz, date, EVENING_START),
            end: local_instant(tz, date + Duration::days(1), EVENING_END),
        }
    };
    let full_day = |day_offset: i64| {
        let date = wednesday + Duration::days(day_offset);
        ShiftWindow {
            product: Product::Waakdienst,
            unit_anchor: wednesday,
            start: start_of_day(tz, date),
            end: end_of_day(tz, date),
        }
    };

    vec![
        evening(0),  // Wednesday
        evening(1),  // Thursday
        evening(2),  // Friday
        full_day(3), // Saturday
        full_day(4), // Sunday
        evening(5),  // Monday
        evening(6),  // Tuesday
    ]
}
