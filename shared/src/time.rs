use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Return the current civil date in the given timezone.
///
/// The orchestrator never uses the host zone implicitly; "today" is always
/// asked for in the team's zone.
pub fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// Resolve a civil `(date, time)` in `tz` to a UTC instant.
///
/// DST rules: an ambiguous local time (fall-back fold) resolves to the
/// earliest instant; a non-existent local time (spring-forward gap) resolves
/// to the first valid instant after the gap. Shift boundaries at 08:00/17:00
/// never fall in the Amsterdam gap, but the fallback keeps the function total.
pub fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _latest) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            // Walk forward in 15-minute steps until we exit the gap.
            let mut probe = naive;
            loop {
                probe += Duration::minutes(15);
                if let chrono::LocalResult::Single(dt) = tz.from_local_datetime(&probe) {
                    return dt.with_timezone(&Utc);
                }
            }
        }
    }
}

/// Start of the civil day in `tz` as a UTC instant.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    local_instant(tz, date, NaiveTime::MIN)
}

/// End of the civil day (24:00, i.e. next day 00:00) in `tz` as a UTC instant.
pub fn end_of_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    start_of_day(tz, date + Duration::days(1))
}

/// The Monday of the ISO week containing `date`.
pub fn monday_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// The Wednesday anchoring the on-call week containing `date`.
///
/// On-call weeks run Wednesday 17:00 to the next Wednesday 08:00; the anchor
/// is the most recent Wednesday on or before `date`.
pub fn waakdienst_anchor(date: NaiveDate) -> NaiveDate {
    let offset = (date.weekday().num_days_from_monday() + 7 - Weekday::Wed.num_days_from_monday())
        % 7;
    date - Duration::days(i64::from(offset))
}

/// Elapsed hours between two instants, as the zone actually produced them.
pub fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_minutes() as f64 / 60.0
}

/// Half-open interval intersection test.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}
