//! Time specs: five-field cron expressions and fixed intervals.
//!
//! A `Schedule` has one operation: given an instant, produce the next
//! instant strictly after it at which the task fires, or `None` when no
//! further firing exists.

mod parse;

pub use parse::MIN_INTERVAL;

use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::error::ParseError;

/// Upper bound on the minute-by-minute search in `next_after`. An
/// expression with no match within a year (e.g. `0 0 31 2 *`) never fires.
const MAX_SEARCH_MINUTES: u32 = 366 * 24 * 60;

/// A parsed time spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Cron(CronSchedule),
    Every(Duration),
}

impl Schedule {
    /// Parse a spec string: either five whitespace-separated cron fields or
    /// an `@descriptor` (`@hourly`, `@every 5m`, ...).
    pub fn parse(expr: &str) -> Result<Self, ParseError> {
        parse::parse(expr)
    }

    /// The next fire instant strictly after `after`, evaluated in `tz`.
    ///
    /// Cron matching happens on local wall-clock fields in `tz`; the result
    /// is returned as an absolute UTC instant.
    pub fn next_after<Tz: TimeZone>(
        &self,
        after: DateTime<Utc>,
        tz: &Tz,
    ) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Every(interval) => {
                Some(after + chrono::Duration::from_std(*interval).ok()?)
            }
            Schedule::Cron(cron) => {
                // Truncate to the minute, then step forward one minute at a
                // time until every field matches.
                let mut t = after.with_second(0)?.with_nanosecond(0)?
                    + chrono::Duration::minutes(1);
                for _ in 0..MAX_SEARCH_MINUTES {
                    if cron.matches(&t.with_timezone(tz)) {
                        return Some(t);
                    }
                    t += chrono::Duration::minutes(1);
                }
                None
            }
        }
    }
}

/// The five fields of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub(crate) minute: CronField,
    pub(crate) hour: CronField,
    pub(crate) day: CronField,
    pub(crate) month: CronField,
    pub(crate) weekday: CronField,
}

impl CronSchedule {
    fn matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        self.minute.matches(t.minute())
            && self.hour.matches(t.hour())
            && self.day.matches(t.day())
            && self.month.matches(t.month())
            && self.weekday.matches(t.weekday().num_days_from_sunday())
    }
}

/// A single cron field.
///
/// Single values, ranges and lists all normalise to `Set` (sorted,
/// deduplicated), so matching is wildcard, modulo, or membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CronField {
    Any,
    Step(u32),
    Set(Vec<u32>),
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Step(step) => value % step == 0,
            Self::Set(values) => values.binary_search(&value).is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn interval_next_is_a_fixed_offset() {
        let s = Schedule::Every(Duration::from_secs(45));
        let t = utc(2026, 3, 1, 12, 0, 7);

        assert_eq!(s.next_after(t, &Utc), Some(t + chrono::Duration::seconds(45)));
    }

    #[test]
    fn cron_next_truncates_seconds_and_is_strictly_after() {
        let s = Schedule::parse("* * * * *").unwrap();
        let t = utc(2026, 3, 1, 12, 0, 59);

        assert_eq!(s.next_after(t, &Utc), Some(utc(2026, 3, 1, 12, 1, 0)));

        // Exactly on a boundary still advances a full minute.
        let t = utc(2026, 3, 1, 12, 0, 0);
        assert_eq!(s.next_after(t, &Utc), Some(utc(2026, 3, 1, 12, 1, 0)));
    }

    #[test]
    fn cron_next_daily_midnight() {
        let s = Schedule::parse("0 0 * * *").unwrap();
        let t = utc(2026, 3, 1, 18, 30, 0);

        assert_eq!(s.next_after(t, &Utc), Some(utc(2026, 3, 2, 0, 0, 0)));
    }

    #[test]
    fn cron_next_respects_weekday() {
        // 2026-03-01 is a Sunday.
        let s = Schedule::parse("0 9 * * 1").unwrap();
        let t = utc(2026, 3, 1, 12, 0, 0);

        assert_eq!(s.next_after(t, &Utc), Some(utc(2026, 3, 2, 9, 0, 0)));
    }

    #[test]
    fn cron_next_step_matches_on_modulo() {
        let s = Schedule::parse("*/15 * * * *").unwrap();
        let t = utc(2026, 3, 1, 12, 3, 0);

        assert_eq!(s.next_after(t, &Utc), Some(utc(2026, 3, 1, 12, 15, 0)));
    }

    #[test]
    fn cron_fields_match_in_the_configured_zone() {
        // Midnight in UTC+5 is 19:00 UTC the previous day.
        let s = Schedule::parse("0 0 * * *").unwrap();
        let tz = FixedOffset::east_opt(5 * 3600).unwrap();
        let t = utc(2026, 3, 1, 12, 0, 0);

        assert_eq!(s.next_after(t, &tz), Some(utc(2026, 3, 1, 19, 0, 0)));
    }

    #[test]
    fn unsatisfiable_cron_yields_no_next_firing() {
        let s = Schedule::parse("0 0 31 2 *").unwrap();
        let t = utc(2026, 1, 1, 0, 0, 0);

        assert_eq!(s.next_after(t, &Utc), None);
    }

    #[test]
    fn next_is_always_strictly_in_the_future() {
        let t = utc(2026, 7, 19, 23, 59, 59);
        for expr in ["* * * * *", "0 0 1 1 *", "@every 30s", "@hourly"] {
            let s = Schedule::parse(expr).unwrap();
            let next = s.next_after(t, &Utc).unwrap();
            assert!(next > t, "{expr}: {next} must be after {t}");
        }
    }
}
