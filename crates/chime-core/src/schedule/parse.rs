//! Spec grammar.
//!
//! Dispatch: a leading `@` selects the descriptor form, anything else must
//! be five whitespace-separated cron fields. Per-field grammar, first match
//! wins: `*`, `*/n`, comma list of atoms (atom = range or value), `a-b`
//! range, integer literal.

use std::collections::BTreeSet;
use std::time::Duration;

use super::{CronField, CronSchedule, Schedule};
use crate::error::ParseError;

/// Floor for `@every` intervals.
pub const MIN_INTERVAL: Duration = Duration::from_secs(30);

pub(super) fn parse(expr: &str) -> Result<Schedule, ParseError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ParseError::Empty);
    }
    if expr.starts_with('@') {
        parse_descriptor(expr)
    } else {
        parse_cron(expr).map(Schedule::Cron)
    }
}

fn parse_descriptor(expr: &str) -> Result<Schedule, ParseError> {
    let equivalent = match expr {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        _ => {
            if let Some(text) = expr.strip_prefix("@every ") {
                let interval = parse_duration(text)
                    .ok_or_else(|| ParseError::InvalidDuration(text.to_string()))?;
                if interval < MIN_INTERVAL {
                    return Err(ParseError::BelowMinimumInterval(interval));
                }
                return Ok(Schedule::Every(interval));
            }
            return Err(ParseError::UnknownDescriptor(expr.to_string()));
        }
    };
    parse_cron(equivalent).map(Schedule::Cron)
}

fn parse_cron(expr: &str) -> Result<CronSchedule, ParseError> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(ParseError::FieldCount(parts.len()));
    }

    Ok(CronSchedule {
        minute: parse_field(parts[0], "minute", 0, 59)?,
        hour: parse_field(parts[1], "hour", 0, 23)?,
        day: parse_field(parts[2], "day of month", 1, 31)?,
        month: parse_field(parts[3], "month", 1, 12)?,
        weekday: parse_field(parts[4], "day of week", 0, 6)?,
    })
}

fn parse_field(
    field: &str,
    name: &'static str,
    min: u32,
    max: u32,
) -> Result<CronField, ParseError> {
    if field == "*" {
        return Ok(CronField::Any);
    }

    if let Some(text) = field.strip_prefix("*/") {
        let step: u32 = text.parse().map_err(|_| ParseError::InvalidStep {
            field: name,
            text: field.to_string(),
        })?;
        if step == 0 {
            return Err(ParseError::InvalidStep {
                field: name,
                text: field.to_string(),
            });
        }
        return Ok(CronField::Step(step));
    }

    if field.contains(',') {
        let mut values = BTreeSet::new();
        for atom in field.split(',') {
            if atom.is_empty() {
                return Err(ParseError::InvalidList {
                    field: name,
                    text: field.to_string(),
                });
            }
            values.extend(expand_atom(atom, name, min, max)?);
        }
        return Ok(CronField::Set(values.into_iter().collect()));
    }

    if field.contains('-') {
        return Ok(CronField::Set(expand_range(field, name, min, max)?));
    }

    let value = parse_value(field, name, min, max)?;
    Ok(CronField::Set(vec![value]))
}

/// One element of a comma list: a range or a single value.
fn expand_atom(
    atom: &str,
    name: &'static str,
    min: u32,
    max: u32,
) -> Result<Vec<u32>, ParseError> {
    if atom.contains('-') {
        expand_range(atom, name, min, max)
    } else {
        Ok(vec![parse_value(atom, name, min, max)?])
    }
}

fn expand_range(
    text: &str,
    name: &'static str,
    min: u32,
    max: u32,
) -> Result<Vec<u32>, ParseError> {
    let invalid = || ParseError::InvalidRange {
        field: name,
        text: text.to_string(),
    };

    let (start, end) = text.split_once('-').ok_or_else(invalid)?;
    if start.is_empty() || end.is_empty() || end.contains('-') {
        return Err(invalid());
    }

    let start = parse_value(start, name, min, max)?;
    let end = parse_value(end, name, min, max)?;
    if start > end {
        return Err(invalid());
    }

    Ok((start..=end).collect())
}

fn parse_value(
    text: &str,
    name: &'static str,
    min: u32,
    max: u32,
) -> Result<u32, ParseError> {
    let value: u32 = text.parse().map_err(|_| ParseError::InvalidValue {
        field: name,
        text: text.to_string(),
    })?;
    if value < min || value > max {
        return Err(ParseError::OutOfRange {
            field: name,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Parse compound durations like `30s`, `5m`, `2h30m`, `1d`.
fn parse_duration(s: &str) -> Option<Duration> {
    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();
    let mut has_unit = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
        } else {
            let n: u64 = num_buf.parse().ok()?;
            num_buf.clear();
            match ch {
                'h' => total_secs += n * 3600,
                'm' => total_secs += n * 60,
                's' => total_secs += n,
                'd' => total_secs += n * 86400,
                _ => return None,
            }
            has_unit = true;
        }
    }

    if !num_buf.is_empty() {
        // Trailing digits with no unit
        return None;
    }

    if has_unit {
        Some(Duration::from_secs(total_secs))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_floor_is_enforced() {
        let err = Schedule::parse("@every 29s").unwrap_err();
        assert!(
            err.to_string().contains("minimum interval is 30s"),
            "unexpected message: {err}"
        );

        assert_eq!(
            Schedule::parse("@every 30s").unwrap(),
            Schedule::Every(Duration::from_secs(30))
        );
    }

    #[test]
    fn compound_durations_parse_like_go() {
        assert_eq!(
            Schedule::parse("@every 1m30s").unwrap(),
            Schedule::Every(Duration::from_secs(90))
        );
        assert_eq!(
            Schedule::parse("@every 2h").unwrap(),
            Schedule::Every(Duration::from_secs(7200))
        );
        assert!(matches!(
            Schedule::parse("@every banana"),
            Err(ParseError::InvalidDuration(_))
        ));
        assert!(matches!(
            Schedule::parse("@every 30"),
            Err(ParseError::InvalidDuration(_))
        ));
    }

    #[test]
    fn descriptors_expand_to_their_cron_equivalents() {
        for (descriptor, cron) in [
            ("@yearly", "0 0 1 1 *"),
            ("@annually", "0 0 1 1 *"),
            ("@monthly", "0 0 1 * *"),
            ("@weekly", "0 0 * * 0"),
            ("@daily", "0 0 * * *"),
            ("@midnight", "0 0 * * *"),
            ("@hourly", "0 * * * *"),
        ] {
            assert_eq!(
                Schedule::parse(descriptor).unwrap(),
                Schedule::parse(cron).unwrap(),
                "{descriptor} should equal {cron}"
            );
        }
    }

    #[test]
    fn unknown_descriptor_is_rejected() {
        assert!(matches!(
            Schedule::parse("@fortnightly"),
            Err(ParseError::UnknownDescriptor(_))
        ));
    }

    #[test]
    fn field_count_must_be_five() {
        assert!(matches!(
            Schedule::parse("* * *"),
            Err(ParseError::FieldCount(3))
        ));
        assert!(matches!(
            Schedule::parse("* * * * * *"),
            Err(ParseError::FieldCount(6))
        ));
        assert!(matches!(Schedule::parse("   "), Err(ParseError::Empty)));
    }

    #[test]
    fn ranges_are_validated_and_expanded() {
        assert_eq!(
            Schedule::parse("0 9-17 * * *").unwrap(),
            cron_with_hours((9..=17).collect())
        );

        // start > end
        assert!(matches!(
            Schedule::parse("0 9-5 * * *"),
            Err(ParseError::InvalidRange { field: "hour", .. })
        ));
        // out of range
        assert!(matches!(
            Schedule::parse("0 25-30 * * *"),
            Err(ParseError::OutOfRange { field: "hour", value: 25, .. })
        ));
        // dangling / doubled dashes
        assert!(Schedule::parse("0 -5 * * *").is_err());
        assert!(Schedule::parse("0 5- * * *").is_err());
        assert!(Schedule::parse("0 5--9 * * *").is_err());
    }

    #[test]
    fn lists_deduplicate_and_accept_range_atoms() {
        assert!(Schedule::parse("0 0 * * 1,3,5").is_ok());

        assert_eq!(
            Schedule::parse("0 0 * * 1,1,3-4,3").unwrap(),
            cron_with_weekdays(vec![1, 3, 4])
        );

        for bad in ["0 0 * * 1,,2", "0 0 * * ,1", "0 0 * * 1,"] {
            assert!(
                matches!(
                    Schedule::parse(bad),
                    Err(ParseError::InvalidList { field: "day of week", .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn steps_require_a_positive_divisor() {
        assert_eq!(
            Schedule::parse("*/5 * * * *").unwrap(),
            Schedule::Cron(CronSchedule {
                minute: CronField::Step(5),
                hour: CronField::Any,
                day: CronField::Any,
                month: CronField::Any,
                weekday: CronField::Any,
            })
        );
        assert!(matches!(
            Schedule::parse("*/0 * * * *"),
            Err(ParseError::InvalidStep { field: "minute", .. })
        ));
        assert!(matches!(
            Schedule::parse("*/x * * * *"),
            Err(ParseError::InvalidStep { field: "minute", .. })
        ));
    }

    #[test]
    fn literals_are_range_checked() {
        assert!(Schedule::parse("59 23 31 12 6").is_ok());
        assert!(matches!(
            Schedule::parse("60 * * * *"),
            Err(ParseError::OutOfRange { field: "minute", value: 60, .. })
        ));
        assert!(matches!(
            Schedule::parse("* * 0 * *"),
            Err(ParseError::OutOfRange { field: "day of month", value: 0, .. })
        ));
        assert!(matches!(
            Schedule::parse("x * * * *"),
            Err(ParseError::InvalidValue { field: "minute", .. })
        ));
    }

    fn cron_with_hours(hours: Vec<u32>) -> Schedule {
        Schedule::Cron(CronSchedule {
            minute: CronField::Set(vec![0]),
            hour: CronField::Set(hours),
            day: CronField::Any,
            month: CronField::Any,
            weekday: CronField::Any,
        })
    }

    fn cron_with_weekdays(weekdays: Vec<u32>) -> Schedule {
        Schedule::Cron(CronSchedule {
            minute: CronField::Set(vec![0]),
            hour: CronField::Set(vec![0]),
            day: CronField::Any,
            month: CronField::Any,
            weekday: CronField::Set(weekdays),
        })
    }
}
