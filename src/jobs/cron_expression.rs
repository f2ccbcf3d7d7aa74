//! Cron expression grammar.
//!
//! Two shapes are accepted:
//! - 5 fields: `minute hour day-of-month month day-of-week`
//! - 6 fields: `second minute hour day-of-month month day-of-week`
//!
//! Each field is a comma separated list of items. An item is `*`, a value
//! `N` or a range `N-M`, optionally followed by a step `/S`. Months accept
//! `JAN`-`DEC` and days of the week accept `SUN`-`SAT` as well as `0`-`7`
//! (both `0` and `7` mean Sunday).
//!
//! When both day fields are restricted a time matches if either one does.
//! A day field written with a leading `*` (`*`, `*/2`) is unrestricted and
//! then both fields must match, as in Vixie cron.
//!
//! The literal `never` is a sentinel for jobs without an automatic schedule.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::OnceLock,
};

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

/// Sentinel for jobs that never run on a timer.
pub const NEVER: &str = "never";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronParseError {
    #[error("Cron expression is empty")]
    Empty,
    #[error("Cron expression must have 5 or 6 fields, found {0}")]
    FieldCount(usize),
    #[error("Invalid {field} token '{token}'")]
    InvalidToken { field: &'static str, token: String },
    #[error("{field} value {value} is outside the allowed range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("Invalid {field} range {start}-{end}: start is after end")]
    ReversedRange {
        field: &'static str,
        start: u32,
        end: u32,
    },
    #[error("{field} step must be at least 1")]
    ZeroStep { field: &'static str },
    #[error("'{0}' is not a schedule")]
    NotASchedule(String),
    #[error("Unsupported cron expression '{expression}': {reason}")]
    Unsupported { expression: String, reason: String },
}

#[derive(Debug, Clone, Copy)]
struct FieldBounds {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    name_base: u32,
}

const SECOND: FieldBounds = FieldBounds {
    name: "second",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};

const MINUTE: FieldBounds = FieldBounds {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};

const HOUR: FieldBounds = FieldBounds {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};

const DAY_OF_MONTH: FieldBounds = FieldBounds {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};

const MONTH: FieldBounds = FieldBounds {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ],
    name_base: 1,
};

// 7 is accepted as an alias for Sunday and folded into 0 after parsing.
const DAY_OF_WEEK: FieldBounds = FieldBounds {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
    name_base: 0,
};

fn item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(\*)|([0-9A-Za-z]+)(?:-([0-9A-Za-z]+))?)(?:/([0-9]+))?$")
            .expect("cron item pattern is valid")
    })
}

/// Set of allowed values for one field, one bit per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldValues(u64);

impl FieldValues {
    fn full(min: u32, max: u32) -> Self {
        Self((min..=max).fold(0, |bits, value| bits | (1 << value)))
    }

    fn values(self) -> impl Iterator<Item = u32> {
        (0..64).filter(move |value| self.0 & (1 << value) != 0)
    }

    fn render(self, min: u32, max: u32, offset: u32) -> String {
        if self == Self::full(min, max) {
            return "*".to_string();
        }
        self.values()
            .map(|value| (value + offset).to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_value(bounds: FieldBounds, token: &str, raw: &str) -> Result<u32, CronParseError> {
    let value = if raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse::<u32>()
            .map_err(|_| CronParseError::InvalidToken {
                field: bounds.name,
                token: token.to_string(),
            })?
    } else {
        let index = bounds
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(raw))
            .ok_or_else(|| CronParseError::InvalidToken {
                field: bounds.name,
                token: token.to_string(),
            })?;
        #[allow(clippy::cast_possible_truncation)]
        let index = index as u32;
        bounds.name_base + index
    };

    if value < bounds.min || value > bounds.max {
        return Err(CronParseError::OutOfRange {
            field: bounds.name,
            value,
            min: bounds.min,
            max: bounds.max,
        });
    }

    Ok(value)
}

fn parse_item(bounds: FieldBounds, token: &str) -> Result<FieldValues, CronParseError> {
    let invalid = || CronParseError::InvalidToken {
        field: bounds.name,
        token: token.to_string(),
    };

    let captures = item_pattern().captures(token).ok_or_else(invalid)?;

    let step = match captures.get(4) {
        Some(step) => {
            let step: u32 = step.as_str().parse().map_err(|_| invalid())?;
            if step == 0 {
                return Err(CronParseError::ZeroStep { field: bounds.name });
            }
            Some(step)
        }
        None => None,
    };

    let (start, end) = if captures.get(1).is_some() {
        // `*` over day-of-week covers 0-6, the Sunday alias is redundant
        let max = if bounds.name == DAY_OF_WEEK.name { 6 } else { bounds.max };
        (bounds.min, max)
    } else {
        let start = captures.get(2).ok_or_else(invalid)?.as_str();
        let start = parse_value(bounds, token, start)?;
        match captures.get(3) {
            Some(end) => {
                let end = parse_value(bounds, token, end.as_str())?;
                if start > end {
                    return Err(CronParseError::ReversedRange {
                        field: bounds.name,
                        start,
                        end,
                    });
                }
                (start, end)
            }
            // `N/S` means "from N to the end of the field every S"
            None if step.is_some() => (start, bounds.max),
            None => (start, start),
        }
    };

    let step = step.unwrap_or(1) as usize;
    let bits = (start..=end)
        .step_by(step)
        .fold(0u64, |bits, value| bits | (1 << value));

    Ok(FieldValues(bits))
}

fn parse_field(bounds: FieldBounds, field: &str) -> Result<FieldValues, CronParseError> {
    let mut bits = 0u64;
    for item in field.split(',') {
        bits |= parse_item(bounds, item)?.0;
    }

    if bounds.name == DAY_OF_WEEK.name && bits & (1 << 7) != 0 {
        bits = (bits & !(1 << 7)) | 1;
    }

    Ok(FieldValues(bits))
}

/// A validated recurring schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    source: String,
    has_seconds: bool,
    // More than one entry when both day fields are restricted: standard cron
    // fires when either matches, the `cron` crate requires both.
    schedules: Vec<cron::Schedule>,
}

impl CronSchedule {
    /// Whether the expression carries a leading seconds field.
    #[must_use]
    pub const fn has_seconds(&self) -> bool {
        self.has_seconds
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Next fire time strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&after).next())
            .min()
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronSchedule {}

impl Display for CronSchedule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for CronSchedule {
    type Err = CronParseError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let source = expression.trim();
        if source.is_empty() {
            return Err(CronParseError::Empty);
        }
        if source == NEVER {
            return Err(CronParseError::NotASchedule(source.to_string()));
        }

        let fields: Vec<&str> = source.split_whitespace().collect();
        let (seconds, rest) = match fields.len() {
            5 => (FieldValues(1), &fields[..]),
            6 => (parse_field(SECOND, fields[0])?, &fields[1..]),
            count => return Err(CronParseError::FieldCount(count)),
        };

        let minutes = parse_field(MINUTE, rest[0])?;
        let hours = parse_field(HOUR, rest[1])?;
        let days_of_month = parse_field(DAY_OF_MONTH, rest[2])?;
        let months = parse_field(MONTH, rest[3])?;
        let days_of_week = parse_field(DAY_OF_WEEK, rest[4])?;

        // A day field counts as unrestricted only when it starts with `*`,
        // so `1-31` still takes part in the either-day match.
        let any_day_of_month = rest[2].starts_with('*');
        let any_day_of_week = rest[4].starts_with('*');

        let render = |dom: &str, dow: &str| {
            format!(
                "{} {} {} {} {} {}",
                seconds.render(0, 59, 0),
                minutes.render(0, 59, 0),
                hours.render(0, 23, 0),
                dom,
                months.render(1, 12, 0),
                dow,
            )
        };

        // `cron` numbers days of the week 1-7 starting on Sunday
        let dom = days_of_month.render(1, 31, 0);
        let dow = days_of_week.render(0, 6, 1);
        let rendered = if any_day_of_month || any_day_of_week {
            vec![render(&dom, &dow)]
        } else {
            vec![render(&dom, "*"), render("*", &dow)]
        };

        let schedules = rendered
            .iter()
            .map(|expression| {
                cron::Schedule::from_str(expression).map_err(|e| CronParseError::Unsupported {
                    expression: source.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: source.to_string(),
            has_seconds: fields.len() == 6,
            schedules,
        })
    }
}

/// A job's cadence: a recurring schedule or the `never` sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronExpression {
    Never,
    Schedule(CronSchedule),
}

impl CronExpression {
    #[must_use]
    pub const fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }

    #[must_use]
    pub const fn schedule(&self) -> Option<&CronSchedule> {
        match self {
            Self::Never => None,
            Self::Schedule(schedule) => Some(schedule),
        }
    }
}

impl Display for CronExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str(NEVER),
            Self::Schedule(schedule) => schedule.fmt(f),
        }
    }
}

impl FromStr for CronExpression {
    type Err = CronParseError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        if expression.trim() == NEVER {
            return Ok(Self::Never);
        }
        expression.parse().map(Self::Schedule)
    }
}

/// Validates a recurring schedule. The `never` sentinel is rejected.
pub fn validate_cron_expression(expression: &str) -> Result<(), CronParseError> {
    expression.parse::<CronSchedule>().map(|_| ())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_accepts_five_and_six_field_expressions() {
        for expression in [
            "* * * * *",
            "*/5 * * * *",
            "0 0 * * */1",
            "15,45 9-17 * * MON-FRI",
            "0 12 1 JAN,jul *",
            "0 0 * * 7",
            "*/10 * * * * *",
            "0 30 4 * * *",
            "5/15 * * * *",
        ] {
            assert!(
                validate_cron_expression(expression).is_ok(),
                "{expression} should be valid"
            );
        }
    }

    #[test]
    fn test_rejects_malformed_expressions() {
        assert_eq!(validate_cron_expression(""), Err(CronParseError::Empty));
        assert_eq!(
            validate_cron_expression("abc"),
            Err(CronParseError::FieldCount(1))
        );
        assert_eq!(
            validate_cron_expression("*/5 * * *"),
            Err(CronParseError::FieldCount(4))
        );
        assert_eq!(
            validate_cron_expression("* * * * * * *"),
            Err(CronParseError::FieldCount(7))
        );
        assert!(matches!(
            validate_cron_expression("60 * * * *"),
            Err(CronParseError::OutOfRange { field: "minute", value: 60, .. })
        ));
        assert!(matches!(
            validate_cron_expression("* 24 * * *"),
            Err(CronParseError::OutOfRange { field: "hour", .. })
        ));
        assert!(matches!(
            validate_cron_expression("* * 0 * *"),
            Err(CronParseError::OutOfRange { field: "day-of-month", .. })
        ));
        assert!(matches!(
            validate_cron_expression("*/0 * * * *"),
            Err(CronParseError::ZeroStep { field: "minute" })
        ));
        assert!(matches!(
            validate_cron_expression("* 10-2 * * *"),
            Err(CronParseError::ReversedRange { field: "hour", start: 10, end: 2 })
        ));
        assert!(matches!(
            validate_cron_expression("* * * FOO *"),
            Err(CronParseError::InvalidToken { field: "month", .. })
        ));
        assert!(matches!(
            validate_cron_expression("* * * * 1,,2"),
            Err(CronParseError::InvalidToken { field: "day-of-week", .. })
        ));
    }

    #[test]
    fn test_never_is_only_a_cron_expression_not_a_schedule() {
        assert_eq!("never".parse::<CronExpression>(), Ok(CronExpression::Never));
        assert!(matches!(
            validate_cron_expression("never"),
            Err(CronParseError::NotASchedule(_))
        ));
        assert!("Never".parse::<CronExpression>().is_err());
    }

    #[test]
    fn test_error_messages_name_the_field() {
        let err = validate_cron_expression("* 99 * * *").unwrap_err();
        assert_eq!(
            err.to_string(),
            "hour value 99 is outside the allowed range 0-23"
        );
    }

    #[test]
    fn test_display_keeps_source_text() {
        let expression: CronExpression = " */5 * * * * ".parse().unwrap();
        assert_eq!(expression.to_string(), "*/5 * * * *");
        assert_eq!(CronExpression::Never.to_string(), "never");
    }

    #[test]
    fn test_next_after_every_five_minutes() {
        let schedule: CronSchedule = "*/5 * * * *".parse().unwrap();
        assert!(!schedule.has_seconds());
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 12, 3, 10)),
            Some(at(2024, 9, 2, 12, 5, 0))
        );
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 12, 5, 0)),
            Some(at(2024, 9, 2, 12, 10, 0))
        );
    }

    #[test]
    fn test_next_after_with_seconds() {
        let schedule: CronSchedule = "*/10 * * * * *".parse().unwrap();
        assert!(schedule.has_seconds());
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 12, 0, 1)),
            Some(at(2024, 9, 2, 12, 0, 10))
        );
    }

    #[test]
    fn test_next_after_daily() {
        let schedule: CronSchedule = "0 0 * * */1".parse().unwrap();
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 12, 0, 0)),
            Some(at(2024, 9, 3, 0, 0, 0))
        );
    }

    #[test]
    fn test_sunday_alias() {
        // 2024-09-02 is a Monday
        let schedule: CronSchedule = "0 0 * * 7".parse().unwrap();
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 0, 0, 0)),
            Some(at(2024, 9, 8, 0, 0, 0))
        );
    }

    #[test]
    fn test_restricted_day_fields_match_either() {
        // 2024-09-01 is a Sunday, the first Friday is the 6th
        let schedule: CronSchedule = "0 0 13 * FRI".parse().unwrap();
        assert_eq!(
            schedule.next_after(at(2024, 9, 1, 0, 0, 1)),
            Some(at(2024, 9, 6, 0, 0, 0))
        );
        assert_eq!(
            schedule.next_after(at(2024, 9, 6, 0, 0, 0)),
            Some(at(2024, 9, 13, 0, 0, 0))
        );
    }

    #[test]
    fn test_step_from_value() {
        let schedule: CronSchedule = "5/20 * * * *".parse().unwrap();
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 12, 6, 0)),
            Some(at(2024, 9, 2, 12, 25, 0))
        );
    }

    #[test]
    fn test_explicit_full_day_range_matches_either_day() {
        // 2024-09-02 is a Monday
        let schedule: CronSchedule = "0 0 1-31 * MON".parse().unwrap();
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 0, 0, 0)),
            Some(at(2024, 9, 3, 0, 0, 0))
        );
    }

    #[test]
    fn test_star_step_day_of_month_requires_both_days() {
        // odd days that are also Mondays: 2024-09-09 is the first after the 2nd
        let schedule: CronSchedule = "0 0 */2 * MON".parse().unwrap();
        assert_eq!(
            schedule.next_after(at(2024, 9, 2, 0, 0, 0)),
            Some(at(2024, 9, 9, 0, 0, 0))
        );
    }
}
