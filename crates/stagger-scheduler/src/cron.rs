//! Standard 5-field crontab expressions on top of the `cron` crate.
//!
//! The `cron` crate wants a leading seconds field and numbers days of the week
//! 1-7 starting at Sunday, while crontab numbers them 0-7 with both 0 and 7
//! meaning Sunday. [`CronSpec::parse`] accepts the crontab form, pins seconds
//! to 0 and rewrites numeric day-of-week items into the crate's numbering.
//!
//! Expressions are read in a [`ScheduleZone`], UTC unless configured
//! otherwise. Fire times are always reported in UTC. When both day-of-month
//! and day-of-week are restricted, a time must match both (the `cron`
//! crate's rule), not either.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};

/// Shorthands passed through to the `cron` crate untouched.
const SHORTHANDS: &[&str] = &["@yearly", "@monthly", "@weekly", "@daily", "@hourly"];

/// Wall clock that cron fields are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleZone {
    #[default]
    Utc,
    /// The host's local zone, DST changes included.
    Local,
    Fixed(FixedOffset),
    /// An IANA zone such as `Europe/Paris`.
    Named(Tz),
}

impl FromStr for ScheduleZone {
    type Err = SchedulerError;

    /// Accepts `UTC`, `local`, an offset like `+05:30` / `-08:00`, or an
    /// IANA zone name.
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(Self::Utc);
        }
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if let Some(offset) = parse_offset(trimmed) {
            return Ok(Self::Fixed(offset));
        }
        trimmed.parse::<Tz>().map(Self::Named).map_err(|_| {
            SchedulerError::InvalidInput(format!(
                "unknown timezone {raw:?} (expected UTC, local, +HH:MM or an IANA name)"
            ))
        })
    }
}

impl fmt::Display for ScheduleZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => f.write_str("UTC"),
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// A validated, recurring cron schedule.
#[derive(Debug, Clone)]
pub struct CronSpec {
    /// The expression as the caller wrote it (trimmed).
    expression: String,
    schedule: cron::Schedule,
    zone: ScheduleZone,
}

impl CronSpec {
    /// Parse a 5-field crontab expression (`min hour dom month dow`) or one of
    /// the `@hourly`-style shorthands.
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let invalid = |reason: String| SchedulerError::InvalidCronSchedule {
            expression: expression.to_string(),
            reason,
        };

        let normalized = if trimmed.starts_with('@') {
            if !SHORTHANDS.contains(&trimmed) {
                return Err(invalid(format!("unknown shorthand {trimmed}")));
            }
            trimmed.to_string()
        } else {
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 5 {
                return Err(invalid(format!("expected 5 fields, got {}", fields.len())));
            }
            let day_of_week = translate_day_of_week(fields[4]).map_err(invalid)?;
            format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], day_of_week
            )
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))?;
        // An expression like "0 0 31 2 *" parses but can never fire.
        if schedule.upcoming(Utc).next().is_none() {
            return Err(invalid("schedule never fires".to_string()));
        }

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
            zone: ScheduleZone::Utc,
        })
    }

    /// Read the fields in `zone` instead of UTC.
    pub fn in_zone(mut self, zone: ScheduleZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn zone(&self) -> ScheduleZone {
        self.zone
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.zone {
            ScheduleZone::Utc => self.schedule.after(after).next(),
            ScheduleZone::Local => self
                .schedule
                .after(&after.with_timezone(&Local))
                .next()
                .map(|t| t.with_timezone(&Utc)),
            ScheduleZone::Fixed(offset) => self
                .schedule
                .after(&after.with_timezone(&offset))
                .next()
                .map(|t| t.with_timezone(&Utc)),
            ScheduleZone::Named(tz) => self
                .schedule
                .after(&after.with_timezone(&tz))
                .next()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Rewrite a crontab day-of-week field into the `cron` crate's numbering.
///
/// Numeric items (single values, ranges, steps) are expanded to an explicit
/// list so wrap-around cases like `5-7` keep their meaning. Named items
/// (`MON-FRI`) and a bare `*` are left alone.
fn translate_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut out: Vec<String> = Vec::new();
    let mut days: Vec<u8> = Vec::new();

    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            out.push(item.to_string());
            continue;
        }

        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u8 = step
                    .parse()
                    .map_err(|_| format!("bad day-of-week step in {item:?}"))?;
                if step == 0 {
                    return Err(format!("zero day-of-week step in {item:?}"));
                }
                (base, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if base == "*" {
            (0, 6)
        } else if let Some((lo, hi)) = base.split_once('-') {
            let (lo, hi) = (parse_day(lo)?, parse_day(hi)?);
            if lo > hi {
                return Err(format!("day-of-week range {base:?} runs backwards"));
            }
            (lo, hi)
        } else {
            let day = parse_day(base)?;
            // crontab reads "3/2" as "3-6/2"
            (day, if step.is_some() { 6 } else { day })
        };

        let step = step.unwrap_or(1) as usize;
        days.extend((start..=end).step_by(step).map(|d| d % 7 + 1));
    }

    days.sort_unstable();
    days.dedup();
    out.extend(days.into_iter().map(|d| d.to_string()));

    if out.is_empty() {
        return Err("empty day-of-week field".to_string());
    }
    Ok(out.join(","))
}

fn parse_day(raw: &str) -> std::result::Result<u8, String> {
    match raw.parse::<u8>() {
        Ok(d) if d <= 7 => Ok(d),
        _ => Err(format!("day of week out of range: {raw:?}")),
    }
}
