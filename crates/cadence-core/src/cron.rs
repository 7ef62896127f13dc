//! Cron expressions and schedule argument parsing.
//!
//! Schedules are stored as six-field expressions (`sec min hour dom month
//! dow`) evaluated in UTC. Five-field input gets a `0` seconds field
//! prepended. When both day-of-month and day-of-week are restricted, both
//! must match.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use croner::Cron;
use jiff::Timestamp;

use crate::error::{EngineError, Result};

const CRON_FIVE_FIELDS: usize = 5;
const CRON_SIX_FIELDS: usize = 6;
const WEEKDAY_NAMES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A validated, normalized cron expression.
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl CronSchedule {
    /// Parses a five- or six-field expression.
    pub fn parse(input: &str) -> Result<Self> {
        let expression = normalize_cron_expression(input)?;
        let cron = Cron::new(&expression)
            .with_seconds_required()
            .with_dom_and_dow()
            .parse()
            .map_err(|e| {
                EngineError::invalid_argument("cron_expression")
                    .with_reason(format!("Invalid cron expression '{expression}': {e}"))
            })?;

        Ok(Self { expression, cron })
    }

    /// The normalized six-field form.
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`, or `None` if the expression
    /// never fires again.
    pub fn next_after(&self, after: Timestamp) -> Option<Timestamp> {
        let start = DateTime::<Utc>::from_timestamp(
            after.as_second(),
            after.subsec_nanosecond().max(0) as u32,
        )?;
        let next = self.cron.find_next_occurrence(&start, false).ok()?;
        Timestamp::new(next.timestamp(), next.timestamp_subsec_nanos() as i32).ok()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Collapses whitespace and widens five-field expressions to six fields.
pub fn normalize_cron_expression(input: &str) -> Result<String> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    match parts.len() {
        0 => Err(EngineError::invalid_argument("cron_expression")
            .with_reason("Cron expression cannot be empty")),
        CRON_FIVE_FIELDS => Ok(format!("0 {}", parts.join(" "))),
        CRON_SIX_FIELDS => Ok(parts.join(" ")),
        n => Err(EngineError::invalid_argument("cron_expression")
            .with_reason(format!("expected 5 or 6 fields, got {n}"))),
    }
}

/// A wall-clock time in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(EngineError::invalid_argument("time")
                .with_reason("Hour must be 0..23 and minute 0..59"));
        }
        Ok(Self { hour, minute })
    }
}

impl FromStr for TimeOfDay {
    type Err = EngineError;

    /// Accepts `HH:mm` or `HHmm`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad_format =
            || EngineError::invalid_argument("time").with_reason("Use HH:mm or HHmm");

        let (hour, minute) = match s.split_once(':') {
            Some(parts) => parts,
            None if s.len() == 4 && s.is_ascii() => s.split_at(2),
            None => return Err(bad_format()),
        };
        let hour = hour.parse::<u8>().map_err(|_| bad_format())?;
        let minute = minute.parse::<u8>().map_err(|_| bad_format())?;
        Self::new(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Structured recurrence used by management surfaces instead of raw cron.
///
/// Days are numbered 1 (Monday) through 7 (Sunday).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleFrequency {
    Daily,
    Weekdays,
    Weekly(Vec<u8>),
    Custom(Vec<u8>),
}

impl ScheduleFrequency {
    /// Builds a frequency from its keyword and, for weekly/custom, a day list.
    pub fn from_parts(kind: &str, days: &[u8]) -> Result<Self> {
        match kind.trim().to_lowercase().as_str() {
            "daily" => Ok(ScheduleFrequency::Daily),
            "weekdays" => Ok(ScheduleFrequency::Weekdays),
            "weekly" => Ok(ScheduleFrequency::Weekly(days.to_vec())),
            "custom" => Ok(ScheduleFrequency::Custom(days.to_vec())),
            other => Err(EngineError::invalid_argument("frequency")
                .with_reason(format!("Unsupported frequency: {other}"))),
        }
    }

    pub fn is_keyword(word: &str) -> bool {
        matches!(
            word.to_lowercase().as_str(),
            "daily" | "weekdays" | "weekly" | "custom"
        )
    }

    /// Renders the six-field cron expression firing at `time` in UTC.
    pub fn to_cron(&self, time: TimeOfDay) -> Result<String> {
        let TimeOfDay { hour, minute } = time;
        match self {
            ScheduleFrequency::Daily => Ok(format!("0 {minute} {hour} * * *")),
            ScheduleFrequency::Weekdays => Ok(format!("0 {minute} {hour} * * MON-FRI")),
            ScheduleFrequency::Weekly(days) | ScheduleFrequency::Custom(days) => {
                let days = normalize_days(days)?;
                let names = days
                    .iter()
                    .map(|d| WEEKDAY_NAMES[usize::from(*d) - 1])
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(format!("0 {minute} {hour} * * {names}"))
            }
        }
    }
}

fn normalize_days(days: &[u8]) -> Result<BTreeSet<u8>> {
    if days.is_empty() {
        return Err(EngineError::invalid_argument("days")
            .with_reason("At least one weekday is required for weekly/custom frequency"));
    }
    days.iter()
        .map(|&day| {
            if (1..=7).contains(&day) {
                Ok(day)
            } else {
                Err(EngineError::invalid_argument("days")
                    .with_reason("Weekday must be between 1 and 7"))
            }
        })
        .collect()
}

/// Parses a comma-separated day list such as `1,3,5` or `mon,wed`.
pub fn parse_days(input: &str) -> Result<Vec<u8>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            if let Ok(n) = d.parse::<u8>() {
                return Ok(n);
            }
            WEEKDAY_NAMES
                .iter()
                .position(|name| name.eq_ignore_ascii_case(d))
                .map(|idx| idx as u8 + 1)
                .ok_or_else(|| {
                    EngineError::invalid_argument("days")
                        .with_reason(format!("Unknown weekday: {d}"))
                })
        })
        .collect()
}

fn parse_cron_words(words: &[&str]) -> Result<(CronSchedule, Option<i64>)> {
    let repeat = words.last().and_then(|w| w.parse::<i64>().ok());
    let head = &words[..words.len().saturating_sub(1)];

    if words.len() > CRON_SIX_FIELDS {
        return match repeat {
            Some(n) => Ok((CronSchedule::parse(&head.join(" "))?, Some(n))),
            None => Ok((CronSchedule::parse(&words.join(" "))?, None)),
        };
    }

    let whole = CronSchedule::parse(&words.join(" "));
    match (whole, repeat) {
        (Ok(schedule), _) => Ok((schedule, None)),
        (Err(e), Some(n)) if words.len() == CRON_SIX_FIELDS => {
            match CronSchedule::parse(&head.join(" ")) {
                Ok(schedule) => Ok((schedule, Some(n))),
                Err(_) => Err(e),
            }
        }
        (Err(e), _) => Err(e),
    }
}

/// A schedule request parsed from command words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    /// Normalized six-field expression
    pub cron_expression: String,
    /// `None` repeats forever
    pub max_executions: Option<u32>,
}

/// Parses the words following `schedule goal|task <id>`.
///
/// Two forms are accepted:
///
/// - `<cron fields...> [repeat]`: seven words always end in a repeat count.
///   Six words are read as a six-field expression first, and as five fields
///   plus a repeat count only when that reading fails
/// - `<daily|weekdays|weekly|custom> [days] <time> [repeat]`
pub fn parse_schedule_args(args: &[&str]) -> Result<ScheduleSpec> {
    let Some(first) = args.first() else {
        return Err(EngineError::invalid_argument("cron_expression")
            .with_reason("Cron expression cannot be empty"));
    };

    let (cron_expression, repeat) = if ScheduleFrequency::is_keyword(first) {
        parse_frequency_args(first, &args[1..])?
    } else {
        let (schedule, repeat) = parse_cron_words(args)?;
        (schedule.as_str().to_string(), repeat)
    };

    Ok(ScheduleSpec {
        cron_expression,
        max_executions: repeat.map(validate_repeat).transpose()?,
    })
}

fn parse_frequency_args(kind: &str, rest: &[&str]) -> Result<(String, Option<i64>)> {
    let needs_days = matches!(kind.to_lowercase().as_str(), "weekly" | "custom");
    let mut rest = rest.iter();

    let days = if needs_days {
        let list = rest.next().ok_or_else(|| {
            EngineError::invalid_argument("days")
                .with_reason("At least one weekday is required for weekly/custom frequency")
        })?;
        parse_days(list)?
    } else {
        Vec::new()
    };

    let time = rest
        .next()
        .ok_or_else(|| EngineError::invalid_argument("time").with_reason("time is required"))?
        .parse::<TimeOfDay>()?;

    let repeat = match rest.next() {
        Some(word) => Some(word.parse::<i64>().map_err(|_| {
            EngineError::invalid_argument("repeat")
                .with_reason(format!("Repeat count must be a number, got '{word}'"))
        })?),
        None => None,
    };
    if let Some(extra) = rest.next() {
        return Err(EngineError::invalid_argument("schedule")
            .with_reason(format!("Unexpected argument '{extra}'")));
    }

    let cron = ScheduleFrequency::from_parts(kind, &days)?.to_cron(time)?;
    CronSchedule::parse(&cron)?;
    Ok((cron, repeat))
}

fn validate_repeat(value: i64) -> Result<u32> {
    if value <= 0 {
        return Err(EngineError::invalid_argument("max_executions")
            .with_reason("Repeat count must be at least 1"));
    }
    u32::try_from(value).map_err(|_| {
        EngineError::invalid_argument("max_executions").with_reason("Repeat count is too large")
    })
}
