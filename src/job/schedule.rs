use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule as CronSchedule;
use tracing::warn;

use crate::error::ScheduleParseError;

/// A validated, parsed schedule expression.
///
/// Parsed once at registration; the timer loop and status queries only ever ask it
/// for the next fire time. Accepted forms:
///
/// - 6-field cron with seconds (`sec min hour day-of-month month day-of-week`) or
///   7-field cron with a trailing year, as understood by the `cron` crate.
/// - Classic 5-field cron (`min hour day-of-month month day-of-week`); seconds default to `0`.
/// - Descriptors: `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`, `@midnight`, `@hourly`.
/// - `@every <duration>`, where the duration is a sequence of `<integer><unit>` groups
///   with units `ms`, `s`, `m` and `h` (e.g. `@every 90s`, `@every 1h30m`).
///
/// All cron times are interpreted in UTC. In 5-field expressions day-of-week numbers
/// are classic cron (0-6 = Sun-Sat, 7 is Sunday again). In 6/7-field expressions they
/// follow the `cron` crate (1-7 = Sun-Sat). Names (`Mon`, `Tue`, ...) work in both.
#[derive(Debug, Clone)]
pub struct Schedule {
  expression: String,
  kind: ScheduleKind,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
  Cron(Box<CronSchedule>),
  /// Fires every `interval` after the reference time.
  Interval(StdDuration),
}

impl Schedule {
  /// Parses a schedule expression. Equivalent to `expression.parse::<Schedule>()`.
  pub fn parse(expression: &str) -> Result<Self, ScheduleParseError> {
    expression.parse()
  }

  /// The expression this schedule was parsed from (trimmed).
  pub fn expression(&self) -> &str {
    &self.expression
  }

  /// The fixed interval for `@every` schedules, `None` for cron schedules.
  pub fn interval(&self) -> Option<StdDuration> {
    match &self.kind {
      ScheduleKind::Interval(interval) => Some(*interval),
      ScheduleKind::Cron(_) => None,
    }
  }

  /// Calculates the first fire time strictly after `from`.
  /// Returns `None` if the schedule has no further occurrences.
  pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match &self.kind {
      ScheduleKind::Cron(cron) => cron.after(&from).next(),
      ScheduleKind::Interval(interval) => match ChronoDuration::from_std(*interval) {
        Ok(step) => from.checked_add_signed(step),
        Err(e) => {
          warn!(expression = %self.expression, error = %e, "Failed to convert interval duration");
          None
        }
      },
    }
  }
}

impl FromStr for Schedule {
  type Err = ScheduleParseError;

  fn from_str(expression: &str) -> Result<Self, Self::Err> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
      return Err(ScheduleParseError::new(expression, "expression is empty"));
    }

    let kind = if let Some(rest) = trimmed.strip_prefix("@every") {
      let interval =
        parse_interval(rest.trim()).map_err(|reason| ScheduleParseError::new(expression, reason))?;
      ScheduleKind::Interval(interval)
    } else {
      let normalized =
        normalize_cron(trimmed).map_err(|reason| ScheduleParseError::new(expression, reason))?;
      let cron = CronSchedule::from_str(&normalized)
        .map_err(|e| ScheduleParseError::new(expression, e.to_string()))?;
      ScheduleKind::Cron(Box::new(cron))
    };

    Ok(Self {
      expression: trimmed.to_string(),
      kind,
    })
  }
}

impl fmt::Display for Schedule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.expression)
  }
}

/// Parses `schedule_expr` and returns its first fire time strictly after `from`.
///
/// Convenience for callers that only hold the textual form, e.g. to display a
/// "next run" column before a job is registered.
pub fn next_fire_time(
  schedule_expr: &str,
  from: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleParseError> {
  Ok(Schedule::parse(schedule_expr)?.next_after(from))
}

/// Rewrites descriptors and 5-field expressions into the 6/7-field form the `cron` crate expects.
fn normalize_cron(expression: &str) -> Result<String, String> {
  let expanded = match expression {
    "@yearly" | "@annually" => "0 0 0 1 1 *",
    "@monthly" => "0 0 0 1 * *",
    "@weekly" => "0 0 0 * * Sun",
    "@daily" | "@midnight" => "0 0 0 * * *",
    "@hourly" => "0 0 * * * *",
    other if other.starts_with('@') => return Err(format!("unknown descriptor '{other}'")),
    other => {
      return match other.split_whitespace().count() {
        5 => {
          let fields: Vec<&str> = other.split_whitespace().collect();
          let day_of_week = classic_day_of_week(fields[4])?;
          Ok(format!("0 {} {} {} {} {day_of_week}", fields[0], fields[1], fields[2], fields[3]))
        }
        6 | 7 => Ok(other.to_string()),
        n => Err(format!("expected 5, 6 or 7 fields, found {n}")),
      };
    }
  };
  Ok(expanded.to_string())
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Rewrites a classic day-of-week field (0-7, Sunday = 0 or 7) into day names.
///
/// Numeric elements, ranges and steps (`1`, `1-5`, `0-6/2`, `3/2`, `*/2`) are expanded
/// into an explicit name list. `*`, `?` and elements containing names are passed through
/// unchanged.
fn classic_day_of_week(field: &str) -> Result<String, String> {
  let mut days = BTreeSet::new();
  let mut passthrough = Vec::new();

  for element in field.split(',') {
    if element == "*" || element == "?" || element.chars().any(|c| c.is_ascii_alphabetic()) {
      passthrough.push(element.to_string());
      continue;
    }

    let (range, step) = match element.split_once('/') {
      Some((range, step)) => {
        let step: u8 = step
          .parse()
          .map_err(|_| format!("bad day-of-week step in '{element}'"))?;
        if step == 0 {
          return Err(format!("day-of-week step must be positive in '{element}'"));
        }
        (range, step)
      }
      None => (element, 1),
    };
    let (start, end) = match range.split_once('-') {
      _ if range == "*" => (0, 6),
      Some((start, end)) => (parse_day(start, element)?, parse_day(end, element)?),
      // `3/2` means "from 3 to the end of the week, every 2 days".
      None if step > 1 => (parse_day(range, element)?, 6),
      None => {
        let day = parse_day(range, element)?;
        (day, day)
      }
    };
    if start > end {
      return Err(format!("day-of-week range '{element}' runs backwards"));
    }
    for day in (start..=end).step_by(step as usize) {
      days.insert(day % 7);
    }
  }

  let mut elements: Vec<String> = days
    .into_iter()
    .map(|day| DAY_NAMES[usize::from(day)].to_string())
    .collect();
  elements.extend(passthrough);
  Ok(elements.join(","))
}

fn parse_day(text: &str, element: &str) -> Result<u8, String> {
  match text.parse::<u8>() {
    Ok(day) if day <= 7 => Ok(day),
    _ => Err(format!("day-of-week '{element}' is outside 0-7")),
  }
}

/// Parses the duration part of an `@every` expression.
fn parse_interval(text: &str) -> Result<StdDuration, String> {
  if text.is_empty() {
    return Err("`@every` needs a duration such as `30s`".to_string());
  }

  let mut total = StdDuration::ZERO;
  let mut rest = text;
  while !rest.is_empty() {
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits_end == 0 {
      return Err(format!("expected a number at '{rest}'"));
    }
    let digits = &rest[..digits_end];
    let value: u64 = digits
      .parse()
      .map_err(|e| format!("bad number '{digits}': {e}"))?;
    rest = &rest[digits_end..];

    let unit_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
    let unit = &rest[..unit_end];
    rest = &rest[unit_end..];

    let part = match unit {
      "ms" => StdDuration::from_millis(value),
      "s" => StdDuration::from_secs(value),
      "m" => StdDuration::from_secs(value.saturating_mul(60)),
      "h" => StdDuration::from_secs(value.saturating_mul(3600)),
      "" => return Err(format!("missing unit after '{value}'")),
      other => return Err(format!("unknown unit '{other}' (use ms, s, m or h)")),
    };
    total = total
      .checked_add(part)
      .ok_or_else(|| "duration overflows".to_string())?;
  }

  if total.is_zero() {
    Err("interval must be greater than zero".to_string())
  } else {
    Ok(total)
  }
}
