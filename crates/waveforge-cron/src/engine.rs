//! Cron Engine: accepts both 5-field (`m h dom mon dow`) and 6-field
//! (`s m h dom mon dow`) cron expressions, computes the next occurrence strictly after
//! a given instant, and renders a short humanization for common patterns.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::ScheduleError;

/// A compiled, validated cron expression. Cheap to clone; the underlying `cron::Schedule`
/// is reference-counted internally.
#[derive(Debug, Clone)]
pub struct CronExpression {
    original: String,
    schedule: Schedule,
}

impl CronExpression {
    /// Parses `expression`, normalizing a bare 5-field expression into the 6-field
    /// (seconds-first) form the `cron` crate expects by prepending `"0 "`.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let normalized = normalize(expression);
        let schedule = Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { original: expression.to_string(), schedule })
    }

    /// `true` iff `expression` parses; never raises.
    pub fn is_valid(expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    /// The next occurrence strictly after `from`, in UTC. Bounded at 4 years out so a
    /// pattern like `0 0 30 2 *` (Feb 30th, never occurs) returns `None` instead of
    /// the underlying iterator spinning indefinitely.
    pub fn next_occurrence(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = from + chrono::Duration::days(4 * 365);
        let candidate = self.schedule.after(&from).next()?;
        if candidate > horizon {
            None
        } else {
            Some(candidate)
        }
    }

    /// A short humanization for common patterns; unrecognized patterns fall back to
    /// `"Cron: <expr>"`.
    pub fn describe(&self) -> String {
        describe(&self.original)
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Checks that the expression has at least one occurrence within the search
    /// horizon, returning `ScheduleError::UnreachableCron` otherwise. Intended for
    /// validating a schedule at creation time, before it's persisted.
    pub fn ensure_reachable(&self, from: DateTime<Utc>) -> Result<(), ScheduleError> {
        if self.next_occurrence(from).is_some() {
            Ok(())
        } else {
            Err(ScheduleError::UnreachableCron { expression: self.original.clone() })
        }
    }
}

fn normalize(expression: &str) -> String {
    let field_count = expression.split_whitespace().count();
    if field_count == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

fn describe(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.as_slice() {
        ["*", "*", "*", "*", "*"] => "every minute".to_string(),
        ["0", "*", "*", "*", "*"] => "every hour".to_string(),
        ["0", "0", "*", "*", "*"] => "every day at midnight".to_string(),
        ["0", "0", "*", "*", "0"] => "every Sunday at midnight".to_string(),
        ["0", "0", "*", "*", "1"] => "every Monday at midnight".to_string(),
        ["0", "0", "1", "*", "*"] => "first day of every month".to_string(),
        ["*", "*", "*", "*", "*", "*"] => "every second".to_string(),
        [minute, hour, "*", "*", "*"] => match (minute.parse::<u32>(), hour.parse::<u32>()) {
            (Ok(m), Ok(h)) if h == 0 => format!("every day at 12:{m:02} AM"),
            (Ok(m), Ok(h)) if h == 12 => format!("every day at 12:{m:02} PM"),
            (Ok(m), Ok(h)) if h > 12 => format!("every day at {}:{:02} PM", h - 12, m),
            (Ok(m), Ok(h)) => format!("every day at {h}:{m:02} AM"),
            _ => format!("Cron: {expression}"),
        },
        _ => format!("Cron: {expression}"),
    }
}
