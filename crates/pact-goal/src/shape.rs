// shape.rs — Goal shape (weeks × sessions per week) and negotiation bounds.
//
// The giver may only widen a goal, never shrink it below the recipient's
// original ask, and never past the hard ceiling. When answering a
// suggestion the recipient may pull back toward the original ask, but must
// keep at least 30% of the increase the giver asked for.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::GoalError;

/// Hard ceiling on the number of weeks in a goal.
pub const MAX_TARGET_WEEKS: u32 = 5;

/// Hard ceiling on sessions per week.
pub const MAX_SESSIONS_PER_WEEK: u32 = 7;

/// Share of the suggested increase the recipient must keep, in tenths.
const ACCEPTANCE_FLOOR_TENTHS: u32 = 3;

/// A goal's shape: how many weeks, and how many sessions in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalShape {
    pub weeks: u32,
    pub sessions: u32,
}

impl GoalShape {
    pub fn new(weeks: u32, sessions: u32) -> Self {
        Self { weeks, sessions }
    }

    /// Validate raw caller input: both counts must be positive integers.
    pub fn from_input(weeks: i64, sessions: i64) -> Result<Self, GoalError> {
        Ok(Self {
            weeks: positive_count("weeks", weeks)?,
            sessions: positive_count("sessions", sessions)?,
        })
    }

    /// Total sessions needed to complete a goal of this shape.
    pub fn total_sessions(&self) -> u32 {
        self.weeks * self.sessions
    }
}

impl fmt::Display for GoalShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} weeks × {} sessions/week", self.weeks, self.sessions)
    }
}

/// Inclusive ranges a shape must fall within.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeBounds {
    pub weeks: RangeInclusive<u32>,
    pub sessions: RangeInclusive<u32>,
}

impl ShapeBounds {
    /// Any shape a recipient may initially ask for.
    pub fn for_proposal() -> Self {
        Self {
            weeks: 1..=MAX_TARGET_WEEKS,
            sessions: 1..=MAX_SESSIONS_PER_WEEK,
        }
    }

    /// What a giver may suggest: at least the original ask, at most the ceiling.
    pub fn for_suggestion(initial: GoalShape) -> Self {
        Self {
            weeks: initial.weeks..=MAX_TARGET_WEEKS,
            sessions: initial.sessions..=MAX_SESSIONS_PER_WEEK,
        }
    }

    /// What a recipient may answer with: from the 30% floor up to the
    /// suggestion (or the ceiling when nothing was suggested).
    pub fn for_response(initial: GoalShape, suggested: Option<GoalShape>) -> Self {
        let upper_weeks = suggested
            .map_or(MAX_TARGET_WEEKS, |s| s.weeks)
            .min(MAX_TARGET_WEEKS);
        let upper_sessions = suggested
            .map_or(MAX_SESSIONS_PER_WEEK, |s| s.sessions)
            .min(MAX_SESSIONS_PER_WEEK);
        Self {
            weeks: acceptance_floor(initial.weeks, upper_weeks)..=upper_weeks,
            sessions: acceptance_floor(initial.sessions, upper_sessions)..=upper_sessions,
        }
    }

    pub fn check(&self, shape: GoalShape) -> Result<(), GoalError> {
        check_range("weeks", shape.weeks, &self.weeks)?;
        check_range("sessions", shape.sessions, &self.sessions)
    }
}

fn check_range(
    field: &'static str,
    value: u32,
    range: &RangeInclusive<u32>,
) -> Result<(), GoalError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(GoalError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// `ceil(initial + 0.3 × (suggested − initial))`, in exact integer arithmetic.
///
/// Never below the original ask.
pub fn acceptance_floor(initial: u32, suggested: u32) -> u32 {
    if suggested <= initial {
        return initial;
    }
    let increase = suggested - initial;
    initial + (ACCEPTANCE_FLOOR_TENTHS * increase).div_ceil(10)
}

/// Validate a count supplied as a number.
pub fn positive_count(field: &'static str, value: i64) -> Result<u32, GoalError> {
    match u32::try_from(value) {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(GoalError::InvalidInput {
            field,
            value: value.to_string(),
        }),
    }
}

/// Validate a count supplied as text (CLI flags, form fields).
pub fn parse_count(field: &'static str, text: &str) -> Result<u32, GoalError> {
    let value = text.trim().parse::<i64>().map_err(|_| GoalError::InvalidInput {
        field,
        value: text.to_string(),
    })?;
    positive_count(field, value)
}
