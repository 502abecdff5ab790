// goal.rs — Goal: a recipient's session commitment and its negotiation state.
//
// The negotiation state machine:
//   Pending → Approved                 (giver approves, or the deadline passes)
//   Pending → Suggested → Accepted     (giver widens, recipient settles)
//
// Approved and Accepted both resolve the negotiation; only then does
// session tracking advance the goal toward completion.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GoalError;
use crate::shape::{GoalShape, ShapeBounds};

/// Where a goal stands in the approval negotiation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Recipient has proposed a shape; waiting on the giver.
    Pending,

    /// Giver approved the original ask (explicitly or by deadline).
    Approved,

    /// Giver proposed a wider shape; waiting on the recipient.
    Suggested,

    /// Recipient settled on a shape within the suggestion's bounds.
    Accepted,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Suggested => "suggested",
            ApprovalStatus::Accepted => "accepted",
        }
    }

    /// Whether the negotiation is over and sessions may be tracked.
    pub fn is_resolved(&self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Accepted)
    }

    /// Check whether moving from this status to `next` is legal.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Pending, ApprovalStatus::Suggested)
                | (ApprovalStatus::Suggested, ApprovalStatus::Accepted)
        )
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the goal's hint history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hint {
    pub session: u32,
    pub date: DateTime<Utc>,
    pub hint: String,
}

/// Input for proposing a new goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    /// Recipient.
    pub user_id: String,
    /// Giver.
    pub empowered_by: String,
    #[serde(default)]
    pub title: String,
    pub weeks: i64,
    pub sessions: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_gift_id: Option<String>,
}

/// Outcome of recording one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTick {
    /// This session filled the week.
    pub week_completed: bool,
    /// This session completed the whole goal.
    pub goal_completed: bool,
}

/// A goal as stored in the `goals` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: String,

    /// Recipient: performs the sessions and owns progress.
    pub user_id: String,

    /// Giver: funded the reward and holds approval rights.
    pub empowered_by: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_gift_id: Option<String>,

    /// The recipient's original ask. Never changes.
    pub initial_target_count: u32,
    pub initial_sessions_per_week: u32,

    /// Present only while a suggestion is outstanding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_target_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_sessions_per_week: Option<u32>,

    /// Effective shape governing progress.
    pub target_count: u32,
    pub sessions_per_week: u32,

    /// Completed weeks.
    #[serde(default)]
    pub current_count: u32,

    /// Sessions completed in the current week.
    #[serde(default)]
    pub weekly_count: u32,

    #[serde(default)]
    pub is_completed: bool,

    pub approval_status: ApprovalStatus,
    pub approval_deadline: DateTime<Utc>,

    /// Set the moment the giver acts; suppresses auto-approval.
    #[serde(default)]
    pub giver_action_taken: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub giver_message: Option<String>,

    /// Append-only; never rewritten by the lifecycle engine.
    #[serde(default)]
    pub hints: Vec<Hint>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Build a pending goal from a proposal. The id is left empty for the
    /// store to assign.
    pub fn propose(new: NewGoal, approval_deadline: DateTime<Utc>) -> Result<Self, GoalError> {
        let initial = GoalShape::from_input(new.weeks, new.sessions)?;
        ShapeBounds::for_proposal().check(initial)?;

        let now = Utc::now();
        Ok(Self {
            id: String::new(),
            user_id: new.user_id,
            empowered_by: new.empowered_by,
            title: new.title,
            experience_gift_id: new.experience_gift_id,
            initial_target_count: initial.weeks,
            initial_sessions_per_week: initial.sessions,
            suggested_target_count: None,
            suggested_sessions_per_week: None,
            target_count: initial.weeks,
            sessions_per_week: initial.sessions,
            current_count: 0,
            weekly_count: 0,
            is_completed: false,
            approval_status: ApprovalStatus::Pending,
            approval_deadline,
            giver_action_taken: false,
            giver_message: None,
            hints: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn initial_shape(&self) -> GoalShape {
        GoalShape::new(self.initial_target_count, self.initial_sessions_per_week)
    }

    pub fn effective_shape(&self) -> GoalShape {
        GoalShape::new(self.target_count, self.sessions_per_week)
    }

    /// The outstanding suggestion, if both halves are present.
    pub fn suggestion(&self) -> Option<GoalShape> {
        match (self.suggested_target_count, self.suggested_sessions_per_week) {
            (Some(weeks), Some(sessions)) => Some(GoalShape::new(weeks, sessions)),
            _ => None,
        }
    }

    pub fn latest_hint(&self) -> Option<&Hint> {
        self.hints.iter().max_by_key(|h| (h.session, h.date))
    }

    /// Pending, untouched by the giver, and at or past the deadline.
    pub fn is_auto_approval_due(&self, now: DateTime<Utc>) -> bool {
        self.approval_status == ApprovalStatus::Pending
            && !self.giver_action_taken
            && now >= self.approval_deadline
    }

    fn transition(
        &mut self,
        next: ApprovalStatus,
        operation: &'static str,
    ) -> Result<(), GoalError> {
        if !self.approval_status.can_transition_to(next) {
            return Err(self.invalid_state(operation));
        }
        self.approval_status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn invalid_state(&self, operation: &'static str) -> GoalError {
        let status = if self.is_completed {
            "completed".to_string()
        } else {
            self.approval_status.to_string()
        };
        GoalError::InvalidState {
            goal_id: self.id.clone(),
            status,
            operation,
        }
    }

    /// Giver approves the original ask.
    pub fn approve(&mut self, message: Option<&str>) -> Result<(), GoalError> {
        self.auto_approve()?;
        self.giver_action_taken = true;
        if let Some(message) = message {
            self.giver_message = Some(message.to_string());
        }
        Ok(())
    }

    /// Deadline approval of the original ask. `giver_action_taken` stays
    /// false: the giver never answered.
    pub fn auto_approve(&mut self) -> Result<(), GoalError> {
        self.transition(ApprovalStatus::Approved, "approve")?;
        self.target_count = self.initial_target_count;
        self.sessions_per_week = self.initial_sessions_per_week;
        Ok(())
    }

    /// Giver proposes a wider shape.
    pub fn suggest(&mut self, shape: GoalShape, message: Option<&str>) -> Result<(), GoalError> {
        if self.approval_status != ApprovalStatus::Pending {
            return Err(self.invalid_state("suggest a change to"));
        }
        ShapeBounds::for_suggestion(self.initial_shape()).check(shape)?;

        self.transition(ApprovalStatus::Suggested, "suggest a change to")?;
        self.giver_action_taken = true;
        self.suggested_target_count = Some(shape.weeks);
        self.suggested_sessions_per_week = Some(shape.sessions);
        self.giver_message = message.map(str::to_string);
        Ok(())
    }

    /// Recipient settles on a shape within the response bounds.
    pub fn accept(&mut self, shape: GoalShape) -> Result<(), GoalError> {
        if self.approval_status != ApprovalStatus::Suggested {
            return Err(self.invalid_state("respond to a suggestion for"));
        }
        ShapeBounds::for_response(self.initial_shape(), self.suggestion()).check(shape)?;

        self.transition(ApprovalStatus::Accepted, "respond to a suggestion for")?;
        self.target_count = shape.weeks;
        self.sessions_per_week = shape.sessions;
        self.suggested_target_count = None;
        self.suggested_sessions_per_week = None;
        Ok(())
    }

    /// Count one completed session.
    pub fn record_session(&mut self) -> Result<SessionTick, GoalError> {
        if self.is_completed || !self.approval_status.is_resolved() {
            return Err(self.invalid_state("record a session for"));
        }

        let mut tick = SessionTick {
            week_completed: false,
            goal_completed: false,
        };
        self.weekly_count += 1;
        if self.weekly_count >= self.sessions_per_week {
            self.weekly_count = 0;
            self.current_count += 1;
            tick.week_completed = true;
            if self.current_count >= self.target_count {
                self.is_completed = true;
                tick.goal_completed = true;
            }
        }
        self.updated_at = Utc::now();
        Ok(tick)
    }

    /// Describe every data-model invariant this goal breaks.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.weekly_count > self.sessions_per_week {
            violations.push("weeklyCount exceeds sessionsPerWeek".to_string());
        }
        if self.current_count > self.target_count {
            violations.push("currentCount exceeds targetCount".to_string());
        }
        if self.target_count < self.initial_target_count
            || self.sessions_per_week < self.initial_sessions_per_week
        {
            violations.push("effective shape is below the original ask".to_string());
        }
        if self.approval_status.is_resolved()
            && (self.target_count > crate::shape::MAX_TARGET_WEEKS
                || self.sessions_per_week > crate::shape::MAX_SESSIONS_PER_WEEK)
        {
            violations.push("effective shape exceeds the ceiling".to_string());
        }
        if self.is_completed && self.current_count < self.target_count {
            violations.push("completed before reaching targetCount".to_string());
        }
        if self.suggested_target_count.is_some() != self.suggested_sessions_per_week.is_some() {
            violations.push("suggestion is half-present".to_string());
        }
        violations
    }
}
