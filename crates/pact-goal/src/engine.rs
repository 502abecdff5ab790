// engine.rs — GoalEngine: persists goal transitions through the document store.
//
// Every transition follows the same shape: read the goal, apply the pure
// transition from goal.rs to a local copy, then write only the changed
// fields with a conditional update guarded on the status (or counters) the
// transition was computed from. A guard miss means another client moved the
// goal first: explicit actions report InvalidState, auto-approval is a
// silent no-op, and session ticks re-read and try again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pact_store::{from_document, to_document, Document, DocumentStore, Filter, OrderBy};
use serde_json::Value;

use crate::error::GoalError;
use crate::events::{EventDispatcher, GoalEvent};
use crate::goal::{ApprovalStatus, Goal, NewGoal};
use crate::shape::GoalShape;

/// Collection holding goal documents.
pub const GOALS: &str = "goals";

const DEFAULT_APPROVAL_WINDOW_HOURS: i64 = 72;
const MAX_TICK_ATTEMPTS: usize = 3;

const APPROVAL_FIELDS: &[&str] = &[
    "approvalStatus",
    "giverActionTaken",
    "targetCount",
    "sessionsPerWeek",
    "giverMessage",
    "updatedAt",
];
const SUGGESTION_FIELDS: &[&str] = &[
    "approvalStatus",
    "giverActionTaken",
    "suggestedTargetCount",
    "suggestedSessionsPerWeek",
    "giverMessage",
    "updatedAt",
];
const RESPONSE_FIELDS: &[&str] = &[
    "approvalStatus",
    "targetCount",
    "sessionsPerWeek",
    "suggestedTargetCount",
    "suggestedSessionsPerWeek",
    "updatedAt",
];
const PROGRESS_FIELDS: &[&str] = &["weeklyCount", "currentCount", "isCompleted", "updatedAt"];

/// Owns the goal state machine on top of a shared document store.
pub struct GoalEngine {
    store: Arc<dyn DocumentStore>,
    events: Arc<EventDispatcher>,
    approval_window: Duration,
}

impl GoalEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            events: Arc::new(EventDispatcher::new()),
            approval_window: Duration::hours(DEFAULT_APPROVAL_WINDOW_HOURS),
        }
    }

    /// How long the giver has before a pending goal auto-approves.
    pub fn with_approval_window(mut self, window: Duration) -> Self {
        self.approval_window = window;
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn approval_window(&self) -> Duration {
        self.approval_window
    }

    /// Store a new pending goal. The store assigns its id.
    pub async fn create_goal(&self, new: NewGoal) -> Result<Goal, GoalError> {
        let now = Utc::now();
        let deadline = now
            .checked_add_signed(self.approval_window)
            .ok_or_else(|| GoalError::InvalidInput {
                field: "approval window",
                value: format!("{} hours", self.approval_window.num_hours()),
            })?;
        let mut goal = Goal::propose(new, deadline)?;
        let mut doc = to_document(&goal)?;
        doc.remove("id");
        goal.id = self.store.insert(GOALS, doc).await?;

        tracing::info!(
            goal_id = %goal.id,
            recipient = %goal.user_id,
            giver = %goal.empowered_by,
            "goal proposed: {}",
            goal.initial_shape()
        );
        self.events.dispatch(&GoalEvent::goal_created(&goal));
        Ok(goal)
    }

    pub async fn get_goal(&self, goal_id: &str) -> Result<Goal, GoalError> {
        let doc = self
            .store
            .get(GOALS, goal_id)
            .await?
            .ok_or_else(|| GoalError::NotFound(goal_id.to_string()))?;
        Ok(from_document(doc)?)
    }

    /// Goals the user is working toward, newest first.
    pub async fn goals_for_recipient(&self, user_id: &str) -> Result<Vec<Goal>, GoalError> {
        self.find(Filter::new().eq("userId", user_id)).await
    }

    /// Goals the user funded, newest first.
    pub async fn goals_for_giver(&self, user_id: &str) -> Result<Vec<Goal>, GoalError> {
        self.find(Filter::new().eq("empoweredBy", user_id)).await
    }

    /// Goals still waiting on the giver.
    pub async fn pending_goals(&self) -> Result<Vec<Goal>, GoalError> {
        self.find(Filter::new().eq("approvalStatus", ApprovalStatus::Pending.as_str()))
            .await
    }

    pub async fn all_goals(&self) -> Result<Vec<Goal>, GoalError> {
        self.find(Filter::new()).await
    }

    async fn find(&self, filter: Filter) -> Result<Vec<Goal>, GoalError> {
        let docs = self
            .store
            .query(GOALS, &filter, Some(&OrderBy::desc("createdAt")))
            .await?;
        let mut goals = Vec::with_capacity(docs.len());
        for doc in docs {
            match from_document::<Goal>(doc) {
                Ok(goal) => goals.push(goal),
                Err(e) => tracing::warn!("skipping unreadable goal document: {}", e),
            }
        }
        Ok(goals)
    }

    /// Giver approves the recipient's original ask.
    pub async fn approve_goal(
        &self,
        goal_id: &str,
        message: Option<&str>,
    ) -> Result<Goal, GoalError> {
        let mut goal = self.get_goal(goal_id).await?;
        let from = goal.approval_status;
        goal.approve(message)?;

        self.commit_transition(&goal, from, APPROVAL_FIELDS, "approve")
            .await?;
        tracing::info!(goal_id, "goal approved: {}", goal.effective_shape());
        self.events
            .dispatch(&GoalEvent::goal_approved(&goal, false, message));
        Ok(goal)
    }

    /// Giver proposes a wider shape; the recipient must answer it.
    pub async fn suggest_goal_change(
        &self,
        goal_id: &str,
        weeks: i64,
        sessions: i64,
        message: Option<&str>,
    ) -> Result<Goal, GoalError> {
        let shape = GoalShape::from_input(weeks, sessions)?;
        let mut goal = self.get_goal(goal_id).await?;
        let from = goal.approval_status;
        goal.suggest(shape, message)?;

        self.commit_transition(&goal, from, SUGGESTION_FIELDS, "suggest a change to")
            .await?;
        tracing::info!(goal_id, "goal change suggested: {}", shape);
        self.events
            .dispatch(&GoalEvent::goal_suggested(&goal, shape, message));
        Ok(goal)
    }

    /// Recipient settles on a shape between the 30% floor and the suggestion.
    pub async fn respond_to_goal_suggestion(
        &self,
        goal_id: &str,
        weeks: i64,
        sessions: i64,
        message: Option<&str>,
    ) -> Result<Goal, GoalError> {
        let shape = GoalShape::from_input(weeks, sessions)?;
        let mut goal = self.get_goal(goal_id).await?;
        let from = goal.approval_status;
        goal.accept(shape)?;

        self.commit_transition(&goal, from, RESPONSE_FIELDS, "respond to a suggestion for")
            .await?;
        tracing::info!(goal_id, "goal suggestion accepted: {}", shape);
        self.events
            .dispatch(&GoalEvent::suggestion_resolved(&goal, message));
        Ok(goal)
    }

    /// Auto-approve a pending goal whose deadline has passed.
    ///
    /// Returns `Ok(Some(goal))` only for the caller whose write performed
    /// the transition. Every other outcome (not due yet, already resolved,
    /// lost the race) is `Ok(None)`.
    pub async fn check_and_auto_approve(&self, goal_id: &str) -> Result<Option<Goal>, GoalError> {
        self.check_and_auto_approve_at(goal_id, Utc::now()).await
    }

    pub async fn check_and_auto_approve_at(
        &self,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Goal>, GoalError> {
        let mut goal = self.get_goal(goal_id).await?;
        if !goal.is_auto_approval_due(now) {
            return Ok(None);
        }
        goal.auto_approve()?;

        let guard = Filter::new()
            .eq("approvalStatus", ApprovalStatus::Pending.as_str())
            .eq("giverActionTaken", false);
        let fields = pick(&goal, APPROVAL_FIELDS)?;
        if !self.store.update_if(GOALS, goal_id, &guard, fields).await? {
            tracing::debug!(goal_id, "auto-approval lost the race, nothing to do");
            return Ok(None);
        }

        tracing::info!(goal_id, "goal auto-approved after deadline {}", goal.approval_deadline);
        self.events
            .dispatch(&GoalEvent::goal_approved(&goal, true, None));
        Ok(Some(goal))
    }

    /// Count one session toward a resolved goal.
    ///
    /// The returned goal has `is_completed` set if this call completed it;
    /// a goal that was already complete is rejected with `InvalidState`.
    pub async fn tick_weekly_session(&self, goal_id: &str) -> Result<Goal, GoalError> {
        for attempt in 1..=MAX_TICK_ATTEMPTS {
            let mut goal = self.get_goal(goal_id).await?;
            let guard = Filter::new()
                .eq("weeklyCount", goal.weekly_count)
                .eq("currentCount", goal.current_count)
                .eq("isCompleted", false);
            let tick = goal.record_session()?;

            let fields = pick(&goal, PROGRESS_FIELDS)?;
            if !self.store.update_if(GOALS, goal_id, &guard, fields).await? {
                tracing::debug!(goal_id, attempt, "session tick contended, retrying");
                continue;
            }

            tracing::info!(
                goal_id,
                week = goal.current_count,
                session = goal.weekly_count,
                "session recorded"
            );
            self.events.dispatch(&GoalEvent::session_ticked(&goal));
            if tick.goal_completed {
                tracing::info!(goal_id, "goal completed");
                self.events.dispatch(&GoalEvent::goal_completed(&goal));
            }
            return Ok(goal);
        }

        Err(GoalError::StoreUnavailable(format!(
            "session tick for goal {} kept conflicting with other writers",
            goal_id
        )))
    }

    async fn commit_transition(
        &self,
        goal: &Goal,
        from: ApprovalStatus,
        fields: &[&str],
        operation: &'static str,
    ) -> Result<(), GoalError> {
        let guard = Filter::new().eq("approvalStatus", from.as_str());
        let fields = pick(goal, fields)?;
        if self.store.update_if(GOALS, &goal.id, &guard, fields).await? {
            return Ok(());
        }
        // Someone else moved the goal between our read and write.
        let current = self.get_goal(&goal.id).await?;
        Err(current.invalid_state(operation))
    }
}

// Serialize the whole goal and keep the listed fields. Fields the goal
// omits (cleared options) become null, which the store treats as removal.
fn pick(goal: &Goal, keys: &[&str]) -> Result<Document, GoalError> {
    let full = to_document(goal)?;
    Ok(keys
        .iter()
        .map(|key| (key.to_string(), full.get(*key).cloned().unwrap_or(Value::Null)))
        .collect())
}
