// negotiator.rs — Runs each actor action as goal write, then side steps.
//
// The goal write is the only step allowed to fail an action. Counterparty
// notifications, retirement of the prompting notification, and the actor's
// confirmation are best-effort and reported through `Outcome`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pact_goal::{Goal, GoalEngine, NewGoal};
use pact_notify::{
    NewNotification, NotificationData, NotificationExchange, NotificationKind, RetireTarget,
};

use crate::error::NegotiationError;
use crate::names::{display_name, NameResolver};

/// A best-effort step that did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideStep {
    NotifyCounterparty,
    ConfirmActor,
}

impl fmt::Display for SideStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideStep::NotifyCounterparty => f.write_str("notify counterparty"),
            SideStep::ConfirmActor => f.write_str("confirm to actor"),
        }
    }
}

/// Result of an action whose goal write succeeded.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub goal: Goal,
    pub failed_steps: Vec<SideStep>,
}

impl Outcome {
    fn new(goal: Goal) -> Self {
        Self {
            goal,
            failed_steps: Vec::new(),
        }
    }

    /// A side step failed; the caller should show a generic retry prompt.
    /// The goal itself is already in its new state.
    pub fn needs_retry(&self) -> bool {
        !self.failed_steps.is_empty()
    }
}

pub struct Negotiator {
    goals: Arc<GoalEngine>,
    notifications: Arc<NotificationExchange>,
    names: Arc<dyn NameResolver>,
}

impl Negotiator {
    pub fn new(
        goals: Arc<GoalEngine>,
        notifications: Arc<NotificationExchange>,
        names: Arc<dyn NameResolver>,
    ) -> Self {
        Self {
            goals,
            notifications,
            names,
        }
    }

    pub fn goals(&self) -> &GoalEngine {
        &self.goals
    }

    pub fn notifications(&self) -> &NotificationExchange {
        &self.notifications
    }

    /// Recipient proposes a goal; the giver is asked to approve it.
    pub async fn propose_goal(&self, new: NewGoal) -> Result<Outcome, NegotiationError> {
        let goal = self.goals.create_goal(new).await?;
        let mut outcome = Outcome::new(goal);
        let goal = &outcome.goal;

        let recipient = display_name(self.names.as_ref(), &goal.user_id).await;
        let shape = goal.initial_shape();
        let request = NewNotification::new(
            &goal.empowered_by,
            NotificationKind::GoalApprovalRequest,
            "Goal approval requested",
            format!("{} wants to commit to {}", recipient, shape),
        )
        .with_data(
            NotificationData::for_goal(&goal.id)
                .from_user(&goal.user_id, &recipient)
                .with_shape(shape.weeks, shape.sessions),
        );
        self.send(SideStep::NotifyCounterparty, request, &mut outcome.failed_steps)
            .await;

        let goal = &outcome.goal;
        let confirmation = NewNotification::new(
            &goal.user_id,
            NotificationKind::ActionConfirmed,
            "Goal sent",
            format!(
                "Your goal was sent for approval. It approves itself on {} if nobody answers.",
                goal.approval_deadline.format("%Y-%m-%d %H:%M UTC")
            ),
        )
        .with_data(NotificationData::for_goal(&goal.id));
        self.send(SideStep::ConfirmActor, confirmation, &mut outcome.failed_steps)
            .await;

        Ok(outcome)
    }

    /// Giver approves the original ask.
    pub async fn approve_goal(
        &self,
        goal_id: &str,
        message: Option<&str>,
        prompt_id: Option<String>,
    ) -> Result<Outcome, NegotiationError> {
        let goal = self.goals.approve_goal(goal_id, message).await?;
        let mut outcome = Outcome::new(goal);
        let goal = &outcome.goal;

        let giver = display_name(self.names.as_ref(), &goal.empowered_by).await;
        let shape = goal.effective_shape();
        let approved = NewNotification::new(
            &goal.user_id,
            NotificationKind::GoalApproved,
            "Goal approved",
            format!("{} approved your goal: {}", giver, shape),
        )
        .with_data(
            NotificationData::for_goal(&goal.id)
                .from_user(&goal.empowered_by, &giver)
                .with_shape(shape.weeks, shape.sessions)
                .with_message(message),
        );
        self.send(SideStep::NotifyCounterparty, approved, &mut outcome.failed_steps)
            .await;

        self.retire_approval_request(&outcome.goal, prompt_id).await;

        let goal = &outcome.goal;
        let confirmation = NewNotification::new(
            &goal.empowered_by,
            NotificationKind::ActionConfirmed,
            "Goal approved",
            format!("You approved {}", shape),
        )
        .with_data(NotificationData::for_goal(&goal.id));
        self.send(SideStep::ConfirmActor, confirmation, &mut outcome.failed_steps)
            .await;

        Ok(outcome)
    }

    /// Giver suggests a wider shape. The recipient gets an action-required
    /// notification that stays until they answer it.
    pub async fn suggest_goal_change(
        &self,
        goal_id: &str,
        weeks: i64,
        sessions: i64,
        message: Option<&str>,
        prompt_id: Option<String>,
    ) -> Result<Outcome, NegotiationError> {
        let goal = self
            .goals
            .suggest_goal_change(goal_id, weeks, sessions, message)
            .await?;
        let mut outcome = Outcome::new(goal);
        let goal = &outcome.goal;

        let giver = display_name(self.names.as_ref(), &goal.empowered_by).await;
        let suggested = goal.suggestion().unwrap_or_else(|| goal.effective_shape());
        let suggestion = NewNotification::new(
            &goal.user_id,
            NotificationKind::GoalSuggestion,
            "Goal change suggested",
            format!("{} suggested {} instead of {}", giver, suggested, goal.initial_shape()),
        )
        .with_data(
            NotificationData::for_goal(&goal.id)
                .from_user(&goal.empowered_by, &giver)
                .with_shape(suggested.weeks, suggested.sessions)
                .with_message(message),
        )
        .action_required();
        self.send(SideStep::NotifyCounterparty, suggestion, &mut outcome.failed_steps)
            .await;

        self.retire_approval_request(&outcome.goal, prompt_id).await;

        let goal = &outcome.goal;
        let confirmation = NewNotification::new(
            &goal.empowered_by,
            NotificationKind::ActionConfirmed,
            "Suggestion sent",
            format!("You suggested {}", suggested),
        )
        .with_data(NotificationData::for_goal(&goal.id));
        self.send(SideStep::ConfirmActor, confirmation, &mut outcome.failed_steps)
            .await;

        Ok(outcome)
    }

    /// Recipient settles on a shape between the floor and the suggestion.
    pub async fn respond_to_goal_suggestion(
        &self,
        goal_id: &str,
        weeks: i64,
        sessions: i64,
        message: Option<&str>,
        prompt_id: Option<String>,
    ) -> Result<Outcome, NegotiationError> {
        let goal = self
            .goals
            .respond_to_goal_suggestion(goal_id, weeks, sessions, message)
            .await?;
        let mut outcome = Outcome::new(goal);
        let goal = &outcome.goal;

        let recipient = display_name(self.names.as_ref(), &goal.user_id).await;
        let chosen = goal.effective_shape();
        let resolved = NewNotification::new(
            &goal.empowered_by,
            NotificationKind::SuggestionResolved,
            "Suggestion answered",
            format!("{} committed to {}", recipient, chosen),
        )
        .with_data(
            NotificationData::for_goal(&goal.id)
                .from_user(&goal.user_id, &recipient)
                .with_shape(chosen.weeks, chosen.sessions)
                .with_message(message),
        );
        self.send(SideStep::NotifyCounterparty, resolved, &mut outcome.failed_steps)
            .await;

        let goal = &outcome.goal;
        let target = RetireTarget::new(&goal.user_id, NotificationKind::GoalSuggestion, &goal.id)
            .with_id(prompt_id);
        self.notifications.retire(&target).await;

        let confirmation = NewNotification::new(
            &goal.user_id,
            NotificationKind::ActionConfirmed,
            "Goal updated",
            format!("You committed to {}", chosen),
        )
        .with_data(NotificationData::for_goal(&goal.id));
        self.send(SideStep::ConfirmActor, confirmation, &mut outcome.failed_steps)
            .await;

        Ok(outcome)
    }

    /// Recipient takes the giver's suggestion unchanged.
    pub async fn accept_suggestion_as_is(
        &self,
        goal_id: &str,
        prompt_id: Option<String>,
    ) -> Result<Outcome, NegotiationError> {
        let goal = self.goals.get_goal(goal_id).await?;
        let suggested = goal.suggestion().ok_or_else(|| {
            NegotiationError::from(goal.invalid_state("accept the suggestion for"))
        })?;
        self.respond_to_goal_suggestion(
            goal_id,
            i64::from(suggested.weeks),
            i64::from(suggested.sessions),
            None,
            prompt_id,
        )
        .await
    }

    /// Observer-driven auto-approval. `Ok(None)` unless this call performed
    /// the transition.
    pub async fn check_deadline(&self, goal_id: &str) -> Result<Option<Outcome>, NegotiationError> {
        self.check_deadline_at(goal_id, Utc::now()).await
    }

    pub async fn check_deadline_at(
        &self,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Outcome>, NegotiationError> {
        let Some(goal) = self.goals.check_and_auto_approve_at(goal_id, now).await? else {
            return Ok(None);
        };
        let mut outcome = Outcome::new(goal);
        let goal = &outcome.goal;
        let shape = goal.effective_shape();

        let approved = NewNotification::new(
            &goal.user_id,
            NotificationKind::GoalAutoApproved,
            "Goal approved",
            format!("Your goal was approved automatically: {}", shape),
        )
        .with_data(NotificationData::for_goal(&goal.id).with_shape(shape.weeks, shape.sessions));
        self.send(SideStep::NotifyCounterparty, approved, &mut outcome.failed_steps)
            .await;

        self.retire_approval_request(&outcome.goal, None).await;

        let goal = &outcome.goal;
        let recipient = display_name(self.names.as_ref(), &goal.user_id).await;
        let informed = NewNotification::new(
            &goal.empowered_by,
            NotificationKind::GoalAutoApproved,
            "Goal approved automatically",
            format!("{}'s goal approved itself after the deadline: {}", recipient, shape),
        )
        .with_data(
            NotificationData::for_goal(&goal.id)
                .from_user(&goal.user_id, &recipient)
                .with_shape(shape.weeks, shape.sessions),
        );
        self.send(SideStep::ConfirmActor, informed, &mut outcome.failed_steps)
            .await;

        Ok(Some(outcome))
    }

    /// Count one session. On the final session both parties are told.
    pub async fn record_session(&self, goal_id: &str) -> Result<Outcome, NegotiationError> {
        let goal = self.goals.tick_weekly_session(goal_id).await?;
        let mut outcome = Outcome::new(goal);
        if !outcome.goal.is_completed {
            return Ok(outcome);
        }

        let goal = &outcome.goal;
        let recipient = display_name(self.names.as_ref(), &goal.user_id).await;
        let shape = goal.effective_shape();
        let to_giver = NewNotification::new(
            &goal.empowered_by,
            NotificationKind::GoalCompleted,
            "Goal completed",
            format!("{} completed {}", recipient, shape),
        )
        .with_data(NotificationData::for_goal(&goal.id).from_user(&goal.user_id, &recipient));
        self.send(SideStep::NotifyCounterparty, to_giver, &mut outcome.failed_steps)
            .await;

        let goal = &outcome.goal;
        let to_recipient = NewNotification::new(
            &goal.user_id,
            NotificationKind::GoalCompleted,
            "Goal completed",
            format!("You completed {}", shape),
        )
        .with_data(NotificationData::for_goal(&goal.id));
        self.send(SideStep::ConfirmActor, to_recipient, &mut outcome.failed_steps)
            .await;

        Ok(outcome)
    }

    async fn retire_approval_request(&self, goal: &Goal, prompt_id: Option<String>) {
        let target = RetireTarget::new(
            &goal.empowered_by,
            NotificationKind::GoalApprovalRequest,
            &goal.id,
        )
        .with_id(prompt_id);
        let removed = self.notifications.retire(&target).await;
        tracing::debug!(goal_id = %goal.id, removed, "approval request retired");
    }

    // The exchange already retried the write once; a failure here is final.
    async fn send(
        &self,
        step: SideStep,
        notification: NewNotification,
        failed: &mut Vec<SideStep>,
    ) {
        let addressee = notification.addressee.clone();
        let kind = notification.kind;
        if let Err(e) = self.notifications.create(notification).await {
            tracing::warn!(
                step = %step,
                addressee = %addressee,
                kind = %kind,
                "notification not delivered, goal change stands: {}",
                e
            );
            failed.push(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::Directory;
    use pact_goal::{ApprovalStatus, GoalError};
    use pact_notify::{NotifyError, NOTIFICATIONS};
    use pact_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        negotiator: Negotiator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let goals = Arc::new(GoalEngine::new(store.clone()));
        let notifications = Arc::new(NotificationExchange::new(store.clone()));
        let names = Directory::new()
            .with_user("rec", "Riley")
            .with_user("giv", "Sam");
        Fixture {
            store,
            negotiator: Negotiator::new(goals, notifications, Arc::new(names)),
        }
    }

    fn new_goal(weeks: i64, sessions: i64) -> NewGoal {
        NewGoal {
            user_id: "rec".to_string(),
            empowered_by: "giv".to_string(),
            title: "Climbing".to_string(),
            weeks,
            sessions,
            experience_gift_id: None,
        }
    }

    async fn kinds_for(n: &Negotiator, user: &str) -> Vec<NotificationKind> {
        n.notifications()
            .list(user)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect()
    }

    #[tokio::test]
    async fn propose_sends_clearable_request_to_giver() {
        let f = fixture();
        let outcome = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap();
        assert!(!outcome.needs_retry());

        let inbox = f.negotiator.notifications().list("giv").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::GoalApprovalRequest);
        assert!(inbox[0].clearable);
        assert_eq!(inbox[0].data.from_name.as_deref(), Some("Riley"));
        assert_eq!(inbox[0].goal_id(), Some(outcome.goal.id.as_str()));
    }

    #[tokio::test]
    async fn approve_retires_request_and_confirms() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;

        let outcome = f
            .negotiator
            .approve_goal(&goal.id, Some("go for it"), None)
            .await
            .unwrap();
        assert_eq!(outcome.goal.approval_status, ApprovalStatus::Approved);

        assert_eq!(
            kinds_for(&f.negotiator, "giv").await,
            vec![NotificationKind::ActionConfirmed]
        );
        let rec = f.negotiator.notifications().list("rec").await.unwrap();
        let approved = rec
            .iter()
            .find(|n| n.kind == NotificationKind::GoalApproved)
            .unwrap();
        assert_eq!(approved.data.message.as_deref(), Some("go for it"));
    }

    #[tokio::test]
    async fn approval_survives_one_dropped_notification_write() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;
        f.store.drop_next_puts(NOTIFICATIONS, 1);

        let outcome = f
            .negotiator
            .approve_goal(&goal.id, None, None)
            .await
            .unwrap();
        assert!(outcome.failed_steps.is_empty());
        assert!(!outcome.needs_retry());
        assert!(kinds_for(&f.negotiator, "rec")
            .await
            .contains(&NotificationKind::GoalApproved));
    }

    #[tokio::test]
    async fn suggestion_is_action_required() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;
        f.negotiator
            .suggest_goal_change(&goal.id, 4, 5, None, None)
            .await
            .unwrap();

        let rec = f.negotiator.notifications().list("rec").await.unwrap();
        let suggestion = rec
            .iter()
            .find(|n| n.kind == NotificationKind::GoalSuggestion)
            .unwrap();
        assert!(!suggestion.clearable);
        assert_eq!((suggestion.data.weeks, suggestion.data.sessions), (Some(4), Some(5)));
        assert!(matches!(
            f.negotiator.notifications().delete(&suggestion.id, false).await,
            Err(NotifyError::NotClearable(_))
        ));
    }

    #[tokio::test]
    async fn out_of_range_suggestion_is_rejected_without_side_effects() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;

        let err = f
            .negotiator
            .suggest_goal_change(&goal.id, 6, 5, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Rejected(GoalError::OutOfRange { .. })
        ));
        assert!(!err.is_retryable());

        let stored = f.negotiator.goals().get_goal(&goal.id).await.unwrap();
        assert_eq!(stored.approval_status, ApprovalStatus::Pending);
        assert_eq!(
            kinds_for(&f.negotiator, "giv").await,
            vec![NotificationKind::GoalApprovalRequest]
        );
    }

    #[tokio::test]
    async fn accept_as_is_takes_the_suggested_shape() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;
        f.negotiator
            .suggest_goal_change(&goal.id, 4, 5, None, None)
            .await
            .unwrap();

        let outcome = f
            .negotiator
            .accept_suggestion_as_is(&goal.id, None)
            .await
            .unwrap();
        assert_eq!(outcome.goal.target_count, 4);
        assert_eq!(outcome.goal.sessions_per_week, 5);
        assert!(outcome.goal.suggestion().is_none());
        assert!(!kinds_for(&f.negotiator, "rec")
            .await
            .contains(&NotificationKind::GoalSuggestion));
    }

    #[tokio::test]
    async fn accept_as_is_without_suggestion_is_invalid_state() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;
        let err = f
            .negotiator
            .accept_suggestion_as_is(&goal.id, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Rejected(GoalError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn notification_outage_does_not_roll_back_the_goal() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;
        f.store.take_offline(NOTIFICATIONS);

        let outcome = f.negotiator.approve_goal(&goal.id, None, None).await.unwrap();
        assert!(outcome.needs_retry());
        assert_eq!(
            outcome.failed_steps,
            vec![SideStep::NotifyCounterparty, SideStep::ConfirmActor]
        );

        let stored = f.negotiator.goals().get_goal(&goal.id).await.unwrap();
        assert_eq!(stored.approval_status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn goal_outage_aborts_with_retry_prompt() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;
        f.store.take_offline(pact_goal::GOALS);

        let err = f.negotiator.approve_goal(&goal.id, None, None).await.unwrap_err();
        assert!(err.is_retryable());
        f.store.bring_online(pact_goal::GOALS);
        assert_eq!(kinds_for(&f.negotiator, "rec").await, vec![NotificationKind::ActionConfirmed]);
    }

    #[tokio::test]
    async fn deadline_check_is_a_no_op_before_the_deadline() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(2, 3)).await.unwrap().goal;
        assert!(f.negotiator.check_deadline(&goal.id).await.unwrap().is_none());

        let later = goal.approval_deadline + chrono::Duration::seconds(1);
        let outcome = f
            .negotiator
            .check_deadline_at(&goal.id, later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.goal.approval_status, ApprovalStatus::Approved);
        assert_eq!(kinds_for(&f.negotiator, "giv").await, vec![NotificationKind::GoalAutoApproved]);
        assert!(f.negotiator.check_deadline_at(&goal.id, later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn final_session_notifies_both_parties() {
        let f = fixture();
        let goal = f.negotiator.propose_goal(new_goal(1, 2)).await.unwrap().goal;
        f.negotiator.approve_goal(&goal.id, None, None).await.unwrap();

        let first = f.negotiator.record_session(&goal.id).await.unwrap();
        assert!(!first.goal.is_completed);
        let last = f.negotiator.record_session(&goal.id).await.unwrap();
        assert!(last.goal.is_completed);

        assert!(kinds_for(&f.negotiator, "giv").await.contains(&NotificationKind::GoalCompleted));
        assert!(kinds_for(&f.negotiator, "rec").await.contains(&NotificationKind::GoalCompleted));

        let err = f.negotiator.record_session(&goal.id).await.unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Rejected(GoalError::InvalidState { .. })
        ));
    }
}
