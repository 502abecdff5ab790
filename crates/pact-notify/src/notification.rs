// notification.rs — Notification records and their protocol-phase tags.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which protocol phase a notification belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// To the giver: a recipient proposed a goal.
    GoalApprovalRequest,
    /// To the recipient: the giver approved the original ask.
    GoalApproved,
    /// To the recipient: the deadline passed and the goal approved itself.
    GoalAutoApproved,
    /// To the recipient: the giver wants a wider goal. Action required.
    GoalSuggestion,
    /// To the giver: the recipient settled on a shape.
    SuggestionResolved,
    /// To the acting party: your action went through.
    ActionConfirmed,
    /// To both parties: the last session was recorded.
    GoalCompleted,
    FriendRequest,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::GoalApprovalRequest => "goal_approval_request",
            NotificationKind::GoalApproved => "goal_approved",
            NotificationKind::GoalAutoApproved => "goal_auto_approved",
            NotificationKind::GoalSuggestion => "goal_suggestion",
            NotificationKind::SuggestionResolved => "suggestion_resolved",
            NotificationKind::ActionConfirmed => "action_confirmed",
            NotificationKind::GoalCompleted => "goal_completed",
            NotificationKind::FriendRequest => "friend_request",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carried alongside the human-readable text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    /// The counterparty who caused this notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weeks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NotificationData {
    pub fn for_goal(goal_id: impl Into<String>) -> Self {
        Self {
            goal_id: Some(goal_id.into()),
            ..Self::default()
        }
    }

    pub fn from_user(mut self, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.from_user_id = Some(user_id.into());
        self.from_name = Some(name.into());
        self
    }

    pub fn with_shape(mut self, weeks: u32, sessions: u32) -> Self {
        self.weeks = Some(weeks);
        self.sessions = Some(sessions);
        self
    }

    pub fn with_message(mut self, message: Option<&str>) -> Self {
        self.message = message.map(str::to_string);
        self
    }
}

fn default_clearable() -> bool {
    true
}

/// A notification as stored in the `notifications` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    /// Addressee.
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: NotificationData,
    #[serde(default)]
    pub read: bool,
    #[serde(default = "default_clearable")]
    pub clearable: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn goal_id(&self) -> Option<&str> {
        self.data.goal_id.as_deref()
    }
}

/// Input for creating a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub addressee: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: NotificationData,
    pub clearable: bool,
}

impl NewNotification {
    pub fn new(
        addressee: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            addressee: addressee.into(),
            kind,
            title: title.into(),
            message: message.into(),
            data: NotificationData::default(),
            clearable: true,
        }
    }

    pub fn with_data(mut self, data: NotificationData) -> Self {
        self.data = data;
        self
    }

    /// Mark as action-required: the addressee cannot dismiss it.
    pub fn action_required(mut self) -> Self {
        self.clearable = false;
        self
    }

    pub(crate) fn into_notification(self) -> Notification {
        Notification {
            id: String::new(),
            user_id: self.addressee,
            kind: self.kind,
            title: self.title,
            message: self.message,
            data: self.data,
            read: false,
            clearable: self.clearable,
            created_at: Utc::now(),
        }
    }
}
