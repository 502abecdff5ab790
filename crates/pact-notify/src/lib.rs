//! # pact-notify
//!
//! The notification exchange that drives and records each negotiation step.
//!
//! Notifications are side artifacts, never sources of truth: the goal
//! document decides what state a negotiation is in. A notification marked
//! not clearable is action-required, so its addressee cannot dismiss it
//! until the system resolves the step and force-deletes it.

pub mod error;
pub mod exchange;
pub mod notification;

pub use error::NotifyError;
pub use exchange::{NotificationExchange, RetireTarget, NOTIFICATIONS};
pub use notification::{NewNotification, Notification, NotificationData, NotificationKind};
