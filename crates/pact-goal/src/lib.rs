//! # pact-goal
//!
//! Goal lifecycle management for Pact.
//!
//! A [`Goal`] is a recipient's recurring-session commitment toward a reward
//! funded by a giver. Before progress can be tracked, the giver must approve
//! the goal's shape (weeks × sessions per week) or suggest a wider one, which
//! the recipient then accepts, possibly negotiating part of the way back.
//! An approval deadline auto-approves goals the giver never acted on.
//!
//! ## Key components
//!
//! - [`ApprovalStatus`] — the negotiation state machine
//!   (Pending → Approved | Suggested → Accepted)
//! - [`Goal`] — the entity and its pure transitions
//! - [`ShapeBounds`] — inclusive ranges for suggestions and responses
//! - [`GoalEngine`] — persists transitions through conditional store writes
//! - [`GoalEvent`] / [`EventDispatcher`] — transition trail for sinks

pub mod engine;
pub mod error;
pub mod events;
pub mod goal;
pub mod shape;

pub use engine::{GoalEngine, GOALS};
pub use error::{EventSinkError, GoalError};
pub use events::{EventDispatcher, EventSink, GoalEvent, LogSink, RecordingSink};
pub use goal::{ApprovalStatus, Goal, Hint, NewGoal, SessionTick};
pub use shape::{
    acceptance_floor, parse_count, positive_count, GoalShape, ShapeBounds, MAX_SESSIONS_PER_WEEK,
    MAX_TARGET_WEEKS,
};
