//! # pact-negotiation
//!
//! Glue between the goal lifecycle engine and the notification exchange.
//!
//! Every actor action runs the same four steps, strictly in order:
//!
//! 1. mutate the goal (the source of truth),
//! 2. notify the counterparty,
//! 3. retire the notification that prompted the action,
//! 4. confirm to the acting party.
//!
//! Only step 1 can fail the action. Steps 2–4 are side artifacts: their
//! failures are logged and reported as [`Outcome::needs_retry`], never rolled
//! back into the goal.
//!
//! ## Key components
//!
//! - [`Negotiator`] — the public actions (`approve_goal`, `suggest_goal_change`,
//!   `respond_to_goal_suggestion`, `accept_suggestion_as_is`, …)
//! - [`DeadlineWatcher`] — scheduled sweep that auto-approves stale goals
//! - [`NameResolver`] — display names for notification text
//! - [`PactConfig`] / [`Settings`] — on-disk layout and `config.toml`

pub mod config;
pub mod error;
pub mod names;
pub mod negotiator;
pub mod watcher;

pub use config::{ConfigError, NegotiationSettings, PactConfig, Settings};
pub use error::NegotiationError;
pub use names::{display_name, Directory, NameError, NameResolver, UNKNOWN_NAME};
pub use negotiator::{Negotiator, Outcome, SideStep};
pub use watcher::DeadlineWatcher;
