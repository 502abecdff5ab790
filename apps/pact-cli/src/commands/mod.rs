// mod.rs — Shared wiring for subcommands.

pub mod goal;
pub mod notify;
pub mod sweep;

use std::sync::Arc;

use pact_goal::{EventDispatcher, GoalEngine, LogSink};
use pact_negotiation::{NegotiationError, Negotiator, Outcome, PactConfig, Settings};
use pact_notify::NotificationExchange;
use pact_store::{DocumentStore, JsonFileStore};

/// Components built once per invocation and shared by every subcommand.
pub struct App {
    pub config: PactConfig,
    pub settings: Settings,
    pub negotiator: Arc<Negotiator>,
}

impl App {
    pub fn open(config: PactConfig) -> anyhow::Result<Self> {
        let settings = config.load_settings();
        let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(&config.store_dir)?);
        let events = Arc::new(EventDispatcher::new().with_sink(LogSink::new(&config.events_log)));
        let goals = Arc::new(
            GoalEngine::new(store.clone())
                .with_approval_window(settings.approval_window())
                .with_events(events),
        );
        let notifications = Arc::new(NotificationExchange::new(store));
        let negotiator = Arc::new(Negotiator::new(
            goals,
            notifications,
            Arc::new(settings.directory()),
        ));
        Ok(Self {
            config,
            settings,
            negotiator,
        })
    }
}

/// Rejections print what the user can fix; outages print a retry prompt.
pub(crate) fn user_error(err: NegotiationError) -> anyhow::Error {
    tracing::debug!("action failed: {}", err);
    anyhow::anyhow!(err.user_message())
}

pub(crate) fn warn_if_incomplete(outcome: &Outcome) {
    if outcome.needs_retry() {
        let steps: Vec<String> = outcome.failed_steps.iter().map(|s| s.to_string()).collect();
        eprintln!(
            "Saved, but some notifications were not delivered ({}). Please try again later.",
            steps.join(", ")
        );
    }
}
