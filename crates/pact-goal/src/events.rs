// events.rs — Goal transition events and sink dispatch.
//
// The engine emits a GoalEvent after every successful write. Sinks observe
// the trail (JSONL log, test recorders); they never influence the
// transition, and a failing sink is logged and skipped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventSinkError;
use crate::goal::Goal;
use crate::shape::GoalShape;

/// Events emitted at goal lifecycle points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GoalEvent {
    /// A recipient proposed a goal.
    GoalCreated {
        goal_id: String,
        recipient: String,
        giver: String,
        shape: GoalShape,
        timestamp: DateTime<Utc>,
    },

    /// The original ask was approved, by the giver or by the deadline.
    GoalApproved {
        goal_id: String,
        shape: GoalShape,
        auto: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The giver suggested a wider shape.
    GoalSuggested {
        goal_id: String,
        suggested: GoalShape,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The recipient settled on a shape.
    SuggestionResolved {
        goal_id: String,
        chosen: GoalShape,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// One session was counted.
    SessionTicked {
        goal_id: String,
        current_count: u32,
        weekly_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// The last session of the last week was counted.
    GoalCompleted {
        goal_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl GoalEvent {
    /// Get the event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            GoalEvent::GoalCreated { .. } => "goal_created",
            GoalEvent::GoalApproved { .. } => "goal_approved",
            GoalEvent::GoalSuggested { .. } => "goal_suggested",
            GoalEvent::SuggestionResolved { .. } => "suggestion_resolved",
            GoalEvent::SessionTicked { .. } => "session_ticked",
            GoalEvent::GoalCompleted { .. } => "goal_completed",
        }
    }

    pub fn goal_id(&self) -> &str {
        match self {
            GoalEvent::GoalCreated { goal_id, .. }
            | GoalEvent::GoalApproved { goal_id, .. }
            | GoalEvent::GoalSuggested { goal_id, .. }
            | GoalEvent::SuggestionResolved { goal_id, .. }
            | GoalEvent::SessionTicked { goal_id, .. }
            | GoalEvent::GoalCompleted { goal_id, .. } => goal_id,
        }
    }

    pub fn goal_created(goal: &Goal) -> Self {
        GoalEvent::GoalCreated {
            goal_id: goal.id.clone(),
            recipient: goal.user_id.clone(),
            giver: goal.empowered_by.clone(),
            shape: goal.initial_shape(),
            timestamp: Utc::now(),
        }
    }

    pub fn goal_approved(goal: &Goal, auto: bool, message: Option<&str>) -> Self {
        GoalEvent::GoalApproved {
            goal_id: goal.id.clone(),
            shape: goal.effective_shape(),
            auto,
            message: message.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn goal_suggested(goal: &Goal, suggested: GoalShape, message: Option<&str>) -> Self {
        GoalEvent::GoalSuggested {
            goal_id: goal.id.clone(),
            suggested,
            message: message.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn suggestion_resolved(goal: &Goal, message: Option<&str>) -> Self {
        GoalEvent::SuggestionResolved {
            goal_id: goal.id.clone(),
            chosen: goal.effective_shape(),
            message: message.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn session_ticked(goal: &Goal) -> Self {
        GoalEvent::SessionTicked {
            goal_id: goal.id.clone(),
            current_count: goal.current_count,
            weekly_count: goal.weekly_count,
            timestamp: Utc::now(),
        }
    }

    pub fn goal_completed(goal: &Goal) -> Self {
        GoalEvent::GoalCompleted {
            goal_id: goal.id.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Trait for receiving goal events.
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the system.
    fn send(&self, event: &GoalEvent) -> Result<(), EventSinkError>;
}

/// Appends events as JSONL to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for LogSink {
    fn send(&self, event: &GoalEvent) -> Result<(), EventSinkError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| EventSinkError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| EventSinkError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| EventSinkError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Collects events in memory.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<GoalEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GoalEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: &GoalEvent) -> Result<(), EventSinkError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

/// Dispatches events to multiple sinks.
///
/// Errors from individual sinks are logged (via tracing) but don't
/// prevent other sinks from receiving the event.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no sinks.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    pub fn dispatch(&self, event: &GoalEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(event = event.event_type(), "goal event sink error: {}", e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn created(goal_id: &str) -> GoalEvent {
        GoalEvent::GoalCreated {
            goal_id: goal_id.to_string(),
            recipient: "r".to_string(),
            giver: "g".to_string(),
            shape: GoalShape::new(2, 3),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn event_serialization_is_tagged() {
        let event = created("g1");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"goal_created\""));

        let restored: GoalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
        assert_eq!(restored.goal_id(), "g1");
    }

    #[test]
    fn log_sink_appends_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/events.jsonl");
        let sink = LogSink::new(&path);

        sink.send(&created("g1")).unwrap();
        sink.send(&created("g2")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn dispatcher_sends_to_all_sinks_despite_failures() {
        struct Broken;
        impl EventSink for Broken {
            fn send(&self, _event: &GoalEvent) -> Result<(), EventSinkError> {
                Err(EventSinkError::Io {
                    path: "/dev/full".to_string(),
                    source: std::io::Error::other("disk full"),
                })
            }
        }

        let recorder = RecordingSink::new();
        let dispatcher = EventDispatcher::new()
            .with_sink(Broken)
            .with_sink(recorder.clone());

        dispatcher.dispatch(&created("g1"));
        assert_eq!(recorder.event_types(), vec!["goal_created"]);
    }
}
