// notify.rs — Notification subcommands: list, read, delete, clear.

use clap::Subcommand;
use pact_notify::{Notification, NotifyError};

use super::App;

#[derive(Subcommand)]
pub enum NotifyCommands {
    /// List a user's notifications, newest first.
    List {
        user: String,
        /// Only unread notifications.
        #[arg(long)]
        unread: bool,
    },
    /// Show a notification and mark it read.
    Read { id: String },
    /// Dismiss a notification.
    Delete {
        id: String,
        /// Also remove action-required notifications.
        #[arg(long)]
        force: bool,
    },
    /// Remove every notification for a user.
    Clear { user: String },
}

pub async fn execute(cmd: &NotifyCommands, app: &App) -> anyhow::Result<()> {
    let exchange = app.negotiator.notifications();
    match cmd {
        NotifyCommands::List { user, unread } => {
            let mut inbox = exchange.list(user).await?;
            if *unread {
                inbox.retain(|n| !n.read);
            }
            if inbox.is_empty() {
                println!("No notifications.");
                return Ok(());
            }
            for n in &inbox {
                println!("{}", summary_line(n));
            }
            Ok(())
        }
        NotifyCommands::Read { id } => {
            let n = exchange.get(id).await?;
            exchange.mark_read(id).await?;
            println!("{}", n.title);
            println!("{}", n.message);
            if let Some(goal_id) = n.goal_id() {
                println!();
                println!("Goal: {}", goal_id);
            }
            if let Some(message) = &n.data.message {
                println!("Note: {}", message);
            }
            if !n.clearable {
                println!();
                println!("Action required: answer with `pact goal respond` or `pact goal accept`.");
            }
            Ok(())
        }
        NotifyCommands::Delete { id, force } => match exchange.delete(id, *force).await {
            Ok(()) => {
                println!("Deleted {}", id);
                Ok(())
            }
            Err(NotifyError::NotClearable(_)) => Err(anyhow::anyhow!(
                "This notification needs an answer before it can be dismissed."
            )),
            Err(e) => Err(e.into()),
        },
        NotifyCommands::Clear { user } => {
            let removed = exchange.clear_all(user).await?;
            println!("Removed {} notification(s).", removed);
            Ok(())
        }
    }
}

fn summary_line(n: &Notification) -> String {
    format!(
        "{} {} {:<22} {}{}",
        if n.read { " " } else { "*" },
        n.id,
        n.kind.as_str(),
        n.title,
        if n.clearable { "" } else { " [action required]" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pact_notify::{NotificationData, NotificationKind};

    #[test]
    fn summary_marks_unread_and_action_required() {
        let n = Notification {
            id: "n1".to_string(),
            user_id: "riley".to_string(),
            kind: NotificationKind::GoalSuggestion,
            title: "Goal change suggested".to_string(),
            message: String::new(),
            data: NotificationData::for_goal("g1"),
            read: false,
            clearable: false,
            created_at: Utc::now(),
        };
        let line = summary_line(&n);
        assert!(line.starts_with('*'));
        assert!(line.ends_with("[action required]"));
    }
}
