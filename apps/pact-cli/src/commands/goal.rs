// goal.rs — Goal subcommands: create, list, status, and the negotiation actions.

use clap::Subcommand;
use pact_goal::{parse_count, Goal, NewGoal};
use pact_negotiation::NegotiationError;

use super::{user_error, warn_if_incomplete, App};

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Propose a new goal and ask the giver to approve it.
    Create {
        /// Recipient user id (the one doing the sessions).
        #[arg(long)]
        recipient: String,
        /// Giver user id (the one approving).
        #[arg(long)]
        giver: String,
        /// Number of weeks (1-5).
        #[arg(long)]
        weeks: String,
        /// Sessions per week (1-7).
        #[arg(long)]
        sessions: String,
        /// Goal title.
        #[arg(long, default_value = "")]
        title: String,
        /// Experience gift this goal unlocks.
        #[arg(long)]
        gift: Option<String>,
    },
    /// List goals.
    List {
        /// Only goals where this user is recipient or giver.
        #[arg(long)]
        user: Option<String>,
        /// Filter by approval status (e.g., "pending", "suggested").
        #[arg(long)]
        status: Option<String>,
    },
    /// Show details for a goal.
    Status {
        /// Goal ID.
        id: String,
    },
    /// Approve the recipient's original ask.
    Approve {
        id: String,
        #[arg(long)]
        message: Option<String>,
        /// Notification that prompted this action.
        #[arg(long)]
        notification: Option<String>,
    },
    /// Suggest a wider goal instead of approving.
    Suggest {
        id: String,
        weeks: String,
        sessions: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        notification: Option<String>,
    },
    /// Answer a suggestion with a shape between the floor and the suggestion.
    Respond {
        id: String,
        weeks: String,
        sessions: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        notification: Option<String>,
    },
    /// Take the suggestion unchanged.
    Accept {
        id: String,
        #[arg(long)]
        notification: Option<String>,
    },
    /// Record one completed session.
    Tick { id: String },
    /// Auto-approve the goal if its deadline has passed.
    CheckDeadline { id: String },
}

pub async fn execute(cmd: &GoalCommands, app: &App) -> anyhow::Result<()> {
    match cmd {
        GoalCommands::Create {
            recipient,
            giver,
            weeks,
            sessions,
            title,
            gift,
        } => create_goal(app, recipient, giver, weeks, sessions, title, gift.as_deref()).await,
        GoalCommands::List { user, status } => {
            list_goals(app, user.as_deref(), status.as_deref()).await
        }
        GoalCommands::Status { id } => show_status(app, id).await,
        GoalCommands::Approve {
            id,
            message,
            notification,
        } => {
            let outcome = app
                .negotiator
                .approve_goal(id, message.as_deref(), notification.clone())
                .await
                .map_err(user_error)?;
            println!("Approved: {}", outcome.goal.effective_shape());
            warn_if_incomplete(&outcome);
            Ok(())
        }
        GoalCommands::Suggest {
            id,
            weeks,
            sessions,
            message,
            notification,
        } => {
            let (weeks, sessions) = counts(weeks, sessions)?;
            let outcome = app
                .negotiator
                .suggest_goal_change(id, weeks, sessions, message.as_deref(), notification.clone())
                .await
                .map_err(user_error)?;
            if let Some(shape) = outcome.goal.suggestion() {
                println!("Suggested: {}", shape);
            }
            warn_if_incomplete(&outcome);
            Ok(())
        }
        GoalCommands::Respond {
            id,
            weeks,
            sessions,
            message,
            notification,
        } => {
            let (weeks, sessions) = counts(weeks, sessions)?;
            let outcome = app
                .negotiator
                .respond_to_goal_suggestion(
                    id,
                    weeks,
                    sessions,
                    message.as_deref(),
                    notification.clone(),
                )
                .await
                .map_err(user_error)?;
            println!("Committed to: {}", outcome.goal.effective_shape());
            warn_if_incomplete(&outcome);
            Ok(())
        }
        GoalCommands::Accept { id, notification } => {
            let outcome = app
                .negotiator
                .accept_suggestion_as_is(id, notification.clone())
                .await
                .map_err(user_error)?;
            println!("Committed to: {}", outcome.goal.effective_shape());
            warn_if_incomplete(&outcome);
            Ok(())
        }
        GoalCommands::Tick { id } => {
            let outcome = app.negotiator.record_session(id).await.map_err(user_error)?;
            let goal = &outcome.goal;
            if goal.is_completed {
                println!("Goal completed: {}", goal.effective_shape());
            } else {
                println!(
                    "Session recorded: week {}/{}, {}/{} sessions this week",
                    goal.current_count + 1,
                    goal.target_count,
                    goal.weekly_count,
                    goal.sessions_per_week
                );
            }
            warn_if_incomplete(&outcome);
            Ok(())
        }
        GoalCommands::CheckDeadline { id } => {
            match app.negotiator.check_deadline(id).await.map_err(user_error)? {
                Some(outcome) => {
                    println!("Auto-approved: {}", outcome.goal.effective_shape());
                    warn_if_incomplete(&outcome);
                }
                None => println!("Nothing to do."),
            }
            Ok(())
        }
    }
}

fn counts(weeks: &str, sessions: &str) -> anyhow::Result<(i64, i64)> {
    let weeks = parse_count("weeks", weeks).map_err(|e| user_error(NegotiationError::from(e)))?;
    let sessions =
        parse_count("sessions", sessions).map_err(|e| user_error(NegotiationError::from(e)))?;
    Ok((i64::from(weeks), i64::from(sessions)))
}

async fn create_goal(
    app: &App,
    recipient: &str,
    giver: &str,
    weeks: &str,
    sessions: &str,
    title: &str,
    gift: Option<&str>,
) -> anyhow::Result<()> {
    let (weeks, sessions) = counts(weeks, sessions)?;
    let outcome = app
        .negotiator
        .propose_goal(NewGoal {
            user_id: recipient.to_string(),
            empowered_by: giver.to_string(),
            title: title.to_string(),
            weeks,
            sessions,
            experience_gift_id: gift.map(str::to_string),
        })
        .await
        .map_err(user_error)?;

    let goal = &outcome.goal;
    println!("Goal proposed: {}", goal.id);
    println!("  Shape:    {}", goal.initial_shape());
    println!(
        "  Deadline: {}",
        goal.approval_deadline.format("%Y-%m-%d %H:%M UTC")
    );
    warn_if_incomplete(&outcome);
    Ok(())
}

async fn list_goals(app: &App, user: Option<&str>, status: Option<&str>) -> anyhow::Result<()> {
    let goals = app.negotiator.goals();
    let mut found: Vec<Goal> = match user {
        Some(user) => {
            let mut mine = goals.goals_for_recipient(user).await?;
            mine.extend(goals.goals_for_giver(user).await?);
            mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            mine.dedup_by(|a, b| a.id == b.id);
            mine
        }
        None => goals.all_goals().await?,
    };
    if let Some(status) = status {
        found.retain(|g| g.approval_status.as_str() == status);
    }

    if found.is_empty() {
        println!("No goals found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<12} {:<12} {:<28} PROGRESS",
        "ID", "STATUS", "RECIPIENT", "GIVER", "SHAPE"
    );
    println!("{}", "-".repeat(112));
    for goal in &found {
        println!(
            "{:<38} {:<10} {:<12} {:<12} {:<28} {}",
            goal.id,
            status_label(goal),
            truncate(&goal.user_id, 12),
            truncate(&goal.empowered_by, 12),
            goal.effective_shape().to_string(),
            progress(goal)
        );
    }
    println!();
    println!("{} goal(s) total.", found.len());
    Ok(())
}

async fn show_status(app: &App, id: &str) -> anyhow::Result<()> {
    let goal = app
        .negotiator
        .goals()
        .get_goal(id)
        .await
        .map_err(|e| user_error(NegotiationError::from(e)))?;

    println!("Goal:      {}", goal.id);
    if !goal.title.is_empty() {
        println!("Title:     {}", goal.title);
    }
    println!("Status:    {}", status_label(&goal));
    println!("Recipient: {}", goal.user_id);
    println!("Giver:     {}", goal.empowered_by);
    println!("Asked for: {}", goal.initial_shape());
    if let Some(suggested) = goal.suggestion() {
        println!("Suggested: {}", suggested);
    }
    println!("Shape:     {}", goal.effective_shape());
    println!("Progress:  {}", progress(&goal));
    println!(
        "Deadline:  {}{}",
        goal.approval_deadline.format("%Y-%m-%d %H:%M UTC"),
        if goal.giver_action_taken { " (giver answered)" } else { "" }
    );
    if let Some(message) = &goal.giver_message {
        println!("Message:   {}", message);
    }
    if let Some(gift) = &goal.experience_gift_id {
        println!("Gift:      {}", gift);
    }
    if let Some(hint) = goal.latest_hint() {
        println!("Hint:      {} (session {})", hint.hint, hint.session);
    }
    println!("Created:   {}", goal.created_at.format("%Y-%m-%d %H:%M UTC"));
    Ok(())
}

fn status_label(goal: &Goal) -> String {
    if goal.is_completed {
        "completed".to_string()
    } else {
        goal.approval_status.to_string()
    }
}

fn progress(goal: &Goal) -> String {
    let done = goal.current_count * goal.sessions_per_week + goal.weekly_count;
    format!("{}/{}", done, goal.effective_shape().total_sessions())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
