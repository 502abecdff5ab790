// sweep.rs — Run the deadline watcher, once or until Ctrl-C.

use chrono::Utc;
use pact_negotiation::DeadlineWatcher;
use tokio::sync::watch;

use super::{user_error, App};

pub async fn execute(app: &App, once: bool) -> anyhow::Result<()> {
    let watcher = DeadlineWatcher::new(app.negotiator.clone(), app.settings.sweep_interval());

    if once {
        let approved = watcher.sweep_once(Utc::now()).await.map_err(user_error)?;
        println!("Auto-approved {} goal(s).", approved);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });
    println!(
        "Watching deadlines every {}s in {} (Ctrl-C to stop)",
        app.settings.sweep_interval().as_secs(),
        app.config.project_root.display()
    );
    watcher.run(shutdown_rx).await;
    Ok(())
}
