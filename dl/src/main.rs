//! dl - devloop entrypoint

use clap::Parser;
use eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use devloop::cli::{Cli, Command};
use devloop::{Config, Coordinator, StateStore, StopReason, spawn_observer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devloop=info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Run {
            project_root,
            max_iterations,
        } => {
            let mut coordinator_config = config.coordinator.clone();
            if let Some(cap) = max_iterations {
                coordinator_config.max_iterations = cap;
            }

            let specialists = config.specialists.build()?;
            let coordinator = Coordinator::new(&project_root, coordinator_config, config.scheduler.clone(), specialists)?;
            let handle = coordinator.handle();
            let (observer_stop, observer) = spawn_observer(coordinator.bus());

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping after the current phase");
                    handle.stop();
                }
            });

            let reason = coordinator.run().await?;
            let _ = observer_stop.send(true);
            let _ = observer.await;

            match reason {
                StopReason::ObjectiveComplete => info!("Run complete: objective reached"),
                StopReason::UserStop => info!("Run complete: stopped by user"),
                StopReason::IterationCap => info!("Run complete: iteration cap reached"),
                StopReason::ConsecutiveErrors => info!("Run stopped: too many consecutive phase errors"),
                StopReason::PersistenceFailure => eyre::bail!("Run stopped: state could not be persisted"),
            }
            Ok(())
        }

        Command::Status { project_root } => {
            let store = StateStore::open(&project_root)?;
            let state = store.snapshot().await;

            println!("iteration: {}", state.iteration);
            println!("tasks: {}", state.tasks.len());
            for (status, count) in [
                ("pending", state.pending_tasks().len()),
                ("needs_fixes", state.needs_fixes_tasks().len()),
                ("completed", state.completed_task_count()),
            ] {
                println!("  {}: {}", status, count);
            }
            println!("objectives: {}", state.objectives.len());
            for objective in &state.objectives {
                println!("  [{}] {} ({:.0}%)", objective.tier, objective.title, objective.completion * 100.0);
            }
            println!("files tracked: {}", state.files.len());
            Ok(())
        }
    }
}
