use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tokio::task::JoinSet;

use crate::{
    core::{db::EventDb, service::EventService},
    integrations::init_integrations,
    settings::Settings,
};

mod actor;
mod core;
mod error;
mod integrations;
mod scheduler;
mod settings;
#[cfg(test)]
mod testing;
mod util;
mod web;

#[derive(Parser, Debug)]
#[command(name = "sparks")]
#[command(version = "0.1")]
#[command(about = "Backend for speed dating events: rosters, match forms and results.", long_about = None)]
struct Args {
    /// Location of the JSON settings file.
    #[arg(short, long, default_value = "settings.json")]
    settings: PathBuf,

    #[command(subcommand)]
    command: RunType,
}

#[derive(Subcommand, Debug)]
enum RunType {
    /// Run the web server and the scheduler.
    Serve,

    /// Create the database file and its tables.
    InitDb,

    /// Email match results of an event.
    /// Does nothing if the results of this event were already sent.
    SendResults { event_id: String },

    /// Remind attendees of an event who have not submitted their match form.
    SendReminders { event_id: String },

    /// Check for events that just ended and run due jobs once, then exit.
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = Arc::new(Settings::load(&args.settings)?);
    let db = Arc::new(EventDb::connect(&settings.database).await?);

    if let RunType::InitDb = args.command {
        log::info!("Database {} is ready", settings.database);
        return Ok(());
    }

    let mut tasks = JoinSet::new();
    let (tickets, mail) = init_integrations(&mut tasks, &settings)?;
    let service = Arc::new(EventService::new(db, tickets, mail, settings.clone()));

    match args.command {
        RunType::Serve => {
            tasks.spawn(web::run_http_server(service.clone(), settings.clone()));
            tasks.spawn(scheduler::run_scheduler(service, settings.scheduler_poll()));

            // Every task runs forever, so the first one to stop ends the process
            if let Some(res) = tasks.join_next().await {
                res??;
            }
        }
        RunType::SendResults { event_id } => {
            let report = service.send_results_for(&event_id).await?;
            log::info!("Results of {}: {} sent, {} failed", event_id, report.sent, report.failed);
        }
        RunType::SendReminders { event_id } => {
            let report = service.send_reminders(&event_id).await?;
            log::info!("Reminders of {}: {} sent, {} failed", event_id, report.sent, report.failed);
        }
        RunType::Schedule => {
            let now = OffsetDateTime::now_utc();
            let added = scheduler::enqueue_ended_events(&service, now).await?;
            let completed = scheduler::run_due_jobs(&service, now).await?;
            log::info!("{} jobs scheduled, {} jobs completed", added, completed);
        }
        RunType::InitDb => {}
    }

    Ok(())
}
