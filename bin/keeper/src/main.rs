#![allow(clippy::redundant_pattern_matching, clippy::identity_op, clippy::redundant_closure)]
#![deny(deprecated)]

extern crate tracing as log;

use std::sync::Arc;

use role_persist::{store::PgRoleStore, PersistenceReactor, RolePersistService};
use task_runner::TaskRunner;

pub mod cli;
pub mod config;
pub mod error;
pub mod platform;
pub mod retry;
pub mod state;
pub mod tasks;

#[cfg(test)]
mod test_support;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    println!("Build time: {}", built::BUILT_TIME_UTC);

    let args = cli::CliOptions::parse()?;

    if let Err(e) = dotenv::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    // temporary logger until info needed for global logger is loaded
    let (dispatch, _) = common::logging::generate(args.verbose, None)?;
    let _log_guard = log::dispatcher::set_default(&dispatch);

    log::debug!("Arguments: {:?}", args);

    let local: config::LocalConfig = ::config::load(&args.config, true).await?;

    // setup full logger
    log::info!("Setting up log-file rotation in {}", local.paths.log_dir.display());
    drop(_log_guard);

    let (dispatch, _log_guard) = common::logging::generate(args.verbose, local.paths.log_dir.clone().into())?;
    log::dispatcher::set_global_default(dispatch)?;

    log::info!("Starting {} (instance {})", local.general.node_name, local.general.instance_id);

    let db = db::Client::connect(local.db.db_str.parse::<db::pg::Config>()?, false).await?;

    log::info!("Running migrations from {}", local.paths.migrations.display());
    db::migrate::migrate(&db, &local.paths.migrations).await?;

    if args.migrate_only {
        log::info!("Migrations complete");
        return Ok(());
    }

    let eligibility = platform::PartyAllowList::new(&local.persist.parties);

    if eligibility.is_restricted() {
        log::info!("Role persistence enabled for {} parties", local.persist.parties.len());
    }

    let store = Arc::new(PgRoleStore::new(db.clone()));
    let service = Arc::new(RolePersistService::load(store, &eligibility).await?);

    let reactor = PersistenceReactor::new(
        service,
        Arc::new(platform::PgPlatform::new(db.clone())),
        Arc::new(platform::PgNotifier::new(db.clone())),
    );

    let state = state::KeeperState::new(local, db, reactor, eligibility);

    log::info!("Starting tasks...");
    let runner = TaskRunner::default();
    tasks::add_tasks(&state, &runner);

    log::trace!("Setting up shutdown signal for Ctrl+C");
    let shutdown = runner.signal();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.stop();
    });

    runner.wait().await?;

    state.db.close().await;

    println!("Flushing logs...");
    drop(_log_guard);
    println!("Goodbye.");

    Ok(())
}

pub mod built {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
