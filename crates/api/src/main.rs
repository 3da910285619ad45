//! CalSync daemon
//!
//! Without arguments the binary runs the cron scheduler until Ctrl-C.
//! `calsync sync <user-id> [pull|push|bidirectional]` performs a single manual
//! run over the configured window and prints its summary as JSON.

use std::process::ExitCode;

use calsync_domain::{CalSyncError, DateRange, Result, SyncDirection};
use calsync_infra::config;
use calsync_lib::utils::logging::init_logging;
use calsync_lib::{trigger_sync, AppContext};
use chrono::Utc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    let config = match config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("calsync: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging(&config.logging) {
        eprintln!("calsync: {err}");
        return ExitCode::FAILURE;
    }
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => warn!(error = %err, "no .env file loaded"),
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(config, &args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "calsync exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: calsync_domain::Config, args: &[String]) -> Result<()> {
    let ctx = AppContext::new(config)?;

    match args {
        [] => serve(&ctx).await,
        [cmd, user_id, rest @ ..] if cmd == "sync" && rest.len() <= 1 => {
            let direction = match rest.first() {
                Some(raw) => raw.parse::<SyncDirection>().map_err(|_| {
                    CalSyncError::InvalidInput(format!("unknown sync direction: {raw}"))
                })?,
                None => SyncDirection::Bidirectional,
            };
            sync_once(&ctx, user_id, direction).await
        }
        _ => Err(CalSyncError::InvalidInput(
            "usage: calsync [sync <user-id> [pull|push|bidirectional]]".into(),
        )),
    }
}

async fn serve(ctx: &AppContext) -> Result<()> {
    if !ctx.start_scheduler().await? {
        info!("nothing to do with automatic sync disabled");
        return Ok(());
    }
    info!("calsync running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| CalSyncError::Internal(format!("failed to listen for Ctrl-C: {err}")))?;
    info!("shutdown requested");
    ctx.shutdown().await
}

async fn sync_once(ctx: &AppContext, user_id: &str, direction: SyncDirection) -> Result<()> {
    let sync = &ctx.config.sync;
    let range = DateRange::around(Utc::now(), sync.lookback_days, sync.lookahead_days);
    let summary = trigger_sync(ctx, user_id, user_id, range.start, range.end, direction).await?;
    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|err| CalSyncError::Internal(format!("failed to render summary: {err}")))?;
    println!("{rendered}");
    Ok(())
}
