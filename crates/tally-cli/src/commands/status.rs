use serde::Serialize;
use tally_core::sync::{SyncPhase, SyncStatus};
use tally_core::util;

use crate::commands::common::{
    build_dispatcher, format_relative_time, format_timestamp, open_store,
};
use crate::error::CliError;
use crate::profile::ResolvedProfile;

#[derive(Debug, Serialize)]
struct StatusView {
    user_id: String,
    device_id: String,
    db_path: String,
    backend_configured: bool,
    pending_count: u64,
    last_sync_at: Option<i64>,
}

pub async fn run_status(
    profile: &ResolvedProfile,
    as_json: bool,
    watch: bool,
) -> Result<(), CliError> {
    if watch {
        return run_watch(profile).await;
    }

    let (store, _status) = open_store(profile)?;
    let view = StatusView {
        user_id: profile.user_id.clone(),
        device_id: profile.device_id.clone(),
        db_path: profile.db_path.display().to_string(),
        backend_configured: profile.backend_url.is_some(),
        pending_count: store.pending_count()?,
        last_sync_at: store.last_sync_at()?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        for line in render_status_lines(&view) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Run one sync cycle and echo every status transition as it happens
async fn run_watch(profile: &ResolvedProfile) -> Result<(), CliError> {
    let (dispatcher, status) = build_dispatcher(profile)?;
    let mut rx = status.subscribe();

    let sync_fut = dispatcher.sync();
    tokio::pin!(sync_fut);

    let outcome = loop {
        tokio::select! {
            result = &mut sync_fut => break result,
            changed = rx.changed() => {
                if changed.is_ok() {
                    let snapshot = rx.borrow_and_update().clone();
                    println!("{}", render_transition(&snapshot));
                }
            }
        }
    };

    // The final publish can race the future's completion; drain it.
    if rx.has_changed().unwrap_or(false) {
        let snapshot = rx.borrow_and_update().clone();
        println!("{}", render_transition(&snapshot));
    }

    match outcome? {
        Some(report) => println!(
            "Pushed {}, pulled {}, applied {}",
            report.pushed, report.pulled, report.applied
        ),
        None => println!("Sync skipped; offline or already running"),
    }

    Ok(())
}

fn render_status_lines(view: &StatusView) -> Vec<String> {
    let now_ms = util::unix_timestamp_ms();
    let last_sync = view.last_sync_at.map_or_else(
        || "never".to_string(),
        |at| {
            format!(
                "{} ({})",
                format_timestamp(at),
                format_relative_time(at, now_ms)
            )
        },
    );
    let backend = if view.backend_configured {
        "configured"
    } else {
        "not configured"
    };

    vec![
        format!("User:      {}", view.user_id),
        format!("Device:    {}", view.device_id),
        format!("Database:  {}", view.db_path),
        format!("Backend:   {backend}"),
        format!("Pending:   {} operation(s)", view.pending_count),
        format!("Last sync: {last_sync}"),
    ]
}

fn render_transition(status: &SyncStatus) -> String {
    let phase = phase_label(status.phase);
    match status.error.as_deref() {
        Some(error) => format!("{phase:<10} pending {}  {error}", status.pending_count),
        None => format!("{phase:<10} pending {}", status.pending_count),
    }
}

const fn phase_label(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Idle => "idle",
        SyncPhase::Pushing => "pushing",
        SyncPhase::Pulling => "pulling",
        SyncPhase::Resolving => "resolving",
        SyncPhase::Error => "error",
    }
}
