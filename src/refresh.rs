// =============================================================================
// Refresh Loop — periodic cycle over the on-disk feed snapshot
// =============================================================================
//
// Runs as a background Tokio task, waking every `refresh_interval_secs` to:
//   1. Re-read the feed snapshot from `feed_path`.
//   2. Derive the session date from the exchange clock and filter the feed.
//   3. Run each instrument on its own blocking worker.
//   4. Publish the merged snapshot into `AppState`.
//
// A failed cycle is logged and recorded; the previous snapshot stays
// published.  The loop is spawned once at startup:
//
//   tokio::spawn(run_refresh_loop(Arc::clone(&state)));
//
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::app_state::AppState;
use crate::engine::{assemble_snapshot, compute_instrument};
use crate::feed::FeedTable;

/// Run the refresh loop forever.
pub async fn run_refresh_loop(state: Arc<AppState>) {
    let interval_secs = state.config.read().refresh_interval_secs.max(1);
    info!(interval_secs, "Refresh loop started");

    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Err(e) = refresh_once(&state).await {
            error!(error = %format!("{e:#}"), "Refresh cycle failed, keeping previous snapshot");
            state.push_error(format!("{e:#}"));
        }
    }
}

/// Run one cycle and publish it.
pub async fn refresh_once(state: &AppState) -> Result<()> {
    let config = state.config.read().clone();

    let feed_path = config.feed_path.clone();
    let table = tokio::task::spawn_blocking(move || FeedTable::from_path(&feed_path))
        .await
        .context("feed reader task panicked")??;

    let session = config.session.window_for(config.session.exchange_date(Utc::now()));
    let frame = Arc::new(session.filter(&table));

    debug!(
        feed_rows = table.row_count(),
        session_rows = frame.len(),
        date = %session.date,
        "Feed snapshot loaded"
    );

    let handles: Vec<_> = config
        .instruments
        .iter()
        .cloned()
        .map(|instrument| {
            let frame = Arc::clone(&frame);
            let pipeline = config.pipeline.clone();
            let signals = config.signals.clone();
            tokio::task::spawn_blocking(move || compute_instrument(&frame, &instrument, &pipeline, &signals))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.context("instrument worker panicked")?);
    }

    let frame = Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone());
    let snapshot = assemble_snapshot(frame, session.date, &config.instruments, results)?;
    state.publish(snapshot);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::EngineConfig;
    use chrono::{Duration as ChronoDuration, FixedOffset};

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("meter-refresh-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Rows stamped at the current exchange time, so they land in "today".
    fn todays_feed(config: &EngineConfig, rows: usize) -> String {
        let offset = FixedOffset::east_opt(config.session.exchange_utc_offset_minutes * 60).unwrap();
        let date = Utc::now().with_timezone(&offset).date_naive();
        let open = date.and_time(config.session.market_open);
        let mut csv = String::from("Timestamp,Nifty_ISS,Nifty_Price_Action\n");
        for i in 0..rows {
            let ts = open + ChronoDuration::minutes(i as i64);
            let v = 0.4 + 0.01 * i as f64;
            csv.push_str(&format!("{},{v},{v}\n", ts.format("%Y-%m-%d %H:%M:%S")));
        }
        csv
    }

    #[tokio::test]
    async fn refresh_publishes_snapshot() {
        let dir = temp_dir();
        let path = dir.join("feed.csv");
        let mut config = EngineConfig::default();
        config.feed_path = path.to_string_lossy().into_owned();
        std::fs::write(&path, todays_feed(&config, 20)).unwrap();

        let state = AppState::new(config);
        refresh_once(&state).await.unwrap();

        let snapshot = state.latest().unwrap();
        assert_eq!(snapshot.rows, 20);
        assert_eq!(snapshot.instruments.len(), 2);
        assert!(snapshot.frame.has_column("Nifty_Composite"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let dir = temp_dir();
        let path = dir.join("feed.csv");
        let mut config = EngineConfig::default();
        config.feed_path = path.to_string_lossy().into_owned();
        std::fs::write(&path, todays_feed(&config, 5)).unwrap();

        let state = AppState::new(config);
        refresh_once(&state).await.unwrap();
        let first = state.latest().unwrap().cycle_id.clone();

        std::fs::remove_file(&path).unwrap();
        assert!(refresh_once(&state).await.is_err());
        assert_eq!(state.latest().unwrap().cycle_id, first);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
