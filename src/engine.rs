// =============================================================================
// Cycle Engine — one refresh cycle from feed snapshot to published snapshot
// =============================================================================
//
//   FeedTable ──session filter──▶ Frame
//        for each instrument (independent, no shared state):
//            meter pipeline ─▶ slope ─▶ signal state machine
//   Frame + derived columns + events ──▶ CycleSnapshot (immutable)
//
// `compute_instrument` is the unit of work the refresh service hands to a
// blocking worker; `run_cycle` is the synchronous path used by tests and
// one-shot callers.  Both produce identical snapshots for the same input.
// =============================================================================

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::feed::FeedTable;
use crate::frame::Frame;
use crate::meter::{compute_meter, MeterSeries, PipelineParams};
use crate::runtime_config::EngineConfig;
use crate::session::SessionWindow;
use crate::signals::{MachineState, SignalEvent, SignalInputs, SignalParams, SignalStateMachine};
use crate::types::Instrument;

// =============================================================================
// Per-instrument result
// =============================================================================

/// Everything computed for one instrument in one cycle.
#[derive(Debug, Clone)]
pub struct InstrumentResult {
    pub instrument: Instrument,
    pub series: MeterSeries,
    pub price_available: bool,
    pub events: Vec<SignalEvent>,
    pub final_state: MachineState,
}

/// Run pipeline, slope and state machine for one instrument.
pub fn compute_instrument(
    frame: &Frame,
    instrument: &Instrument,
    pipeline: &PipelineParams,
    signals: &SignalParams,
) -> InstrumentResult {
    let series = compute_meter(frame, instrument, pipeline);
    let prices = frame.column(&instrument.price_column());

    let inputs = SignalInputs::new(frame.timestamps(), series.watched(), &series.slope).with_prices(prices);
    let (events, final_state) = SignalStateMachine::new(signals.clone()).replay(&inputs);

    debug!(
        instrument = %instrument,
        inputs_present = series.inputs_present,
        events = events.len(),
        position = %final_state.position,
        "instrument computed"
    );

    InstrumentResult {
        instrument: instrument.clone(),
        price_available: prices.is_some(),
        series,
        events,
        final_state,
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Per-instrument part of a published snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSummary {
    pub instrument: Instrument,
    /// False when a required raw column was absent from the feed.
    pub inputs_present: bool,
    pub price_confirmation_available: bool,
    /// Last non-missing value of the watched meter.
    pub latest_value: Option<f64>,
    pub latest_slope: Option<f64>,
    pub final_state: MachineState,
    pub events: Vec<SignalEvent>,
}

/// Immutable result of one refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSnapshot {
    pub cycle_id: String,
    pub session_date: NaiveDate,
    pub last_updated: DateTime<Utc>,
    pub rows: usize,
    /// Columns a dashboard plots by default.
    pub plot_columns: Vec<String>,
    /// Session frame augmented with every instrument's derived columns.
    pub frame: Frame,
    pub instruments: Vec<InstrumentSummary>,
}

/// An event tagged with the instrument that emitted it.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedEvent<'a> {
    pub instrument: &'a str,
    #[serde(flatten)]
    pub event: &'a SignalEvent,
}

impl CycleSnapshot {
    pub fn instrument(&self, name: &str) -> Option<&InstrumentSummary> {
        self.instruments
            .iter()
            .find(|s| s.instrument.name.eq_ignore_ascii_case(name))
    }

    /// Raw and derived columns of one instrument, on the session axis.
    pub fn instrument_frame(&self, instrument: &Instrument) -> Frame {
        let names = [
            instrument.iss_column(),
            instrument.price_action_column(),
            instrument.price_column(),
            instrument.composite_column(),
            instrument.smoothed_column(),
            instrument.slope_column(),
        ];
        self.frame.select(names.iter().map(String::as_str))
    }

    /// All events across instruments, ordered by timestamp (instrument order
    /// breaks ties).
    pub fn all_events(&self) -> Vec<TaggedEvent<'_>> {
        let mut events: Vec<TaggedEvent<'_>> = self
            .instruments
            .iter()
            .flat_map(|s| {
                s.events.iter().map(move |event| TaggedEvent {
                    instrument: s.instrument.name.as_str(),
                    event,
                })
            })
            .collect();
        events.sort_by_key(|t| t.event.timestamp);
        events
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        self.frame.timestamps()
    }
}

/// Default plot columns: every raw input, then every composite.
pub fn default_plot_columns(instruments: &[Instrument]) -> Vec<String> {
    let iss = instruments.iter().map(Instrument::iss_column);
    let pa = instruments.iter().map(Instrument::price_action_column);
    let composite = instruments.iter().map(Instrument::composite_column);
    iss.chain(pa).chain(composite).collect()
}

/// Merge per-instrument results into the published snapshot.
pub fn assemble_snapshot(
    mut frame: Frame,
    session_date: NaiveDate,
    instruments: &[Instrument],
    results: Vec<InstrumentResult>,
) -> Result<CycleSnapshot> {
    let mut summaries = Vec::with_capacity(results.len());

    for result in results {
        let instrument = result.instrument;
        let latest = |series: &[f64]| series.iter().rev().copied().find(|v| !v.is_nan());
        let latest_value = latest(result.series.watched());
        let latest_slope = latest(&result.series.slope);

        frame.insert_column(instrument.composite_column(), result.series.composite)?;
        frame.insert_column(instrument.smoothed_column(), result.series.smoothed)?;
        frame.insert_column(instrument.slope_column(), result.series.slope)?;

        summaries.push(InstrumentSummary {
            instrument,
            inputs_present: result.series.inputs_present,
            price_confirmation_available: result.price_available,
            latest_value,
            latest_slope,
            final_state: result.final_state,
            events: result.events,
        });
    }

    let snapshot = CycleSnapshot {
        cycle_id: Uuid::new_v4().to_string(),
        session_date,
        last_updated: Utc::now(),
        rows: frame.len(),
        plot_columns: default_plot_columns(instruments),
        frame,
        instruments: summaries,
    };

    info!(
        cycle_id = %snapshot.cycle_id,
        session_date = %snapshot.session_date,
        rows = snapshot.rows,
        events = snapshot.instruments.iter().map(|s| s.events.len()).sum::<usize>(),
        "cycle complete"
    );

    Ok(snapshot)
}

/// Run one full cycle synchronously.
pub fn run_cycle(config: &EngineConfig, table: &FeedTable, session: &SessionWindow) -> Result<CycleSnapshot> {
    let frame = session.filter(table);
    let results = config
        .instruments
        .iter()
        .map(|instrument| compute_instrument(&frame, instrument, &config.pipeline, &config.signals))
        .collect();
    assemble_snapshot(frame, session.date, &config.instruments, results)
}
