// =============================================================================
// Signal State Machine — FLAT / LONG / SHORT over the meter series
// =============================================================================
//
// Walks the meter in strict index order and emits at most one event per bar.
//
// Per bar:
//   1. Missing value → nothing happens (the bar still counts as elapsed).
//   2. Track the running peak (LONG) or trough (SHORT).
//   3. Arm: a direction starts disarmed and is disarmed again by an exit; it
//      arms once the value is at or inside its entry level.
//   4. Cooldown: no event within `cooldown_bars` of the previous one.
//   5. FLAT  → try LONG entry, then SHORT entry.
//      LONG  → try reverse to SHORT, then exit.
//      SHORT → try reverse to LONG, then exit.
//
// Entry (LONG; SHORT mirrors):
//   armed, outside the neutral band, value > long_entry_level for the last
//   `confirmation_bars` bars, slope > min_momentum, price rising (optional).
//
// Exit (LONG):
//   trailing stop    value < peak * (1 - trailing_stop_pct)
//   watch level      value < long_exit_level and slope below min_momentum
//                    (a missing slope counts as below)
//   momentum         slope < -exit_momentum
//
// SHORT trails in inverted space: (1 - value) < (1 - trough) * (1 - pct).
//
// The machine itself is stateless; all mutable state is in `MachineState`,
// so a caller can replay a whole session or continue from a saved state.
// =============================================================================

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use super::params::SignalParams;
use crate::types::{PositionState, SignalKind};

// =============================================================================
// Inputs / outputs
// =============================================================================

/// Aligned per-bar inputs for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    pub timestamps: &'a [NaiveDateTime],
    /// The watched meter series.
    pub values: &'a [f64],
    pub slopes: &'a [f64],
    /// Raw price, when the feed carries one for this instrument.
    pub prices: Option<&'a [f64]>,
}

impl<'a> SignalInputs<'a> {
    pub fn new(timestamps: &'a [NaiveDateTime], values: &'a [f64], slopes: &'a [f64]) -> Self {
        Self {
            timestamps,
            values,
            slopes,
            prices: None,
        }
    }

    pub fn with_prices(mut self, prices: Option<&'a [f64]>) -> Self {
        self.prices = prices;
        self
    }

    /// Number of bars the machine can walk.
    pub fn len(&self) -> usize {
        self.values.len().min(self.timestamps.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slope(&self, i: usize) -> f64 {
        self.slopes.get(i).copied().unwrap_or(f64::NAN)
    }
}

/// A discrete transition, with chart metadata attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvent {
    pub timestamp: NaiveDateTime,
    pub index: usize,
    /// Meter value at the bar that fired.
    pub value: f64,
    pub kind: SignalKind,
    pub color: &'static str,
    pub label: &'static str,
    pub reason: String,
}

impl SignalEvent {
    fn new(timestamp: NaiveDateTime, index: usize, value: f64, kind: SignalKind, reason: String) -> Self {
        Self {
            timestamp,
            index,
            value,
            kind,
            color: kind.color(),
            label: kind.label(),
            reason,
        }
    }
}

// =============================================================================
// MachineState
// =============================================================================

/// Everything the machine carries from one bar to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MachineState {
    pub position: PositionState,
    /// Highest value since the LONG entry.
    pub peak: Option<f64>,
    /// Lowest value since the SHORT entry.
    pub trough: Option<f64>,
    pub last_signal_index: Option<usize>,
    pub armed_long: bool,
    pub armed_short: bool,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            position: PositionState::Flat,
            peak: None,
            trough: None,
            last_signal_index: None,
            armed_long: false,
            armed_short: false,
        }
    }
}

impl MachineState {
    fn apply(&mut self, kind: SignalKind, index: usize, value: f64) {
        match kind {
            SignalKind::EnterLong | SignalKind::ReverseToLong => {
                if kind == SignalKind::ReverseToLong {
                    self.armed_short = false;
                }
                self.peak = Some(value);
                self.trough = None;
            }
            SignalKind::EnterShort | SignalKind::ReverseToShort => {
                if kind == SignalKind::ReverseToShort {
                    self.armed_long = false;
                }
                self.trough = Some(value);
                self.peak = None;
            }
            SignalKind::ExitLong => {
                self.armed_long = false;
                self.peak = None;
            }
            SignalKind::ExitShort => {
                self.armed_short = false;
                self.trough = None;
            }
        }
        self.position = kind.resulting_position();
        self.last_signal_index = Some(index);
    }
}

// =============================================================================
// SignalStateMachine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Long,
    Short,
}

/// Applies one `SignalParams` policy to meter inputs.
#[derive(Debug, Clone, Default)]
pub struct SignalStateMachine {
    params: SignalParams,
}

impl SignalStateMachine {
    pub fn new(params: SignalParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    /// Replay a whole session from a fresh state.
    pub fn replay(&self, inputs: &SignalInputs<'_>) -> (Vec<SignalEvent>, MachineState) {
        self.replay_from(MachineState::default(), inputs, 0)
    }

    /// Continue from `state`, walking bars `start..`.
    pub fn replay_from(
        &self,
        mut state: MachineState,
        inputs: &SignalInputs<'_>,
        start: usize,
    ) -> (Vec<SignalEvent>, MachineState) {
        let events: Vec<SignalEvent> = (start..inputs.len())
            .filter_map(|i| self.observe(&mut state, inputs, i))
            .collect();
        (events, state)
    }

    /// Process bar `i`, updating `state`.  Returns the event fired, if any.
    pub fn observe(&self, state: &mut MachineState, inputs: &SignalInputs<'_>, i: usize) -> Option<SignalEvent> {
        let (Some(&value), Some(&timestamp)) = (inputs.values.get(i), inputs.timestamps.get(i)) else {
            return None;
        };
        if value.is_nan() {
            return None;
        }
        let slope = inputs.slope(i);
        let p = &self.params;

        match state.position {
            PositionState::Long => state.peak = Some(state.peak.map_or(value, |pk| pk.max(value))),
            PositionState::Short => state.trough = Some(state.trough.map_or(value, |tr| tr.min(value))),
            PositionState::Flat => {}
        }

        if value <= p.long_entry_level {
            state.armed_long = true;
        }
        if value >= p.short_entry_level {
            state.armed_short = true;
        }

        if let Some(last) = state.last_signal_index {
            if i.saturating_sub(last) <= p.cooldown_bars {
                return None;
            }
        }

        let (kind, reason) = match state.position {
            PositionState::Flat => {
                if self.entry_ok(Direction::Long, state, inputs, i, p.min_momentum) {
                    (SignalKind::EnterLong, format!("value {:.3} above {:.2} with slope {:.4}", value, p.long_entry_level, slope))
                } else if self.entry_ok(Direction::Short, state, inputs, i, p.min_momentum) {
                    (SignalKind::EnterShort, format!("value {:.3} below {:.2} with slope {:.4}", value, p.short_entry_level, slope))
                } else {
                    return None;
                }
            }
            PositionState::Long => {
                if p.allow_reverse
                    && self.entry_ok(Direction::Short, state, inputs, i, self.reverse_momentum())
                {
                    (SignalKind::ReverseToShort, format!("reverse: value {:.3} below {:.2} with slope {:.4}", value, p.short_entry_level, slope))
                } else {
                    (SignalKind::ExitLong, self.long_exit_reason(state, value, slope)?)
                }
            }
            PositionState::Short => {
                if p.allow_reverse
                    && self.entry_ok(Direction::Long, state, inputs, i, self.reverse_momentum())
                {
                    (SignalKind::ReverseToLong, format!("reverse: value {:.3} above {:.2} with slope {:.4}", value, p.long_entry_level, slope))
                } else {
                    (SignalKind::ExitShort, self.short_exit_reason(state, value, slope)?)
                }
            }
        };

        state.apply(kind, i, value);

        debug!(
            index = i,
            %timestamp,
            value,
            slope,
            kind = %kind,
            reason = %reason,
            "signal fired"
        );

        Some(SignalEvent::new(timestamp, i, value, kind, reason))
    }

    fn reverse_momentum(&self) -> f64 {
        self.params.min_momentum * self.params.reverse_momentum_multiplier
    }

    fn entry_ok(
        &self,
        dir: Direction,
        state: &MachineState,
        inputs: &SignalInputs<'_>,
        i: usize,
        momentum: f64,
    ) -> bool {
        let p = &self.params;
        let value = inputs.values[i];
        let slope = inputs.slope(i);

        let armed = match dir {
            Direction::Long => state.armed_long,
            Direction::Short => state.armed_short,
        };
        if !armed || p.in_neutral_band(value) {
            return false;
        }

        let k = p.effective_confirmation();
        if i + 1 < k {
            return false;
        }
        let beyond = |v: &f64| match dir {
            Direction::Long => *v > p.long_entry_level,
            Direction::Short => *v < p.short_entry_level,
        };
        if !inputs.values[i + 1 - k..=i].iter().all(beyond) {
            return false;
        }

        let momentum_ok = match dir {
            Direction::Long => slope.is_finite() && slope > momentum,
            Direction::Short => slope.is_finite() && slope < -momentum,
        };
        momentum_ok && self.price_agrees(dir, inputs, i)
    }

    fn price_agrees(&self, dir: Direction, inputs: &SignalInputs<'_>, i: usize) -> bool {
        if !self.params.require_price_confirmation {
            return true;
        }
        let Some(prices) = inputs.prices else {
            return true;
        };
        if i == 0 {
            return false;
        }
        let (Some(&prev), Some(&cur)) = (prices.get(i - 1), prices.get(i)) else {
            return false;
        };
        match dir {
            Direction::Long => cur > prev,
            Direction::Short => cur < prev,
        }
    }

    fn long_exit_reason(&self, state: &MachineState, value: f64, slope: f64) -> Option<String> {
        let p = &self.params;
        if let Some(peak) = state.peak {
            let stop = peak * (1.0 - p.trailing_stop_pct);
            if value < stop {
                return Some(format!("trailing stop: {:.3} below {:.3} (peak {:.3})", value, stop, peak));
            }
        }
        if value < p.long_exit_level && (slope.is_nan() || slope < p.min_momentum) {
            return Some(format!("below exit level {:.2} with weakened momentum", p.long_exit_level));
        }
        if slope < -p.exit_momentum {
            return Some(format!("momentum reversal: slope {:.4}", slope));
        }
        None
    }

    fn short_exit_reason(&self, state: &MachineState, value: f64, slope: f64) -> Option<String> {
        let p = &self.params;
        if let Some(trough) = state.trough {
            let stop = (1.0 - trough) * (1.0 - p.trailing_stop_pct);
            if 1.0 - value < stop {
                return Some(format!("trailing stop: {:.3} above {:.3} (trough {:.3})", value, 1.0 - stop, trough));
            }
        }
        if value > p.short_exit_level && (slope.is_nan() || slope > -p.min_momentum) {
            return Some(format!("above exit level {:.2} with weakened momentum", p.short_exit_level));
        }
        if slope > p.exit_momentum {
            return Some(format!("momentum reversal: slope {:.4}", slope));
        }
        None
    }
}
