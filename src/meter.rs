// =============================================================================
// Composite Meter Pipeline — two raw signals in, one bounded oscillator out
// =============================================================================
//
// Blended mode (production):
//
//   1. Centering         oi_c = oi - SMA(oi, W1)        pa_c = pa - SMA(pa, W1)
//   2. Adaptive weight   w    = clip((oi - 0.5) * 2, 0.2, 0.8)
//   3. Blend             c    = w * oi_c + (1 - w) * pa_c
//   4. Double EMA        s    = 2 * EMA(c, 3) - EMA(EMA(c, 3), 3)
//   5. Rescale           m    = clip((s - min_W2(s)) / (max_W2(s) - min_W2(s) + eps), 0, 1)
//
// When the open-interest signal is strongly skewed the weight saturates at
// 0.8 and it dominates the blend; near its midpoint the blend leans 80/20
// toward price action.  Neither input is ever fully excluded.
//
// Simple mode: c = (oi + pa) / 2, s = SMA(c, 5); the state machine then
// watches `s` instead of a rescaled value.  The slope is always taken on `c`.
//
// Missing inputs propagate: NaN at t in either raw series gives NaN in every
// derived column at t.  An absent raw column gives all-NaN output for that
// instrument.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::frame::Frame;
use crate::indicators::{calculate_double_ema, rolling_max, rolling_mean, rolling_min, SlopeMethod};
use crate::types::Instrument;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_center_window() -> usize {
    12
}

fn default_scale_window() -> usize {
    24
}

fn default_ema_span() -> usize {
    3
}

fn default_weight_floor() -> f64 {
    0.2
}

fn default_weight_ceiling() -> f64 {
    0.8
}

fn default_epsilon() -> f64 {
    1e-8
}

fn default_simple_smooth_window() -> usize {
    5
}

fn default_slope_window() -> usize {
    3
}

// =============================================================================
// Parameters
// =============================================================================

/// Which composite formula the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    Blended,
    Simple,
}

impl Default for CompositeMode {
    fn default() -> Self {
        Self::Blended
    }
}

/// Tunable parameters of the meter pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineParams {
    #[serde(default)]
    pub mode: CompositeMode,

    /// Centering SMA window (W1).
    #[serde(default = "default_center_window")]
    pub center_window: usize,

    /// Rolling min/max rescale window (W2).
    #[serde(default = "default_scale_window")]
    pub scale_window: usize,

    /// Span of both EMA passes in the double-EMA smoother.
    #[serde(default = "default_ema_span")]
    pub ema_span: usize,

    /// Lower bound of the adaptive open-interest weight.
    #[serde(default = "default_weight_floor")]
    pub weight_floor: f64,

    /// Upper bound of the adaptive open-interest weight.
    #[serde(default = "default_weight_ceiling")]
    pub weight_ceiling: f64,

    /// Added to the rescale denominator so a flat window does not divide by 0.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// SMA window of the simple-mode smoother.
    #[serde(default = "default_simple_smooth_window")]
    pub simple_smooth_window: usize,

    #[serde(default)]
    pub slope_method: SlopeMethod,

    #[serde(default = "default_slope_window")]
    pub slope_window: usize,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            mode: CompositeMode::Blended,
            center_window: default_center_window(),
            scale_window: default_scale_window(),
            ema_span: default_ema_span(),
            weight_floor: default_weight_floor(),
            weight_ceiling: default_weight_ceiling(),
            epsilon: default_epsilon(),
            simple_smooth_window: default_simple_smooth_window(),
            slope_method: SlopeMethod::Ols,
            slope_window: default_slope_window(),
        }
    }
}

impl PipelineParams {
    /// The lighter variant: unweighted mean, SMA(5) smoothing, mean-diff slope.
    pub fn simple() -> Self {
        Self {
            mode: CompositeMode::Simple,
            slope_method: SlopeMethod::MeanDiff,
            ..Self::default()
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// Derived columns for one instrument, aligned with the session frame.
#[derive(Debug, Clone, Serialize)]
pub struct MeterSeries {
    pub mode: CompositeMode,
    /// False when a required raw column was absent; every series is NaN.
    pub inputs_present: bool,
    pub composite: Vec<f64>,
    pub smoothed: Vec<f64>,
    /// Slope of `composite` in both modes.
    pub slope: Vec<f64>,
}

impl MeterSeries {
    fn missing(mode: CompositeMode, len: usize) -> Self {
        Self {
            mode,
            inputs_present: false,
            composite: vec![f64::NAN; len],
            smoothed: vec![f64::NAN; len],
            slope: vec![f64::NAN; len],
        }
    }

    /// The series the signal state machine consumes.
    pub fn watched(&self) -> &[f64] {
        match self.mode {
            CompositeMode::Blended => &self.composite,
            CompositeMode::Simple => &self.smoothed,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Run the meter pipeline for `instrument` over `frame`.
pub fn compute_meter(frame: &Frame, instrument: &Instrument, params: &PipelineParams) -> MeterSeries {
    let iss_col = instrument.iss_column();
    let pa_col = instrument.price_action_column();

    let (Some(oi), Some(pa)) = (frame.column(&iss_col), frame.column(&pa_col)) else {
        warn!(
            instrument = %instrument,
            has_iss = frame.has_column(&iss_col),
            has_price_action = frame.has_column(&pa_col),
            "required raw column absent, meter is all-missing"
        );
        return MeterSeries::missing(params.mode, frame.len());
    };

    let (composite, smoothed) = match params.mode {
        CompositeMode::Blended => blended_composite(oi, pa, params),
        CompositeMode::Simple => simple_composite(oi, pa, params),
    };

    let slope = params.slope_method.compute(&composite, params.slope_window);

    debug!(
        instrument = %instrument,
        rows = frame.len(),
        mode = ?params.mode,
        slope_method = %params.slope_method,
        last = ?composite.last(),
        "meter computed"
    );

    MeterSeries {
        mode: params.mode,
        inputs_present: true,
        composite,
        smoothed,
        slope,
    }
}

/// Blended composite.  Returns `(normalized, smoothed)`.
pub fn blended_composite(oi: &[f64], pa: &[f64], params: &PipelineParams) -> (Vec<f64>, Vec<f64>) {
    debug_assert_eq!(oi.len(), pa.len());

    let oi_centered = center(oi, params.center_window);
    let pa_centered = center(pa, params.center_window);

    let blend: Vec<f64> = oi
        .iter()
        .zip(oi_centered.iter().zip(&pa_centered))
        .map(|(&raw, (&oc, &pc))| {
            let w = adaptive_weight(raw, params.weight_floor, params.weight_ceiling);
            w * oc + (1.0 - w) * pc
        })
        .collect();

    let smoothed = calculate_double_ema(&blend, params.ema_span);

    let lo = rolling_min(&smoothed, params.scale_window);
    let hi = rolling_max(&smoothed, params.scale_window);
    let normalized = smoothed
        .iter()
        .zip(lo.iter().zip(&hi))
        .map(|(&s, (&mn, &mx))| clip((s - mn) / (mx - mn + params.epsilon), 0.0, 1.0))
        .collect();

    (normalized, smoothed)
}

/// Simple composite.  Returns `(mean, smoothed mean)`.
pub fn simple_composite(oi: &[f64], pa: &[f64], params: &PipelineParams) -> (Vec<f64>, Vec<f64>) {
    let composite: Vec<f64> = oi.iter().zip(pa).map(|(a, b)| (a + b) / 2.0).collect();
    let smoothed = rolling_mean(&composite, params.simple_smooth_window);
    (composite, smoothed)
}

/// Adaptive open-interest blend weight.
pub fn adaptive_weight(oi_raw: f64, floor: f64, ceiling: f64) -> f64 {
    clip((oi_raw - 0.5) * 2.0, floor, ceiling)
}

fn center(values: &[f64], window: usize) -> Vec<f64> {
    let sma = rolling_mean(values, window);
    values.iter().zip(&sma).map(|(v, m)| v - m).collect()
}

/// Clamp that keeps NaN as NaN and never panics on an inverted range.
fn clip(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        f64::NAN
    } else {
        value.max(lo).min(hi)
    }
}
