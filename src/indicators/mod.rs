// =============================================================================
// Series Indicators Module
// =============================================================================
//
// Pure, side-effect-free series transforms used by the meter pipeline.  Every
// function returns a series aligned index-for-index with its input, with NaN
// marking positions where the value is undefined or depends on a missing
// input.

pub mod ema;
pub mod rolling;
pub mod slope;

pub use ema::{calculate_double_ema, calculate_ema};
pub use rolling::{rolling_max, rolling_mean, rolling_min};
pub use slope::{mean_diff_slope, ols_slope, SlopeMethod};
