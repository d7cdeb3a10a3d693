// =============================================================================
// Slope Estimators — OLS line fit and mean of first differences
// =============================================================================
//
// Two distinct rate-of-change measures over a trailing window.  They are NOT
// interchangeable:
//
//   OLS slope        fit `y = a*x + b` over x = 0..window-1 and return `a`.
//                    Closed form:  a = Σ(x - x̄)(y - ȳ) / Σ(x - x̄)²
//
//   Mean-diff slope  average of the last `window` first differences
//                    (y_t - y_{t-1}).  Equal weight per step, no line fit.
//
// The OLS window at index i is `series[i - window .. i]`, i.e. it ends just
// BEFORE i.  The mean-diff window ends AT i.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Smallest window for which a line fit is defined.
const MIN_OLS_WINDOW: usize = 2;

/// Which slope estimator the engine runs on the meter series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeMethod {
    Ols,
    MeanDiff,
}

impl Default for SlopeMethod {
    fn default() -> Self {
        Self::Ols
    }
}

impl SlopeMethod {
    pub fn compute(&self, series: &[f64], window: usize) -> Vec<f64> {
        match self {
            Self::Ols => ols_slope(series, window),
            Self::MeanDiff => mean_diff_slope(series, window),
        }
    }
}

impl std::fmt::Display for SlopeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ols => write!(f, "OLS_SLOPE"),
            Self::MeanDiff => write!(f, "MEAN_DIFF_SLOPE"),
        }
    }
}

/// Trailing OLS slope, aligned with `series`.
///
/// NaN for `i < window` and wherever the window holds a NaN.  `window` is
/// raised to 2 when smaller.
pub fn ols_slope(series: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(MIN_OLS_WINDOW);
    let mut result = vec![f64::NAN; series.len()];

    // x = 0..window-1 is fixed, so x̄ and Σ(x - x̄)² are constants.
    let n = window as f64;
    let x_mean = (n - 1.0) / 2.0;
    let sxx: f64 = (0..window).map(|x| (x as f64 - x_mean).powi(2)).sum();

    for i in window..series.len() {
        let win = &series[i - window..i];
        if win.iter().any(|v| v.is_nan()) {
            continue;
        }

        let y_mean = win.iter().sum::<f64>() / n;
        let sxy: f64 = win
            .iter()
            .enumerate()
            .map(|(x, y)| (x as f64 - x_mean) * (y - y_mean))
            .sum();

        result[i] = sxy / sxx;
    }

    result
}

/// Rolling mean of first differences, aligned with `series`.
///
/// The first difference is undefined at index 0, so the first full window
/// ends at index `window`.  NaN wherever the window is not full or holds a
/// NaN difference.
pub fn mean_diff_slope(series: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut result = vec![f64::NAN; series.len()];

    let diffs: Vec<f64> = std::iter::once(f64::NAN)
        .chain(series.windows(2).map(|w| w[1] - w[0]))
        .collect();

    for i in window..diffs.len() {
        let win = &diffs[i + 1 - window..=i];
        if win.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = win.iter().sum::<f64>() / window as f64;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ols_increasing_series_is_positive() {
        let series: Vec<f64> = (0..20).map(|i| (i as f64).powf(1.3)).collect();
        let slope = ols_slope(&series, 3);
        for (i, s) in slope.iter().enumerate() {
            if i < 3 {
                assert!(s.is_nan());
            } else {
                assert!(*s > 0.0, "index {i}: {s}");
            }
        }
    }

    #[test]
    fn ols_decreasing_series_is_negative() {
        let series: Vec<f64> = (0..20).map(|i| 1.0 - (i as f64) * 0.03).collect();
        let slope = ols_slope(&series, 3);
        assert!(slope[3..].iter().all(|s| *s < 0.0));
    }

    #[test]
    fn ols_window_three_matches_closed_form() {
        // For x = 0,1,2 the slope is (y2 - y0) / 2.
        let series = [1.0, 4.0, 2.0, 9.0, 0.0];
        let slope = ols_slope(&series, 3);
        assert!((slope[3] - (2.0 - 1.0) / 2.0).abs() < 1e-12);
        assert!((slope[4] - (9.0 - 4.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn ols_window_excludes_current_value() {
        let series = [0.0, 1.0, 2.0, -100.0];
        let slope = ols_slope(&series, 3);
        assert!((slope[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ols_missing_in_window_is_missing() {
        let series = [0.0, f64::NAN, 2.0, 3.0, 4.0, 5.0];
        let slope = ols_slope(&series, 3);
        assert!(slope[3].is_nan());
        assert!(slope[4].is_nan());
        assert!((slope[5] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ols_short_series_is_all_missing() {
        assert!(ols_slope(&[0.5, 0.6], 3).iter().all(|s| s.is_nan()));
        assert!(ols_slope(&[], 3).is_empty());
    }

    #[test]
    fn mean_diff_known_values() {
        let series = [0.0, 1.0, 3.0, 6.0, 10.0];
        let slope = mean_diff_slope(&series, 3);
        assert!(slope[..3].iter().all(|s| s.is_nan()));
        // diffs 1, 2, 3 -> 2
        assert!((slope[3] - 2.0).abs() < 1e-12);
        // diffs 2, 3, 4 -> 3
        assert!((slope[4] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn mean_diff_differs_from_ols() {
        let series = [0.0, 1.0, 3.0, 6.0, 10.0];
        let ols = ols_slope(&series, 3);
        let md = mean_diff_slope(&series, 3);
        assert!((ols[4] - md[4]).abs() > 1e-6);
    }

    #[test]
    fn method_dispatch() {
        let series = [0.0, 1.0, 2.0, 3.0, 4.0];
        let a = SlopeMethod::Ols.compute(&series, 3);
        let b = SlopeMethod::MeanDiff.compute(&series, 3);
        assert!((a[4] - 1.0).abs() < 1e-12);
        assert!((b[4] - 1.0).abs() < 1e-12);
    }
}
