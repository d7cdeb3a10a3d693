// =============================================================================
// Trailing Rolling Windows — mean / min / max
// =============================================================================
//
// All functions return a series aligned index-for-index with the input.
//
// Windows are trailing and partial at the start of the series: the effective
// window at index i is `min(window, i + 1)`.  A nominal window longer than the
// series therefore degrades to the available length instead of failing, and
// a window of 0 is treated as 1.
//
// Missing entries (NaN) inside a window are skipped; the statistic needs at
// least one valid entry.  The output at index i is NaN whenever the input at
// i itself is NaN.
// =============================================================================

/// Trailing simple moving average.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |valid| {
        valid.iter().sum::<f64>() / valid.len() as f64
    })
}

/// Trailing minimum.
pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |valid| {
        valid.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

/// Trailing maximum.
pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |valid| {
        valid.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Effective window length for a series of `len` observations.
pub fn effective_window(window: usize, len: usize) -> usize {
    window.min(len).max(1)
}

fn rolling_apply<F>(values: &[f64], window: usize, stat: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let window = effective_window(window, values.len());
    let mut result = Vec::with_capacity(values.len());
    let mut valid = Vec::with_capacity(window);

    for i in 0..values.len() {
        if values[i].is_nan() {
            result.push(f64::NAN);
            continue;
        }

        let start = (i + 1).saturating_sub(window);
        valid.clear();
        valid.extend(values[start..=i].iter().copied().filter(|v| !v.is_nan()));

        // values[i] is valid, so `valid` is never empty here.
        result.push(stat(&valid));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_uses_partial_windows_at_start() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        let expected = [1.0, 1.5, 2.0, 3.0];
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "got {a}, expected {b}");
        }
    }

    #[test]
    fn window_longer_than_series_degrades() {
        let out = rolling_mean(&[2.0, 4.0], 12);
        assert!((out[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn single_value_series() {
        assert_eq!(rolling_mean(&[0.7], 12), vec![0.7]);
        assert_eq!(rolling_min(&[0.7], 24), vec![0.7]);
        assert_eq!(rolling_max(&[0.7], 24), vec![0.7]);
    }

    #[test]
    fn zero_window_is_treated_as_one() {
        assert_eq!(rolling_max(&[3.0, 1.0, 2.0], 0), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn min_max_slide() {
        let data = [5.0, 1.0, 4.0, 3.0, 2.0];
        assert_eq!(rolling_min(&data, 2), vec![5.0, 1.0, 1.0, 3.0, 2.0]);
        assert_eq!(rolling_max(&data, 2), vec![5.0, 5.0, 4.0, 4.0, 3.0]);
    }

    #[test]
    fn missing_entries_are_skipped_inside_window() {
        let out = rolling_mean(&[1.0, f64::NAN, 3.0], 3);
        assert!((out[0] - 1.0).abs() < 1e-12);
        assert!(out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input() {
        assert!(rolling_mean(&[], 5).is_empty());
    }
}
