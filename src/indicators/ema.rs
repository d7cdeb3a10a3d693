// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Recursive EMA over an aligned series, with span-based smoothing:
//
//   alpha  = 2 / (span + 1)
//   EMA_t  = x_t * alpha + EMA_{t-1} * (1 - alpha)
//
// The first valid observation seeds the filter (no SMA warm-up), so the
// output is the same length as the input and index-aligned with it.
//
// Missing observations (NaN) produce NaN at their own index and are skipped:
// the filter state carries over to the next valid observation unchanged.
// =============================================================================

/// Compute the span-based EMA of `values`, aligned index-for-index.
///
/// # Edge cases
/// - `span == 0` is treated as `span == 1` (alpha = 1, the identity filter).
/// - Leading NaNs stay NaN until the first valid observation.
/// - Interior NaNs stay NaN at their index; the state is not reset.
pub fn calculate_ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);

    let mut result = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &value in values {
        if value.is_nan() {
            result.push(f64::NAN);
            continue;
        }

        let ema = match prev {
            Some(p) => value * alpha + p * (1.0 - alpha),
            None => value,
        };
        prev = Some(ema);
        result.push(ema);
    }

    result
}

/// Double-EMA ("zero-lag") smoother: `2 * EMA(x) - EMA(EMA(x))`.
///
/// Lags less than a single EMA of the same span, at the cost of a slight
/// overshoot whenever the input changes direction.
pub fn calculate_double_ema(values: &[f64], span: usize) -> Vec<f64> {
    let ema1 = calculate_ema(values, span);
    let ema2 = calculate_ema(&ema1, span);

    ema1.iter().zip(&ema2).map(|(e1, e2)| 2.0 * e1 - e2).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 3).is_empty());
    }

    #[test]
    fn ema_seeds_with_first_value() {
        let ema = calculate_ema(&[4.0, 4.0, 4.0], 3);
        assert_eq!(ema.len(), 3);
        for v in ema {
            assert!((v - 4.0).abs() < 1e-12);
        }
    }

    #[test]
    fn ema_known_values_span_3() {
        // alpha = 0.5
        let ema = calculate_ema(&[0.0, 2.0, 4.0, 4.0], 3);
        let expected = [0.0, 1.0, 2.5, 3.25];
        for (a, b) in ema.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_span_zero_is_identity() {
        let ema = calculate_ema(&[1.0, 5.0, -2.0], 0);
        assert_eq!(ema, vec![1.0, 5.0, -2.0]);
    }

    #[test]
    fn ema_missing_values_stay_missing_and_state_carries() {
        let ema = calculate_ema(&[f64::NAN, 2.0, f64::NAN, 4.0], 3);
        assert!(ema[0].is_nan());
        assert!((ema[1] - 2.0).abs() < 1e-12);
        assert!(ema[2].is_nan());
        // 4 * 0.5 + 2 * 0.5
        assert!((ema[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn double_ema_tracks_constant_exactly() {
        let dema = calculate_double_ema(&[7.0; 10], 3);
        for v in dema {
            assert!((v - 7.0).abs() < 1e-12);
        }
    }

    #[test]
    fn double_ema_overshoots_after_step() {
        let mut input = vec![0.0; 5];
        input.extend(vec![1.0; 5]);
        let single = calculate_ema(&input, 3);
        let dema = calculate_double_ema(&input, 3);
        // Less lag than the single EMA right after the step.
        assert!(dema[5] > single[5]);
        // And it overshoots the new level at some point.
        assert!(dema.iter().any(|&v| v > 1.0));
    }
}
