// =============================================================================
// Signal Parameters — one configurable policy with named presets
// =============================================================================
//
// Every threshold the state machine consults lives here.  Rule-set variants
// are presets over the same struct rather than separate code paths:
//
//   default  entry 0.60 / 0.40, cooldown 3, trailing 10%, no price check
//   strict   entry 0.65 / 0.35, cooldown 5, trailing 8%, price must agree
//
// All values are in meter units ([0, 1]) except the bar counts.
// =============================================================================

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

fn default_long_entry_level() -> f64 {
    0.60
}

fn default_short_entry_level() -> f64 {
    0.40
}

fn default_long_exit_level() -> f64 {
    0.45
}

fn default_short_exit_level() -> f64 {
    0.55
}

fn default_neutral_band_low() -> f64 {
    0.45
}

fn default_neutral_band_high() -> f64 {
    0.55
}

fn default_min_momentum() -> f64 {
    0.02
}

fn default_exit_momentum() -> f64 {
    0.05
}

fn default_trailing_stop_pct() -> f64 {
    0.10
}

fn default_cooldown_bars() -> usize {
    3
}

fn default_confirmation_bars() -> usize {
    3
}

fn default_allow_reverse() -> bool {
    true
}

fn default_reverse_momentum_multiplier() -> f64 {
    2.0
}

/// Thresholds for the FLAT / LONG / SHORT state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    /// LONG entry requires the meter above this level.
    #[serde(default = "default_long_entry_level")]
    pub long_entry_level: f64,

    /// SHORT entry requires the meter below this level.
    #[serde(default = "default_short_entry_level")]
    pub short_entry_level: f64,

    /// LONG watch level: below it with weakened momentum exits.
    #[serde(default = "default_long_exit_level")]
    pub long_exit_level: f64,

    /// SHORT watch level: above it with weakened momentum exits.
    #[serde(default = "default_short_exit_level")]
    pub short_exit_level: f64,

    /// Values inside [low, high] never trigger entries or reversals.
    #[serde(default = "default_neutral_band_low")]
    pub neutral_band_low: f64,

    #[serde(default = "default_neutral_band_high")]
    pub neutral_band_high: f64,

    /// Entry slope must exceed this in the entry direction.
    #[serde(default = "default_min_momentum")]
    pub min_momentum: f64,

    /// Slope beyond this against the position forces an exit.
    #[serde(default = "default_exit_momentum")]
    pub exit_momentum: f64,

    /// Fractional give-back from the running peak (trough) that exits.
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,

    /// Bars after an event during which no new event may fire.
    #[serde(default = "default_cooldown_bars")]
    pub cooldown_bars: usize,

    /// Consecutive bars (including the current one) beyond the entry level.
    #[serde(default = "default_confirmation_bars")]
    pub confirmation_bars: usize,

    /// Entries also need the raw price to move in the entry direction.
    #[serde(default)]
    pub require_price_confirmation: bool,

    #[serde(default = "default_allow_reverse")]
    pub allow_reverse: bool,

    /// A reverse needs `min_momentum * multiplier` in the new direction.
    #[serde(default = "default_reverse_momentum_multiplier")]
    pub reverse_momentum_multiplier: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            long_entry_level: default_long_entry_level(),
            short_entry_level: default_short_entry_level(),
            long_exit_level: default_long_exit_level(),
            short_exit_level: default_short_exit_level(),
            neutral_band_low: default_neutral_band_low(),
            neutral_band_high: default_neutral_band_high(),
            min_momentum: default_min_momentum(),
            exit_momentum: default_exit_momentum(),
            trailing_stop_pct: default_trailing_stop_pct(),
            cooldown_bars: default_cooldown_bars(),
            confirmation_bars: default_confirmation_bars(),
            require_price_confirmation: false,
            allow_reverse: default_allow_reverse(),
            reverse_momentum_multiplier: default_reverse_momentum_multiplier(),
        }
    }
}

impl SignalParams {
    /// Tighter entries, longer cooldown, price agreement required.
    pub fn strict() -> Self {
        Self {
            long_entry_level: 0.65,
            short_entry_level: 0.35,
            trailing_stop_pct: 0.08,
            cooldown_bars: 5,
            require_price_confirmation: true,
            ..Self::default()
        }
    }

    /// True when `value` sits inside the neutral band.
    pub fn in_neutral_band(&self, value: f64) -> bool {
        value >= self.neutral_band_low && value <= self.neutral_band_high
    }

    /// Confirmation window length; zero behaves as one.
    pub fn effective_confirmation(&self) -> usize {
        self.confirmation_bars.max(1)
    }

    /// Reject parameter sets the state machine cannot interpret.
    pub fn validate(&self) -> Result<()> {
        let levels = [
            ("long_entry_level", self.long_entry_level),
            ("short_entry_level", self.short_entry_level),
            ("long_exit_level", self.long_exit_level),
            ("short_exit_level", self.short_exit_level),
            ("neutral_band_low", self.neutral_band_low),
            ("neutral_band_high", self.neutral_band_high),
        ];
        for (name, level) in levels {
            if !(0.0..=1.0).contains(&level) {
                bail!("{} must be within [0, 1], got {}", name, level);
            }
        }
        if self.neutral_band_low > self.neutral_band_high {
            bail!(
                "neutral band is inverted: low {} > high {}",
                self.neutral_band_low,
                self.neutral_band_high
            );
        }
        if !(0.0..1.0).contains(&self.trailing_stop_pct) {
            bail!("trailing_stop_pct must be within [0, 1), got {}", self.trailing_stop_pct);
        }
        if self.min_momentum < 0.0 || self.exit_momentum < 0.0 {
            bail!("momentum thresholds must be non-negative");
        }
        if self.reverse_momentum_multiplier < 0.0 {
            bail!(
                "reverse_momentum_multiplier must be non-negative, got {}",
                self.reverse_momentum_multiplier
            );
        }
        Ok(())
    }
}

/// Named parameter presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPreset {
    Default,
    Strict,
}

impl SignalPreset {
    pub fn params(&self) -> SignalParams {
        match self {
            Self::Default => SignalParams::default(),
            Self::Strict => SignalParams::strict(),
        }
    }
}

impl std::str::FromStr for SignalPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "strict" => Ok(Self::Strict),
            other => bail!("unknown signal preset '{}' (expected 'default' or 'strict')", other),
        }
    }
}

impl std::fmt::Display for SignalPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let p = SignalParams::default();
        assert!((p.long_entry_level - 0.60).abs() < 1e-12);
        assert!((p.short_entry_level - 0.40).abs() < 1e-12);
        assert!((p.trailing_stop_pct - 0.10).abs() < 1e-12);
        assert_eq!(p.cooldown_bars, 3);
        assert_eq!(p.confirmation_bars, 3);
        assert!(!p.require_price_confirmation);
        assert!(p.allow_reverse);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn empty_json_gives_defaults() {
        let p: SignalParams = serde_json::from_str("{}").unwrap();
        assert_eq!(p, SignalParams::default());
    }

    #[test]
    fn strict_is_stricter() {
        let d = SignalParams::default();
        let s = SignalParams::strict();
        assert!(s.long_entry_level > d.long_entry_level);
        assert!(s.short_entry_level < d.short_entry_level);
        assert!(s.cooldown_bars > d.cooldown_bars);
        assert!(s.require_price_confirmation);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn presets_parse() {
        assert_eq!("Strict".parse::<SignalPreset>().unwrap(), SignalPreset::Strict);
        assert_eq!(SignalPreset::Default.params(), SignalParams::default());
        assert!("aggressive".parse::<SignalPreset>().is_err());
    }

    #[test]
    fn neutral_band_is_inclusive() {
        let p = SignalParams::default();
        assert!(p.in_neutral_band(0.45));
        assert!(p.in_neutral_band(0.55));
        assert!(!p.in_neutral_band(0.56));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let inverted = SignalParams {
            neutral_band_low: 0.6,
            neutral_band_high: 0.4,
            ..SignalParams::default()
        };
        assert!(inverted.validate().is_err());

        let out_of_range = SignalParams {
            long_entry_level: 1.5,
            ..SignalParams::default()
        };
        assert!(out_of_range.validate().is_err());

        let full_stop = SignalParams {
            trailing_stop_pct: 1.0,
            ..SignalParams::default()
        };
        assert!(full_stop.validate().is_err());
    }

    #[test]
    fn zero_confirmation_behaves_as_one() {
        let p = SignalParams {
            confirmation_bars: 0,
            ..SignalParams::default()
        };
        assert_eq!(p.effective_confirmation(), 1);
    }
}
