// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Central configuration for the meter engine: which instruments to track,
// session hours, pipeline and signal parameters, and where the feed snapshot
// lives.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::meter::PipelineParams;
use crate::session::SessionConfig;
use crate::signals::SignalParams;
use crate::types::Instrument;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_instruments() -> Vec<Instrument> {
    vec![Instrument::nifty(), Instrument::bank_nifty()]
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_feed_path() -> String {
    "feed_snapshot.csv".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_max_recent_errors() -> usize {
    20
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the meter engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Instruments & feed -------------------------------------------------

    /// Instruments to compute, in output order.
    #[serde(default = "default_instruments")]
    pub instruments: Vec<Instrument>,

    /// Feed snapshot on disk (`.csv`, or `.json` holding an array of rows).
    #[serde(default = "default_feed_path")]
    pub feed_path: String,

    /// Seconds between refresh cycles.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    // --- Service -------------------------------------------------------------

    /// Listen address of the JSON export API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Failed-cycle messages retained for the health endpoint.
    #[serde(default = "default_max_recent_errors")]
    pub max_recent_errors: usize,

    // --- Computation ---------------------------------------------------------

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub pipeline: PipelineParams,

    #[serde(default)]
    pub signals: SignalParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instruments: default_instruments(),
            feed_path: default_feed_path(),
            refresh_interval_secs: default_refresh_interval_secs(),
            bind_addr: default_bind_addr(),
            max_recent_errors: default_max_recent_errors(),
            session: SessionConfig::default(),
            pipeline: PipelineParams::default(),
            signals: SignalParams::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            instruments = ?config.instruments.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            mode = ?config.pipeline.mode,
            slope_method = %config.pipeline.slope_method,
            refresh_interval_secs = config.refresh_interval_secs,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            bail!("at least one instrument must be configured");
        }
        for (i, a) in self.instruments.iter().enumerate() {
            if a.prefix.trim().is_empty() {
                bail!("instrument '{}' has an empty column prefix", a.name);
            }
            if self.instruments[..i].iter().any(|b| b.name == a.name) {
                bail!("instrument '{}' is configured twice", a.name);
            }
            if let Some(b) = self.instruments[..i].iter().find(|b| b.prefix == a.prefix) {
                bail!(
                    "instruments '{}' and '{}' share the column prefix '{}'",
                    b.name,
                    a.name,
                    a.prefix
                );
            }
        }
        if self.refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be positive");
        }
        if self.session.market_open > self.session.market_close {
            bail!(
                "market_open {} is after market_close {}",
                self.session.market_open,
                self.session.market_close
            );
        }
        if self.pipeline.epsilon.is_nan() || self.pipeline.epsilon <= 0.0 {
            bail!("pipeline epsilon must be positive, got {}", self.pipeline.epsilon);
        }
        if self.pipeline.weight_floor > self.pipeline.weight_ceiling {
            bail!(
                "weight_floor {} exceeds weight_ceiling {}",
                self.pipeline.weight_floor,
                self.pipeline.weight_ceiling
            );
        }
        self.signals.validate()
    }

    /// Look up a configured instrument by display name (case-insensitive).
    pub fn instrument(&self, name: &str) -> Option<&Instrument> {
        self.instruments
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::SlopeMethod;
    use crate::meter::CompositeMode;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.instruments.len(), 2);
        assert_eq!(cfg.instruments[0].prefix, "Nifty");
        assert_eq!(cfg.instruments[1].prefix, "Bank");
        assert_eq!(cfg.refresh_interval_secs, 300);
        assert_eq!(cfg.pipeline.mode, CompositeMode::Blended);
        assert_eq!(cfg.pipeline.slope_method, SlopeMethod::Ols);
        assert_eq!(cfg.pipeline.slope_window, 3);
        assert!((cfg.signals.long_entry_level - 0.60).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.instruments, EngineConfig::default().instruments);
        assert_eq!(cfg.pipeline.center_window, 12);
        assert_eq!(cfg.pipeline.scale_window, 24);
        assert_eq!(cfg.signals.cooldown_bars, 3);
        assert_eq!(cfg.session.exchange_utc_offset_minutes, 330);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "pipeline": { "mode": "simple", "slope_method": "mean_diff" },
            "signals": { "cooldown_bars": 5 },
            "instruments": [{ "name": "FINNIFTY", "prefix": "Fin" }]
        }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.pipeline.mode, CompositeMode::Simple);
        assert_eq!(cfg.pipeline.slope_method, SlopeMethod::MeanDiff);
        assert_eq!(cfg.pipeline.ema_span, 3);
        assert_eq!(cfg.signals.cooldown_bars, 5);
        assert_eq!(cfg.signals.confirmation_bars, 3);
        assert_eq!(cfg.instruments[0].iss_column(), "Fin_ISS");
    }

    #[test]
    fn validation_rejects_duplicates_and_empty() {
        let mut cfg = EngineConfig::default();
        cfg.instruments.push(Instrument::nifty());
        assert!(cfg.validate().is_err());

        cfg.instruments.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.signals.neutral_band_low = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_shared_prefix() {
        let mut cfg = EngineConfig::default();
        cfg.instruments[1].prefix = "Nifty".into();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("column prefix"), "{err}");
    }

    #[test]
    fn validation_rejects_non_positive_epsilon() {
        let mut cfg = EngineConfig::default();
        cfg.pipeline.epsilon = 0.0;
        assert!(cfg.validate().is_err());
        cfg.pipeline.epsilon = -1e-8;
        assert!(cfg.validate().is_err());
        cfg.pipeline.epsilon = f64::NAN;
        assert!(cfg.validate().is_err());
        cfg.pipeline.epsilon = 1e-8;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn instrument_lookup_is_case_insensitive() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.instrument("banknifty").map(|i| i.prefix.as_str()), Some("Bank"));
        assert!(cfg.instrument("SENSEX").is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("meter-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("meter_config.json");

        let mut cfg = EngineConfig::default();
        cfg.refresh_interval_secs = 60;
        cfg.signals = SignalParams::strict();
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.refresh_interval_secs, 60);
        assert_eq!(loaded.signals, SignalParams::strict());
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_is_error() {
        assert!(EngineConfig::load("/nonexistent/meter_config.json").is_err());
    }
}
