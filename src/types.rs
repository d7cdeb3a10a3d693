// =============================================================================
// Shared types used across the meter engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// An instrument tracked by the engine, identified in the feed by its column
/// prefix (`Nifty_ISS`, `Bank_Price_Action`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Display name, e.g. "NIFTY".
    pub name: String,
    /// Column prefix used by the feed, e.g. "Nifty".
    pub prefix: String,
}

impl Instrument {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }

    pub fn nifty() -> Self {
        Self::new("NIFTY", "Nifty")
    }

    pub fn bank_nifty() -> Self {
        Self::new("BANKNIFTY", "Bank")
    }

    /// Raw open-interest-style column.
    pub fn iss_column(&self) -> String {
        format!("{}_ISS", self.prefix)
    }

    /// Raw price-action-style column.
    pub fn price_action_column(&self) -> String {
        format!("{}_Price_Action", self.prefix)
    }

    /// Optional raw price column used for price confirmation.
    pub fn price_column(&self) -> String {
        format!("{}_Price", self.prefix)
    }

    pub fn composite_column(&self) -> String {
        format!("{}_Composite", self.prefix)
    }

    pub fn smoothed_column(&self) -> String {
        format!("{}_Smoothed", self.prefix)
    }

    pub fn slope_column(&self) -> String {
        format!("{}_Slope", self.prefix)
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Position held by the signal state machine for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

impl Default for PositionState {
    fn default() -> Self {
        Self::Flat
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "FLAT"),
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Discrete transition emitted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    /// LONG -> SHORT without passing through FLAT.
    ReverseToShort,
    /// SHORT -> LONG without passing through FLAT.
    ReverseToLong,
}

impl SignalKind {
    /// Position held after this transition.
    pub fn resulting_position(&self) -> PositionState {
        match self {
            Self::EnterLong | Self::ReverseToLong => PositionState::Long,
            Self::EnterShort | Self::ReverseToShort => PositionState::Short,
            Self::ExitLong | Self::ExitShort => PositionState::Flat,
        }
    }

    /// Suggested chart color. Presentation metadata only.
    pub fn color(&self) -> &'static str {
        match self {
            Self::EnterLong | Self::ReverseToLong => "green",
            Self::EnterShort | Self::ReverseToShort => "red",
            Self::ExitLong => "orange",
            Self::ExitShort => "lightgreen",
        }
    }

    /// Suggested chart label. Presentation metadata only.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EnterLong => "LONG",
            Self::EnterShort => "SHORT",
            Self::ExitLong => "EXIT LONG",
            Self::ExitShort => "EXIT SHORT",
            Self::ReverseToShort => "REV SHORT",
            Self::ReverseToLong => "REV LONG",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnterLong => write!(f, "ENTER_LONG"),
            Self::EnterShort => write!(f, "ENTER_SHORT"),
            Self::ExitLong => write!(f, "EXIT_LONG"),
            Self::ExitShort => write!(f, "EXIT_SHORT"),
            Self::ReverseToShort => write!(f, "REVERSE_TO_SHORT"),
            Self::ReverseToLong => write!(f, "REVERSE_TO_LONG"),
        }
    }
}
