// =============================================================================
// Signals Module
// =============================================================================
//
// Turns a per-instrument meter series into discrete position events:
// - Parameter policy with named presets (default / strict)
// - FLAT / LONG / SHORT state machine with cooldown, confirmation,
//   trailing stops and direct reversals

pub mod params;
pub mod state_machine;

pub use params::{SignalParams, SignalPreset};
pub use state_machine::{MachineState, SignalEvent, SignalInputs, SignalStateMachine};
