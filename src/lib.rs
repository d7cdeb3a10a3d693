// =============================================================================
// Meter Engine — composite open-interest / price-action meter with signals
// =============================================================================
//
// Library half of the service.  `engine::run_cycle` is the synchronous entry
// point; the binary wraps it in a refresh loop and an HTTP export.

pub mod api;
pub mod app_state;
pub mod engine;
pub mod feed;
pub mod frame;
pub mod indicators;
pub mod meter;
pub mod refresh;
pub mod runtime_config;
pub mod session;
pub mod signals;
pub mod types;
