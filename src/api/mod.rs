// =============================================================================
// API Module — read-only JSON export over HTTP
// =============================================================================

pub mod rest;

pub use rest::router;
