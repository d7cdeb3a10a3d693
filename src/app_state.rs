// =============================================================================
// Central Application State — Meter Engine
// =============================================================================
//
// Shared between the refresh loop (the only writer) and the HTTP export API
// (readers).  The latest cycle snapshot is published whole, behind an Arc,
// so readers never observe a half-built cycle.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared fields.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::engine::CycleSnapshot;
use crate::runtime_config::EngineConfig;

// =============================================================================
// Error Record
// =============================================================================

/// A failed refresh cycle, kept for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every publish and every recorded error.
    pub state_version: AtomicU64,

    /// Completed cycles since start.
    pub cycles_completed: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub config: Arc<RwLock<EngineConfig>>,

    // ── Published results ───────────────────────────────────────────────
    /// Most recent successful cycle.  `None` until the first one completes.
    pub latest: RwLock<Option<Arc<CycleSnapshot>>>,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            cycles_completed: AtomicU64::new(0),
            config: Arc::new(RwLock::new(config)),
            latest: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Publishing ──────────────────────────────────────────────────────

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: CycleSnapshot) {
        *self.latest.write() = Some(Arc::new(snapshot));
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        self.increment_version();
    }

    /// The latest snapshot, if any cycle has completed.
    pub fn latest(&self) -> Option<Arc<CycleSnapshot>> {
        self.latest.read().clone()
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message.  The list is capped at the configured
    /// `max_recent_errors`; oldest entries are evicted first.
    pub fn push_error(&self, msg: String) {
        let cap = self.config.read().max_recent_errors.max(1);
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > cap {
            errors.remove(0);
        }

        self.increment_version();
    }

    // ── Health ──────────────────────────────────────────────────────────

    pub fn health(&self) -> HealthSnapshot {
        let latest = self.latest();
        HealthSnapshot {
            status: if latest.is_some() { "ok" } else { "warming_up" },
            state_version: self.current_state_version(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
            last_cycle_id: latest.as_ref().map(|s| s.cycle_id.clone()),
            last_updated: latest.as_ref().map(|s| s.last_updated.to_rfc3339()),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

/// Payload of `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub state_version: u64,
    pub uptime_secs: u64,
    pub cycles_completed: u64,
    pub last_cycle_id: Option<String>,
    pub last_updated: Option<String>,
    pub recent_errors: Vec<ErrorRecord>,
}
