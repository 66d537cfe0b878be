//! Source health tracking and rotation.
//!
//! Three consecutive failures put a source into a five-minute disable
//! window; the first availability check after the window elapses resets it.
//! Each area keeps its own round-robin cursor over the sources serving it,
//! so a noisy area does not starve rotation elsewhere.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::sources::{Area, SourceId};

/// Failures before a source is disabled.
pub const FAIL_THRESHOLD: u32 = 3;
/// How long a disabled source sits out.
pub const DISABLE_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Default, Clone)]
struct SourceHealth {
    fails: u32,
    last_fail: Option<Instant>,
    last_success: Option<Instant>,
    disabled: bool,
}

#[derive(Default)]
struct Inner {
    health: HashMap<SourceId, SourceHealth>,
    cursors: HashMap<Area, usize>,
}

/// Process-global registry of source health, shared by the orchestrator.
pub struct SourceRegistry {
    inner: RwLock<Inner>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// Is the source usable right now? Auto-resets an expired disable window.
    pub fn available(&self, id: SourceId) -> bool {
        self.available_at(id, Instant::now())
    }

    fn available_at(&self, id: SourceId, now: Instant) -> bool {
        {
            let inner = self.inner.read();
            match inner.health.get(&id) {
                None => return true,
                Some(h) if !h.disabled => return true,
                Some(h) => {
                    let elapsed_window = h
                        .last_fail
                        .map(|t| now.duration_since(t) > DISABLE_WINDOW)
                        .unwrap_or(true);
                    if !elapsed_window {
                        return false;
                    }
                }
            }
        }
        // The window has elapsed; this read resets the source.
        let mut inner = self.inner.write();
        if let Some(h) = inner.health.get_mut(&id) {
            if h.disabled {
                info!(source = %id, "disable window elapsed, re-enabling");
                h.disabled = false;
                h.fails = 0;
            }
        }
        true
    }

    /// Next available source for `area` in round-robin order, advancing the
    /// cursor past the returned source. `None` when everything is disabled.
    pub fn next_for(&self, area: Area) -> Option<SourceId> {
        self.next_for_at(area, Instant::now())
    }

    fn next_for_at(&self, area: Area, now: Instant) -> Option<SourceId> {
        let sources = area.sources();
        if sources.is_empty() {
            return None;
        }
        let start = {
            let inner = self.inner.read();
            inner.cursors.get(&area).copied().unwrap_or(0) % sources.len()
        };
        for offset in 0..sources.len() {
            let idx = (start + offset) % sources.len();
            let id = sources[idx];
            if self.available_at(id, now) {
                let mut inner = self.inner.write();
                inner.cursors.insert(area, (idx + 1) % sources.len());
                return Some(id);
            }
        }
        None
    }

    /// All currently available sources for `area`, in the area's priority
    /// order. The steady-state fallback sweep and the cold-start race both
    /// iterate this.
    pub fn available_for(&self, area: Area) -> Vec<SourceId> {
        let now = Instant::now();
        area.sources()
            .iter()
            .copied()
            .filter(|id| self.available_at(*id, now))
            .collect()
    }

    /// After a cold-start race, rotation resumes at the winner's successor.
    pub fn set_cursor_after(&self, area: Area, winner: SourceId) {
        let sources = area.sources();
        if let Some(idx) = sources.iter().position(|s| *s == winner) {
            let mut inner = self.inner.write();
            inner.cursors.insert(area, (idx + 1) % sources.len());
        }
    }

    pub fn mark_failure(&self, id: SourceId) {
        self.mark_failure_at(id, Instant::now());
    }

    fn mark_failure_at(&self, id: SourceId, now: Instant) {
        let mut inner = self.inner.write();
        let health = inner.health.entry(id).or_default();
        health.fails += 1;
        health.last_fail = Some(now);
        if health.fails >= FAIL_THRESHOLD && !health.disabled {
            health.disabled = true;
            warn!(
                source = %id,
                fails = health.fails,
                window_secs = DISABLE_WINDOW.as_secs(),
                "source disabled"
            );
        }
    }

    pub fn mark_success(&self, id: SourceId) {
        let mut inner = self.inner.write();
        let health = inner.health.entry(id).or_default();
        health.fails = 0;
        health.disabled = false;
        health.last_success = Some(Instant::now());
    }

    /// Snapshot for diagnostics: (source, fails, disabled).
    pub fn health_report(&self) -> Vec<(SourceId, u32, bool)> {
        let inner = self.inner.read();
        SourceId::ALL
            .iter()
            .map(|id| {
                let h = inner.health.get(id).cloned().unwrap_or_default();
                (*id, h.fails, h.disabled)
            })
            .collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
