use crate::lattice::CacheMetrics;
use serde::Serialize;

/// Counters gathered while one session runs. Attached to every outcome
/// that opened a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionTelemetry {
    pub expressions_visited: usize,
    pub constraints_collected: usize,
    pub fixpoint_iterations: usize,
    /// `equals`/`hashCode`/`toString` calls, which never produce constraints.
    pub universal_uses: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl SessionTelemetry {
    pub fn with_cache(mut self, metrics: CacheMetrics) -> Self {
        self.cache_hits = metrics.hits;
        self.cache_misses = metrics.misses;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
