//! Engine configuration: batch mode, fixpoint limit and cache sharing.
//!
//! Sessions never run concurrently with themselves; parallelism only applies
//! across independent call sites handed to [`crate::BuilderInference::infer_all`].

use std::num::NonZeroUsize;

/// Environment variable selecting the number of worker threads for [`BatchMode`].
pub const WORKER_THREADS_ENV: &str = "BIX_WORKER_THREADS";
/// Environment variable overriding [`InferenceConfig::fixpoint_iteration_limit`].
pub const FIXPOINT_LIMIT_ENV: &str = "BIX_FIXPOINT_LIMIT";
/// Environment variable overriding [`InferenceConfig::share_lattice_cache`].
pub const SHARED_CACHE_ENV: &str = "BIX_SHARED_LATTICE_CACHE";

pub const DEFAULT_FIXPOINT_LIMIT: usize = 16;

/// How `infer_all` spreads call sites over threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// One call site after another on the caller's thread.
    #[default]
    Sequential,
    /// Sessions on a dedicated pool; each worker takes at least `min_batch` sites.
    Pooled {
        workers: NonZeroUsize,
        min_batch: NonZeroUsize,
    },
}

impl BatchMode {
    /// Fewer than two workers is [`BatchMode::Sequential`]; a zero batch becomes one.
    pub fn pooled(workers: usize, min_batch: usize) -> Self {
        match NonZeroUsize::new(workers) {
            Some(workers) if workers.get() > 1 => BatchMode::Pooled {
                workers,
                min_batch: NonZeroUsize::new(min_batch).unwrap_or(NonZeroUsize::MIN),
            },
            _ => BatchMode::Sequential,
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            BatchMode::Sequential => 1,
            BatchMode::Pooled { workers, .. } => workers.get(),
        }
    }

    pub fn min_batch(&self) -> usize {
        match self {
            BatchMode::Sequential => 1,
            BatchMode::Pooled { min_batch, .. } => min_batch.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceConfig {
    pub batch: BatchMode,
    /// Rounds the resolver may spend propagating variable-to-variable bounds.
    pub fixpoint_iteration_limit: usize,
    /// One process-wide join/meet cache instead of a fresh cache per session.
    pub share_lattice_cache: bool,
}

impl InferenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_mode(mut self, batch: BatchMode) -> Self {
        self.batch = batch;
        self
    }

    /// Zero is raised to one round.
    pub fn with_fixpoint_iteration_limit(mut self, limit: usize) -> Self {
        self.fixpoint_iteration_limit = limit.max(1);
        self
    }

    pub fn with_shared_lattice_cache(mut self, shared: bool) -> Self {
        self.share_lattice_cache = shared;
        self
    }

    /// Defaults overridden by `BIX_*` environment variables. Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(workers) = parse::<usize>(&lookup, WORKER_THREADS_ENV) {
            config = config.with_batch_mode(BatchMode::pooled(workers, 1));
        }
        if let Some(limit) = parse::<usize>(&lookup, FIXPOINT_LIMIT_ENV) {
            config = config.with_fixpoint_iteration_limit(limit);
        }
        if let Some(shared) = lookup(SHARED_CACHE_ENV).and_then(|raw| parse_flag(&raw)) {
            config = config.with_shared_lattice_cache(shared);
        }
        config
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            batch: BatchMode::Sequential,
            fixpoint_iteration_limit: DEFAULT_FIXPOINT_LIMIT,
            share_lattice_cache: true,
        }
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
