//! `try_infer` facade and the batch driver.
//!
//! One [`BuilderInference`] owns the loaded hierarchy, the shared join/meet
//! cache and the variable allocator. It is `Sync`; independent call sites may
//! be inferred from many threads at once.

mod telemetry;

pub use telemetry::SessionTelemetry;

use crate::config::{BatchMode, InferenceConfig};
use crate::constraint::ConstraintCollector;
use crate::diagnostics::DiagnosticsSink;
use crate::eligibility::{Eligibility, EligibilityAnalyzer};
use crate::error::EngineError;
use crate::finalize::{Finalizer, InferenceOutcome, TypeCheckResults};
use crate::lattice::{CacheMetrics, HierarchyError, LatticeCache, TypeHierarchy, TypeLattice};
use crate::session::VariableAllocator;
use crate::solver::Resolver;
use bix_ast::CallSite;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct BuilderInference {
    hierarchy: Arc<TypeHierarchy>,
    cache: Arc<LatticeCache>,
    allocator: VariableAllocator,
    config: InferenceConfig,
    pool: Option<ThreadPool>,
}

impl BuilderInference {
    pub fn new(hierarchy: Arc<TypeHierarchy>) -> Self {
        Self::with_config(hierarchy, InferenceConfig::default())
    }

    /// Engine over the built-in Kotlin-like hierarchy.
    pub fn standard() -> Result<Self, HierarchyError> {
        Ok(Self::new(Arc::new(TypeHierarchy::standard()?)))
    }

    pub fn with_config(hierarchy: Arc<TypeHierarchy>, config: InferenceConfig) -> Self {
        let pool = match config.batch {
            BatchMode::Sequential => None,
            BatchMode::Pooled { workers, .. } => match ThreadPoolBuilder::new()
                .num_threads(workers.get())
                .thread_name(|index| format!("bix-infer-{index}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(error) => {
                    warn!(%error, "falling back to sequential builder inference");
                    None
                }
            },
        };
        Self {
            hierarchy,
            cache: Arc::new(LatticeCache::new()),
            allocator: VariableAllocator::new(),
            config,
            pool,
        }
    }

    /// Replaces the process-wide join/meet cache, e.g. to share it between engines.
    pub fn with_shared_cache(mut self, cache: Arc<LatticeCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// Lifetime metrics of the shared cache.
    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    /// Runs builder inference for one call site. Contradictory evidence is an
    /// [`InferenceOutcome::Failure`]; `Err` means malformed input.
    pub fn try_infer(&self, site: &CallSite) -> Result<InferenceOutcome, EngineError> {
        if site.arguments.len() != site.callee.params.len() {
            return Err(EngineError::ArgumentCountMismatch {
                callee: site.callee.name.clone(),
                expected: site.callee.params.len(),
                found: site.arguments.len(),
            });
        }

        let private_cache;
        let cache: &LatticeCache = if self.config.share_lattice_cache {
            &self.cache
        } else {
            private_cache = LatticeCache::new();
            &private_cache
        };
        let lattice = TypeLattice::new(&self.hierarchy, cache);

        let eligible = match EligibilityAnalyzer::new(&lattice).analyze(site) {
            Eligibility::NotEligible(reason) => {
                debug!(call_site = %site.id, ?reason, "builder inference not applicable");
                return Ok(InferenceOutcome::NotEligible(reason));
            }
            Eligibility::Eligible(eligible) => eligible,
        };

        let mut session = self.allocator.open_session(site, &eligible)?;
        let expressions_visited =
            ConstraintCollector::new(&lattice, &site.operations, &mut session).collect(site)?;
        session.freeze();

        let resolution =
            Resolver::new(&lattice, self.config.fixpoint_iteration_limit).resolve(&session);
        let telemetry = SessionTelemetry {
            expressions_visited,
            constraints_collected: session.constraints().len(),
            fixpoint_iterations: resolution.iterations,
            universal_uses: session.universal_uses(),
            ..SessionTelemetry::default()
        }
        .with_cache(lattice.observed_metrics());

        Ok(Finalizer::finalize(&session, &resolution, telemetry))
    }

    /// [`Self::try_infer`] followed by publishing the outcome to the collaborators.
    pub fn try_infer_into(
        &self,
        site: &CallSite,
        results: &mut dyn TypeCheckResults,
        sink: &mut dyn DiagnosticsSink,
    ) -> Result<InferenceOutcome, EngineError> {
        let outcome = self.try_infer(site)?;
        Finalizer::publish(&outcome, results, sink);
        Ok(outcome)
    }

    /// Infers every call site, in parallel when configured. Results keep input order.
    pub fn infer_all(&self, sites: &[CallSite]) -> Vec<Result<InferenceOutcome, EngineError>> {
        match &self.pool {
            Some(pool) => {
                let batch = self.config.batch.min_batch();
                pool.install(|| {
                    sites
                        .par_iter()
                        .with_min_len(batch)
                        .map(|site| self.try_infer(site))
                        .collect()
                })
            }
            None => sites.iter().map(|site| self.try_infer(site)).collect(),
        }
    }
}
