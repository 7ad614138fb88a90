//! bix_inference - builder-style inference of generic type arguments.
//!
//! For a call such as `buildList { add(1) }` ordinary unification leaves `E`
//! free. The engine introduces a postponed variable for `E`, walks the lambda
//! body collecting subtype and equality evidence against the receiver's
//! operations, resolves the variable over the nominal type lattice and
//! reports `List<Int>`.
//!
//! Entry point: [`BuilderInference::try_infer`].

pub mod config;
pub mod constraint;
pub mod diagnostics;
pub mod eligibility;
pub mod error;
pub mod finalize;
pub mod lattice;
pub mod service;
pub mod session;
pub mod solver;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{BatchMode, InferenceConfig};
pub use constraint::{
    Constraint, ConstraintCollector, ConstraintKind, ConstraintOrigin, ConstraintSet, Provenance,
};
pub use diagnostics::{BuilderDiagnostic, DiagnosticsSink};
pub use eligibility::{Eligibility, EligibilityAnalyzer, EligibleCall, IneligibleReason};
pub use error::EngineError;
pub use finalize::{
    FinalizedCall, Finalizer, InferenceOutcome, RecordedResults, SessionFailure, TypeCheckResults,
    VariableFailure,
};
pub use lattice::{
    CacheMetrics, ClassDecl, HierarchyBuilder, HierarchyError, LatticeCache, TypeHierarchy,
    TypeLattice,
};
pub use service::{BuilderInference, SessionTelemetry};
pub use session::{InferenceSession, PostponedVariable, VariableAllocator};
pub use solver::{
    EvidenceSnapshot, FailureKind, Resolution, ResolutionResult, Resolver, Witness,
};
pub use types::{SessionId, Type, VariableId};
