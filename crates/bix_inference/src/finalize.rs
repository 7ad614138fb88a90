//! Turns a resolution into the call site's outcome and publishes it.
//!
//! A session either succeeds as a whole, with every variable replaced by its
//! resolved type, or fails as a whole. Nothing of a failed session reaches
//! [`TypeCheckResults`].

use crate::diagnostics::{BuilderDiagnostic, DiagnosticsSink};
use crate::eligibility::IneligibleReason;
use crate::service::SessionTelemetry;
use crate::session::{InferenceSession, TypedExpression};
use crate::solver::{EvidenceSnapshot, FailureKind, Resolution};
use crate::types::{Type, VariableId};
use bix_ast::CallSiteId;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

/// Call site with every postponed variable substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedCall {
    pub call_site: CallSiteId,
    pub callee: String,
    /// Type arguments in the callee's declaration order.
    pub type_arguments: Vec<(String, Type)>,
    pub return_type: Type,
    /// Receiver type of each lambda argument that has one, by argument index.
    pub lambda_receivers: Vec<(usize, Type)>,
    pub expression_types: Vec<TypedExpression>,
    pub telemetry: SessionTelemetry,
}

impl FinalizedCall {
    pub fn type_argument(&self, parameter: &str) -> Option<&Type> {
        self.type_arguments
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, ty)| ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableFailure {
    pub variable: VariableId,
    pub parameter: String,
    pub kind: FailureKind,
    pub evidence: EvidenceSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub call_site: CallSiteId,
    pub callee: String,
    /// Failed variables, ordered by their earliest evidence.
    pub failures: Vec<VariableFailure>,
    pub telemetry: SessionTelemetry,
}

impl SessionFailure {
    /// Kind of the earliest failure.
    pub fn kind(&self) -> Option<FailureKind> {
        self.failures.first().map(|failure| failure.kind)
    }

    pub fn failure_for(&self, parameter: &str) -> Option<&VariableFailure> {
        self.failures
            .iter()
            .find(|failure| failure.parameter == parameter)
    }

    pub fn diagnostics(&self) -> Vec<BuilderDiagnostic> {
        self.failures
            .iter()
            .map(|failure| {
                BuilderDiagnostic::for_failure(
                    &self.callee,
                    &failure.parameter,
                    failure.kind,
                    &failure.evidence,
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InferenceOutcome {
    /// Builder inference does not apply; ordinary inference should handle the call.
    NotEligible(IneligibleReason),
    Success(FinalizedCall),
    Failure(SessionFailure),
}

impl InferenceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InferenceOutcome::Success(_))
    }

    pub fn as_success(&self) -> Option<&FinalizedCall> {
        match self {
            InferenceOutcome::Success(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_failure(&self) -> Option<&SessionFailure> {
        match self {
            InferenceOutcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// External type-checking result that receives finalized builder calls.
pub trait TypeCheckResults {
    fn record_call(&mut self, call: &FinalizedCall);
}

/// In-memory [`TypeCheckResults`] keyed by call site.
#[derive(Debug, Default, Clone)]
pub struct RecordedResults {
    calls: FxHashMap<CallSiteId, FinalizedCall>,
}

impl RecordedResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, call_site: CallSiteId) -> Option<&FinalizedCall> {
        self.calls.get(&call_site)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl TypeCheckResults for RecordedResults {
    fn record_call(&mut self, call: &FinalizedCall) {
        self.calls.insert(call.call_site, call.clone());
    }
}

pub struct Finalizer;

impl Finalizer {
    pub fn finalize(
        session: &InferenceSession,
        resolution: &Resolution,
        telemetry: SessionTelemetry,
    ) -> InferenceOutcome {
        if !resolution.is_success() {
            let mut failures: Vec<VariableFailure> = resolution
                .failures()
                .map(|(variable, kind, evidence)| VariableFailure {
                    variable,
                    parameter: session
                        .variable(variable)
                        .map(|v| v.parameter.clone())
                        .unwrap_or_else(|| variable.to_string()),
                    kind,
                    evidence: evidence.clone(),
                })
                .collect();
            failures.sort_by_key(|failure| BuilderDiagnostic::first_order(&failure.evidence));
            debug!(
                session = %session.id(),
                call_site = %session.call_site(),
                failures = failures.len(),
                "builder session failed"
            );
            return InferenceOutcome::Failure(SessionFailure {
                call_site: session.call_site(),
                callee: session.callee().to_string(),
                failures,
                telemetry,
            });
        }

        let draft = FinalizedCall {
            call_site: session.call_site(),
            callee: session.callee().to_string(),
            type_arguments: session.type_arguments().to_vec(),
            return_type: session.return_type().clone(),
            lambda_receivers: session
                .lambdas()
                .iter()
                .filter_map(|lambda| lambda.receiver.clone().map(|ty| (lambda.argument, ty)))
                .collect(),
            expression_types: session.typed_expressions().to_vec(),
            telemetry,
        };
        let call = Self::substitute(&draft, resolution);
        debug!(
            session = %session.id(),
            call_site = %call.call_site,
            return_type = %call.return_type,
            "builder session finalized"
        );
        InferenceOutcome::Success(call)
    }

    /// Replaces every resolved variable in `call`. Applying it to an already
    /// substituted call returns the call unchanged.
    pub fn substitute(call: &FinalizedCall, resolution: &Resolution) -> FinalizedCall {
        let lookup = |id: VariableId| resolution.resolved_type(id).cloned();
        let apply = |ty: &Type| ty.substitute(&lookup);
        FinalizedCall {
            call_site: call.call_site,
            callee: call.callee.clone(),
            type_arguments: call
                .type_arguments
                .iter()
                .map(|(name, ty)| (name.clone(), apply(ty)))
                .collect(),
            return_type: apply(&call.return_type),
            lambda_receivers: call
                .lambda_receivers
                .iter()
                .map(|(index, ty)| (*index, apply(ty)))
                .collect(),
            expression_types: call
                .expression_types
                .iter()
                .map(|typed| TypedExpression {
                    span: typed.span.clone(),
                    ty: apply(&typed.ty),
                })
                .collect(),
            telemetry: call.telemetry,
        }
    }

    /// The only outward write: success goes to `results`, failure diagnostics
    /// go to `sink` in provenance order.
    pub fn publish(
        outcome: &InferenceOutcome,
        results: &mut dyn TypeCheckResults,
        sink: &mut dyn DiagnosticsSink,
    ) {
        match outcome {
            InferenceOutcome::Success(call) => results.record_call(call),
            InferenceOutcome::Failure(failure) => {
                for diagnostic in failure.diagnostics() {
                    sink.report(diagnostic);
                }
            }
            InferenceOutcome::NotEligible(_) => {}
        }
    }
}
