//! Diagnostics for failed builder inference sessions.
//!
//! Rendering and localization belong to the consumer; this module only turns
//! a failed variable and its evidence into a coded message with notes.

use crate::solver::{EvidenceSnapshot, FailureKind, Witness};
use bix_ast::Span;
use serde::Serialize;

pub const AMBIGUOUS_CONSTRAINTS: &str = "BI0001";
pub const INCOMPATIBLE_CONSTRAINTS: &str = "BI0002";
pub const UNRESOLVED_VARIABLE: &str = "BI0003";

pub fn code_for(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::AmbiguousConstraints => AMBIGUOUS_CONSTRAINTS,
        FailureKind::IncompatibleConstraints => INCOMPATIBLE_CONSTRAINTS,
        FailureKind::UnresolvedVariable => UNRESOLVED_VARIABLE,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuilderDiagnostic {
    pub code: &'static str,
    pub kind: FailureKind,
    pub message: String,
    pub span: Option<Span>,
    pub notes: Vec<String>,
}

impl BuilderDiagnostic {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            code: code_for(kind),
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Builds the diagnostic for type parameter `parameter` of `callee`.
    /// The span points at the earliest witness; every witness becomes a note.
    pub fn for_failure(
        callee: &str,
        parameter: &str,
        kind: FailureKind,
        evidence: &EvidenceSnapshot,
    ) -> Self {
        let message = format!(
            "cannot infer type argument `{parameter}` of `{callee}`: {kind}"
        );
        let mut diagnostic = Self::new(kind, message);
        if let Some(first) = ordered_witnesses(evidence).first() {
            diagnostic = diagnostic.with_span(first.1.provenance.span.clone());
        }
        for (relation, witness) in ordered_witnesses(evidence) {
            diagnostic = diagnostic.with_note(format!(
                "{relation} `{}` from {} at {}",
                witness.ty, witness.provenance.origin, witness.provenance.span
            ));
        }
        diagnostic
    }

    /// Emission order of the earliest witness; diagnostics are reported in this order.
    pub(crate) fn first_order(evidence: &EvidenceSnapshot) -> usize {
        ordered_witnesses(evidence)
            .first()
            .map(|(_, witness)| witness.provenance.order)
            .unwrap_or(usize::MAX)
    }
}

fn ordered_witnesses(evidence: &EvidenceSnapshot) -> Vec<(&'static str, &Witness)> {
    let mut all: Vec<(&'static str, &Witness)> = evidence
        .equal
        .iter()
        .map(|w| ("equal to", w))
        .chain(evidence.lower.iter().map(|w| ("lower bound", w)))
        .chain(evidence.upper.iter().map(|w| ("upper bound", w)))
        .chain(evidence.mismatched.iter().map(|w| ("incompatible with", w)))
        .collect();
    all.sort_by_key(|(_, witness)| witness.provenance.order);
    all
}

/// Receives diagnostics for failed sessions.
pub trait DiagnosticsSink {
    fn report(&mut self, diagnostic: BuilderDiagnostic);
}

impl DiagnosticsSink for Vec<BuilderDiagnostic> {
    fn report(&mut self, diagnostic: BuilderDiagnostic) {
        self.push(diagnostic);
    }
}
