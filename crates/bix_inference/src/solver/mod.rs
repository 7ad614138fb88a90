//! Resolves postponed variables from their collected evidence.
//!
//! Each variable is resolved from its own bound sets: an equality pins it,
//! otherwise the join of the lower bounds is taken as long as it stays below
//! the meet of the upper bounds. When bounds mention other variables the
//! session is re-resolved with the previous round's candidates substituted,
//! until no candidate changes or the iteration limit is reached. A variable
//! whose only evidence is other unsettled variables waits instead of guessing.
//! When the rounds stall, declared bounds are admitted as evidence; variables
//! still waiting after that take the no-evidence answer.

mod bounds;

pub(crate) use bounds::partition;
pub use bounds::{EvidenceSnapshot, Witness};

use crate::constraint::ConstraintOrigin;
use crate::lattice::TypeLattice;
use crate::session::InferenceSession;
use crate::types::{SessionId, Type, VariableId};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    /// Equalities disagree, or the lower bounds do not fit under the upper bounds.
    AmbiguousConstraints,
    /// No join or meet exists for the evidence, or a pinned type violates a bound.
    IncompatibleConstraints,
    /// Variable-to-variable propagation did not settle within the iteration limit.
    UnresolvedVariable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::AmbiguousConstraints => "ambiguous constraints",
            FailureKind::IncompatibleConstraints => "incompatible constraints",
            FailureKind::UnresolvedVariable => "unresolved variable",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResolutionResult {
    Resolved(Type),
    Failed {
        kind: FailureKind,
        evidence: EvidenceSnapshot,
    },
}

impl ResolutionResult {
    pub fn resolved(&self) -> Option<&Type> {
        match self {
            ResolutionResult::Resolved(ty) => Some(ty),
            ResolutionResult::Failed { .. } => None,
        }
    }

    fn failed(kind: FailureKind, evidence: EvidenceSnapshot) -> Self {
        ResolutionResult::Failed { kind, evidence }
    }
}

/// Per-variable results of one session, in variable order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub session: SessionId,
    pub results: Vec<(VariableId, ResolutionResult)>,
    /// Resolution rounds run; `1` when no bound mentions another variable.
    pub iterations: usize,
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|(_, result)| matches!(result, ResolutionResult::Resolved(_)))
    }

    pub fn resolved_type(&self, id: VariableId) -> Option<&Type> {
        self.results
            .iter()
            .find(|(variable, _)| *variable == id)
            .and_then(|(_, result)| result.resolved())
    }

    pub fn failures(&self) -> impl Iterator<Item = (VariableId, FailureKind, &EvidenceSnapshot)> {
        self.results.iter().filter_map(|(id, result)| match result {
            ResolutionResult::Failed { kind, evidence } => Some((*id, *kind, evidence)),
            ResolutionResult::Resolved(_) => None,
        })
    }
}

pub struct Resolver<'l, 'a> {
    lattice: &'l TypeLattice<'a>,
    iteration_limit: usize,
}

impl<'l, 'a> Resolver<'l, 'a> {
    pub fn new(lattice: &'l TypeLattice<'a>, iteration_limit: usize) -> Self {
        Self {
            lattice,
            iteration_limit: iteration_limit.max(1),
        }
    }

    pub fn resolve(&self, session: &InferenceSession) -> Resolution {
        let partitioned = partition(self.lattice, session);
        let coupled = partitioned
            .iter()
            .any(|(_, evidence)| evidence.has_variable_witnesses());

        // `None` marks a variable still waiting for its neighbours.
        let mut previous: Option<Vec<Option<ResolutionResult>>> = None;
        let mut bounds_released = false;
        let mut iterations = 0;
        let results = loop {
            iterations += 1;
            let candidates = candidates_of(&partitioned, previous.as_deref());
            let current: Vec<Option<ResolutionResult>> = partitioned
                .iter()
                .map(|(id, evidence)| {
                    let snapshot = substituted(*id, evidence, &candidates);
                    if coupled && awaits_neighbours(&snapshot, bounds_released) {
                        None
                    } else {
                        Some(self.decide(snapshot))
                    }
                })
                .collect();

            if !coupled || previous.as_ref() == Some(&current) {
                let waiting = current.iter().any(Option::is_none);
                if waiting && !bounds_released && iterations < self.iteration_limit {
                    // Stalled: let declared bounds seed the waiting groups.
                    bounds_released = true;
                    previous = Some(current);
                    continue;
                }
                break self.settle_waiting(&partitioned, current);
            }
            if iterations >= self.iteration_limit {
                warn!(
                    session = %session.id(),
                    iterations,
                    "builder inference fixpoint did not converge"
                );
                let settled = mark_unsettled(&partitioned, previous.as_deref(), current);
                break self.settle_waiting(&partitioned, settled);
            }
            previous = Some(current);
        };

        let resolution = Resolution {
            session: session.id(),
            results: partitioned
                .iter()
                .map(|(id, _)| *id)
                .zip(results)
                .collect(),
            iterations,
        };
        debug!(
            session = %session.id(),
            variables = resolution.results.len(),
            iterations,
            failures = resolution.failures().count(),
            "resolved builder session"
        );
        resolution
    }

    /// Variables that only ever waited on each other have no evidence from
    /// outside their group; they take the no-evidence answer.
    fn settle_waiting(
        &self,
        partitioned: &[(VariableId, EvidenceSnapshot)],
        round: Vec<Option<ResolutionResult>>,
    ) -> Vec<ResolutionResult> {
        let candidates = candidates_of(partitioned, Some(round.as_slice()));
        partitioned
            .iter()
            .zip(round)
            .map(|((id, evidence), result)| match result {
                Some(result) => result,
                None => self.decide(substituted(*id, evidence, &candidates)),
            })
            .collect()
    }

    fn decide(&self, snapshot: EvidenceSnapshot) -> ResolutionResult {
        if !snapshot.mismatched.is_empty() {
            return ResolutionResult::failed(FailureKind::IncompatibleConstraints, snapshot);
        }

        // Witnesses still mentioning unsettled variables wait for a later round.
        let settled = |witnesses: &[Witness]| -> Vec<Type> {
            witnesses
                .iter()
                .filter(|witness| !witness.ty.contains_variables())
                .map(|witness| witness.ty.clone())
                .collect()
        };
        let lower = settled(&snapshot.lower);
        let upper = settled(&snapshot.upper);
        let equal = settled(&snapshot.equal);

        if let Some(pinned) = equal.first() {
            if equal.iter().any(|other| other != pinned) {
                return ResolutionResult::failed(FailureKind::AmbiguousConstraints, snapshot);
            }
            let fits = lower.iter().all(|l| self.lattice.is_subtype(l, pinned))
                && upper.iter().all(|u| self.lattice.is_subtype(pinned, u));
            if !fits {
                return ResolutionResult::failed(FailureKind::IncompatibleConstraints, snapshot);
            }
            return ResolutionResult::Resolved(pinned.clone());
        }

        if lower.is_empty() && upper.is_empty() {
            return match self.lattice.top() {
                Some(top) => ResolutionResult::Resolved(top),
                None => ResolutionResult::failed(FailureKind::UnresolvedVariable, snapshot),
            };
        }

        let Some(least) = fold(&lower, |a, b| self.lattice.join(a, b)) else {
            return ResolutionResult::failed(FailureKind::IncompatibleConstraints, snapshot);
        };
        let Some(greatest) = fold(&upper, |a, b| self.lattice.meet(a, b)) else {
            return ResolutionResult::failed(FailureKind::IncompatibleConstraints, snapshot);
        };

        match (least, greatest) {
            (Some(l), None) => ResolutionResult::Resolved(l),
            (None, Some(u)) => ResolutionResult::Resolved(u),
            (Some(l), Some(u)) if self.lattice.is_subtype(&l, &u) => ResolutionResult::Resolved(l),
            _ => ResolutionResult::failed(FailureKind::AmbiguousConstraints, snapshot),
        }
    }
}

/// Types settled in `round`; waiting and failed variables contribute nothing.
fn candidates_of(
    partitioned: &[(VariableId, EvidenceSnapshot)],
    round: Option<&[Option<ResolutionResult>]>,
) -> FxHashMap<VariableId, Type> {
    round
        .into_iter()
        .flat_map(|round| partitioned.iter().zip(round))
        .filter_map(|((id, _), result)| {
            let ty = result.as_ref()?.resolved()?;
            Some((*id, ty.clone()))
        })
        .collect()
}

/// `evidence` with the candidates of every other variable substituted.
fn substituted(
    id: VariableId,
    evidence: &EvidenceSnapshot,
    candidates: &FxHashMap<VariableId, Type>,
) -> EvidenceSnapshot {
    let lookup = |other: VariableId| {
        if other == id {
            None
        } else {
            candidates.get(&other).cloned()
        }
    };
    let substitute = |witnesses: &[Witness]| -> Vec<Witness> {
        witnesses
            .iter()
            .map(|witness| Witness {
                ty: witness.ty.substitute(&lookup),
                provenance: witness.provenance.clone(),
            })
            .collect()
    };
    EvidenceSnapshot {
        lower: substitute(&evidence.lower),
        upper: substitute(&evidence.upper),
        equal: substitute(&evidence.equal),
        mismatched: evidence.mismatched.clone(),
    }
}

/// True when every witness from the body still mentions an unsettled
/// variable. Declared bounds only count once `bounds_released` is set.
fn awaits_neighbours(snapshot: &EvidenceSnapshot, bounds_released: bool) -> bool {
    let mut witnesses = snapshot
        .lower
        .iter()
        .chain(&snapshot.upper)
        .chain(&snapshot.equal)
        .filter(|witness| {
            bounds_released
                || !matches!(
                    witness.provenance.origin,
                    ConstraintOrigin::DeclaredBound { .. }
                )
        })
        .peekable();
    witnesses.peek().is_some() && witnesses.all(|witness| witness.ty.contains_variables())
}

/// Folds `types` with `combine`. `Some(None)` for an empty input, `None` when
/// some step is undefined.
fn fold<F>(types: &[Type], combine: F) -> Option<Option<Type>>
where
    F: Fn(&Type, &Type) -> Option<Type>,
{
    let Some((first, rest)) = types.split_first() else {
        return Some(None);
    };
    rest.iter()
        .try_fold(first.clone(), |acc, next| combine(&acc, next))
        .map(Some)
}

/// Variables whose result still changed in the last round fail as unresolved.
/// Variables that waited in both rounds stay waiting.
fn mark_unsettled(
    partitioned: &[(VariableId, EvidenceSnapshot)],
    previous: Option<&[Option<ResolutionResult>]>,
    current: Vec<Option<ResolutionResult>>,
) -> Vec<Option<ResolutionResult>> {
    current
        .into_iter()
        .enumerate()
        .map(|(index, result)| {
            let settled = previous.and_then(|round| round.get(index)) == Some(&result);
            if settled {
                result
            } else {
                let evidence = partitioned
                    .get(index)
                    .map(|(_, evidence)| evidence.clone())
                    .unwrap_or_default();
                Some(ResolutionResult::failed(
                    FailureKind::UnresolvedVariable,
                    evidence,
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Constraint, ConstraintOrigin, Provenance};
    use crate::eligibility::EligibleCall;
    use crate::lattice::{LatticeCache, TypeHierarchy};
    use crate::session::VariableAllocator;
    use bix_ast::{CallSite, CallSiteId, FunctionSignature, LambdaExpr, Span, TypeParamDecl, TypeRef};
    use test_case::test_case;

    fn session_with(params: &[(&str, Option<&str>)]) -> InferenceSession {
        let receiver_args = params.iter().map(|(name, _)| TypeRef::param(*name)).collect();
        let mut callee = FunctionSignature::new("build", TypeRef::named("Unit")).with_param(
            "builder",
            TypeRef::function_with_receiver(
                TypeRef::generic("Holder", receiver_args),
                vec![],
                TypeRef::named("Unit"),
            ),
        );
        for (name, bound) in params {
            callee = callee.with_type_param(match bound {
                Some(bound) => TypeParamDecl::bounded(*name, TypeRef::named(*bound)),
                None => TypeParamDecl::new(*name),
            });
        }
        let site = CallSite::new(CallSiteId(0), callee, Span::dummy())
            .with_lambda(LambdaExpr::new(Vec::new(), Span::dummy()));
        let names: Vec<String> = params.iter().map(|(name, _)| name.to_string()).collect();
        let eligible = EligibleCall {
            receiver_params: names.clone(),
            postponed_params: names,
            fixed: Vec::new(),
            builder_arguments: vec![0],
        };
        VariableAllocator::new()
            .open_session(&site, &eligible)
            .expect("session")
    }

    fn var(index: u32) -> Type {
        Type::variable(VariableId::new(index))
    }

    fn provenance() -> Provenance {
        Provenance::new(Span::dummy(), ConstraintOrigin::LambdaResult)
    }

    fn resolve(session: &mut InferenceSession, constraints: Vec<Constraint>) -> Resolution {
        for constraint in constraints {
            session.add_constraint(constraint).expect("own variable");
        }
        session.freeze();
        let hierarchy = TypeHierarchy::standard().expect("standard hierarchy");
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        Resolver::new(&lattice, 16).resolve(session)
    }

    fn lower(ty: &str) -> Constraint {
        Constraint::subtype(Type::concrete(ty), var(0), provenance())
    }

    fn upper(ty: &str) -> Constraint {
        Constraint::subtype(var(0), Type::concrete(ty), provenance())
    }

    fn equal(ty: &str) -> Constraint {
        Constraint::equal(var(0), Type::concrete(ty), provenance())
    }

    #[test_case(vec![lower("Int")] => Ok(Type::concrete("Int")); "single lower bound")]
    #[test_case(vec![lower("Int"), lower("Double")] => Ok(Type::concrete("Number")); "lower bounds join")]
    #[test_case(vec![lower("Int"), upper("Number")] => Ok(Type::concrete("Int")); "most specific fitting type")]
    #[test_case(vec![upper("Number")] => Ok(Type::concrete("Number")); "upper bound only")]
    #[test_case(vec![equal("Float"), upper("Number")] => Ok(Type::concrete("Float")); "equality within bounds")]
    #[test_case(vec![equal("Float"), lower("Int")] => Err(FailureKind::IncompatibleConstraints); "pinned type below lower bound")]
    #[test_case(vec![equal("Float"), equal("Int")] => Err(FailureKind::AmbiguousConstraints); "conflicting equalities")]
    #[test_case(vec![lower("String"), upper("Number")] => Err(FailureKind::AmbiguousConstraints); "lower above upper")]
    #[test_case(vec![upper("String"), upper("Number")] => Err(FailureKind::IncompatibleConstraints); "no meet")]
    #[test_case(vec![] => Ok(Type::concrete("Any").nullable()); "no evidence falls back to top")]
    fn single_variable(constraints: Vec<Constraint>) -> Result<Type, FailureKind> {
        let mut session = session_with(&[("T", None)]);
        let resolution = resolve(&mut session, constraints);
        match &resolution.results[0].1 {
            ResolutionResult::Resolved(ty) => Ok(ty.clone()),
            ResolutionResult::Failed { kind, .. } => Err(*kind),
        }
    }

    #[test]
    fn declared_bound_is_the_fallback() {
        let mut session = session_with(&[("T", Some("Number"))]);
        let resolution = resolve(&mut session, Vec::new());
        assert_eq!(
            resolution.resolved_type(VariableId::new(0)),
            Some(&Type::concrete("Number"))
        );
    }

    #[test]
    fn declared_bound_rejects_outside_evidence() {
        let mut session = session_with(&[("T", Some("Number"))]);
        let resolution = resolve(&mut session, vec![lower("String")]);
        let failures: Vec<FailureKind> = resolution.failures().map(|(_, kind, _)| kind).collect();
        assert_eq!(failures, vec![FailureKind::AmbiguousConstraints]);
    }

    #[test]
    fn structural_constraints_decompose_into_equalities() {
        let mut session = session_with(&[("E", None)]);
        let resolution = resolve(
            &mut session,
            vec![Constraint::subtype(
                Type::generic("MutableList", vec![var(0)]),
                Type::generic("List", vec![Type::concrete("String")]),
                provenance(),
            )],
        );
        assert_eq!(
            resolution.resolved_type(VariableId::new(0)),
            Some(&Type::concrete("String"))
        );
    }

    #[test]
    fn unrelated_structures_are_incompatible() {
        let mut session = session_with(&[("E", None)]);
        let resolution = resolve(
            &mut session,
            vec![Constraint::subtype(
                Type::generic("MutableList", vec![var(0)]),
                Type::generic("Map", vec![Type::concrete("String"), Type::concrete("Int")]),
                provenance(),
            )],
        );
        let (_, kind, evidence) = resolution.failures().next().expect("failure");
        assert_eq!(kind, FailureKind::IncompatibleConstraints);
        assert_eq!(evidence.mismatched.len(), 1);
    }

    #[test]
    fn nullable_upper_bound_admits_non_null_lower() {
        let mut session = session_with(&[("T", None)]);
        let resolution = resolve(
            &mut session,
            vec![
                Constraint::subtype(var(0).nullable(), Type::concrete("Number").nullable(), provenance()),
                lower("Int"),
            ],
        );
        assert_eq!(
            resolution.resolved_type(VariableId::new(0)),
            Some(&Type::concrete("Int"))
        );
    }

    #[test]
    fn variable_chains_settle_by_fixpoint() {
        let mut session = session_with(&[("K", None), ("V", None)]);
        let resolution = resolve(
            &mut session,
            vec![
                Constraint::subtype(Type::concrete("Int"), var(0), provenance()),
                Constraint::subtype(var(0), var(1), provenance()),
            ],
        );
        assert!(resolution.is_success());
        assert_eq!(resolution.resolved_type(VariableId::new(1)), Some(&Type::concrete("Int")));
        assert!(resolution.iterations > 1);
    }

    #[test]
    fn mutual_bounds_wait_for_outside_evidence() {
        let mut session = session_with(&[("K", None), ("V", None)]);
        let resolution = resolve(
            &mut session,
            vec![
                Constraint::subtype(var(0), var(1), provenance()),
                Constraint::subtype(var(1), var(0), provenance()),
                Constraint::subtype(Type::concrete("Int"), var(0), provenance()),
            ],
        );
        assert!(resolution.is_success());
        assert_eq!(resolution.resolved_type(VariableId::new(0)), Some(&Type::concrete("Int")));
        assert_eq!(resolution.resolved_type(VariableId::new(1)), Some(&Type::concrete("Int")));
    }

    #[test]
    fn closed_cycles_take_the_no_evidence_answer() {
        let mut session = session_with(&[("K", None), ("V", None)]);
        let resolution = resolve(
            &mut session,
            vec![
                Constraint::subtype(var(0), var(1), provenance()),
                Constraint::subtype(var(1), var(0), provenance()),
            ],
        );
        let top = Type::concrete("Any").nullable();
        assert_eq!(resolution.resolved_type(VariableId::new(0)), Some(&top));
        assert_eq!(resolution.resolved_type(VariableId::new(1)), Some(&top));
    }

    #[test]
    fn declared_bound_seeds_a_closed_cycle() {
        let mut session = session_with(&[("K", None), ("V", Some("Number"))]);
        let resolution = resolve(
            &mut session,
            vec![
                Constraint::subtype(var(0), var(1), provenance()),
                Constraint::subtype(var(1), var(0), provenance()),
            ],
        );
        assert!(resolution.is_success());
        assert_eq!(resolution.resolved_type(VariableId::new(0)), Some(&Type::concrete("Number")));
        assert_eq!(resolution.resolved_type(VariableId::new(1)), Some(&Type::concrete("Number")));
    }

    #[test]
    fn exhausted_iteration_limit_reports_unresolved() {
        let mut session = session_with(&[("K", None), ("V", None)]);
        for constraint in [
            Constraint::subtype(Type::concrete("Int"), var(0), provenance()),
            Constraint::subtype(var(0), var(1), provenance()),
        ] {
            session.add_constraint(constraint).expect("own variable");
        }
        session.freeze();
        let hierarchy = TypeHierarchy::standard().expect("standard hierarchy");
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        let resolution = Resolver::new(&lattice, 1).resolve(&session);
        assert!(resolution
            .failures()
            .all(|(_, kind, _)| kind == FailureKind::UnresolvedVariable));
        assert!(!resolution.is_success());
    }

    #[test]
    fn resolution_is_deterministic() {
        let build = || {
            let mut session = session_with(&[("T", None)]);
            resolve(&mut session, vec![lower("Int"), lower("Double"), upper("Any")])
        };
        assert_eq!(build(), build());
    }
}
