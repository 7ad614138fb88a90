//! Partitions a session's constraints into per-variable bound sets.
//!
//! Structured constraints are decomposed through the hierarchy first:
//! `MutableList<?0> <: List<String>` becomes `?0 == String` because type
//! arguments are invariant. Nullable upper bounds are kept as written:
//! `?0? <: String?` bounds `?0` by `String?`, while `String? <: ?0?` only
//! needs `?0 :> String`.

use crate::constraint::{Constraint, ConstraintKind, ConstraintOrigin, Provenance};
use crate::lattice::TypeLattice;
use crate::session::InferenceSession;
use crate::types::{Type, VariableId};
use bix_ast::Span;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// One piece of evidence about a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Witness {
    pub ty: Type,
    pub provenance: Provenance,
}

/// Evidence collected for one variable, split by relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvidenceSnapshot {
    /// `X <: v`
    pub lower: Vec<Witness>,
    /// `v <: Y`
    pub upper: Vec<Witness>,
    /// `v == Z`
    pub equal: Vec<Witness>,
    /// Constraints whose structure can never hold, e.g. `MutableList<?0> <: Map<K, V>`.
    pub mismatched: Vec<Witness>,
}

impl EvidenceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
            && self.upper.is_empty()
            && self.equal.is_empty()
            && self.mismatched.is_empty()
    }

    /// True when some witness still mentions a variable.
    pub fn has_variable_witnesses(&self) -> bool {
        self.lower
            .iter()
            .chain(&self.upper)
            .chain(&self.equal)
            .any(|witness| witness.ty.contains_variables())
    }
}

#[derive(Debug, Clone, Copy)]
enum Relation {
    Lower,
    Upper,
    Equal,
}

/// Builds the bound sets of every variable in `session`, in variable order.
/// Declared upper bounds are appended as upper witnesses.
pub(crate) fn partition(
    lattice: &TypeLattice<'_>,
    session: &InferenceSession,
) -> Vec<(VariableId, EvidenceSnapshot)> {
    let mut partitioner = Partitioner {
        lattice,
        bounds: session
            .variables()
            .iter()
            .map(|variable| (variable.id, EvidenceSnapshot::default()))
            .collect(),
    };

    for constraint in session.constraints().iter() {
        partitioner.add(constraint);
    }
    for variable in session.variables() {
        if let Some(bound) = &variable.declared_bound {
            let provenance = Provenance::new(
                Span::dummy(),
                ConstraintOrigin::DeclaredBound {
                    parameter: variable.parameter.clone(),
                },
            );
            partitioner.record(variable.id, Relation::Upper, bound.clone(), &provenance);
        }
    }

    let mut bounds = partitioner.bounds;
    session
        .variables()
        .iter()
        .map(|variable| {
            let set = bounds.remove(&variable.id).unwrap_or_default();
            (variable.id, set)
        })
        .collect()
}

struct Partitioner<'l, 'a> {
    lattice: &'l TypeLattice<'a>,
    bounds: FxHashMap<VariableId, EvidenceSnapshot>,
}

impl Partitioner<'_, '_> {
    fn add(&mut self, constraint: &Constraint) {
        let provenance = &constraint.provenance;
        let consistent = match &constraint.kind {
            ConstraintKind::Subtype { sub, sup } => self.subtype(sub, sup, provenance),
            ConstraintKind::Equal { left, right } => self.equal(left, right, provenance),
        };
        if consistent {
            return;
        }
        let other = match &constraint.kind {
            ConstraintKind::Subtype { sup, .. } => sup,
            ConstraintKind::Equal { right, .. } => right,
        };
        for variable in constraint.kind.variables() {
            if let Some(set) = self.bounds.get_mut(&variable) {
                set.mismatched.push(Witness {
                    ty: other.clone(),
                    provenance: provenance.clone(),
                });
            }
        }
    }

    /// Returns `false` when the constraint can never hold.
    fn subtype(&mut self, sub: &Type, sup: &Type, provenance: &Provenance) -> bool {
        if sub == sup {
            return true;
        }
        match (sub, sup) {
            (Type::Variable { id: a, .. }, Type::Variable { id: b, .. }) => {
                self.record(*a, Relation::Upper, sup.clone().non_null(), provenance);
                self.record(*b, Relation::Lower, sub.clone().non_null(), provenance);
                true
            }
            (Type::Variable { id, nullable }, Type::Concrete { .. }) => {
                if *nullable && !sup.is_nullable() {
                    return false;
                }
                self.record(*id, Relation::Upper, sup.clone(), provenance);
                true
            }
            (Type::Concrete { .. }, Type::Variable { id, nullable }) => {
                let bound = if *nullable { sub.clone().non_null() } else { sub.clone() };
                self.record(*id, Relation::Lower, bound, provenance);
                true
            }
            (Type::Concrete { name: sub_name, .. }, Type::Concrete { name: sup_name, args, .. }) => {
                if !sub.contains_variables() && !sup.contains_variables() {
                    return self.lattice.is_subtype(sub, sup);
                }
                if sub.is_nullable() && !sup.is_nullable() {
                    return false;
                }
                let hierarchy = self.lattice.hierarchy();
                if hierarchy.is_top(sup_name) || hierarchy.is_bottom(sub_name) {
                    return true;
                }
                let Some(view) = self.lattice.supertype_instance(&sub.clone().non_null(), sup_name)
                else {
                    return false;
                };
                view.len() == args.len()
                    && view
                        .iter()
                        .zip(args)
                        .all(|(left, right)| self.equal(left, right, provenance))
            }
        }
    }

    fn equal(&mut self, left: &Type, right: &Type, provenance: &Provenance) -> bool {
        if left == right {
            return true;
        }
        match (left, right) {
            (Type::Variable { id: a, .. }, Type::Variable { id: b, .. }) => {
                self.record(*a, Relation::Equal, right.clone().non_null(), provenance);
                self.record(*b, Relation::Equal, left.clone().non_null(), provenance);
                true
            }
            (Type::Variable { id, nullable }, other @ Type::Concrete { .. })
            | (other @ Type::Concrete { .. }, Type::Variable { id, nullable }) => {
                if *nullable && !other.is_nullable() {
                    return false;
                }
                let bound = if *nullable { other.clone().non_null() } else { other.clone() };
                self.record(*id, Relation::Equal, bound, provenance);
                true
            }
            (
                Type::Concrete {
                    name: left_name,
                    args: left_args,
                    nullable: left_null,
                },
                Type::Concrete {
                    name: right_name,
                    args: right_args,
                    nullable: right_null,
                },
            ) => {
                left_name == right_name
                    && left_null == right_null
                    && left_args.len() == right_args.len()
                    && left_args
                        .iter()
                        .zip(right_args)
                        .all(|(l, r)| self.equal(l, r, provenance))
            }
        }
    }

    fn record(&mut self, id: VariableId, relation: Relation, ty: Type, provenance: &Provenance) {
        let Some(set) = self.bounds.get_mut(&id) else {
            return;
        };
        let witness = Witness {
            ty,
            provenance: provenance.clone(),
        };
        match relation {
            Relation::Lower => set.lower.push(witness),
            Relation::Upper => set.upper.push(witness),
            Relation::Equal => set.equal.push(witness),
        }
    }
}
