//! Decides whether a call site needs builder inference at all.
//!
//! The analyzer first runs a plain structural unification of the value
//! arguments and the expected type against the callee signature. Parameters
//! left free by that pass are candidates for postponement, provided some
//! lambda argument has a receiver mentioning them and some accessible
//! operation on that receiver can supply evidence.

use crate::lattice::TypeLattice;
use crate::types::{Type, VariableId};
use bix_ast::{Argument, CallSite, OperationDecl, TypeRef};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibleCall {
    /// Free parameters mentioned by a builder lambda receiver that some operation can constrain.
    pub receiver_params: Vec<String>,
    /// Every parameter left free by ordinary unification, in declaration order.
    pub postponed_params: Vec<String>,
    /// Parameters ordinary unification already determined, in declaration order.
    pub fixed: Vec<(String, Type)>,
    /// Argument indices of the lambdas whose receivers mention a postponed parameter.
    pub builder_arguments: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IneligibleReason {
    NoTypeParameters,
    ExplicitTypeArguments,
    /// Ordinary unification determines every type parameter.
    FullyDetermined,
    /// No lambda argument has a receiver mentioning a free parameter.
    NoReceiverLambda,
    /// No accessible operation on the receiver mentions a free parameter.
    NoEvidenceSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Eligibility {
    Eligible(EligibleCall),
    NotEligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible(_))
    }
}

/// Result of viewing a receiver type through an operation's declared receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReceiverMatch {
    /// Operation type parameter name to the type it takes at this receiver.
    pub bindings: FxHashMap<String, Type>,
    /// `(actual, declared)` argument pairs that must be equal for the operation to apply.
    pub requirements: Vec<(Type, Type)>,
}

/// Views `receiver` as the operation's declared receiver constructor and binds
/// the operation's type parameters. `None` when the operation does not apply.
pub(crate) fn match_operation_receiver(
    lattice: &TypeLattice<'_>,
    operation: &OperationDecl,
    receiver: &Type,
) -> Option<ReceiverMatch> {
    let TypeRef::Named { name, args, .. } = &operation.receiver else {
        return None;
    };
    let view = lattice.supertype_instance(receiver, name)?;
    if view.len() != args.len() {
        return None;
    }
    let mut bindings = FxHashMap::default();
    let mut requirements = Vec::new();
    for (pattern, actual) in args.iter().zip(view) {
        match pattern {
            TypeRef::Param { name, .. } if operation.type_params.contains(name) => {
                bindings.insert(name.clone(), actual);
            }
            other => {
                let declared = Type::from_ref(other, &FxHashMap::default()).ok()?;
                if actual.contains_variables() {
                    requirements.push((actual, declared));
                } else if actual != declared {
                    return None;
                }
            }
        }
    }
    Some(ReceiverMatch {
        bindings,
        requirements,
    })
}

pub struct EligibilityAnalyzer<'l, 'a> {
    lattice: &'l TypeLattice<'a>,
}

impl<'l, 'a> EligibilityAnalyzer<'l, 'a> {
    pub fn new(lattice: &'l TypeLattice<'a>) -> Self {
        Self { lattice }
    }

    pub fn analyze(&self, site: &CallSite) -> Eligibility {
        let verdict = self.evaluate(site);
        debug!(
            call_site = %site.id,
            callee = %site.callee.name,
            eligible = verdict.is_eligible(),
            "builder inference eligibility"
        );
        verdict
    }

    fn evaluate(&self, site: &CallSite) -> Eligibility {
        let callee = &site.callee;
        if callee.type_params.is_empty() {
            return Eligibility::NotEligible(IneligibleReason::NoTypeParameters);
        }
        if !site.explicit_type_arguments.is_empty() {
            return Eligibility::NotEligible(IneligibleReason::ExplicitTypeArguments);
        }

        // Each callee parameter is stood in for by a placeholder variable whose
        // id is its declaration index; placeholders never leave this function.
        let placeholders: FxHashMap<String, Type> = (0u32..)
            .zip(callee.type_params.iter())
            .map(|(index, decl)| (decl.name.clone(), Type::variable(VariableId::new(index))))
            .collect();
        let mut solved: FxHashMap<VariableId, Type> = FxHashMap::default();

        for (argument, param) in site.arguments.iter().zip(callee.params.iter()) {
            let Argument::Value { ty, .. } = argument else {
                continue;
            };
            let (Ok(pattern), Ok(actual)) = (
                Type::from_ref(&param.ty, &placeholders),
                Type::from_ref(ty, &FxHashMap::default()),
            ) else {
                continue;
            };
            self.unify(&pattern, &actual, Direction::ActualIsSubtype, &mut solved);
        }
        if let Some(expected) = &site.expected_type {
            if let (Ok(pattern), Ok(actual)) = (
                Type::from_ref(&callee.return_type, &placeholders),
                Type::from_ref(expected, &FxHashMap::default()),
            ) {
                self.unify(&pattern, &actual, Direction::ActualIsSupertype, &mut solved);
            }
        }

        let mut fixed = Vec::new();
        let mut postponed_params = Vec::new();
        for (index, decl) in (0u32..).zip(callee.type_params.iter()) {
            match solved.get(&VariableId::new(index)) {
                Some(ty) => fixed.push((decl.name.clone(), ty.clone())),
                None => postponed_params.push(decl.name.clone()),
            }
        }
        if postponed_params.is_empty() {
            return Eligibility::NotEligible(IneligibleReason::FullyDetermined);
        }

        let mut builder_arguments = Vec::new();
        let mut receiver_params: Vec<String> = Vec::new();
        let mut has_evidence = false;
        for (index, (argument, param)) in site
            .arguments
            .iter()
            .zip(callee.params.iter())
            .enumerate()
        {
            if !matches!(argument, Argument::Lambda(_)) {
                continue;
            }
            // A bare type parameter as receiver (`T.() -> Unit`) is not supported.
            let Some(receiver @ TypeRef::Named { .. }) = param.ty.receiver() else {
                continue;
            };
            let mentioned: Vec<&String> = postponed_params
                .iter()
                .filter(|name| receiver.mentions_param(name))
                .collect();
            if mentioned.is_empty() {
                continue;
            }
            builder_arguments.push(index);
            for name in &mentioned {
                if !receiver_params.contains(name) {
                    receiver_params.push((*name).clone());
                }
            }

            let Ok(receiver_ty) = Type::from_ref(receiver, &placeholders) else {
                continue;
            };
            has_evidence |= site
                .operations
                .iter()
                .filter(|operation| operation.visibility.is_accessible())
                .any(|operation| {
                    self.supplies_evidence(operation, &receiver_ty, &mentioned, &placeholders)
                });
        }

        if builder_arguments.is_empty() {
            return Eligibility::NotEligible(IneligibleReason::NoReceiverLambda);
        }
        if !has_evidence {
            return Eligibility::NotEligible(IneligibleReason::NoEvidenceSource);
        }

        let declared_order = |name: &String| {
            callee
                .type_params
                .iter()
                .position(|decl| &decl.name == name)
                .unwrap_or(usize::MAX)
        };
        receiver_params.sort_by_key(declared_order);

        Eligibility::Eligible(EligibleCall {
            receiver_params,
            postponed_params,
            fixed,
            builder_arguments,
        })
    }

    fn supplies_evidence(
        &self,
        operation: &OperationDecl,
        receiver: &Type,
        mentioned: &[&String],
        placeholders: &FxHashMap<String, Type>,
    ) -> bool {
        let Some(matched) = match_operation_receiver(self.lattice, operation, receiver) else {
            return false;
        };
        if !matched.requirements.is_empty() {
            return true;
        }
        mentioned.iter().any(|callee_param| {
            let Some(placeholder) = placeholders.get(callee_param.as_str()) else {
                return false;
            };
            matched.bindings.iter().any(|(operation_param, bound)| {
                bound.variables().iter().any(|id| placeholder.as_variable() == Some(*id))
                    && operation.signature_mentions(operation_param)
            })
        })
    }

    /// Structural unification of a placeholder pattern against a concrete type.
    fn unify(
        &self,
        pattern: &Type,
        actual: &Type,
        direction: Direction,
        solved: &mut FxHashMap<VariableId, Type>,
    ) {
        match pattern {
            Type::Variable { id, nullable } => {
                let value = if *nullable {
                    actual.clone().non_null()
                } else {
                    actual.clone()
                };
                solved.entry(*id).or_insert(value);
            }
            Type::Concrete { name, args, .. } => {
                let (Some(actual_name), pattern_args, actual_args) =
                    (actual.name(), args.clone(), actual.args().to_vec())
                else {
                    return;
                };
                let pairs = if actual_name == name {
                    Some((pattern_args, actual_args))
                } else {
                    match direction {
                        Direction::ActualIsSubtype => self
                            .lattice
                            .supertype_instance(actual, name)
                            .map(|view| (pattern_args, view)),
                        Direction::ActualIsSupertype => self
                            .lattice
                            .supertype_instance(pattern, actual_name)
                            .map(|view| (view, actual_args)),
                    }
                };
                let Some((left, right)) = pairs else {
                    return;
                };
                if left.len() != right.len() {
                    return;
                }
                for (p, a) in left.iter().zip(right.iter()) {
                    self.unify(p, a, direction, solved);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Value arguments: the argument type is a subtype of the parameter type.
    ActualIsSubtype,
    /// Expected type: the call's return type is a subtype of it.
    ActualIsSupertype,
}
