//! Constraint model and the lambda-body collector that produces it.

mod collector;

pub use collector::ConstraintCollector;

use crate::types::{Type, VariableId};
use bix_ast::Span;
use serde::Serialize;
use std::fmt;

/// Where a piece of evidence came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstraintOrigin {
    /// Value passed to a parameter of a receiver operation.
    OperationArgument { operation: String, index: usize },
    /// Value passed to a parameter of a resolved outside function.
    FunctionArgument { function: String, index: usize },
    /// Value used as the receiver of an outside extension function.
    ExtensionReceiver { function: String },
    /// `val name: Declared = value`.
    Declaration { name: String },
    /// Operand of an ordering comparison.
    Comparison,
    /// Condition of an `if`.
    Condition,
    /// Trailing expression of a lambda flowing into its declared return type.
    LambdaResult,
    /// The callee's declared upper bound for the type parameter.
    DeclaredBound { parameter: String },
}

impl fmt::Display for ConstraintOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintOrigin::OperationArgument { operation, index } => {
                write!(f, "argument #{index} of `{operation}`")
            }
            ConstraintOrigin::FunctionArgument { function, index } => {
                write!(f, "argument #{index} of `{function}`")
            }
            ConstraintOrigin::ExtensionReceiver { function } => {
                write!(f, "receiver of `{function}`")
            }
            ConstraintOrigin::Declaration { name } => write!(f, "declaration of `{name}`"),
            ConstraintOrigin::Comparison => f.write_str("comparison"),
            ConstraintOrigin::Condition => f.write_str("condition"),
            ConstraintOrigin::LambdaResult => f.write_str("lambda result"),
            ConstraintOrigin::DeclaredBound { parameter } => {
                write!(f, "declared bound of `{parameter}`")
            }
        }
    }
}

/// Source position and originating construct of a constraint. `order` is the
/// emission index inside the session and orders diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub span: Span,
    pub origin: ConstraintOrigin,
    pub order: usize,
}

impl Provenance {
    pub fn new(span: Span, origin: ConstraintOrigin) -> Self {
        Self {
            span,
            origin,
            order: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstraintKind {
    /// `sub <: sup`
    Subtype { sub: Type, sup: Type },
    /// `left == right`
    Equal { left: Type, right: Type },
}

impl ConstraintKind {
    /// Variables mentioned on either side, sorted.
    pub fn variables(&self) -> Vec<VariableId> {
        let (a, b) = match self {
            ConstraintKind::Subtype { sub, sup } => (sub, sup),
            ConstraintKind::Equal { left, right } => (left, right),
        };
        let mut vars = a.variables();
        vars.extend(b.variables());
        vars.sort();
        vars.dedup();
        vars
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Subtype { sub, sup } => write!(f, "{sub} <: {sup}"),
            ConstraintKind::Equal { left, right } => write!(f, "{left} == {right}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub provenance: Provenance,
}

impl Constraint {
    pub fn subtype(sub: Type, sup: Type, provenance: Provenance) -> Self {
        Self {
            kind: ConstraintKind::Subtype { sub, sup },
            provenance,
        }
    }

    pub fn equal(left: Type, right: Type, provenance: Provenance) -> Self {
        Self {
            kind: ConstraintKind::Equal { left, right },
            provenance,
        }
    }
}

/// Append-only list of constraints in emission order.
#[derive(Debug, Default, Clone)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends and stamps the emission order into the provenance.
    pub fn push(&mut self, mut constraint: Constraint) {
        constraint.provenance.order = self.constraints.len();
        self.constraints.push(constraint);
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn drain(self) -> Vec<Constraint> {
        self.constraints
    }
}
