// bix_ast/call_site - A generic call whose type arguments may need builder inference
use crate::signature::{FunctionSignature, OperationDecl};
use crate::statement::LambdaExpr;
use crate::types::{Span, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallSiteId(pub u32);

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Positional argument, aligned with `FunctionSignature::params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// Ordinary value argument whose static type is already known.
    Value { ty: TypeRef, span: Span },
    Lambda(LambdaExpr),
}

impl Argument {
    pub fn span(&self) -> &Span {
        match self {
            Argument::Value { span, .. } => span,
            Argument::Lambda(lambda) => &lambda.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    pub id: CallSiteId,
    pub callee: FunctionSignature,
    /// Explicit `<...>` type arguments; empty when omitted.
    pub explicit_type_arguments: Vec<TypeRef>,
    pub arguments: Vec<Argument>,
    /// Type expected by the surrounding context, e.g. a declared `val` type.
    pub expected_type: Option<TypeRef>,
    /// Members and extensions visible at the call site.
    pub operations: Vec<OperationDecl>,
    pub span: Span,
}

impl CallSite {
    pub fn new(id: CallSiteId, callee: FunctionSignature, span: Span) -> Self {
        Self {
            id,
            callee,
            explicit_type_arguments: Vec::new(),
            arguments: Vec::new(),
            expected_type: None,
            operations: Vec::new(),
            span,
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_lambda(self, lambda: LambdaExpr) -> Self {
        self.with_argument(Argument::Lambda(lambda))
    }

    pub fn with_operation(mut self, operation: OperationDecl) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_operations(mut self, operations: impl IntoIterator<Item = OperationDecl>) -> Self {
        self.operations.extend(operations);
        self
    }

    pub fn with_expected_type(mut self, expected: TypeRef) -> Self {
        self.expected_type = Some(expected);
        self
    }

    pub fn with_explicit_type_arguments(mut self, arguments: Vec<TypeRef>) -> Self {
        self.explicit_type_arguments = arguments;
        self
    }
}
