// bix_ast/expression - Typed expression nodes inside a builder lambda
use crate::signature::FunctionRef;
use crate::statement::Statement;
use crate::types::{Span, TypeRef};
use serde::{Deserialize, Serialize};

/// Operations every type supports, including a postponed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniversalOperation {
    Equals,
    HashCode,
    ToString,
}

impl UniversalOperation {
    pub fn name(self) -> &'static str {
        match self {
            UniversalOperation::Equals => "equals",
            UniversalOperation::HashCode => "hashCode",
            UniversalOperation::ToString => "toString",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            UniversalOperation::Equals => 1,
            UniversalOperation::HashCode | UniversalOperation::ToString => 0,
        }
    }
}

/// Expression node. Overload resolution has already happened: calls name
/// the operation they target and every literal carries its static type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal {
        ty: TypeRef,
        span: Span,
    },

    // Reference to a `val` declared earlier in the lambda
    Local {
        name: String,
        span: Span,
    },

    // The lambda's implicit receiver
    This {
        span: Span,
    },

    // Positional lambda parameter (`it` for the first)
    LambdaParameter {
        index: usize,
        span: Span,
    },

    // Call on the implicit receiver: `add(1)`, `put("k", 2)`
    MemberCall {
        member: String,
        args: Vec<Expression>,
        span: Span,
    },

    // Call to a resolved function outside the receiver: `takeMyLong(x)`, `x.isMoreThat3()`
    FunctionCall {
        function: FunctionRef,
        receiver: Option<Box<Expression>>,
        args: Vec<Expression>,
        span: Span,
    },

    // Callable reference to a receiver operation: `::get`
    MemberReference {
        member: String,
        arity: usize,
        span: Span,
    },

    // Ordering comparison: `left < right`
    Comparison {
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },

    Universal {
        target: Box<Expression>,
        operation: UniversalOperation,
        args: Vec<Expression>,
        span: Span,
    },

    Block {
        statements: Vec<Statement>,
        span: Span,
    },

    If {
        condition: Box<Expression>,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
        span: Span,
    },
}

impl Expression {
    pub fn span(&self) -> &Span {
        match self {
            Expression::Literal { span, .. }
            | Expression::Local { span, .. }
            | Expression::This { span }
            | Expression::LambdaParameter { span, .. }
            | Expression::MemberCall { span, .. }
            | Expression::FunctionCall { span, .. }
            | Expression::MemberReference { span, .. }
            | Expression::Comparison { span, .. }
            | Expression::Universal { span, .. }
            | Expression::Block { span, .. }
            | Expression::If { span, .. } => span,
        }
    }

    pub fn literal(ty: TypeRef, span: Span) -> Self {
        Expression::Literal { ty, span }
    }

    pub fn local(name: impl Into<String>, span: Span) -> Self {
        Expression::Local {
            name: name.into(),
            span,
        }
    }

    pub fn member_call(member: impl Into<String>, args: Vec<Expression>, span: Span) -> Self {
        Expression::MemberCall {
            member: member.into(),
            args,
            span,
        }
    }

    pub fn function_call(function: FunctionRef, args: Vec<Expression>, span: Span) -> Self {
        Expression::FunctionCall {
            function,
            receiver: None,
            args,
            span,
        }
    }

    pub fn extension_call(
        function: FunctionRef,
        receiver: Expression,
        args: Vec<Expression>,
        span: Span,
    ) -> Self {
        Expression::FunctionCall {
            function,
            receiver: Some(Box::new(receiver)),
            args,
            span,
        }
    }

    pub fn universal(target: Expression, operation: UniversalOperation, span: Span) -> Self {
        Expression::Universal {
            target: Box::new(target),
            operation,
            args: Vec::new(),
            span,
        }
    }
}
