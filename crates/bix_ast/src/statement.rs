// bix_ast/statement - Statements and lambda bodies
use crate::expression::Expression;
use crate::types::{Span, TypeRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    // val name: Declared = value
    Let {
        name: String,
        declared: Option<TypeRef>,
        value: Expression,
        span: Span,
    },
    Expression {
        expr: Expression,
        span: Span,
    },
}

impl Statement {
    pub fn let_(name: impl Into<String>, declared: Option<TypeRef>, value: Expression) -> Self {
        let span = value.span().clone();
        Statement::Let {
            name: name.into(),
            declared,
            value,
            span,
        }
    }

    pub fn expr(expr: Expression) -> Self {
        let span = expr.span().clone();
        Statement::Expression { expr, span }
    }

    pub fn span(&self) -> &Span {
        match self {
            Statement::Let { span, .. } | Statement::Expression { span, .. } => span,
        }
    }
}

/// Lambda argument. When the last statement is an expression it is the
/// lambda's result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub body: Vec<Statement>,
    pub span: Span,
}

impl LambdaExpr {
    pub fn new(body: Vec<Statement>, span: Span) -> Self {
        Self { body, span }
    }

    pub fn result_expression(&self) -> Option<&Expression> {
        match self.body.last() {
            Some(Statement::Expression { expr, .. }) => Some(expr),
            _ => None,
        }
    }
}
