//! Errors for malformed input and broken engine invariants.
//!
//! Inference failures caused by contradictory evidence are not errors: they
//! are reported through [`crate::InferenceOutcome::Failure`].

use crate::types::{SessionId, VariableId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("variable {variable} is not owned by {session}")]
    ForeignVariable {
        variable: VariableId,
        session: SessionId,
    },
    #[error("{session} is frozen; constraints can no longer be added")]
    SessionFrozen { session: SessionId },
    #[error("variable id space exhausted; allocation would reuse a live id")]
    VariableSpaceExhausted,
    #[error("no accessible operation `{member}` with {arity} parameter(s) on `{receiver}`")]
    UnresolvedMember {
        member: String,
        arity: usize,
        receiver: String,
    },
    #[error("unknown local `{name}`")]
    UnknownLocal { name: String },
    #[error("type parameter `{name}` is not bound in this context")]
    UnboundTypeParameter { name: String },
    #[error("lambda parameter #{index} requested but the lambda declares {available}")]
    LambdaParameterOutOfRange { index: usize, available: usize },
    #[error("`{callee}` expects {expected} argument(s) but the call provides {found}")]
    ArgumentCountMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
}
