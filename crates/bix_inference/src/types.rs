//! Type representation used while inferring builder type arguments.
//!
//! A [`Type`] is either a fully resolved nominal type or a postponed variable
//! owned by exactly one inference session. Bound sets are not stored inline:
//! they live in the session's constraint list and are partitioned per variable
//! by the resolver.

use crate::error::EngineError;
use bix_ast::TypeRef;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Names the engine itself needs to talk about.
pub mod well_known {
    pub const ANY: &str = "Any";
    pub const NOTHING: &str = "Nothing";
    pub const BOOLEAN: &str = "Boolean";
    pub const INT: &str = "Int";
    pub const STRING: &str = "String";
    pub const UNIT: &str = "Unit";

    /// Nominal name of an `n`-ary function type.
    pub fn function(arity: usize) -> String {
        format!("Function{arity}")
    }

    /// Nominal name of a callable reference to an `n`-ary operation.
    pub fn callable_reference(arity: usize) -> String {
        format!("KFunction{arity}")
    }
}

/// Identifier of a postponed type variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VariableId(u32);

impl VariableId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Identifier of an inference session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(u32);

impl SessionId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    Concrete {
        name: String,
        args: Vec<Type>,
        nullable: bool,
    },
    Variable {
        id: VariableId,
        nullable: bool,
    },
}

impl Type {
    pub fn concrete(name: impl Into<String>) -> Self {
        Type::Concrete {
            name: name.into(),
            args: Vec::new(),
            nullable: false,
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::Concrete {
            name: name.into(),
            args,
            nullable: false,
        }
    }

    pub fn variable(id: VariableId) -> Self {
        Type::Variable {
            id,
            nullable: false,
        }
    }

    pub fn with_nullable(mut self, flag: bool) -> Self {
        match &mut self {
            Type::Concrete { nullable, .. } | Type::Variable { nullable, .. } => *nullable = flag,
        }
        self
    }

    pub fn nullable(self) -> Self {
        self.with_nullable(true)
    }

    pub fn non_null(self) -> Self {
        self.with_nullable(false)
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Type::Concrete { nullable, .. } | Type::Variable { nullable, .. } => *nullable,
        }
    }

    /// Nominal name for concrete types.
    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Concrete { name, .. } => Some(name),
            Type::Variable { .. } => None,
        }
    }

    pub fn args(&self) -> &[Type] {
        match self {
            Type::Concrete { args, .. } => args,
            Type::Variable { .. } => &[],
        }
    }

    /// The variable when `self` is a bare (possibly nullable) variable.
    pub fn as_variable(&self) -> Option<VariableId> {
        match self {
            Type::Variable { id, .. } => Some(*id),
            Type::Concrete { .. } => None,
        }
    }

    pub fn contains_variables(&self) -> bool {
        match self {
            Type::Variable { .. } => true,
            Type::Concrete { args, .. } => args.iter().any(Type::contains_variables),
        }
    }

    /// Variables mentioned anywhere in the type, sorted for deterministic output.
    pub fn variables(&self) -> Vec<VariableId> {
        let mut acc = BTreeSet::new();
        self.collect_variables(&mut acc);
        acc.into_iter().collect()
    }

    fn collect_variables(&self, acc: &mut BTreeSet<VariableId>) {
        match self {
            Type::Variable { id, .. } => {
                acc.insert(*id);
            }
            Type::Concrete { args, .. } => {
                for arg in args {
                    arg.collect_variables(acc);
                }
            }
        }
    }

    /// Replaces variables for which `lookup` has an answer. A nullable
    /// occurrence stays nullable after substitution.
    pub fn substitute<F>(&self, lookup: &F) -> Type
    where
        F: Fn(VariableId) -> Option<Type>,
    {
        match self {
            Type::Variable { id, nullable } => match lookup(*id) {
                Some(replacement) => {
                    let flag = *nullable || replacement.is_nullable();
                    replacement.with_nullable(flag)
                }
                None => self.clone(),
            },
            Type::Concrete {
                name,
                args,
                nullable,
            } => Type::Concrete {
                name: name.clone(),
                args: args.iter().map(|arg| arg.substitute(lookup)).collect(),
                nullable: *nullable,
            },
        }
    }

    /// Lowers a syntactic reference, replacing parameter names via `bindings`.
    pub fn from_ref(
        reference: &TypeRef,
        bindings: &FxHashMap<String, Type>,
    ) -> Result<Type, EngineError> {
        match reference {
            TypeRef::Named {
                name,
                args,
                nullable,
            } => {
                let args = args
                    .iter()
                    .map(|arg| Type::from_ref(arg, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::generic(name.clone(), args).with_nullable(*nullable))
            }
            TypeRef::Param { name, nullable } => {
                let bound = bindings
                    .get(name)
                    .ok_or_else(|| EngineError::UnboundTypeParameter { name: name.clone() })?;
                let flag = *nullable || bound.is_nullable();
                Ok(bound.clone().with_nullable(flag))
            }
            TypeRef::Function {
                receiver,
                params,
                return_type,
                nullable,
            } => {
                let mut args = Vec::with_capacity(params.len() + 2);
                if let Some(receiver) = receiver {
                    args.push(Type::from_ref(receiver, bindings)?);
                }
                for param in params {
                    args.push(Type::from_ref(param, bindings)?);
                }
                let arity = args.len();
                args.push(Type::from_ref(return_type, bindings)?);
                Ok(Type::generic(well_known::function(arity), args).with_nullable(*nullable))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Concrete {
                name,
                args,
                nullable,
            } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (index, arg) in args.iter().enumerate() {
                        if index > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                if *nullable {
                    f.write_str("?")?;
                }
                Ok(())
            }
            Type::Variable { id, nullable } => {
                write!(f, "{id}")?;
                if *nullable {
                    f.write_str("?")?;
                }
                Ok(())
            }
        }
    }
}
