// bix_ast/types - Position information and syntactic type references
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position information for tree nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Single-line span covering `[start, end)` columns on `line`.
    pub fn line(line: usize, start: usize, end: usize) -> Self {
        Self::new(line, start, line, end)
    }

    pub fn dummy() -> Self {
        Self::default()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_column)
    }
}

/// Type as written in a declaration, before any inference variable exists.
///
/// `Param` refers to a type parameter by name; its meaning depends on the
/// declaration that introduces it (callee signature, class, or extension).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    Named {
        name: String,
        args: Vec<TypeRef>,
        nullable: bool,
    },
    Param {
        name: String,
        nullable: bool,
    },
    Function {
        receiver: Option<Box<TypeRef>>,
        params: Vec<TypeRef>,
        return_type: Box<TypeRef>,
        nullable: bool,
    },
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
            nullable: false,
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args,
            nullable: false,
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        TypeRef::Param {
            name: name.into(),
            nullable: false,
        }
    }

    pub fn function(params: Vec<TypeRef>, return_type: TypeRef) -> Self {
        TypeRef::Function {
            receiver: None,
            params,
            return_type: Box::new(return_type),
            nullable: false,
        }
    }

    /// Function type with an explicit receiver: `Receiver.(params) -> R`.
    pub fn function_with_receiver(
        receiver: TypeRef,
        params: Vec<TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        TypeRef::Function {
            receiver: Some(Box::new(receiver)),
            params,
            return_type: Box::new(return_type),
            nullable: false,
        }
    }

    /// Returns the same reference marked nullable (`T?`).
    pub fn nullable(mut self) -> Self {
        match &mut self {
            TypeRef::Named { nullable, .. }
            | TypeRef::Param { nullable, .. }
            | TypeRef::Function { nullable, .. } => *nullable = true,
        }
        self
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            TypeRef::Named { nullable, .. }
            | TypeRef::Param { nullable, .. }
            | TypeRef::Function { nullable, .. } => *nullable,
        }
    }

    /// Receiver of a function type, if this is one and it declares a receiver.
    pub fn receiver(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Function { receiver, .. } => receiver.as_deref(),
            _ => None,
        }
    }

    /// True if the reference mentions the type parameter `name` anywhere.
    pub fn mentions_param(&self, name: &str) -> bool {
        match self {
            TypeRef::Named { args, .. } => args.iter().any(|arg| arg.mentions_param(name)),
            TypeRef::Param { name: own, .. } => own == name,
            TypeRef::Function {
                receiver,
                params,
                return_type,
                ..
            } => {
                receiver
                    .as_deref()
                    .map(|r| r.mentions_param(name))
                    .unwrap_or(false)
                    || params.iter().any(|p| p.mentions_param(name))
                    || return_type.mentions_param(name)
            }
        }
    }

    /// Collects every parameter name mentioned, in first-occurrence order.
    pub fn param_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_param_names(&mut names);
        names
    }

    fn collect_param_names<'a>(&'a self, acc: &mut Vec<&'a str>) {
        match self {
            TypeRef::Named { args, .. } => {
                for arg in args {
                    arg.collect_param_names(acc);
                }
            }
            TypeRef::Param { name, .. } => {
                if !acc.contains(&name.as_str()) {
                    acc.push(name);
                }
            }
            TypeRef::Function {
                receiver,
                params,
                return_type,
                ..
            } => {
                if let Some(receiver) = receiver {
                    receiver.collect_param_names(acc);
                }
                for param in params {
                    param.collect_param_names(acc);
                }
                return_type.collect_param_names(acc);
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nullable = match self {
            TypeRef::Named {
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
                *nullable
            }
            TypeRef::Param { name, nullable } => {
                f.write_str(name)?;
                *nullable
            }
            TypeRef::Function {
                receiver,
                params,
                return_type,
                nullable,
            } => {
                if *nullable {
                    f.write_str("(")?;
                }
                if let Some(receiver) = receiver {
                    write!(f, "{receiver}.")?;
                }
                f.write_str("(")?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {return_type}")?;
                if *nullable {
                    f.write_str(")")?;
                }
                *nullable
            }
        };
        if nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}
