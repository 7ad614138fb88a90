// bix_ast/signature - Declarations referenced from a call site
use crate::types::TypeRef;
use serde::{Deserialize, Serialize};

/// Type parameter of a callee, e.g. `T : Number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParamDecl {
    pub name: String,
    /// Declared upper bound. `None` means the universal top type (`Any?`).
    pub upper_bound: Option<TypeRef>,
}

impl TypeParamDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upper_bound: None,
        }
    }

    pub fn bounded(name: impl Into<String>, upper_bound: TypeRef) -> Self {
        Self {
            name: name.into(),
            upper_bound: Some(upper_bound),
        }
    }
}

/// Value parameter of a callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeRef,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Signature of the generic function being called (`buildList`, `myBuilder`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<ParamDecl>,
    pub return_type: TypeRef,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            params: Vec::new(),
            return_type,
        }
    }

    pub fn with_type_param(mut self, param: TypeParamDecl) -> Self {
        self.type_params.push(param);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.params.push(ParamDecl::new(name, ty));
        self
    }

    pub fn type_param(&self, name: &str) -> Option<&TypeParamDecl> {
        self.type_params.iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Member,
    Extension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

impl Visibility {
    /// Whether code inside a builder lambda may call an operation with this visibility.
    pub fn is_accessible(self) -> bool {
        !matches!(self, Visibility::Private)
    }
}

/// Operation callable on a receiver: a class member or an extension function.
///
/// `type_params` lists the names that `receiver`, `params` and `return_type`
/// may mention. For members these are the owner class parameters; for
/// extensions they are the extension's own parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDecl {
    pub name: String,
    pub kind: OperationKind,
    pub visibility: Visibility,
    pub type_params: Vec<String>,
    pub receiver: TypeRef,
    pub params: Vec<TypeRef>,
    pub return_type: TypeRef,
}

impl OperationDecl {
    pub fn member(name: impl Into<String>, receiver: TypeRef) -> Self {
        Self::new(name, OperationKind::Member, receiver)
    }

    pub fn extension(name: impl Into<String>, receiver: TypeRef) -> Self {
        Self::new(name, OperationKind::Extension, receiver)
    }

    fn new(name: impl Into<String>, kind: OperationKind, receiver: TypeRef) -> Self {
        let type_params = receiver
            .param_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            name: name.into(),
            kind,
            visibility: Visibility::Public,
            type_params,
            receiver,
            params: Vec::new(),
            return_type: TypeRef::named("Unit"),
        }
    }

    pub fn param(mut self, ty: TypeRef) -> Self {
        self.params.push(ty);
        self
    }

    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.return_type = ty;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// True if a parameter or the return type mentions the declared type parameter `name`.
    pub fn signature_mentions(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.mentions_param(name)) || self.return_type.mentions_param(name)
    }
}

/// Already-resolved non-generic function called from inside a lambda body,
/// such as `takeMyLong(x: Long)` or the extension `String.isMoreThat3()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub name: String,
    pub receiver: Option<TypeRef>,
    pub params: Vec<TypeRef>,
    pub return_type: TypeRef,
}

impl FunctionRef {
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            receiver: None,
            params,
            return_type,
        }
    }

    pub fn with_receiver(mut self, receiver: TypeRef) -> Self {
        self.receiver = Some(receiver);
        self
    }
}
