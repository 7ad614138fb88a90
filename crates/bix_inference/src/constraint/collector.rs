//! Single pre-order walk over the builder lambdas of one call site.

use super::{Constraint, ConstraintOrigin, Provenance};
use crate::eligibility::match_operation_receiver;
use crate::error::EngineError;
use crate::lattice::TypeLattice;
use crate::session::{InferenceSession, LambdaSignature};
use crate::types::{well_known, Type};
use bix_ast::{
    Argument, CallSite, Expression, FunctionRef, OperationDecl, Span, Statement,
    UniversalOperation,
};
use rustc_hash::FxHashMap;
use tracing::trace;

/// How a value reaches the type it is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowContext {
    /// `val x: T = value`: a bare variable is pinned to a non-null `T`.
    Declaration,
    /// Argument passing, comparison and other consuming positions.
    Consumer,
}

/// Lambda currently being walked.
#[derive(Debug, Clone)]
struct Frame {
    receiver: Option<Type>,
    params: Vec<Type>,
}

/// Walks lambda bodies and appends constraints to the owning session.
pub struct ConstraintCollector<'c, 'a> {
    lattice: &'c TypeLattice<'a>,
    operations: &'c [OperationDecl],
    session: &'c mut InferenceSession,
    scopes: Vec<FxHashMap<String, Type>>,
    frame: Option<Frame>,
    visited: usize,
}

impl<'c, 'a> ConstraintCollector<'c, 'a> {
    pub fn new(
        lattice: &'c TypeLattice<'a>,
        operations: &'c [OperationDecl],
        session: &'c mut InferenceSession,
    ) -> Self {
        Self {
            lattice,
            operations,
            session,
            scopes: Vec::new(),
            frame: None,
            visited: 0,
        }
    }

    /// Walks every lambda argument of `site` and returns the number of
    /// expressions visited.
    pub fn collect(mut self, site: &CallSite) -> Result<usize, EngineError> {
        let lambdas: Vec<LambdaSignature> = self.session.lambdas().to_vec();
        for signature in &lambdas {
            let Some(Argument::Lambda(lambda)) = site.arguments.get(signature.argument) else {
                continue;
            };
            self.frame = Some(Frame {
                receiver: signature.receiver.clone(),
                params: signature.params.clone(),
            });
            self.scopes.push(FxHashMap::default());
            let result = self.walk_statements(&lambda.body)?;
            self.scopes.pop();
            self.frame = None;

            if let (Some(result), false) = (result, is_unit(&signature.return_type)) {
                let span = lambda
                    .result_expression()
                    .map(|expr| expr.span().clone())
                    .unwrap_or_else(|| lambda.span.clone());
                self.flow(
                    result,
                    signature.return_type.clone(),
                    &span,
                    ConstraintOrigin::LambdaResult,
                    FlowContext::Consumer,
                )?;
            }
        }
        Ok(self.visited)
    }

    /// Returns the type of the trailing expression statement, if any.
    fn walk_statements(&mut self, statements: &[Statement]) -> Result<Option<Type>, EngineError> {
        let mut last = None;
        for statement in statements {
            last = match statement {
                Statement::Let {
                    name,
                    declared,
                    value,
                    ..
                } => {
                    let value_ty = self.visit(value)?;
                    let bound = match declared {
                        Some(declared) => {
                            let declared = Type::from_ref(declared, &FxHashMap::default())?;
                            self.flow(
                                value_ty,
                                declared.clone(),
                                value.span(),
                                ConstraintOrigin::Declaration { name: name.clone() },
                                FlowContext::Declaration,
                            )?;
                            declared
                        }
                        None => value_ty,
                    };
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.insert(name.clone(), bound);
                    }
                    None
                }
                Statement::Expression { expr, .. } => Some(self.visit(expr)?),
            };
        }
        Ok(last)
    }

    fn walk_scoped(&mut self, statements: &[Statement]) -> Result<(), EngineError> {
        self.scopes.push(FxHashMap::default());
        let walked = self.walk_statements(statements);
        self.scopes.pop();
        walked.map(|_| ())
    }

    fn visit(&mut self, expr: &Expression) -> Result<Type, EngineError> {
        self.visited += 1;
        let ty = self.infer(expr)?;
        self.session.record_expression(expr.span().clone(), ty.clone())?;
        Ok(ty)
    }

    fn infer(&mut self, expr: &Expression) -> Result<Type, EngineError> {
        match expr {
            Expression::Literal { ty, .. } => Type::from_ref(ty, &FxHashMap::default()),
            Expression::Local { name, .. } => self
                .scopes
                .iter()
                .rev()
                .find_map(|scope| scope.get(name))
                .cloned()
                .ok_or_else(|| EngineError::UnknownLocal { name: name.clone() }),
            Expression::This { .. } => self.receiver().ok_or_else(|| EngineError::UnknownLocal {
                name: "this".to_string(),
            }),
            Expression::LambdaParameter { index, .. } => {
                let params = self
                    .frame
                    .as_ref()
                    .map(|frame| frame.params.as_slice())
                    .unwrap_or_default();
                params
                    .get(*index)
                    .cloned()
                    .ok_or(EngineError::LambdaParameterOutOfRange {
                        index: *index,
                        available: params.len(),
                    })
            }
            Expression::MemberCall { member, args, span } => self.member_call(member, args, span),
            Expression::FunctionCall {
                function,
                receiver,
                args,
                span,
            } => self.function_call(function, receiver.as_deref(), args, span),
            Expression::MemberReference { member, arity, span } => {
                let (operation, bindings) = self.resolve_member(member, *arity, span)?;
                let mut args = operation
                    .params
                    .iter()
                    .map(|param| Type::from_ref(param, &bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                args.push(Type::from_ref(&operation.return_type, &bindings)?);
                Ok(Type::generic(well_known::callable_reference(*arity), args))
            }
            Expression::Comparison { left, right, span } => {
                let left = self.visit(left)?;
                let right = self.visit(right)?;
                self.flow(
                    left,
                    right,
                    span,
                    ConstraintOrigin::Comparison,
                    FlowContext::Consumer,
                )?;
                Ok(Type::concrete(well_known::BOOLEAN))
            }
            Expression::Universal {
                target,
                operation,
                args,
                ..
            } => {
                self.visit(target)?;
                for arg in args {
                    self.visit(arg)?;
                }
                self.session.record_universal_use();
                Ok(universal_result(*operation))
            }
            Expression::Block { statements, .. } => {
                self.walk_scoped(statements)?;
                Ok(Type::concrete(well_known::UNIT))
            }
            Expression::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let condition_ty = self.visit(condition)?;
                self.flow(
                    condition_ty,
                    Type::concrete(well_known::BOOLEAN),
                    condition.span(),
                    ConstraintOrigin::Condition,
                    FlowContext::Consumer,
                )?;
                self.walk_scoped(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.walk_scoped(else_branch)?;
                }
                Ok(Type::concrete(well_known::UNIT))
            }
        }
    }

    fn member_call(
        &mut self,
        member: &str,
        args: &[Expression],
        span: &Span,
    ) -> Result<Type, EngineError> {
        let (operation, bindings) = self.resolve_member(member, args.len(), span)?;
        for (index, (arg, param)) in args.iter().zip(operation.params.iter()).enumerate() {
            let arg_ty = self.visit(arg)?;
            let param_ty = Type::from_ref(param, &bindings)?;
            self.flow(
                arg_ty,
                param_ty,
                arg.span(),
                ConstraintOrigin::OperationArgument {
                    operation: operation.name.clone(),
                    index,
                },
                FlowContext::Consumer,
            )?;
        }
        Type::from_ref(&operation.return_type, &bindings)
    }

    fn function_call(
        &mut self,
        function: &FunctionRef,
        receiver: Option<&Expression>,
        args: &[Expression],
        span: &Span,
    ) -> Result<Type, EngineError> {
        if args.len() != function.params.len() {
            return Err(EngineError::ArgumentCountMismatch {
                callee: function.name.clone(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        let none = FxHashMap::default();

        let receiver_ty = match receiver {
            Some(expr) => Some((self.visit(expr)?, expr.span().clone())),
            None if function.receiver.is_some() => self.receiver().map(|ty| (ty, span.clone())),
            None => None,
        };
        if let (Some(declared), Some((actual, receiver_span))) = (&function.receiver, receiver_ty)
        {
            self.flow(
                actual,
                Type::from_ref(declared, &none)?,
                &receiver_span,
                ConstraintOrigin::ExtensionReceiver {
                    function: function.name.clone(),
                },
                FlowContext::Consumer,
            )?;
        }

        for (index, (arg, param)) in args.iter().zip(function.params.iter()).enumerate() {
            let arg_ty = self.visit(arg)?;
            self.flow(
                arg_ty,
                Type::from_ref(param, &none)?,
                arg.span(),
                ConstraintOrigin::FunctionArgument {
                    function: function.name.clone(),
                    index,
                },
                FlowContext::Consumer,
            )?;
        }
        Type::from_ref(&function.return_type, &none)
    }

    /// Finds the accessible operation `member/arity` applicable to the lambda
    /// receiver and binds its type parameters. Receiver requirements of
    /// operations declared on a concrete instantiation become equalities.
    fn resolve_member(
        &mut self,
        member: &str,
        arity: usize,
        span: &Span,
    ) -> Result<(&'c OperationDecl, FxHashMap<String, Type>), EngineError> {
        let receiver = self.receiver();
        let unresolved = || EngineError::UnresolvedMember {
            member: member.to_string(),
            arity,
            receiver: receiver
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<no receiver>".to_string()),
        };
        let Some(receiver_ty) = receiver.as_ref() else {
            return Err(unresolved());
        };
        let operations: &'c [OperationDecl] = self.operations;
        let found = operations
            .iter()
            .filter(|operation| {
                operation.visibility.is_accessible()
                    && operation.name == member
                    && operation.arity() == arity
            })
            .find_map(|operation| {
                match_operation_receiver(self.lattice, operation, receiver_ty)
                    .map(|matched| (operation, matched))
            });
        let Some((operation, matched)) = found else {
            return Err(unresolved());
        };
        for (actual, declared) in matched.requirements {
            self.emit(Constraint::equal(
                actual,
                declared,
                Provenance::new(
                    span.clone(),
                    ConstraintOrigin::ExtensionReceiver {
                        function: operation.name.clone(),
                    },
                ),
            ))?;
        }
        Ok((operation, matched.bindings))
    }

    fn receiver(&self) -> Option<Type> {
        self.frame.as_ref().and_then(|frame| frame.receiver.clone())
    }

    /// Records that a value of type `actual` flows into a position of type `target`.
    fn flow(
        &mut self,
        actual: Type,
        target: Type,
        span: &Span,
        origin: ConstraintOrigin,
        context: FlowContext,
    ) -> Result<(), EngineError> {
        if actual == target || !(actual.contains_variables() || target.contains_variables()) {
            return Ok(());
        }
        let provenance = Provenance::new(span.clone(), origin);
        let declared = context == FlowContext::Declaration
            && actual.as_variable().is_some()
            && !target.contains_variables();
        // `val x: Float = get(0)` pins; `val x: String? = getLastItem()` only bounds,
        // so the variable may still become `String?`.
        let constraint = if declared && !actual.is_nullable() && !target.is_nullable() {
            Constraint::equal(actual, target, provenance)
        } else {
            Constraint::subtype(actual, target, provenance)
        };
        self.emit(constraint)
    }

    fn emit(&mut self, constraint: Constraint) -> Result<(), EngineError> {
        trace!(
            session = %self.session.id(),
            constraint = %constraint.kind,
            origin = %constraint.provenance.origin,
            "collected constraint"
        );
        self.session.add_constraint(constraint)
    }
}

fn is_unit(ty: &Type) -> bool {
    ty.name() == Some(well_known::UNIT) && !ty.is_nullable()
}

fn universal_result(operation: UniversalOperation) -> Type {
    match operation {
        UniversalOperation::Equals => Type::concrete(well_known::BOOLEAN),
        UniversalOperation::HashCode => Type::concrete(well_known::INT),
        UniversalOperation::ToString => Type::concrete(well_known::STRING),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintKind;
    use crate::eligibility::EligibleCall;
    use crate::lattice::{LatticeCache, TypeHierarchy};
    use crate::session::VariableAllocator;
    use bix_ast::{CallSiteId, FunctionSignature, LambdaExpr, TypeParamDecl, TypeRef};

    fn list_e() -> TypeRef {
        TypeRef::generic("MutableList", vec![TypeRef::param("E")])
    }

    fn operations() -> Vec<OperationDecl> {
        vec![
            OperationDecl::member("add", list_e())
                .param(TypeRef::param("E"))
                .returns(TypeRef::named("Boolean")),
            OperationDecl::member("get", list_e())
                .param(TypeRef::named("Int"))
                .returns(TypeRef::param("E")),
        ]
    }

    fn site(body: Vec<Statement>) -> CallSite {
        let callee = FunctionSignature::new("buildList", TypeRef::generic("List", vec![TypeRef::param("E")]))
            .with_type_param(TypeParamDecl::new("E"))
            .with_param(
                "builder",
                TypeRef::function_with_receiver(list_e(), vec![], TypeRef::named("Unit")),
            );
        CallSite::new(CallSiteId(0), callee, Span::dummy())
            .with_lambda(LambdaExpr::new(body, Span::dummy()))
            .with_operations(operations())
    }

    fn collect(site: &CallSite) -> Result<InferenceSession, EngineError> {
        let hierarchy = TypeHierarchy::standard().expect("standard hierarchy");
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        let eligible = EligibleCall {
            receiver_params: vec!["E".into()],
            postponed_params: vec!["E".into()],
            fixed: Vec::new(),
            builder_arguments: vec![0],
        };
        let mut session = VariableAllocator::new().open_session(site, &eligible)?;
        ConstraintCollector::new(&lattice, &site.operations, &mut session).collect(site)?;
        Ok(session)
    }

    fn int(value: usize) -> Expression {
        Expression::literal(TypeRef::named("Int"), Span::line(value, 1, 2))
    }

    fn rendered(session: &InferenceSession) -> Vec<String> {
        session
            .constraints()
            .iter()
            .map(|constraint| constraint.kind.to_string())
            .collect()
    }

    #[test]
    fn concrete_argument_becomes_lower_bound() {
        let session = collect(&site(vec![Statement::expr(Expression::member_call(
            "add",
            vec![int(1)],
            Span::line(1, 1, 7),
        ))]))
        .expect("collect");
        assert_eq!(rendered(&session), vec!["Int <: ?0"]);
        assert!(matches!(
            session.constraints().iter().next().map(|c| &c.provenance.origin),
            Some(ConstraintOrigin::OperationArgument { index: 0, .. })
        ));
    }

    #[test]
    fn declaration_pins_bare_variable() {
        let session = collect(&site(vec![Statement::let_(
            "x",
            Some(TypeRef::named("Float")),
            Expression::member_call("get", vec![int(1)], Span::line(1, 1, 7)),
        )]))
        .expect("collect");
        let kinds: Vec<&ConstraintKind> = session.constraints().iter().map(|c| &c.kind).collect();
        assert_eq!(
            kinds,
            vec![&ConstraintKind::Equal {
                left: Type::variable(session.variables()[0].id),
                right: Type::concrete("Float"),
            }]
        );
    }

    #[test]
    fn universal_operations_emit_nothing() {
        let body = vec![Statement::expr(Expression::universal(
            Expression::member_call("get", vec![int(1)], Span::line(1, 1, 7)),
            UniversalOperation::ToString,
            Span::line(1, 1, 18),
        ))];
        let session = collect(&site(body)).expect("collect");
        assert!(session.constraints().is_empty());
        assert_eq!(session.universal_uses(), 1);
    }

    #[test]
    fn locals_carry_variable_types_into_comparisons() {
        let body = vec![
            Statement::let_(
                "x",
                None,
                Expression::member_call("get", vec![int(1)], Span::line(1, 1, 7)),
            ),
            Statement::expr(Expression::Comparison {
                left: Box::new(Expression::local("x", Span::line(2, 1, 2))),
                right: Box::new(int(2)),
                span: Span::line(2, 1, 6),
            }),
        ];
        let session = collect(&site(body)).expect("collect");
        assert_eq!(rendered(&session), vec!["?0 <: Int"]);
    }

    #[test]
    fn unknown_members_are_reported() {
        let body = vec![Statement::expr(Expression::member_call(
            "push",
            vec![int(1)],
            Span::line(1, 1, 7),
        ))];
        let err = collect(&site(body)).unwrap_err();
        assert_eq!(
            err,
            EngineError::UnresolvedMember {
                member: "push".into(),
                arity: 1,
                receiver: "MutableList<?0>".into(),
            }
        );
    }

    #[test]
    fn unknown_locals_are_reported() {
        let body = vec![Statement::expr(Expression::local("y", Span::dummy()))];
        assert_eq!(
            collect(&site(body)).unwrap_err(),
            EngineError::UnknownLocal { name: "y".into() }
        );
    }
}
