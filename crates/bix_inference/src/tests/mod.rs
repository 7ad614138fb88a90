mod engine;

use crate::finalize::{FinalizedCall, InferenceOutcome, SessionFailure};
use crate::service::BuilderInference;
use crate::types::Type;
use bix_ast::{
    CallSite, CallSiteId, Expression, FunctionSignature, LambdaExpr, OperationDecl, Span,
    Statement, TypeParamDecl, TypeRef,
};

fn engine() -> BuilderInference {
    BuilderInference::standard().expect("standard hierarchy")
}

fn at(line: usize) -> Span {
    Span::line(line, 5, 20)
}

fn named(name: &str) -> TypeRef {
    TypeRef::named(name)
}

fn ty(name: &str) -> Type {
    Type::concrete(name)
}

fn int(line: usize) -> Expression {
    Expression::literal(named("Int"), at(line))
}

fn string(line: usize) -> Expression {
    Expression::literal(named("String"), at(line))
}

fn call(member: &str, args: Vec<Expression>, line: usize) -> Expression {
    Expression::member_call(member, args, at(line))
}

fn list_e() -> TypeRef {
    TypeRef::generic("MutableList", vec![TypeRef::param("E")])
}

fn map_kv() -> TypeRef {
    TypeRef::generic("MutableMap", vec![TypeRef::param("K"), TypeRef::param("V")])
}

fn list_operations() -> Vec<OperationDecl> {
    vec![
        OperationDecl::member("add", list_e())
            .param(TypeRef::param("E"))
            .returns(named("Boolean")),
        OperationDecl::member("get", list_e())
            .param(named("Int"))
            .returns(TypeRef::param("E")),
        OperationDecl::extension("getOrNull", TypeRef::generic("List", vec![TypeRef::param("T")]))
            .param(named("Int"))
            .returns(TypeRef::param("T").nullable()),
        OperationDecl::member("size", list_e()).returns(named("Int")),
    ]
}

fn map_operations() -> Vec<OperationDecl> {
    vec![
        OperationDecl::member("put", map_kv())
            .param(TypeRef::param("K"))
            .param(TypeRef::param("V"))
            .returns(TypeRef::param("V").nullable()),
        OperationDecl::member("get", map_kv())
            .param(TypeRef::param("K"))
            .returns(TypeRef::param("V").nullable()),
    ]
}

/// `fun <E> buildList(builder: MutableList<E>.() -> Unit): List<E>`
fn build_list() -> FunctionSignature {
    FunctionSignature::new("buildList", TypeRef::generic("List", vec![TypeRef::param("E")]))
        .with_type_param(TypeParamDecl::new("E"))
        .with_param(
            "builder",
            TypeRef::function_with_receiver(list_e(), vec![], named("Unit")),
        )
}

/// `fun <K, V> buildMap(builder: MutableMap<K, V>.() -> Unit): Map<K, V>`
fn build_map() -> FunctionSignature {
    FunctionSignature::new(
        "buildMap",
        TypeRef::generic("Map", vec![TypeRef::param("K"), TypeRef::param("V")]),
    )
    .with_type_param(TypeParamDecl::new("K"))
    .with_type_param(TypeParamDecl::new("V"))
    .with_param(
        "builder",
        TypeRef::function_with_receiver(map_kv(), vec![], named("Unit")),
    )
}

fn list_site(id: u32, body: Vec<Statement>) -> CallSite {
    CallSite::new(CallSiteId(id), build_list(), at(1))
        .with_lambda(LambdaExpr::new(body, at(1)))
        .with_operations(list_operations())
}

fn map_site(id: u32, body: Vec<Statement>) -> CallSite {
    CallSite::new(CallSiteId(id), build_map(), at(1))
        .with_lambda(LambdaExpr::new(body, at(1)))
        .with_operations(map_operations())
}

fn success(outcome: InferenceOutcome) -> FinalizedCall {
    match outcome {
        InferenceOutcome::Success(call) => call,
        other => panic!("expected success, got {other:?}"),
    }
}

fn failure(outcome: InferenceOutcome) -> SessionFailure {
    match outcome {
        InferenceOutcome::Failure(failure) => failure,
        other => panic!("expected failure, got {other:?}"),
    }
}
