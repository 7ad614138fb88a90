//! 推論セッションと、後回し型変数（postponed type variable）の割り当て。
//!
//! セッションは一つのビルダー呼び出しに対して生成され、収集フェーズでのみ
//! 変更される。リゾルバに渡された時点で凍結される。

use crate::constraint::{Constraint, ConstraintSet};
use crate::eligibility::EligibleCall;
use crate::error::EngineError;
use crate::types::{SessionId, Type, VariableId};
use bix_ast::{Argument, CallSite, CallSiteId, Span, TypeRef};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// 呼び出し先の型パラメータ一つに対応する後回し型変数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostponedVariable {
    pub id: VariableId,
    pub parameter: String,
    /// 明示的に宣言された上限（`T : Number`）。未宣言なら `None`。
    pub declared_bound: Option<Type>,
}

/// ラムダ引数の型情報。レシーバー・引数・戻り値はセッションの変数で具体化済み。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaSignature {
    pub argument: usize,
    pub receiver: Option<Type>,
    pub params: Vec<Type>,
    pub return_type: Type,
}

/// 走査中に型が判明した式。確定後に代入されて外部へ書き戻される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedExpression {
    pub span: Span,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Collecting,
    Frozen,
}

/// 一つの呼び出し箇所に対する推論セッション。
#[derive(Debug)]
pub struct InferenceSession {
    id: SessionId,
    call_site: CallSiteId,
    callee: String,
    variables: Vec<PostponedVariable>,
    owned: FxHashSet<VariableId>,
    type_arguments: Vec<(String, Type)>,
    return_type: Type,
    lambdas: Vec<LambdaSignature>,
    constraints: ConstraintSet,
    typed_expressions: Vec<TypedExpression>,
    universal_uses: usize,
    state: SessionState,
}

impl InferenceSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn call_site(&self) -> CallSiteId {
        self.call_site
    }

    pub fn callee(&self) -> &str {
        &self.callee
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn variables(&self) -> &[PostponedVariable] {
        &self.variables
    }

    pub fn variable(&self, id: VariableId) -> Option<&PostponedVariable> {
        self.variables.iter().find(|variable| variable.id == id)
    }

    pub fn owns(&self, id: VariableId) -> bool {
        self.owned.contains(&id)
    }

    /// 呼び出し先の宣言順に並んだ型引数。未確定のものは変数のまま。
    pub fn type_arguments(&self) -> &[(String, Type)] {
        &self.type_arguments
    }

    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    pub fn lambdas(&self) -> &[LambdaSignature] {
        &self.lambdas
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn typed_expressions(&self) -> &[TypedExpression] {
        &self.typed_expressions
    }

    pub fn universal_uses(&self) -> usize {
        self.universal_uses
    }

    /// 制約を追加する。凍結済み、または他セッションの変数を含む場合はエラー。
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<(), EngineError> {
        self.ensure_collecting()?;
        for variable in constraint.kind.variables() {
            if !self.owned.contains(&variable) {
                return Err(EngineError::ForeignVariable {
                    variable,
                    session: self.id,
                });
            }
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn record_expression(&mut self, span: Span, ty: Type) -> Result<(), EngineError> {
        self.ensure_collecting()?;
        self.typed_expressions.push(TypedExpression { span, ty });
        Ok(())
    }

    pub fn record_universal_use(&mut self) {
        self.universal_uses += 1;
    }

    /// 収集を終了する。以降の変更は拒否される。
    pub fn freeze(&mut self) {
        self.state = SessionState::Frozen;
    }

    fn ensure_collecting(&self) -> Result<(), EngineError> {
        match self.state {
            SessionState::Collecting => Ok(()),
            SessionState::Frozen => Err(EngineError::SessionFrozen { session: self.id }),
        }
    }
}

/// セッション ID と変数 ID を払い出すアロケータ。同一エンジン内の全セッションで共有される。
#[derive(Debug, Default)]
pub struct VariableAllocator {
    next_session: AtomicU32,
    next_variable: AtomicU32,
}

impl VariableAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定した番号から払い出しを始める（テスト向け）。
    pub fn starting_at(session: u32, variable: u32) -> Self {
        Self {
            next_session: AtomicU32::new(session),
            next_variable: AtomicU32::new(variable),
        }
    }

    /// 適格と判定された呼び出しに対して新しいセッションを開く。
    pub fn open_session(
        &self,
        site: &CallSite,
        eligible: &EligibleCall,
    ) -> Result<InferenceSession, EngineError> {
        let session = SessionId::new(reserve(&self.next_session, 1)?);
        let count = u32::try_from(eligible.postponed_params.len())
            .map_err(|_| EngineError::VariableSpaceExhausted)?;
        let first = reserve(&self.next_variable, count)?;

        let mut bindings: FxHashMap<String, Type> = eligible.fixed.iter().cloned().collect();
        let mut fresh = Vec::with_capacity(eligible.postponed_params.len());
        for (offset, parameter) in (0u32..).zip(eligible.postponed_params.iter()) {
            let id = VariableId::new(first + offset);
            bindings.insert(parameter.clone(), Type::variable(id));
            fresh.push((id, parameter.clone()));
        }

        let mut variables = Vec::with_capacity(fresh.len());
        for (id, parameter) in fresh {
            let declared_bound = site
                .callee
                .type_param(&parameter)
                .and_then(|decl| decl.upper_bound.as_ref())
                .map(|bound| Type::from_ref(bound, &bindings))
                .transpose()?;
            variables.push(PostponedVariable {
                id,
                parameter,
                declared_bound,
            });
        }

        let type_arguments = site
            .callee
            .type_params
            .iter()
            .map(|decl| {
                bindings
                    .get(&decl.name)
                    .cloned()
                    .map(|ty| (decl.name.clone(), ty))
                    .ok_or_else(|| EngineError::UnboundTypeParameter {
                        name: decl.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut lambdas = Vec::new();
        for (index, (argument, param)) in site
            .arguments
            .iter()
            .zip(site.callee.params.iter())
            .enumerate()
        {
            let (Argument::Lambda(_), TypeRef::Function { receiver, params, return_type, .. }) =
                (argument, &param.ty)
            else {
                continue;
            };
            lambdas.push(LambdaSignature {
                argument: index,
                receiver: receiver
                    .as_deref()
                    .map(|r| Type::from_ref(r, &bindings))
                    .transpose()?,
                params: params
                    .iter()
                    .map(|p| Type::from_ref(p, &bindings))
                    .collect::<Result<Vec<_>, _>>()?,
                return_type: Type::from_ref(return_type, &bindings)?,
            });
        }

        let return_type = Type::from_ref(&site.callee.return_type, &bindings)?;
        let owned = variables.iter().map(|variable| variable.id).collect();

        debug!(
            session = %session,
            call_site = %site.id,
            callee = %site.callee.name,
            variables = variables.len(),
            lambdas = lambdas.len(),
            "opened builder inference session"
        );

        Ok(InferenceSession {
            id: session,
            call_site: site.id,
            callee: site.callee.name.clone(),
            variables,
            owned,
            type_arguments,
            return_type,
            lambdas,
            constraints: ConstraintSet::new(),
            typed_expressions: Vec::new(),
            universal_uses: 0,
            state: SessionState::Collecting,
        })
    }
}

/// `count` 個分の連番を予約し、先頭番号を返す。桁あふれは既存 ID の再利用になるため拒否する。
fn reserve(counter: &AtomicU32, count: u32) -> Result<u32, EngineError> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            current.checked_add(count)
        })
        .map_err(|_| EngineError::VariableSpaceExhausted)
}
