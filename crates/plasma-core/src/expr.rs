//! Core IR expressions.

use serde::{Deserialize, Serialize};

use crate::ids::{CtorId, FuncId, Var};
use crate::span::Span;
use crate::ty::Type;

/// Literal constant kinds.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Const {
    Str(String),
    Num(i64),
    Func(FuncId),
    Ctor(CtorId),
}

/// A match-case pattern.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Pattern {
    /// Binds the scrutinee (or a sub-position of it) to a fresh variable.
    Var(Var),
    /// Matches anything, introduces no binding.
    Wildcard,
    Int(i64),
    /// `ctor_id` must belong to the scrutinee's type; `sub_patterns.len()`
    /// must equal that constructor's field count.
    Ctor(CtorId, Vec<Pattern>),
}

impl Pattern {
    /// Every variable this pattern introduces, in left-to-right order.
    pub fn bound_vars(&self) -> Vec<Var> {
        let mut out = Vec::new();
        self.collect_bound_vars(&mut out);
        out
    }

    fn collect_bound_vars(&self, out: &mut Vec<Var>) {
        match self {
            Pattern::Var(v) => out.push(*v),
            Pattern::Wildcard | Pattern::Int(_) => {}
            Pattern::Ctor(_, subs) => {
                for sub in subs {
                    sub.collect_bound_vars(out);
                }
            }
        }
    }
}

/// An expression kind. Plasma expressions may produce more than one result
/// (see `CodeInfo::arity`), so there is no single "the" type of an
/// expression until both inference passes have run.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum ExprKind {
    /// Non-empty; value is the value of the last element.
    Sequence(Vec<Expr>),
    Let {
        vars: Vec<Var>,
        rhs: Box<Expr>,
        body: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    /// Saturated call: `args.len()` must equal the callee's input count.
    Call {
        func: FuncId,
        args: Vec<Expr>,
    },
    Var(Var),
    Constant(Const),
    Construction {
        ctor: CtorId,
        args: Vec<Expr>,
    },
    /// `cases` is non-empty.
    Match {
        scrutinee: Var,
        cases: Vec<(Pattern, Expr)>,
    },
}

/// Per-expression metadata populated by the inference passes.
///
/// `arity` and `result_types` are `None` until the corresponding inference
/// pass has run; code generation requires both to be `Some`.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct CodeInfo {
    pub span: Span,
    pub arity: Option<u32>,
    pub result_types: Option<Vec<Type>>,
}

impl CodeInfo {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            arity: None,
            result_types: None,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub info: CodeInfo,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            info: CodeInfo::new(span),
        }
    }

    /// Walk every direct child expression, in document order.
    ///
    /// Shared by the arity pass, the type-inference walk and const-data
    /// interning so each doesn't hand-roll its own traversal.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Sequence(exprs) | ExprKind::Tuple(exprs) => exprs.iter().collect(),
            ExprKind::Let { rhs, body, .. } => vec![rhs.as_ref(), body.as_ref()],
            ExprKind::Call { args, .. } | ExprKind::Construction { args, .. } => args.iter().collect(),
            ExprKind::Var(_) | ExprKind::Constant(_) => vec![],
            ExprKind::Match { cases, .. } => cases.iter().map(|(_, body)| body).collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Sequence(exprs) | ExprKind::Tuple(exprs) => exprs.iter_mut().collect(),
            ExprKind::Let { rhs, body, .. } => vec![rhs.as_mut(), body.as_mut()],
            ExprKind::Call { args, .. } | ExprKind::Construction { args, .. } => args.iter_mut().collect(),
            ExprKind::Var(_) | ExprKind::Constant(_) => vec![],
            ExprKind::Match { cases, .. } => cases.iter_mut().map(|(_, body)| body).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_bound_vars_nested_ctor() {
        let a = Var::from_raw(0);
        let b = Var::from_raw(1);
        let pat = Pattern::Ctor(CtorId::from_raw(0), vec![Pattern::Var(a), Pattern::Wildcard, Pattern::Var(b)]);
        assert_eq!(pat.bound_vars(), vec![a, b]);
    }

    #[test]
    fn sequence_children_in_document_order() {
        let span = Span::synthetic();
        let e1 = Expr::new(ExprKind::Var(Var::from_raw(0)), span);
        let e2 = Expr::new(ExprKind::Var(Var::from_raw(1)), span);
        let seq = Expr::new(ExprKind::Sequence(vec![e1.clone(), e2.clone()]), span);
        assert_eq!(seq.children(), vec![&e1, &e2]);
    }
}
