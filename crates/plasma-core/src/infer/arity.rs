//! Arity inference: annotating every expression with how many values it
//! produces, and checking that against how many its context expects.
//!
//! Plasma functions can return more than one value, so an expression's
//! "type" is incomplete without also knowing its arity. Call sites need
//! the callee's arity, so functions are processed callee-before-caller
//! using the call graph's strongly connected components; a component is
//! solved as one batch of constraints so mutually recursive functions see
//! each other's declared arity consistently.

use std::collections::{HashMap, HashSet};

use crate::core::Core;
use crate::expr::{Expr, ExprKind};
use crate::ids::FuncId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct ArityVar(u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ArityTerm {
    Var(ArityVar),
    Known(u32),
}

#[derive(Debug, Default)]
struct ArityProblem {
    next_var: u32,
    bindings: HashMap<ArityVar, ArityTerm>,
}

impl ArityProblem {
    fn fresh(&mut self) -> ArityVar {
        let v = ArityVar(self.next_var);
        self.next_var += 1;
        v
    }

    fn resolve(&self, term: ArityTerm) -> ArityTerm {
        match term {
            ArityTerm::Var(v) => match self.bindings.get(&v) {
                Some(&bound) => self.resolve(bound),
                None => ArityTerm::Var(v),
            },
            known => known,
        }
    }

    fn unify(&mut self, a: ArityTerm, b: ArityTerm, func: FuncId) -> Result<(), ArityError> {
        let a = self.resolve(a);
        let b = self.resolve(b);
        match (a, b) {
            (ArityTerm::Var(v1), ArityTerm::Var(v2)) if v1 == v2 => Ok(()),
            (ArityTerm::Known(x), ArityTerm::Known(y)) if x == y => Ok(()),
            (ArityTerm::Known(expected), ArityTerm::Known(found)) => {
                Err(ArityError::Mismatch { func, expected, found })
            }
            (ArityTerm::Var(v), other) | (other, ArityTerm::Var(v)) => {
                self.bindings.insert(v, other);
                Ok(())
            }
        }
    }

    fn known(&self, term: ArityTerm) -> Option<u32> {
        match self.resolve(term) {
            ArityTerm::Known(n) => Some(n),
            ArityTerm::Var(_) => None,
        }
    }
}

/// Why arity inference failed for some function.
#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ArityError {
    #[error("function {func} expects {expected} value(s) here but found {found}")]
    Mismatch { func: FuncId, expected: u32, found: u32 },
    #[error("function {func} body's arity could not be determined")]
    Undetermined { func: FuncId },
    /// §4.1: a call's argument count must equal the callee's declared
    /// input count, independent of each argument's own (always-1) arity.
    #[error("function {func} calls a function expecting {expected} argument(s) but supplies {found}")]
    ParameterNumber { func: FuncId, expected: u32, found: u32 },
    /// §4.1's acknowledged extension point: mutually recursive SCCs of
    /// size > 1 are a design limitation, not a compile error, since a
    /// correct implementation is just unimplemented rather than invalid.
    #[error("function {func} is part of a mutually recursive group; inference over mutual recursion is not implemented")]
    MutualRecursionUnimplemented { func: FuncId },
}

/// Annotate every expression in every function body with its arity,
/// processing the call graph callee-before-caller.
///
/// A singleton strongly connected component is annotated normally; a
/// component of size > 1 (mutual recursion) is a named, unimplemented
/// restriction (§4.1, §9): every member is reported and skipped rather
/// than guessed at, so type inference and code generation don't later
/// trip over an inconsistent annotation.
pub fn infer_arities(core: &mut Core) -> Result<(), Vec<ArityError>> {
    let sccs = core.sccs().to_vec();
    let mut errors = Vec::new();

    for scc in &sccs {
        if scc.len() > 1 {
            for &func_id in scc {
                errors.push(ArityError::MutualRecursionUnimplemented { func: func_id });
            }
            continue;
        }

        let mut problem = ArityProblem::default();
        // Post-order term lists, one per function body, in the same
        // children-then-self order the annotation pass below replays.
        let mut per_func_terms: Vec<(FuncId, Vec<ArityTerm>)> = Vec::new();

        for &func_id in scc {
            let Some(func) = core.function(func_id) else { continue };
            let Some(body) = &func.body else { continue };
            let expected = ArityTerm::Known(func.signature.declared_arity);
            let mut terms = Vec::new();
            let body_term = generate_expr_constraints(&body.expr, core, &mut problem, &mut errors, func_id, &mut terms);
            if let Err(e) = problem.unify(body_term, expected, func_id) {
                errors.push(e);
            }
            per_func_terms.push((func_id, terms));
        }

        for (func_id, terms) in &per_func_terms {
            if let Some(func) = core.function_mut(*func_id) {
                if let Some(body) = &mut func.body {
                    let mut cursor = 0;
                    annotate_expr(&mut body.expr, &problem, &mut errors, *func_id, terms, &mut cursor);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Every function an `ArityError` names as having failed, regardless of
/// which case produced it (a local mismatch, an undetermined body, a
/// bad call, or a mutually recursive group).
///
/// §7.1: a function that fails arity inference must be skipped by type
/// inference and code generation rather than carried forward with a
/// missing or stale arity annotation; this is how `run_core_passes`
/// finds that set.
pub fn failed_functions(errors: &[ArityError]) -> HashSet<FuncId> {
    errors
        .iter()
        .map(|e| match *e {
            ArityError::Mismatch { func, .. }
            | ArityError::Undetermined { func }
            | ArityError::ParameterNumber { func, .. }
            | ArityError::MutualRecursionUnimplemented { func } => func,
        })
        .collect()
}

/// Generate constraints for one expression and every descendant, in
/// children-then-self order, pushing each node's own term onto `terms` as
/// it is computed (so `terms` ends up holding a post-order walk of the
/// tree). Returns the term for `expr` itself, which is also its last push.
fn generate_expr_constraints(
    expr: &Expr,
    core: &Core,
    problem: &mut ArityProblem,
    errors: &mut Vec<ArityError>,
    owner: FuncId,
    terms: &mut Vec<ArityTerm>,
) -> ArityTerm {
    let term = match &expr.kind {
        ExprKind::Sequence(exprs) => {
            for e in &exprs[..exprs.len().saturating_sub(1)] {
                generate_expr_constraints(e, core, problem, errors, owner, terms);
            }
            match exprs.last() {
                Some(last) => generate_expr_constraints(last, core, problem, errors, owner, terms),
                None => ArityTerm::Known(0),
            }
        }
        ExprKind::Let { vars, rhs, body } => {
            let rhs_term = generate_expr_constraints(rhs, core, problem, errors, owner, terms);
            if let Err(e) = problem.unify(rhs_term, ArityTerm::Known(vars.len() as u32), owner) {
                errors.push(e);
            }
            generate_expr_constraints(body, core, problem, errors, owner, terms)
        }
        ExprKind::Tuple(exprs) => {
            for e in exprs {
                let t = generate_expr_constraints(e, core, problem, errors, owner, terms);
                if let Err(err) = problem.unify(t, ArityTerm::Known(1), owner) {
                    errors.push(err);
                }
            }
            ArityTerm::Known(exprs.len() as u32)
        }
        ExprKind::Call { func, args } => {
            for arg in args {
                let t = generate_expr_constraints(arg, core, problem, errors, owner, terms);
                if let Err(err) = problem.unify(t, ArityTerm::Known(1), owner) {
                    errors.push(err);
                }
            }
            match core.function(*func) {
                Some(callee) => {
                    let expected = callee.signature.inputs.len() as u32;
                    let found = args.len() as u32;
                    if expected != found {
                        errors.push(ArityError::ParameterNumber { func: owner, expected, found });
                    }
                    ArityTerm::Known(callee.signature.declared_arity)
                }
                None => problem.fresh_term(),
            }
        }
        ExprKind::Construction { args, .. } => {
            for arg in args {
                let t = generate_expr_constraints(arg, core, problem, errors, owner, terms);
                if let Err(err) = problem.unify(t, ArityTerm::Known(1), owner) {
                    errors.push(err);
                }
            }
            ArityTerm::Known(1)
        }
        ExprKind::Var(_) | ExprKind::Constant(_) => ArityTerm::Known(1),
        ExprKind::Match { cases, .. } => {
            let result = problem.fresh_term();
            for (_, case_body) in cases {
                let t = generate_expr_constraints(case_body, core, problem, errors, owner, terms);
                if let Err(err) = problem.unify(t, result, owner) {
                    errors.push(err);
                }
            }
            result
        }
    };
    terms.push(term);
    term
}

impl ArityProblem {
    fn fresh_term(&mut self) -> ArityTerm {
        ArityTerm::Var(self.fresh())
    }
}

/// Replay the same children-then-self order `generate_expr_constraints`
/// used, consuming one term per node from `terms` via `cursor`.
fn annotate_expr(
    expr: &mut Expr,
    problem: &ArityProblem,
    errors: &mut Vec<ArityError>,
    owner: FuncId,
    terms: &[ArityTerm],
    cursor: &mut usize,
) {
    for child in expr.children_mut() {
        annotate_expr(child, problem, errors, owner, terms, cursor);
    }
    let term = terms[*cursor];
    *cursor += 1;
    match problem.known(term) {
        Some(n) => expr.info.arity = Some(n),
        None => errors.push(ArityError::Undetermined { func: owner }),
    }
}
