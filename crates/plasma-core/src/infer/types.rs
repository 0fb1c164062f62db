//! Hindley-Milner type inference over the core IR.
//!
//! Runs after arity inference: a `Match`'s branches need to know how many
//! values each branch's body produces before their types can be unified
//! elementwise, and a `Let`'s right-hand side needs the same. Like arity
//! inference, functions are processed callee-before-caller by strongly
//! connected component, with one SCC solved as a single batch of
//! constraints so mutual recursion is typed consistently.

use std::collections::{HashMap, HashSet};

use crate::core::Core;
use crate::expr::{Const, Expr, ExprKind};
use crate::ids::{FuncId, Var};
use crate::interner::{Interner, Symbol};
use crate::solve::{self, Constraint, Problem, SolveError, SolverVar, Term, VarGen};
use crate::ty::{TVar, Type};

/// Why type inference failed for some function.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TypeError {
    #[error("in function {func}: {source}")]
    Solve { func: FuncId, source: SolveError },
    #[error("in function {func}: a match's branches produce a different number of values")]
    ArityMismatchedBranches { func: FuncId },
    #[error("in function {func}: expression arity was not determined by a prior pass")]
    MissingArity { func: FuncId },
    /// Mirrors `infer::arity::ArityError::MutualRecursionUnimplemented`:
    /// a function whose arity inference failed for being part of a
    /// mutually recursive group is skipped here too (§7.1: passes
    /// depending on a failed predecessor are skipped for that function).
    #[error("function {func} is part of a mutually recursive group; inference over mutual recursion is not implemented")]
    MutualRecursionUnimplemented { func: FuncId },
}

/// Instantiate a signature's inputs and outputs with fresh solver variables,
/// one per distinct named `TVar`, so each call site gets its own copy.
fn instantiate(
    inputs: &[Type],
    outputs: &[Type],
    gen: &mut VarGen,
) -> (Vec<Term>, Vec<Term>, HashMap<Symbol, SolverVar>) {
    let mut subst = HashMap::new();
    let in_terms = inputs.iter().map(|t| type_to_term(t, &mut subst, gen)).collect();
    let out_terms = outputs.iter().map(|t| type_to_term(t, &mut subst, gen)).collect();
    (in_terms, out_terms, subst)
}

fn type_to_term(ty: &Type, subst: &mut HashMap<Symbol, SolverVar>, gen: &mut VarGen) -> Term {
    match ty {
        Type::Builtin(b) => Term::Builtin(*b),
        Type::Var(TVar(name)) => {
            let var = *subst.entry(*name).or_insert_with(|| gen.fresh());
            Term::Var(var)
        }
        Type::Ref(type_id, args) => {
            Term::Ref(*type_id, args.iter().map(|a| type_to_term(a, subst, gen)).collect())
        }
    }
}

/// Run type inference over every function body in `core`, populating each
/// expression's `CodeInfo::result_types`.
///
/// `interner` allocates display names for type variables that are
/// introduced purely during inference and never traced back to a name in
/// the function's own declared signature (see `label_free_vars`).
///
/// `failed_arity` is the set of functions `infer::arity::infer_arities`
/// already reported as failed (via `failed_functions`); §7.1 says a
/// function in that state is skipped here rather than type-checked
/// against a missing or stale arity annotation, so it is silently
/// excluded instead of producing a cascaded `TypeError`.
pub fn infer_types(
    core: &mut Core,
    interner: &mut Interner,
    failed_arity: &HashSet<FuncId>,
) -> Result<(), Vec<TypeError>> {
    let sccs = core.sccs().to_vec();
    let mut all_errors = Vec::new();

    for scc in &sccs {
        if scc.len() > 1 {
            for &func_id in scc {
                all_errors.push(TypeError::MutualRecursionUnimplemented { func: func_id });
            }
            continue;
        }

        let mut gen = VarGen::new();
        let mut problem = Problem::new();
        // Post-order per-node result lists, one per function, replayed by
        // the annotation pass below.
        let mut node_terms_by_func: HashMap<FuncId, Vec<Vec<Term>>> = HashMap::new();
        let mut sig_names_by_func: HashMap<FuncId, HashMap<SolverVar, Symbol>> = HashMap::new();

        for &func_id in scc {
            if failed_arity.contains(&func_id) {
                continue;
            }
            let Some(func) = core.function(func_id) else { continue };
            let Some(body) = &func.body else { continue };

            let (in_terms, out_terms, own_subst) = instantiate(&func.signature.inputs, &func.signature.outputs, &mut gen);
            let mut var_types = HashMap::new();
            for (param, term) in body.params.iter().zip(in_terms.iter()) {
                var_types.insert(*param, term.clone());
            }

            let mut node_terms = Vec::new();
            let mut errors = Vec::new();
            let body_terms = generate_expr_constraints(
                &body.expr,
                core,
                &mut gen,
                &mut problem,
                &mut var_types,
                &mut node_terms,
                &mut errors,
                func_id,
            );
            all_errors.extend(errors);

            if body_terms.len() == out_terms.len() {
                for (a, b) in body_terms.iter().zip(out_terms.iter()) {
                    problem.push(Constraint::eq(a.clone(), b.clone()));
                }
            } else {
                all_errors.push(TypeError::ArityMismatchedBranches { func: func_id });
            }

            let sig_names: HashMap<SolverVar, Symbol> = own_subst.into_iter().map(|(name, var)| (var, name)).collect();
            sig_names_by_func.insert(func_id, sig_names);
            node_terms_by_func.insert(func_id, node_terms);
        }

        let solution = match solve::solve(problem) {
            Ok(s) => s,
            Err(source) => {
                let func = scc.first().copied().unwrap_or(FuncId::from_raw(0));
                all_errors.push(TypeError::Solve { func, source });
                continue;
            }
        };

        for &func_id in scc {
            if failed_arity.contains(&func_id) {
                continue;
            }
            let Some(terms) = node_terms_by_func.get(&func_id) else { continue };
            let sig_names = sig_names_by_func.get(&func_id).cloned().unwrap_or_default();

            let resolved: Vec<Vec<Term>> = terms
                .iter()
                .map(|node| node.iter().map(|t| solution.resolve(t)).collect())
                .collect();
            let mut free_vars = Vec::new();
            for node in &resolved {
                for term in node {
                    collect_free_vars(term, &mut free_vars);
                }
            }
            let labeling = label_free_vars(&free_vars, &sig_names, interner);

            if let Some(func) = core.function_mut(func_id) {
                if let Some(body) = &mut func.body {
                    let mut cursor = 0;
                    annotate_expr(&mut body.expr, &resolved, &labeling, &mut cursor);
                }
            }
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors)
    }
}

fn collect_free_vars(term: &Term, out: &mut Vec<SolverVar>) {
    match term {
        Term::Var(v) => {
            if !out.contains(v) {
                out.push(*v);
            }
        }
        Term::Builtin(_) => {}
        Term::Ref(_, args) => {
            for arg in args {
                collect_free_vars(arg, out);
            }
        }
    }
}

fn generate_expr_constraints(
    expr: &Expr,
    core: &Core,
    gen: &mut VarGen,
    problem: &mut Problem,
    var_types: &mut HashMap<Var, Term>,
    node_terms: &mut Vec<Vec<Term>>,
    errors: &mut Vec<TypeError>,
    owner: FuncId,
) -> Vec<Term> {
    let result = match &expr.kind {
        ExprKind::Sequence(exprs) => {
            for e in &exprs[..exprs.len().saturating_sub(1)] {
                generate_expr_constraints(e, core, gen, problem, var_types, node_terms, errors, owner);
            }
            match exprs.last() {
                Some(last) => generate_expr_constraints(last, core, gen, problem, var_types, node_terms, errors, owner),
                None => Vec::new(),
            }
        }
        ExprKind::Let { vars, rhs, body } => {
            let rhs_terms = generate_expr_constraints(rhs, core, gen, problem, var_types, node_terms, errors, owner);
            for (var, term) in vars.iter().zip(rhs_terms.iter()) {
                let var_term = var_types.entry(*var).or_insert_with(|| Term::Var(gen.fresh())).clone();
                problem.push(Constraint::eq(var_term, term.clone()));
            }
            generate_expr_constraints(body, core, gen, problem, var_types, node_terms, errors, owner)
        }
        ExprKind::Tuple(exprs) => exprs
            .iter()
            .map(|e| {
                let mut t = generate_expr_constraints(e, core, gen, problem, var_types, node_terms, errors, owner);
                t.drain(..).next().unwrap_or_else(|| Term::Var(gen.fresh()))
            })
            .collect(),
        ExprKind::Call { func, args } => {
            let arg_terms: Vec<Term> = args
                .iter()
                .map(|a| {
                    let mut t = generate_expr_constraints(a, core, gen, problem, var_types, node_terms, errors, owner);
                    t.drain(..).next().unwrap_or_else(|| Term::Var(gen.fresh()))
                })
                .collect();
            match core.function(*func) {
                Some(callee) => {
                    let (in_terms, out_terms, _) = instantiate(&callee.signature.inputs, &callee.signature.outputs, gen);
                    for (arg, param) in arg_terms.iter().zip(in_terms.iter()) {
                        problem.push(Constraint::eq(arg.clone(), param.clone()));
                    }
                    out_terms
                }
                None => vec![Term::Var(gen.fresh())],
            }
        }
        ExprKind::Var(v) => {
            vec![var_types.entry(*v).or_insert_with(|| Term::Var(gen.fresh())).clone()]
        }
        ExprKind::Constant(c) => vec![match c {
            Const::Str(_) => Term::Builtin(crate::ty::Builtin::String),
            Const::Num(_) => Term::Builtin(crate::ty::Builtin::Int),
            // First-class function and constructor values are not assigned
            // a structural type here; their use sites are all saturated
            // (`Call`/`Construction`), which type themselves directly.
            Const::Func(_) | Const::Ctor(_) => Term::Var(gen.fresh()),
        }],
        ExprKind::Construction { ctor, args } => {
            let arg_terms: Vec<Term> = args
                .iter()
                .map(|a| {
                    let mut t = generate_expr_constraints(a, core, gen, problem, var_types, node_terms, errors, owner);
                    t.drain(..).next().unwrap_or_else(|| Term::Var(gen.fresh()))
                })
                .collect();
            match core.ctor(*ctor) {
                Some(c) => {
                    let mut subst = HashMap::new();
                    for (param_field, arg_term) in c.fields.iter().zip(arg_terms.iter()) {
                        let field_term = type_to_term(&param_field.1, &mut subst, gen);
                        problem.push(Constraint::eq(arg_term.clone(), field_term));
                    }
                    vec![Term::Var(gen.fresh())]
                }
                None => vec![Term::Var(gen.fresh())],
            }
        }
        ExprKind::Match { cases, .. } => {
            let arity = expr.info.arity;
            let result_vars: Vec<Term> = match arity {
                Some(n) => (0..n).map(|_| Term::Var(gen.fresh())).collect(),
                None => {
                    errors.push(TypeError::MissingArity { func: owner });
                    Vec::new()
                }
            };
            for (_, case_body) in cases {
                let case_terms =
                    generate_expr_constraints(case_body, core, gen, problem, var_types, node_terms, errors, owner);
                if case_terms.len() == result_vars.len() {
                    for (a, b) in case_terms.iter().zip(result_vars.iter()) {
                        problem.push(Constraint::eq(a.clone(), b.clone()));
                    }
                } else {
                    errors.push(TypeError::ArityMismatchedBranches { func: owner });
                }
            }
            result_vars
        }
    };
    node_terms.push(result.clone());
    result
}

fn annotate_expr(
    expr: &mut Expr,
    resolved_node_terms: &[Vec<Term>],
    labeling: &HashMap<SolverVar, Symbol>,
    cursor: &mut usize,
) {
    for child in expr.children_mut() {
        annotate_expr(child, resolved_node_terms, labeling, cursor);
    }
    let terms = &resolved_node_terms[*cursor];
    *cursor += 1;
    expr.info.result_types = Some(terms.iter().map(|t| term_to_display_type(t, labeling)).collect());
}

/// Convert an already-resolved solver term back into a displayable `Type`,
/// substituting each residual variable's labeled display name.
fn term_to_display_type(term: &Term, labeling: &HashMap<SolverVar, Symbol>) -> Type {
    match term {
        Term::Builtin(b) => Type::Builtin(*b),
        Term::Ref(type_id, args) => {
            Type::Ref(*type_id, args.iter().map(|a| term_to_display_type(a, labeling)).collect())
        }
        Term::Var(v) => {
            let name = labeling
                .get(v)
                .copied()
                .unwrap_or_else(|| unreachable!("free var collected before labeling"));
            Type::Var(TVar(name))
        }
    }
}

/// Label a function's residual free solver variables for display,
/// distinguishing ones that trace back to the function's own declared
/// signature from ones introduced purely during inference.
///
/// Non-signature variables are named first (`t0`, `t1`, ...), then
/// signature variables reuse their original declared name; this keeps
/// synthetic names stable across unrelated functions while never colliding
/// with a name the author chose.
pub fn label_free_vars(
    free_vars: &[SolverVar],
    signature_names: &HashMap<SolverVar, Symbol>,
    interner: &mut Interner,
) -> HashMap<SolverVar, Symbol> {
    let mut labels = HashMap::new();
    let mut next_synthetic = 0u32;

    for &var in free_vars {
        if !signature_names.contains_key(&var) {
            let name = interner.intern(&format!("t{next_synthetic}"));
            next_synthetic += 1;
            labels.insert(var, name);
        }
    }
    for &var in free_vars {
        if let Some(&name) = signature_names.get(&var) {
            labels.insert(var, name);
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::{Function, FunctionBody, Signature};
    use crate::span::Span;
    use crate::vars::VarMap;

    fn int_returning_function() -> Function {
        Function {
            signature: Signature {
                inputs: vec![],
                outputs: vec![Type::int()],
                uses_resources: vec![],
                observes_resources: vec![],
                declared_arity: 1,
            },
            body: Some(FunctionBody {
                varmap: VarMap::new(),
                params: vec![],
                expr: Expr::new(ExprKind::Constant(Const::Num(1)), Span::synthetic()),
            }),
        }
    }

    #[test]
    fn constant_body_matches_declared_output() {
        let mut core = Core::new();
        let id = core.fresh_func_id();
        core.insert_function(id, int_returning_function());
        core.set_sccs(vec![vec![id]]);
        let mut interner = Interner::new();

        assert!(infer_types(&mut core, &mut interner, &HashSet::new()).is_ok());
        let body = &core.function(id).unwrap().body.as_ref().unwrap().expr;
        assert_eq!(body.info.result_types, Some(vec![Type::int()]));
    }

    #[test]
    fn mismatched_output_type_is_rejected() {
        let mut core = Core::new();
        let id = core.fresh_func_id();
        let mut func = int_returning_function();
        func.body.as_mut().unwrap().expr = Expr::new(ExprKind::Constant(Const::Str("x".into())), Span::synthetic());
        core.insert_function(id, func);
        core.set_sccs(vec![vec![id]]);
        let mut interner = Interner::new();

        assert!(infer_types(&mut core, &mut interner, &HashSet::new()).is_err());
    }

    #[test]
    fn mutually_recursive_scc_is_rejected() {
        let mut core = Core::new();
        let a = core.fresh_func_id();
        let b = core.fresh_func_id();
        let call_expr = |callee| Expr::new(ExprKind::Call { func: callee, args: vec![] }, Span::synthetic());
        core.insert_function(
            a,
            Function {
                signature: Signature {
                    inputs: vec![],
                    outputs: vec![],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 0,
                },
                body: Some(FunctionBody {
                    varmap: VarMap::new(),
                    params: vec![],
                    expr: call_expr(b),
                }),
            },
        );
        core.insert_function(
            b,
            Function {
                signature: Signature {
                    inputs: vec![],
                    outputs: vec![],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 0,
                },
                body: Some(FunctionBody {
                    varmap: VarMap::new(),
                    params: vec![],
                    expr: call_expr(a),
                }),
            },
        );
        core.set_sccs(vec![vec![a, b]]);
        let mut interner = Interner::new();

        let errors = infer_types(&mut core, &mut interner, &HashSet::new()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, TypeError::MutualRecursionUnimplemented { .. })));
    }
}
