//! Herbrand-term unification, the engine behind both inference passes.
//!
//! Arity inference unifies over arity terms; type inference
//! unifies over `Term`s built from `Type`. Both share this solver: a
//! standard union-find-backed substitution with an occurs check, kept
//! deliberately generic over the kind of constant (`Builtin` types here,
//! but the same shape works for arity naturals) by just using `Term`
//! directly rather than parameterizing over it — the crate only ever
//! needs the one instantiation.

use std::collections::HashMap;
use std::fmt;

use crate::ids::TypeId;
use crate::ty::Builtin;

/// An internal unification variable, distinct from the named `TVar`s that
/// appear in surface signatures. Every expression node and every signature
/// variable gets its own fresh `SolverVar` for the duration of one
/// inference run; named `TVar`s are mapped onto these before solving and
/// mapped back after.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SolverVar(u32);

impl SolverVar {
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SolverVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Allocates fresh `SolverVar`s for one inference run.
#[derive(Debug, Clone, Default)]
pub struct VarGen {
    next: u32,
}

impl VarGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> SolverVar {
        let v = SolverVar(self.next);
        self.next += 1;
        v
    }
}

/// A Herbrand term: either a unification variable, a nullary builtin, or a
/// reference to a user type applied to argument terms.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Term {
    Var(SolverVar),
    Builtin(Builtin),
    Ref(TypeId, Vec<Term>),
}

impl Term {
    fn occurs(&self, var: SolverVar) -> bool {
        match self {
            Term::Var(v) => *v == var,
            Term::Builtin(_) => false,
            Term::Ref(_, args) => args.iter().any(|a| a.occurs(var)),
        }
    }
}

/// An equality constraint between two terms, to be solved together.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Constraint {
    pub left: Term,
    pub right: Term,
}

impl Constraint {
    pub fn eq(left: Term, right: Term) -> Self {
        Self { left, right }
    }
}

/// A batch of constraints collected by one inference pass before solving.
#[derive(Clone, Debug, Default)]
pub struct Problem {
    constraints: Vec<Constraint>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn extend(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        self.constraints.extend(constraints);
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Why unification failed.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum SolveError {
    #[error("cannot unify {left:?} with {right:?}")]
    Mismatch { left: Term, right: Term },
    #[error("type variable {var} occurs in the type it would be bound to")]
    Occurs { var: SolverVar, term: Term },
}

/// The substitution produced by a successful solve. Resolving a term walks
/// variable bindings to a fixed point.
#[derive(Clone, Debug, Default)]
pub struct Solution {
    bindings: HashMap<SolverVar, Term>,
}

impl Solution {
    /// Fully resolve a term: follow variable bindings and recurse into
    /// structure, so the result contains no bound variable.
    pub fn resolve(&self, term: &Term) -> Term {
        match term {
            Term::Var(v) => match self.bindings.get(v) {
                Some(bound) => self.resolve(bound),
                None => Term::Var(*v),
            },
            Term::Builtin(b) => Term::Builtin(*b),
            Term::Ref(type_id, args) => Term::Ref(*type_id, args.iter().map(|a| self.resolve(a)).collect()),
        }
    }

    pub fn binding(&self, var: SolverVar) -> Option<&Term> {
        self.bindings.get(&var)
    }
}

/// Solve a batch of equality constraints by repeated unification.
///
/// Constraints are processed in order; later constraints see earlier
/// bindings, matching a single left-to-right unification pass rather than
/// a fixpoint loop (the constraint generators never need transitive
/// discovery beyond what union-find already gives them for free).
pub fn solve(problem: Problem) -> Result<Solution, SolveError> {
    let mut solution = Solution::default();
    for constraint in problem.constraints {
        unify(&mut solution, constraint.left, constraint.right)?;
    }
    Ok(solution)
}

fn unify(solution: &mut Solution, left: Term, right: Term) -> Result<(), SolveError> {
    let left = solution.resolve(&left);
    let right = solution.resolve(&right);

    match (&left, &right) {
        (Term::Var(a), Term::Var(b)) if a == b => Ok(()),
        (Term::Var(v), other) | (other, Term::Var(v)) => {
            if other.occurs(*v) {
                return Err(SolveError::Occurs {
                    var: *v,
                    term: other.clone(),
                });
            }
            solution.bindings.insert(*v, other.clone());
            Ok(())
        }
        (Term::Builtin(a), Term::Builtin(b)) if a == b => Ok(()),
        (Term::Ref(a_id, a_args), Term::Ref(b_id, b_args)) if a_id == b_id && a_args.len() == b_args.len() => {
            for (a, b) in a_args.iter().zip(b_args.iter()) {
                unify(solution, a.clone(), b.clone())?;
            }
            Ok(())
        }
        _ => Err(SolveError::Mismatch { left, right }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unifies_var_with_builtin() {
        let mut gen = VarGen::new();
        let v = gen.fresh();
        let mut problem = Problem::new();
        problem.push(Constraint::eq(Term::Var(v), Term::Builtin(Builtin::Int)));
        let solution = solve(problem).unwrap();
        assert_eq!(solution.resolve(&Term::Var(v)), Term::Builtin(Builtin::Int));
    }

    #[test]
    fn mismatched_builtins_fail() {
        let mut problem = Problem::new();
        problem.push(Constraint::eq(Term::Builtin(Builtin::Int), Term::Builtin(Builtin::String)));
        assert!(matches!(solve(problem), Err(SolveError::Mismatch { .. })));
    }

    #[test]
    fn occurs_check_rejects_infinite_type() {
        let mut gen = VarGen::new();
        let v = gen.fresh();
        let mut problem = Problem::new();
        problem.push(Constraint::eq(Term::Var(v), Term::Ref(TypeId::from_raw(0), vec![Term::Var(v)])));
        assert!(matches!(solve(problem), Err(SolveError::Occurs { .. })));
    }

    #[test]
    fn transitive_var_chains_resolve_to_ground_term() {
        let mut gen = VarGen::new();
        let a = gen.fresh();
        let b = gen.fresh();
        let mut problem = Problem::new();
        problem.push(Constraint::eq(Term::Var(a), Term::Var(b)));
        problem.push(Constraint::eq(Term::Var(b), Term::Builtin(Builtin::Codepoint)));
        let solution = solve(problem).unwrap();
        assert_eq!(solution.resolve(&Term::Var(a)), Term::Builtin(Builtin::Codepoint));
    }

    #[test]
    fn nested_refs_unify_structurally() {
        let mut gen = VarGen::new();
        let v = gen.fresh();
        let type_id = TypeId::from_raw(7);
        let mut problem = Problem::new();
        problem.push(Constraint::eq(
            Term::Ref(type_id, vec![Term::Var(v)]),
            Term::Ref(type_id, vec![Term::Builtin(Builtin::Int)]),
        ));
        let solution = solve(problem).unwrap();
        assert_eq!(solution.resolve(&Term::Var(v)), Term::Builtin(Builtin::Int));
    }
}
