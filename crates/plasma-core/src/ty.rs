//! Types in the core IR.

use serde::{Deserialize, Serialize};

use crate::ids::TypeId;
use crate::interner::Symbol;

/// A built-in type, not backed by any user `TypeId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Builtin {
    Int,
    String,
    Codepoint,
}

/// A free type variable, scoped to the declaration that introduces it.
///
/// Carries the variable's source-level name (e.g. `t` in `id(x: t) -> t`)
/// for error messages; two `TVar`s are equal iff their names are equal
/// within the same declaration's scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct TVar(pub Symbol);

/// A type as written in a signature or constructor field.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Type {
    Builtin(Builtin),
    /// Reference to a user-declared type, applied to type arguments.
    /// `args.len()` must equal the referenced type's declared arity.
    Ref(TypeId, Vec<Type>),
    /// A free type variable.
    Var(TVar),
}

impl Type {
    pub fn int() -> Self {
        Type::Builtin(Builtin::Int)
    }

    pub fn string() -> Self {
        Type::Builtin(Builtin::String)
    }

    pub fn codepoint() -> Self {
        Type::Builtin(Builtin::Codepoint)
    }

    /// Type variables occurring anywhere within this type, in first-occurrence order.
    pub fn free_vars(&self) -> Vec<TVar> {
        let mut found = Vec::new();
        self.collect_free_vars(&mut found);
        found
    }

    fn collect_free_vars(&self, out: &mut Vec<TVar>) {
        match self {
            Type::Builtin(_) => {}
            Type::Var(v) => {
                if !out.contains(v) {
                    out.push(*v);
                }
            }
            Type::Ref(_, args) => {
                for arg in args {
                    arg.collect_free_vars(out);
                }
            }
        }
    }
}
