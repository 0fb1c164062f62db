//! Per-function variable bookkeeping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::Var;
use crate::interner::Symbol;

/// Maps a function's internal variable handles to their display names.
///
/// Fresh variables are allocated by a counter; display names need not be
/// unique (shadowing in surface syntax is resolved by the front end before
/// the IR reaches this crate, but the same display name may still be reused
/// across unrelated variables).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VarMap {
    names: IndexMap<Var, Symbol>,
    next: u32,
}

impl VarMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh variable with the given display name.
    pub fn fresh(&mut self, display: Symbol) -> Var {
        let var = Var::from_raw(self.next);
        self.next += 1;
        self.names.insert(var, display);
        var
    }

    pub fn display_name(&self, var: Var) -> Option<Symbol> {
        self.names.get(&var).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
