//! Const-data interning (§4.4): assigning one bytecode data id to each
//! unique string literal in the program.

use std::collections::HashMap;

use plasma_bytecode::{Pz, PzData, Width};
use plasma_core::core::Core;
use plasma_core::expr::{Const, Expr, ExprKind};
use plasma_core::ids::PzdId;

/// §9: string encoding is currently ASCII-only, preserved here as a named
/// limitation rather than silently re-encoding or truncating.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ConstDataError {
    #[error("string literal {literal:?} is not ASCII; non-ASCII string literals are not supported")]
    NonAscii { literal: String },
}

/// Maps each unique interned string literal to its bytecode data id.
#[derive(Clone, Debug, Default)]
pub struct StringTable {
    ids: HashMap<String, PzdId>,
}

impl StringTable {
    pub fn get(&self, s: &str) -> Option<PzdId> {
        self.ids.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Walk every function body in `core`, interning each string literal into
/// `pz`'s data table exactly once.
///
/// Idempotent: every literal already present in `table` is a lookup, not
/// a fresh allocation, so running this twice over the same `core`/`pz`/
/// `table` triple leaves `table` unchanged on the second call.
pub fn intern_strings(core: &Core, pz: &mut Pz, table: &mut StringTable) -> Result<(), ConstDataError> {
    for (_, func) in core.functions() {
        if let Some(body) = &func.body {
            intern_expr(&body.expr, pz, table)?;
        }
    }
    Ok(())
}

fn intern_expr(expr: &Expr, pz: &mut Pz, table: &mut StringTable) -> Result<(), ConstDataError> {
    if let ExprKind::Constant(Const::Str(s)) = &expr.kind {
        intern_one(s, pz, table)?;
    }
    for child in expr.children() {
        intern_expr(child, pz, table)?;
    }
    Ok(())
}

fn intern_one(s: &str, pz: &mut Pz, table: &mut StringTable) -> Result<(), ConstDataError> {
    if table.ids.contains_key(s) {
        return Ok(());
    }
    if !s.is_ascii() {
        return Err(ConstDataError::NonAscii { literal: s.to_owned() });
    }
    let id = pz.fresh_data_id();
    let mut bytes: Vec<u8> = s.bytes().collect();
    bytes.push(0);
    pz.insert_data(id, PzData::Array(Width::W8, bytes));
    table.ids.insert(s.to_owned(), id);
    Ok(())
}
