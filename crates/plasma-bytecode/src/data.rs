//! Const-data entries: the values the code generator's string interning
//! (and, potentially, other literal pools) store alongside procedures.

use serde::{Deserialize, Serialize};

use crate::width::Width;

/// One entry of the bytecode program's data table.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PzData {
    /// A flat array of same-width values. The const-data pass always uses
    /// `Width::W8` here: a NUL-terminated byte array holding one interned
    /// string literal.
    Array(Width, Vec<u8>),
    /// A struct literal: one width-tagged value per declared field.
    Struct(Vec<(Width, i64)>),
}
