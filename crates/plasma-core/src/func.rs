//! Functions and their signatures.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::ids::{ResourceId, Var};
use crate::ty::Type;
use crate::vars::VarMap;

/// A function's type signature. Shared by imported and local functions —
/// imported functions carry a `Signature` but no `FunctionBody`.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Signature {
    pub inputs: Vec<Type>,
    pub outputs: Vec<Type>,
    pub uses_resources: Vec<ResourceId>,
    pub observes_resources: Vec<ResourceId>,
    /// Number of values this function returns (Plasma is multiple-return).
    pub declared_arity: u32,
}

/// A function body: its local variable table, parameter bindings and the
/// expression that computes its results.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FunctionBody {
    pub varmap: VarMap,
    pub params: Vec<Var>,
    pub expr: Expr,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Function {
    pub signature: Signature,
    /// `None` for imported functions.
    pub body: Option<FunctionBody>,
}

impl Function {
    pub fn is_imported(&self) -> bool {
        self.body.is_none()
    }
}
