//! Stack-machine instructions emitted by the code generator.
//!
//! Stack discipline (§4.5 of the design this crate implements): arguments
//! are pushed left-to-right before a call; a call consumes its arguments
//! and leaves its results on the stack top. Blocks form a simple CFG
//! within one procedure; branching is only ever a conditional or
//! unconditional jump to another block of the same procedure.

use serde::{Deserialize, Serialize};

use plasma_core::ids::{PzdId, PziId, PzpId, PzsId};

use crate::width::Width;

/// A valid call target: either a procedure compiled into this program, or
/// a named import resolved by the external VM runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CallTarget {
    Proc(PzpId),
    Import(PziId),
}

/// The fixed set of binary arithmetic, comparison and bitwise operators
/// the builtins table installs (`add_int`, `lt_int`, `and_bool`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Neq,
}

/// The fixed set of unary operators (`not_bool`, integer negation).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UnOp {
    Not,
    Neg,
}

/// A block index within one procedure's block list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// One stack-machine instruction.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Instruction {
    /// Push a copy of the value `n` positions below the current stack top
    /// (`0` is the top itself). Backs `e_var` lowering.
    Pick(u32),
    /// Drop the value `n` positions below the current stack top, used to
    /// discard non-last `e_sequence` results and bindings that fall out of
    /// scope after a `e_let` body.
    Drop(u32),
    LoadImmediate(Width, i64),
    /// Push the interned constant-data entry `d` (a string literal's
    /// address).
    Load(PzdId),
    BinOp(Width, BinOp),
    UnOp(Width, UnOp),
    Call(CallTarget),
    /// Like `Call`, but in tail position: the callee's return also returns
    /// from this procedure, so the runtime may reuse this call's frame.
    TailCall(CallTarget),
    /// Allocate a struct of the given layout with its fields unset,
    /// pushing the new (untagged) reference.
    Alloc(PzsId),
    /// Pop the value at the stack top and store it into field `field` of
    /// the struct reference that sits just beneath it, leaving that
    /// reference on top. Used immediately after pushing a field's value
    /// while the struct reference from `Alloc` is the next stack slot
    /// down.
    StoreField { struct_id: PzsId, field: u32 },
    /// Push the value of field `field` of the struct reference at the
    /// stack top, without popping the reference itself.
    LoadField { struct_id: PzsId, field: u32 },
    /// Or the primary tag `ptag` into the pointer at the stack top.
    MakeTag(u8),
    /// Left-shift the stack-top word by `NUM_PTAG_BITS`, then or in
    /// `ptag` — the nullary-constructor constant encoding.
    ShiftMakeTag(u8),
    /// Split a tagged pointer at the stack top into its primary tag (new
    /// top) and the untagged pointer beneath it.
    BreakTag,
    /// Like `BreakTag`, but additionally right-shifts the untagged
    /// payload by `NUM_PTAG_BITS` — the inverse of `ShiftMakeTag`.
    BreakShiftTag,
    /// Right-shift the stack-top word by `NUM_PTAG_BITS` without
    /// inspecting or removing a tag.
    UnshiftValue,
    /// Jump to `target` if the top-of-stack primary tag equals `ptag`.
    /// Does not itself pop; the match skeleton pops via an explicit `Drop`
    /// once dispatch is resolved.
    CJmpTag { ptag: u8, target: BlockId },
    /// Jump to `target` if the top-of-stack integer literal equals
    /// `value` (`e_match` over `Pattern::Int`).
    CJmpEq { value: i64, target: BlockId },
    Jmp(BlockId),
    Ret,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_targets_distinguish_proc_and_import() {
        let proc = CallTarget::Proc(PzpId::from_raw(0));
        let import = CallTarget::Import(PziId::from_raw(0));
        assert_ne!(proc, import);
    }
}
