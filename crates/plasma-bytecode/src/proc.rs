//! Bytecode procedures: a signature plus (for locally-defined procedures)
//! a block-structured body.

use serde::{Deserialize, Serialize};

use crate::instr::Instruction;
use crate::width::Width;

/// A procedure's stack signature: the widths it expects to find on the
/// stack before it runs, and the widths it leaves behind when it returns.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PzpSignature {
    pub before: Vec<Width>,
    pub after: Vec<Width>,
}

/// A straight-line sequence of instructions. Control only ever leaves a
/// block via its last instruction (`Jmp`, `CJmpTag`, `CJmpEq` or `Ret`).
pub type Block = Vec<Instruction>;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PzProc {
    pub signature: PzpSignature,
    /// `None` for a procedure declared but not defined in this program
    /// (mirrors `Function::body` being absent for an imported function).
    pub blocks: Option<Vec<Block>>,
}

impl PzProc {
    pub fn is_imported(&self) -> bool {
        self.blocks.is_none()
    }
}
