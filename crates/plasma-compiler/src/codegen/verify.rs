//! A post-codegen sanity check: simulate each procedure's stack height
//! block by block and confirm it is self-consistent.
//!
//! This is not part of the bytecode format and is never invoked by the
//! compiler driver automatically — it exists so tests (and, if this
//! crate grows a `--verify` CLI flag someday) can catch a code generator
//! bug before it reaches the VM.

use std::collections::HashMap;

use plasma_bytecode::{BlockId, CallTarget, Instruction, Pz, PzProc};

/// Why a procedure's bytecode failed verification.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("block {0:?} ends without a Jmp or Ret terminator")]
    MissingTerminator(BlockId),
    #[error("block {0:?} is reached with height {1} after having been reached with height {2}")]
    InconsistentHeight(BlockId, u32, u32),
    #[error("Ret reached with height {actual}, expected {expected}")]
    WrongReturnHeight { actual: u32, expected: u32 },
    #[error("call target {0:?} does not name a known procedure in this program")]
    UnknownCallee(CallTarget),
    #[error("block index {0} referenced but not present in this procedure")]
    MissingBlock(u32),
}

/// Per-instruction net effect on stack height. `Call`/`TailCall` are
/// handled separately since their effect depends on the callee.
fn instruction_height_delta(instr: &Instruction) -> Option<i64> {
    match instr {
        Instruction::Pick(_)
        | Instruction::LoadImmediate(..)
        | Instruction::Load(_)
        | Instruction::Alloc(_)
        | Instruction::LoadField { .. }
        | Instruction::BreakTag
        | Instruction::BreakShiftTag => Some(1),
        Instruction::Drop(_) | Instruction::StoreField { .. } | Instruction::BinOp(..) => Some(-1),
        Instruction::UnOp(..) | Instruction::MakeTag(_) | Instruction::ShiftMakeTag(_) | Instruction::UnshiftValue => {
            Some(0)
        }
        Instruction::CJmpTag { .. } | Instruction::CJmpEq { .. } => Some(0),
        Instruction::Jmp(_) | Instruction::Ret => Some(0),
        Instruction::Call(_) | Instruction::TailCall(_) => None,
    }
}

fn call_height_delta(pz: &Pz, target: &CallTarget) -> Result<i64, VerifyError> {
    match target {
        CallTarget::Proc(id) => {
            let callee = pz.proc(*id).ok_or(VerifyError::UnknownCallee(*target))?;
            Ok(callee.signature.after.len() as i64 - callee.signature.before.len() as i64)
        }
        // `Pz`'s `ImportName` carries no stack-effect signature, only a
        // `QName` — a call through a runtime import is trusted, not
        // statically verified.
        CallTarget::Import(_) => Ok(0),
    }
}

/// Simulate `proc`'s block graph, confirming every block reaches a
/// consistent height at every jump target and that `Ret` only fires at
/// the declared return height.
pub fn simulate_stack_effects(pz: &Pz, proc: &PzProc) -> Result<(), VerifyError> {
    let Some(blocks) = &proc.blocks else { return Ok(()) };
    let expected_return_height = proc.signature.after.len() as u32;

    let mut seen: HashMap<u32, u32> = HashMap::new();
    let mut worklist = vec![(0u32, proc.signature.before.len() as u32)];
    seen.insert(0, proc.signature.before.len() as u32);

    while let Some((block_idx, mut height)) = worklist.pop() {
        let block = blocks
            .get(block_idx as usize)
            .ok_or(VerifyError::MissingBlock(block_idx))?;

        let mut terminated = false;
        for instr in block {
            if terminated {
                break;
            }
            match instr {
                Instruction::Call(target) | Instruction::TailCall(target) => {
                    let delta = call_height_delta(pz, target)?;
                    height = (height as i64 + delta) as u32;
                }
                Instruction::CJmpTag { target, .. } | Instruction::CJmpEq { target, .. } => {
                    note_height(&mut seen, &mut worklist, *target, height)?;
                }
                Instruction::Jmp(target) => {
                    note_height(&mut seen, &mut worklist, *target, height)?;
                    terminated = true;
                }
                Instruction::Ret => {
                    if height != expected_return_height {
                        return Err(VerifyError::WrongReturnHeight { actual: height, expected: expected_return_height });
                    }
                    terminated = true;
                }
                other => {
                    let delta = instruction_height_delta(other)
                        .expect("Call/TailCall/CJmpTag/CJmpEq/Jmp/Ret handled above");
                    height = (height as i64 + delta) as u32;
                }
            }
        }

        if !terminated {
            return Err(VerifyError::MissingTerminator(BlockId(block_idx)));
        }
    }

    Ok(())
}

fn note_height(
    seen: &mut HashMap<u32, u32>,
    worklist: &mut Vec<(u32, u32)>,
    target: BlockId,
    height: u32,
) -> Result<(), VerifyError> {
    match seen.get(&target.0) {
        Some(&expected) if expected != height => {
            return Err(VerifyError::InconsistentHeight(target, height, expected));
        }
        Some(_) => {}
        None => {
            seen.insert(target.0, height);
            worklist.push((target.0, height));
        }
    }
    Ok(())
}

/// Verify every non-imported procedure in `pz`.
pub fn verify_program(pz: &Pz) -> Result<(), VerifyError> {
    for (_, proc) in pz.procs() {
        if proc.is_imported() {
            continue;
        }
        simulate_stack_effects(pz, proc)?;
    }
    Ok(())
}
