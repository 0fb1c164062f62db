//! In-memory bytecode program model (`Pz`) for the Plasma compiler.
//!
//! This crate owns the §3 bytecode data model — widths, struct layouts,
//! data entries, instructions and procedures — consumed by
//! `plasma-compiler`'s code generator and, outside this workspace, by a
//! bytecode serializer and the stack-machine VM runtime. It has no
//! knowledge of the core IR or any inference pass.

pub mod data;
pub mod instr;
pub mod proc;
pub mod pz;
pub mod struct_def;
pub mod width;

pub use data::PzData;
pub use instr::{BinOp, BlockId, CallTarget, Instruction, UnOp};
pub use proc::{Block, PzProc, PzpSignature};
pub use pz::{ImportName, Pz};
pub use struct_def::PzStruct;
pub use width::Width;

/// Number of low pointer bits reserved for the primary constructor tag.
///
/// This is an ABI contract with the VM runtime (§6); changing it requires
/// a coordinated change there. The source's `TODO` about a 64-bit target
/// with three ptag bits is a documented, unimplemented extension point —
/// this crate commits to the single value below rather than parameterizing
/// speculatively over a target that doesn't exist yet.
pub const NUM_PTAG_BITS: u32 = 2;
