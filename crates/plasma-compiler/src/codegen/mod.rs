//! Code generation (§4.5): lowering every function body in `core` into
//! `plasma_bytecode` blocks, using the tag table, string table and
//! builtins table the earlier passes produced.
//!
//! The generator is a straightforward stack-machine lowering: each
//! `Expr` either pushes its results onto the current block's simulated
//! stack top or (a tail call, or a `Match` every one of whose cases ends
//! in a tail call) closes the current block with a terminator. `Locals`
//! tracks where each bound variable currently sits so `Var` lowering can
//! emit the right `Pick` distance; `FnCtx` owns the block list being
//! built for one procedure.

mod verify;

pub use verify::{simulate_stack_effects, verify_program, VerifyError};

use std::collections::HashMap;

use plasma_bytecode::{
    BlockId, CallTarget, Instruction, Pz, PzProc, PzStruct, PzpSignature, Width,
};
use plasma_core::core::Core;
use plasma_core::expr::{Const, Expr, ExprKind, Pattern};
use plasma_core::ids::{CtorId, FuncId, PziId, PzpId, PzsId, TypeId, Var};
use plasma_core::qname::QName;
use plasma_core::ty::{Builtin, Type};

use crate::builtins::{BuiltinKind, BuiltinTable};
use crate::constdata::StringTable;
use crate::options::CodegenOptions;
use crate::tags::{CtorTagInfo, TagTable};

/// Why code generation failed. Every variant here represents either an
/// invariant an earlier pass should already guarantee (`Internal`) or a
/// deliberately narrow scope boundary this generator does not lower.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("{0}")]
    Internal(String),
    /// `e_match`'s sub-patterns are only ever `Pattern::Var`/`Wildcard`
    /// leaves in every worked example this crate generates code for
    /// (`Bool`, `List`); a nested `Pattern::Ctor`/`Pattern::Int`
    /// sub-pattern would need its own recursive dispatch this generator
    /// does not build.
    #[error("nested constructor or literal sub-patterns are not supported by this code generator")]
    NestedSubPatternUnsupported,
    /// A `Pattern::Ctor`/`Pattern::Int` match mixed with a `Pattern::Var`
    /// or `Pattern::Wildcard` case is a legitimate program this generator
    /// chooses not to support: telling which tag dispatch a default case
    /// falls out of would require reconstructing the original tagged
    /// value after `BreakTag` has already discarded it.
    #[error("constructor or integer patterns mixed with a wildcard/variable default case are not supported by this code generator")]
    MixedPatternKindsUnsupported,
}

fn internal(message: impl Into<String>) -> CodegenError {
    CodegenError::Internal(message.into())
}

fn field_width(ty: &Type) -> Width {
    match ty {
        Type::Builtin(Builtin::Int) | Type::Builtin(Builtin::Codepoint) => Width::WFast,
        Type::Builtin(Builtin::String) | Type::Ref(..) | Type::Var(_) => Width::WPtr,
    }
}

/// Tracks, for every variable currently in scope, its absolute position
/// from the bottom of the current function's stack, plus the running
/// stack height. `depth_of` turns a position into the `Pick`/`Drop`
/// distance from the current top.
#[derive(Debug, Default)]
struct Locals {
    positions: HashMap<Var, u32>,
    height: u32,
}

impl Locals {
    fn new() -> Self {
        Self::default()
    }

    fn bind_at_top(&mut self, var: Var) {
        self.positions.insert(var, self.height - 1);
    }

    fn depth_of(&self, var: Var) -> Option<u32> {
        self.positions.get(&var).map(|&pos| self.height - 1 - pos)
    }

    fn push_n(&mut self, n: u32) {
        self.height += n;
    }

    fn pop_n(&mut self, n: u32) {
        self.height -= n;
    }
}

/// Lowering context for one procedure body: the read-only side tables
/// produced by earlier passes, the variable/stack bookkeeping, and the
/// block list under construction.
struct FnCtx<'a> {
    core: &'a Core,
    tags: &'a TagTable,
    strings: &'a StringTable,
    builtins: &'a BuiltinTable,
    ctor_owner: &'a HashMap<CtorId, TypeId>,
    struct_ids: &'a HashMap<CtorId, PzsId>,
    proc_ids: &'a HashMap<FuncId, PzpId>,
    import_ids: &'a HashMap<FuncId, PziId>,
    locals: Locals,
    blocks: Vec<Vec<Instruction>>,
    current: usize,
}

impl<'a> FnCtx<'a> {
    fn emit(&mut self, instr: Instruction) {
        self.blocks[self.current].push(instr);
    }

    fn new_block(&mut self) -> usize {
        self.blocks.push(Vec::new());
        self.blocks.len() - 1
    }

    fn switch_to(&mut self, block: usize) {
        self.current = block;
    }

    /// Lower `expr`. `tail` is true only when `expr` sits in tail
    /// position of the enclosing function body — the only place that
    /// matters is `Call`, which emits `TailCall` instead of `Call` there.
    ///
    /// Returns whether the current block now ends in a terminator
    /// (`true`, meaning the caller must not append anything else to it —
    /// a tail call was just emitted) or is still open for more
    /// instructions (`false`).
    fn lower_expr(&mut self, expr: &Expr, tail: bool) -> Result<bool, CodegenError> {
        match &expr.kind {
            ExprKind::Sequence(exprs) => {
                let (init, last) = exprs.split_at(exprs.len() - 1);
                for e in init {
                    let closed = self.lower_expr(e, false)?;
                    debug_assert!(!closed, "a non-tail sequence element cannot close its block");
                    let k = e
                        .info
                        .arity
                        .ok_or_else(|| internal("sequence element missing arity"))?;
                    for _ in 0..k {
                        self.emit(Instruction::Drop(0));
                    }
                    self.locals.pop_n(k);
                }
                self.lower_expr(&last[0], tail)
            }
            ExprKind::Let { vars, rhs, body } => {
                let closed = self.lower_expr(rhs, false)?;
                debug_assert!(!closed, "a let binding's value cannot close its block");
                let base = self.locals.height - vars.len() as u32;
                for (i, &v) in vars.iter().enumerate() {
                    self.locals.positions.insert(v, base + i as u32);
                }
                let closed = self.lower_expr(body, tail)?;
                if closed {
                    return Ok(true);
                }
                let body_arity = body.info.arity.ok_or_else(|| internal("let body missing arity"))?;
                for _ in 0..vars.len() {
                    self.emit(Instruction::Drop(body_arity));
                }
                self.locals.pop_n(vars.len() as u32);
                Ok(false)
            }
            ExprKind::Tuple(exprs) => {
                for e in exprs {
                    let closed = self.lower_expr(e, false)?;
                    debug_assert!(!closed, "a tuple element cannot close its block");
                }
                Ok(false)
            }
            ExprKind::Call { func, args } => self.lower_call(*func, args, tail),
            ExprKind::Var(v) => {
                let depth = self
                    .locals
                    .depth_of(*v)
                    .ok_or_else(|| internal(format!("unbound variable {v}")))?;
                self.emit(Instruction::Pick(depth));
                self.locals.push_n(1);
                Ok(false)
            }
            ExprKind::Constant(c) => self.lower_constant(c),
            ExprKind::Construction { ctor, args } => self.lower_construction(*ctor, args),
            ExprKind::Match { scrutinee, cases } => self.lower_match(*scrutinee, cases, tail),
        }
    }

    fn lower_call(&mut self, func: FuncId, args: &[Expr], tail: bool) -> Result<bool, CodegenError> {
        for arg in args {
            let closed = self.lower_expr(arg, false)?;
            debug_assert!(!closed, "a call argument cannot close its block");
        }

        let signature = &self
            .core
            .function(func)
            .ok_or_else(|| internal(format!("call to undefined function {func}")))?
            .signature;
        let inputs = signature.inputs.len() as u32;
        let outputs = signature.outputs.len() as u32;

        match self.builtins.kind(func) {
            Some(BuiltinKind::InlinePz(ops)) => {
                for op in ops {
                    self.emit(op.clone());
                }
                self.locals.pop_n(inputs);
                self.locals.push_n(outputs);
                Ok(false)
            }
            Some(BuiltinKind::Runtime(_)) => {
                let import_id = *self
                    .import_ids
                    .get(&func)
                    .ok_or_else(|| internal(format!("function {func} has no registered import")))?;
                self.emit_call(CallTarget::Import(import_id), inputs, outputs, tail)
            }
            Some(BuiltinKind::Core) | None => {
                let proc_id = *self
                    .proc_ids
                    .get(&func)
                    .ok_or_else(|| internal(format!("function {func} has no registered procedure")))?;
                self.emit_call(CallTarget::Proc(proc_id), inputs, outputs, tail)
            }
        }
    }

    fn emit_call(&mut self, target: CallTarget, inputs: u32, outputs: u32, tail: bool) -> Result<bool, CodegenError> {
        self.locals.pop_n(inputs);
        self.locals.push_n(outputs);
        if tail {
            self.emit(Instruction::TailCall(target));
            Ok(true)
        } else {
            self.emit(Instruction::Call(target));
            Ok(false)
        }
    }

    fn lower_constant(&mut self, c: &Const) -> Result<bool, CodegenError> {
        match c {
            Const::Num(n) => {
                self.emit(Instruction::LoadImmediate(Width::WFast, *n));
                self.locals.push_n(1);
            }
            Const::Str(s) => {
                let id = self
                    .strings
                    .get(s)
                    .ok_or_else(|| internal(format!("string literal {s:?} was not interned")))?;
                self.emit(Instruction::Load(id));
                self.locals.push_n(1);
            }
            Const::Ctor(ctor_id) => {
                let type_id = self.owning_type(*ctor_id)?;
                match self.tags.get(type_id, *ctor_id) {
                    Some(CtorTagInfo::ConstantNoTag(i)) => {
                        self.emit(Instruction::LoadImmediate(Width::WFast, i as i64));
                        self.locals.push_n(1);
                    }
                    Some(CtorTagInfo::Constant { ptag, word_bits }) => {
                        self.emit(Instruction::LoadImmediate(Width::WFast, word_bits as i64));
                        self.emit(Instruction::ShiftMakeTag(ptag));
                        self.locals.push_n(1);
                    }
                    Some(CtorTagInfo::TaggedPointer { .. }) => {
                        return Err(internal(format!(
                            "constructor {ctor_id} needs a heap allocation and cannot appear as a bare constant"
                        )));
                    }
                    None => return Err(internal(format!("constructor {ctor_id} has no assigned tag"))),
                }
            }
            Const::Func(func_id) => {
                return Err(internal(format!(
                    "function {func_id} used as a first-class value is not supported by this code generator"
                )));
            }
        }
        Ok(false)
    }

    fn lower_construction(&mut self, ctor_id: CtorId, args: &[Expr]) -> Result<bool, CodegenError> {
        let type_id = self.owning_type(ctor_id)?;
        match self.tags.get(type_id, ctor_id) {
            Some(CtorTagInfo::ConstantNoTag(i)) => {
                self.emit(Instruction::LoadImmediate(Width::WFast, i as i64));
                self.locals.push_n(1);
            }
            Some(CtorTagInfo::Constant { ptag, word_bits }) => {
                self.emit(Instruction::LoadImmediate(Width::WFast, word_bits as i64));
                self.emit(Instruction::ShiftMakeTag(ptag));
                self.locals.push_n(1);
            }
            Some(CtorTagInfo::TaggedPointer { ptag }) => {
                let struct_id = *self
                    .struct_ids
                    .get(&ctor_id)
                    .ok_or_else(|| internal(format!("constructor {ctor_id} has no struct layout")))?;
                self.emit(Instruction::Alloc(struct_id));
                self.locals.push_n(1);
                for (i, arg) in args.iter().enumerate() {
                    let closed = self.lower_expr(arg, false)?;
                    debug_assert!(!closed, "a constructor argument cannot close its block");
                    self.emit(Instruction::StoreField { struct_id, field: i as u32 });
                    self.locals.pop_n(1);
                }
                self.emit(Instruction::MakeTag(ptag));
            }
            None => return Err(internal(format!("constructor {ctor_id} has no assigned tag"))),
        }
        Ok(false)
    }

    fn owning_type(&self, ctor_id: CtorId) -> Result<TypeId, CodegenError> {
        self.ctor_owner
            .get(&ctor_id)
            .copied()
            .ok_or_else(|| internal(format!("constructor {ctor_id} has no owning type")))
    }

    fn lower_match(&mut self, scrutinee: Var, cases: &[(Pattern, Expr)], tail: bool) -> Result<bool, CodegenError> {
        let depth = self
            .locals
            .depth_of(scrutinee)
            .ok_or_else(|| internal(format!("unbound match scrutinee {scrutinee}")))?;
        self.emit(Instruction::Pick(depth));
        self.locals.push_n(1);

        let has_ctor = cases.iter().any(|(p, _)| matches!(p, Pattern::Ctor(..)));
        let has_int = cases.iter().any(|(p, _)| matches!(p, Pattern::Int(_)));
        let has_default = cases
            .iter()
            .any(|(p, _)| matches!(p, Pattern::Var(_) | Pattern::Wildcard));

        if has_ctor {
            if has_int || has_default {
                return Err(CodegenError::MixedPatternKindsUnsupported);
            }
            let first_ctor = cases
                .iter()
                .find_map(|(p, _)| match p {
                    Pattern::Ctor(c, _) => Some(*c),
                    _ => None,
                })
                .expect("has_ctor implies at least one Ctor pattern");
            let type_id = self.owning_type(first_ctor)?;
            let is_strict_enum = matches!(self.tags.get(type_id, first_ctor), Some(CtorTagInfo::ConstantNoTag(_)));
            if is_strict_enum {
                self.lower_strict_enum_match(cases, tail)
            } else {
                self.lower_mixed_ctor_match(cases, tail)
            }
        } else if has_int {
            self.lower_int_match(cases, tail)
        } else {
            self.lower_fallback_only(cases, tail)
        }
    }

    /// A match over a strict-enum type (every constructor nullary, no
    /// pointer tag at all): the scrutinee duplicate is already the raw
    /// `ConstantNoTag` index, so dispatch is a plain `CJmpEq` chain with
    /// no `BreakTag` involved.
    fn lower_strict_enum_match(&mut self, cases: &[(Pattern, Expr)], tail: bool) -> Result<bool, CodegenError> {
        let join = self.new_block();
        let mut any_open = false;
        let n = cases.len();
        let entry_height = self.locals.height;

        for (i, (pat, body)) in cases.iter().enumerate() {
            let ctor_id = match pat {
                Pattern::Ctor(c, _) => *c,
                _ => return Err(internal("strict-enum match case is not a constructor pattern")),
            };
            let type_id = self.owning_type(ctor_id)?;
            let index = match self.tags.get(type_id, ctor_id) {
                Some(CtorTagInfo::ConstantNoTag(i)) => i,
                _ => return Err(internal(format!("constructor {ctor_id} is not a strict-enum constant"))),
            };

            if i == n - 1 {
                self.locals.height = entry_height;
                self.emit_single_value_leaf(body, tail, join, &mut any_open)?;
            } else {
                let block = self.new_block();
                self.emit(Instruction::CJmpEq { value: index as i64, target: BlockId(block as u32) });
                let outer = self.current;
                self.switch_to(block);
                self.locals.height = entry_height;
                self.emit_single_value_leaf(body, tail, join, &mut any_open)?;
                self.switch_to(outer);
                self.locals.height = entry_height;
            }
        }

        self.finish_dispatch(join, any_open)
    }

    /// A match over an integer pattern chain (or a single `Var`/`Wildcard`
    /// default as its last arm). Identical dispatch shape to the
    /// strict-enum case, but the scrutinee duplicate is kept (and
    /// optionally bound) rather than unconditionally discarded, since a
    /// `Var` leaf needs it.
    fn lower_int_match(&mut self, cases: &[(Pattern, Expr)], tail: bool) -> Result<bool, CodegenError> {
        let join = self.new_block();
        let mut any_open = false;
        let n = cases.len();
        let entry_height = self.locals.height;

        for (i, (pat, body)) in cases.iter().enumerate() {
            let is_last = i == n - 1;
            if !is_last {
                let value = match pat {
                    Pattern::Int(v) => *v,
                    _ => return Err(internal("non-final case of an integer match must be an integer pattern")),
                };
                let block = self.new_block();
                self.emit(Instruction::CJmpEq { value, target: BlockId(block as u32) });
                let outer = self.current;
                self.switch_to(block);
                self.locals.height = entry_height;
                self.emit_int_leaf(pat, body, tail, join, &mut any_open)?;
                self.switch_to(outer);
                self.locals.height = entry_height;
            } else {
                self.locals.height = entry_height;
                self.emit_int_leaf(pat, body, tail, join, &mut any_open)?;
            }
        }

        self.finish_dispatch(join, any_open)
    }

    fn emit_int_leaf(
        &mut self,
        pat: &Pattern,
        body: &Expr,
        tail: bool,
        join: usize,
        any_open: &mut bool,
    ) -> Result<(), CodegenError> {
        if let Pattern::Var(v) = pat {
            self.locals.bind_at_top(*v);
        }
        self.finish_leaf(body, tail, join, 1, any_open)
    }

    /// A match with exactly one case, a bare `Var`/`Wildcard` pattern —
    /// every other dispatch kind needs at least one discriminating test.
    fn lower_fallback_only(&mut self, cases: &[(Pattern, Expr)], tail: bool) -> Result<bool, CodegenError> {
        let (pat, body) = cases.first().expect("e_match cases is non-empty");
        if let Pattern::Var(v) = pat {
            self.locals.bind_at_top(*v);
        }
        let closed = self.lower_expr(body, tail)?;
        if closed {
            return Ok(true);
        }
        let body_arity = body.info.arity.ok_or_else(|| internal("match case body missing arity"))?;
        self.emit(Instruction::Drop(body_arity));
        self.locals.pop_n(1);
        Ok(false)
    }

    /// A match over a mixed type (at least one fielded constructor):
    /// `BreakTag` splits the scrutinee duplicate into its primary tag and
    /// untagged payload, fielded constructors dispatch by `CJmpTag`, and
    /// nullary constructors (sharing primary tag 0) dispatch as one
    /// `CJmpTag{0, ...}` cluster with its own inner `word_bits` chain.
    fn lower_mixed_ctor_match(&mut self, cases: &[(Pattern, Expr)], tail: bool) -> Result<bool, CodegenError> {
        self.emit(Instruction::BreakTag);
        self.locals.push_n(1);
        let join = self.new_block();
        let mut any_open = false;
        let entry_height = self.locals.height;

        let mut fielded: Vec<(u8, CtorId, &[Pattern], &Expr)> = Vec::new();
        let mut nullary: Vec<(u32, &Expr)> = Vec::new();

        for (pat, body) in cases {
            let ctor_id = match pat {
                Pattern::Ctor(c, _) => *c,
                _ => return Err(internal("mixed-type match case is not a constructor pattern")),
            };
            let type_id = self.owning_type(ctor_id)?;
            match self.tags.get(type_id, ctor_id) {
                Some(CtorTagInfo::TaggedPointer { ptag }) => {
                    let sub_patterns = match pat {
                        Pattern::Ctor(_, subs) => subs.as_slice(),
                        _ => unreachable!(),
                    };
                    fielded.push((ptag, ctor_id, sub_patterns, body));
                }
                Some(CtorTagInfo::Constant { word_bits, .. }) => nullary.push((word_bits, body)),
                _ => return Err(internal(format!("constructor {ctor_id} is not encoded as a mixed-type tag"))),
            }
        }

        let last_ctor_id = match &cases.last().expect("e_match cases is non-empty").0 {
            Pattern::Ctor(c, _) => *c,
            _ => unreachable!("checked above"),
        };
        let last_type_id = self.owning_type(last_ctor_id)?;
        let last_is_nullary = matches!(self.tags.get(last_type_id, last_ctor_id), Some(CtorTagInfo::Constant { .. }));

        // Exactly one group ends up test-less (the fallthrough containing
        // `last_ctor_id`), and its code must be the very last thing
        // appended to the dispatch block — every conditional `CJmpTag`
        // test is emitted first, regardless of `cases` order, so the
        // fallthrough's own terminator (`Jmp`/`TailCall`) really is the
        // block's last instruction.
        if !last_is_nullary && !nullary.is_empty() {
            let block = self.new_block();
            self.emit(Instruction::CJmpTag { ptag: 0, target: BlockId(block as u32) });
            let outer = self.current;
            self.switch_to(block);
            self.locals.height = entry_height;
            self.emit_nullary_cluster(&nullary, tail, join, &mut any_open)?;
            self.switch_to(outer);
            self.locals.height = entry_height;
        }

        for (ptag, ctor_id, sub_patterns, body) in &fielded {
            let is_fallthrough = !last_is_nullary && *ctor_id == last_ctor_id;
            if is_fallthrough {
                continue;
            }
            let struct_id = *self
                .struct_ids
                .get(ctor_id)
                .ok_or_else(|| internal(format!("constructor {ctor_id} has no struct layout")))?;
            let block = self.new_block();
            self.emit(Instruction::CJmpTag { ptag: *ptag, target: BlockId(block as u32) });
            let outer = self.current;
            self.switch_to(block);
            self.locals.height = entry_height;
            self.emit_fielded_case(struct_id, sub_patterns, body, tail, join, &mut any_open)?;
            self.switch_to(outer);
            self.locals.height = entry_height;
        }

        if last_is_nullary {
            self.locals.height = entry_height;
            self.emit_nullary_cluster(&nullary, tail, join, &mut any_open)?;
        } else {
            let (ptag, ctor_id, sub_patterns, body) = fielded
                .iter()
                .find(|(_, ctor_id, _, _)| *ctor_id == last_ctor_id)
                .expect("last_ctor_id is fielded when last_is_nullary is false");
            let struct_id = *self
                .struct_ids
                .get(ctor_id)
                .ok_or_else(|| internal(format!("constructor {ctor_id} has no struct layout")))?;
            self.locals.height = entry_height;
            self.emit_fielded_case(struct_id, sub_patterns, body, tail, join, &mut any_open)?;
        }

        self.finish_dispatch(join, any_open)
    }

    fn emit_fielded_case(
        &mut self,
        struct_id: PzsId,
        sub_patterns: &[Pattern],
        body: &Expr,
        tail: bool,
        join: usize,
        any_open: &mut bool,
    ) -> Result<(), CodegenError> {
        self.emit(Instruction::Drop(0));
        self.locals.pop_n(1);
        let mut bindings = 1u32;
        for (i, sub) in sub_patterns.iter().enumerate() {
            self.emit(Instruction::LoadField { struct_id, field: i as u32 });
            self.locals.push_n(1);
            bindings += 1;
            match sub {
                Pattern::Var(v) => self.locals.bind_at_top(*v),
                Pattern::Wildcard => {}
                Pattern::Ctor(..) | Pattern::Int(_) => return Err(CodegenError::NestedSubPatternUnsupported),
            }
        }
        self.finish_leaf(body, tail, join, bindings, any_open)
    }

    /// `nullary`'s shared ptag (0) has already been tested and the
    /// untagged payload (`word_bits`, possibly shifted) is the stack top.
    /// A single nullary constructor needs no further test; more than one
    /// needs `UnshiftValue` to recover the raw `word_bits` index and a
    /// `CJmpEq` chain over it, same fallthrough-last shape as every other
    /// dispatch here.
    fn emit_nullary_cluster(
        &mut self,
        nullary: &[(u32, &Expr)],
        tail: bool,
        join: usize,
        any_open: &mut bool,
    ) -> Result<(), CodegenError> {
        self.emit(Instruction::Drop(0));
        self.locals.pop_n(1);

        if nullary.len() == 1 {
            let (_, body) = nullary[0];
            return self.emit_single_value_leaf(body, tail, join, any_open);
        }

        self.emit(Instruction::UnshiftValue);
        let entry_height = self.locals.height;
        let n = nullary.len();
        for (i, (word_bits, body)) in nullary.iter().enumerate() {
            if i == n - 1 {
                self.locals.height = entry_height;
                self.emit_single_value_leaf(body, tail, join, any_open)?;
            } else {
                let block = self.new_block();
                self.emit(Instruction::CJmpEq { value: *word_bits as i64, target: BlockId(block as u32) });
                let outer = self.current;
                self.switch_to(block);
                self.locals.height = entry_height;
                self.emit_single_value_leaf(body, tail, join, any_open)?;
                self.switch_to(outer);
                self.locals.height = entry_height;
            }
        }
        Ok(())
    }

    /// A leaf reached with exactly one dead scratch value (a match-tag
    /// payload, or an int/default scrutinee duplicate) still sitting on
    /// top: drop it, then lower the body as an ordinary single binding.
    fn emit_single_value_leaf(
        &mut self,
        body: &Expr,
        tail: bool,
        join: usize,
        any_open: &mut bool,
    ) -> Result<(), CodegenError> {
        self.emit(Instruction::Drop(0));
        self.locals.pop_n(1);
        self.finish_leaf(body, tail, join, 0, any_open)
    }

    /// Lower `body` (already in its dispatch block, with `extra_bindings`
    /// scratch/field slots pushed below where its results will land), then
    /// — unless `body` already closed the block itself via a nested tail
    /// call — strip those slots and jump to `join`.
    fn finish_leaf(
        &mut self,
        body: &Expr,
        tail: bool,
        join: usize,
        extra_bindings: u32,
        any_open: &mut bool,
    ) -> Result<(), CodegenError> {
        let closed = self.lower_expr(body, tail)?;
        if closed {
            return Ok(());
        }
        let body_arity = body.info.arity.ok_or_else(|| internal("match case body missing arity"))?;
        for _ in 0..extra_bindings {
            self.emit(Instruction::Drop(body_arity));
        }
        self.locals.pop_n(extra_bindings);
        self.emit(Instruction::Jmp(BlockId(join as u32)));
        *any_open = true;
        Ok(())
    }

    fn finish_dispatch(&mut self, join: usize, any_open: bool) -> Result<bool, CodegenError> {
        if any_open {
            self.switch_to(join);
            Ok(false)
        } else {
            Ok(true)
        }
    }
}

/// Lower every function body in `core` into bytecode, adding procedures,
/// runtime imports and struct layouts to `pz` (which already holds the
/// interned const-data table `constdata::intern_strings` built).
pub fn generate(
    core: &Core,
    tags: &TagTable,
    strings: &StringTable,
    builtins: &BuiltinTable,
    options: &CodegenOptions,
    pz: &mut Pz,
) -> Result<(), CodegenError> {
    // num_ptag_bits only governs tag assignment (already run by the time
    // code generation starts); kept as a parameter for symmetry with the
    // other passes this crate chains together.
    let _ = options;

    let mut ctor_owner: HashMap<CtorId, TypeId> = HashMap::new();
    let mut struct_ids: HashMap<CtorId, PzsId> = HashMap::new();

    for (type_id, type_def) in core.types() {
        for &ctor_id in &type_def.ctors {
            ctor_owner.insert(ctor_id, type_id);
            let ctor = core
                .ctor(ctor_id)
                .ok_or_else(|| internal(format!("constructor {ctor_id} is missing from core")))?;
            if !ctor.is_nullary() {
                let id = pz.fresh_struct_id();
                let fields = ctor.fields.iter().map(|(_, ty)| field_width(ty)).collect();
                pz.insert_struct(id, PzStruct::new(fields));
                struct_ids.insert(ctor_id, id);
            }
        }
    }

    // Reserved scaffolding for the §9 secondary-tag extension point. Never
    // referenced by anything this generator emits — `assign_tags` already
    // rejects a type before code generation runs if it would need one.
    let reserved_stag_struct = pz.fresh_struct_id();
    pz.insert_struct(reserved_stag_struct, PzStruct::new(vec![Width::WFast]));

    let mut proc_ids: HashMap<FuncId, PzpId> = HashMap::new();
    let mut import_ids: HashMap<FuncId, PziId> = HashMap::new();

    for (func_id, func) in core.functions() {
        match builtins.kind(func_id) {
            Some(BuiltinKind::InlinePz(_)) => {}
            Some(BuiltinKind::Runtime(sym)) => {
                let id = pz.fresh_import_id();
                pz.insert_import(id, plasma_bytecode::ImportName(QName::builtin(*sym)));
                import_ids.insert(func_id, id);
            }
            Some(BuiltinKind::Core) | None => {
                let id = pz.fresh_proc_id();
                let signature = PzpSignature {
                    before: func.signature.inputs.iter().map(|_| Width::WFast).collect(),
                    after: func.signature.outputs.iter().map(|_| Width::WFast).collect(),
                };
                let blocks = if func.is_imported() { None } else { Some(Vec::new()) };
                pz.insert_proc(id, PzProc { signature, blocks });
                proc_ids.insert(func_id, id);
            }
        }
    }

    for (func_id, func) in core.functions() {
        let Some(&proc_id) = proc_ids.get(&func_id) else { continue };
        let Some(body) = &func.body else { continue };

        let mut locals = Locals::new();
        locals.height = body.params.len() as u32;
        for (i, &param) in body.params.iter().enumerate() {
            locals.positions.insert(param, i as u32);
        }

        let mut fn_ctx = FnCtx {
            core,
            tags,
            strings,
            builtins,
            ctor_owner: &ctor_owner,
            struct_ids: &struct_ids,
            proc_ids: &proc_ids,
            import_ids: &import_ids,
            locals,
            blocks: vec![Vec::new()],
            current: 0,
        };

        let closed = fn_ctx.lower_expr(&body.expr, true)?;
        if !closed {
            fn_ctx.emit(Instruction::Ret);
        }

        pz.proc_mut(proc_id)
            .ok_or_else(|| internal(format!("procedure for {func_id} was not pre-registered")))?
            .blocks = Some(fn_ctx.blocks);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasma_core::decl::{Constructor, TypeDef};
    use plasma_core::func::{Function, FunctionBody, Signature};
    use plasma_core::interner::Interner;
    use plasma_core::span::Span;
    use plasma_core::vars::VarMap;

    fn add_int_function(core: &mut Core, builtins: &crate::builtins::BuiltinTable, a: i64, b: i64) -> FuncId {
        let add = builtins.func("add_int").unwrap();
        let id = core.fresh_func_id();
        core.insert_function(
            id,
            Function {
                signature: Signature {
                    inputs: vec![],
                    outputs: vec![Type::int()],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 1,
                },
                body: Some(FunctionBody {
                    varmap: VarMap::new(),
                    params: vec![],
                    expr: Expr::new(
                        ExprKind::Call {
                            func: add,
                            args: vec![
                                Expr::new(ExprKind::Constant(Const::Num(a)), Span::synthetic()),
                                Expr::new(ExprKind::Constant(Const::Num(b)), Span::synthetic()),
                            ],
                        },
                        Span::synthetic(),
                    ),
                }),
            },
        );
        id
    }

    fn run_inference(core: &mut Core, interner: &mut Interner) {
        plasma_core::pipeline::run_core_passes(core, interner).unwrap();
    }

    #[test]
    fn arithmetic_call_lowers_to_an_inline_binop() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let builtins = crate::builtins::install(&mut core, &mut interner);
        add_int_function(&mut core, &builtins, 1, 2);
        run_inference(&mut core, &mut interner);

        let tags = crate::tags::assign_tags(&core, &CodegenOptions::default()).unwrap();
        let mut pz = Pz::new();
        let mut strings = StringTable::default();
        crate::constdata::intern_strings(&core, &mut pz, &mut strings).unwrap();
        generate(&core, &tags, &strings, &builtins, &CodegenOptions::default(), &mut pz).unwrap();

        let found = pz.procs().find(|(_, p)| {
            p.blocks
                .as_ref()
                .map(|blocks| blocks[0].iter().any(|i| matches!(i, Instruction::BinOp(..))))
                .unwrap_or(false)
        });
        assert!(found.is_some(), "expected a procedure whose body contains a BinOp");
    }

    #[test]
    fn bool_to_string_lowers_to_a_strict_enum_dispatch() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let builtins = crate::builtins::install(&mut core, &mut interner);
        run_inference(&mut core, &mut interner);

        let tags = crate::tags::assign_tags(&core, &CodegenOptions::default()).unwrap();
        let mut pz = Pz::new();
        let mut strings = StringTable::default();
        crate::constdata::intern_strings(&core, &mut pz, &mut strings).unwrap();
        generate(&core, &tags, &strings, &builtins, &CodegenOptions::default(), &mut pz).unwrap();

        let bool_to_string = builtins.func("bool_to_string").unwrap();
        assert!(matches!(builtins.kind(bool_to_string), Some(BuiltinKind::Core)));

        let proc = pz
            .procs()
            .find(|(_, p)| {
                p.blocks
                    .as_ref()
                    .map(|blocks| blocks.iter().any(|b| b.iter().any(|i| matches!(i, Instruction::CJmpEq { .. }))))
                    .unwrap_or(false)
            })
            .map(|(_, p)| p);
        assert!(proc.is_some(), "expected a CJmpEq-based dispatch for bool_to_string");
    }

    #[test]
    fn list_cons_construction_allocates_and_stores_fields() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let builtins = crate::builtins::install(&mut core, &mut interner);
        let cons = builtins.ctor("Cons").unwrap();
        let nil = builtins.ctor("Nil").unwrap();

        let id = core.fresh_func_id();
        let list_type = builtins.type_id("List").unwrap();
        core.insert_function(
            id,
            Function {
                signature: Signature {
                    inputs: vec![],
                    outputs: vec![Type::Ref(list_type, vec![Type::int()])],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 1,
                },
                body: Some(FunctionBody {
                    varmap: VarMap::new(),
                    params: vec![],
                    expr: Expr::new(
                        ExprKind::Construction {
                            ctor: cons,
                            args: vec![
                                Expr::new(ExprKind::Constant(Const::Num(1)), Span::synthetic()),
                                Expr::new(ExprKind::Construction { ctor: nil, args: vec![] }, Span::synthetic()),
                            ],
                        },
                        Span::synthetic(),
                    ),
                }),
            },
        );

        run_inference(&mut core, &mut interner);
        let tags = crate::tags::assign_tags(&core, &CodegenOptions::default()).unwrap();
        let mut pz = Pz::new();
        let mut strings = StringTable::default();
        crate::constdata::intern_strings(&core, &mut pz, &mut strings).unwrap();
        generate(&core, &tags, &strings, &builtins, &CodegenOptions::default(), &mut pz).unwrap();

        let has_alloc_and_store = pz.procs().any(|(_, p)| {
            p.blocks
                .as_ref()
                .map(|blocks| {
                    blocks[0].iter().any(|i| matches!(i, Instruction::Alloc(_)))
                        && blocks[0].iter().any(|i| matches!(i, Instruction::StoreField { .. }))
                        && blocks[0].iter().any(|i| matches!(i, Instruction::MakeTag(_)))
                })
                .unwrap_or(false)
        });
        assert!(has_alloc_and_store, "expected Alloc/StoreField/MakeTag in the Cons construction's procedure");
    }

    #[test]
    fn self_recursive_tail_call_is_a_tail_call_instruction() {
        // f() = f() -- a self call in tail position of the function body.
        let mut core = Core::new();
        let mut interner = Interner::new();
        let builtins = crate::builtins::install(&mut core, &mut interner);

        let f = core.fresh_func_id();
        core.insert_function(
            f,
            Function {
                signature: Signature {
                    inputs: vec![],
                    outputs: vec![Type::int()],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 1,
                },
                body: Some(FunctionBody {
                    varmap: VarMap::new(),
                    params: vec![],
                    expr: Expr::new(ExprKind::Call { func: f, args: vec![] }, Span::synthetic()),
                }),
            },
        );

        run_inference(&mut core, &mut interner);
        let tags = crate::tags::assign_tags(&core, &CodegenOptions::default()).unwrap();
        let mut pz = Pz::new();
        let mut strings = StringTable::default();
        crate::constdata::intern_strings(&core, &mut pz, &mut strings).unwrap();
        generate(&core, &tags, &strings, &builtins, &CodegenOptions::default(), &mut pz).unwrap();

        let has_tail_call = pz.procs().any(|(_, p)| {
            p.blocks
                .as_ref()
                .map(|blocks| blocks[0].iter().any(|i| matches!(i, Instruction::TailCall(_))))
                .unwrap_or(false)
        });
        assert!(has_tail_call, "expected the self-call to lower as a TailCall");
    }

    #[test]
    fn first_class_function_constant_is_a_named_limitation() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let builtins = crate::builtins::install(&mut core, &mut interner);

        let g = core.fresh_func_id();
        core.insert_function(
            g,
            Function {
                signature: Signature {
                    inputs: vec![],
                    outputs: vec![],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 0,
                },
                body: None,
            },
        );

        let f = core.fresh_func_id();
        core.insert_function(
            f,
            Function {
                signature: Signature {
                    inputs: vec![],
                    outputs: vec![],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 1,
                },
                body: Some(FunctionBody {
                    varmap: VarMap::new(),
                    params: vec![],
                    expr: Expr::new(ExprKind::Constant(Const::Func(g)), Span::synthetic()),
                }),
            },
        );

        // Skip full inference (declared_arity already set; arity/type
        // inference aren't exercised by this limitation path) and hand the
        // expression a manually-populated arity so codegen's arity lookups
        // don't fail before reaching the real assertion under test.
        if let Some(func) = core.function_mut(f) {
            if let Some(body) = &mut func.body {
                body.expr.info.arity = Some(0);
            }
        }

        let tags = crate::tags::assign_tags(&core, &CodegenOptions::default()).unwrap();
        let mut pz = Pz::new();
        let mut strings = StringTable::default();
        crate::constdata::intern_strings(&core, &mut pz, &mut strings).unwrap();
        let err = generate(&core, &tags, &strings, &builtins, &CodegenOptions::default(), &mut pz).unwrap_err();
        assert!(matches!(err, CodegenError::Internal(_)));
    }

    #[test]
    fn unused_symbol_for_unshift_value_case_is_reachable() {
        // Exercises emit_nullary_cluster's multi-nullary branch: a type
        // with two nullary constructors sharing ptag 0 alongside one
        // fielded constructor, matched over all three.
        let mut core = Core::new();
        let mut interner = Interner::new();
        let builtins = crate::builtins::install(&mut core, &mut interner);

        let red = core.fresh_ctor_id();
        let green = core.fresh_ctor_id();
        let wrapped = core.fresh_ctor_id();
        core.insert_ctor(red, Constructor { name: interner.intern("Red"), type_params: vec![], fields: vec![] });
        core.insert_ctor(green, Constructor { name: interner.intern("Green"), type_params: vec![], fields: vec![] });
        core.insert_ctor(
            wrapped,
            Constructor {
                name: interner.intern("Wrapped"),
                type_params: vec![],
                fields: vec![(interner.intern("value"), Type::int())],
            },
        );
        let color_type = core.fresh_type_id();
        core.insert_type(
            color_type,
            TypeDef {
                name: interner.intern("Color"),
                type_params: vec![],
                ctors: vec![red, green, wrapped],
            },
        );

        let tags = crate::tags::assign_tags(&core, &CodegenOptions::default()).unwrap();
        let color_ty = Type::Ref(color_type, vec![]);
        assert!(matches!(tags.get(color_type, red), Some(CtorTagInfo::Constant { ptag: 0, word_bits: 0 })));
        assert!(matches!(tags.get(color_type, green), Some(CtorTagInfo::Constant { ptag: 0, word_bits: 1 })));
        assert!(matches!(tags.get(color_type, wrapped), Some(CtorTagInfo::TaggedPointer { ptag: 1 })));

        let f = core.fresh_func_id();
        let mut varmap = VarMap::new();
        let c = varmap.fresh(interner.intern("c"));
        core.insert_function(
            f,
            Function {
                signature: Signature {
                    inputs: vec![color_ty],
                    outputs: vec![Type::int()],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 1,
                },
                body: Some(FunctionBody {
                    varmap,
                    params: vec![c],
                    expr: Expr::new(
                        ExprKind::Match {
                            scrutinee: c,
                            cases: vec![
                                (Pattern::Ctor(red, vec![]), Expr::new(ExprKind::Constant(Const::Num(0)), Span::synthetic())),
                                (Pattern::Ctor(green, vec![]), Expr::new(ExprKind::Constant(Const::Num(1)), Span::synthetic())),
                                (
                                    Pattern::Ctor(wrapped, vec![Pattern::Wildcard]),
                                    Expr::new(ExprKind::Constant(Const::Num(2)), Span::synthetic()),
                                ),
                            ],
                        },
                        Span::synthetic(),
                    ),
                }),
            },
        );

        run_inference(&mut core, &mut interner);
        let mut pz = Pz::new();
        let mut strings = StringTable::default();
        crate::constdata::intern_strings(&core, &mut pz, &mut strings).unwrap();
        generate(&core, &tags, &strings, &builtins, &CodegenOptions::default(), &mut pz).unwrap();

        let has_unshift = pz.procs().any(|(_, p)| {
            p.blocks
                .as_ref()
                .map(|blocks| blocks.iter().any(|b| b.iter().any(|i| matches!(i, Instruction::UnshiftValue))))
                .unwrap_or(false)
        });
        assert!(has_unshift, "expected UnshiftValue in the two-nullary-constructor dispatch");

        for (_, proc) in pz.procs() {
            simulate_stack_effects(&pz, proc).unwrap();
        }
    }

    #[test]
    fn match_arm_returning_a_tuple_keeps_every_branch_at_the_same_height() {
        // match c { True -> (1, 2); False -> (3, 4) } -- each branch pushes
        // a two-element result, so a branch that leaves `Locals`'s height
        // polluted for the next one would make the two arms join at
        // different stack heights.
        let mut core = Core::new();
        let mut interner = Interner::new();
        let builtins = crate::builtins::install(&mut core, &mut interner);
        let true_id = builtins.ctor("True").unwrap();
        let false_id = builtins.ctor("False").unwrap();
        let bool_type = builtins.type_id("Bool").unwrap();
        let bool_ty = Type::Ref(bool_type, vec![]);

        let f = core.fresh_func_id();
        let mut varmap = VarMap::new();
        let c = varmap.fresh(interner.intern("c"));
        core.insert_function(
            f,
            Function {
                signature: Signature {
                    inputs: vec![bool_ty],
                    outputs: vec![Type::int(), Type::int()],
                    uses_resources: vec![],
                    observes_resources: vec![],
                    declared_arity: 1,
                },
                body: Some(FunctionBody {
                    varmap,
                    params: vec![c],
                    expr: Expr::new(
                        ExprKind::Match {
                            scrutinee: c,
                            cases: vec![
                                (
                                    Pattern::Ctor(true_id, vec![]),
                                    Expr::new(
                                        ExprKind::Tuple(vec![
                                            Expr::new(ExprKind::Constant(Const::Num(1)), Span::synthetic()),
                                            Expr::new(ExprKind::Constant(Const::Num(2)), Span::synthetic()),
                                        ]),
                                        Span::synthetic(),
                                    ),
                                ),
                                (
                                    Pattern::Ctor(false_id, vec![]),
                                    Expr::new(
                                        ExprKind::Tuple(vec![
                                            Expr::new(ExprKind::Constant(Const::Num(3)), Span::synthetic()),
                                            Expr::new(ExprKind::Constant(Const::Num(4)), Span::synthetic()),
                                        ]),
                                        Span::synthetic(),
                                    ),
                                ),
                            ],
                        },
                        Span::synthetic(),
                    ),
                }),
            },
        );

        run_inference(&mut core, &mut interner);
        let tags = crate::tags::assign_tags(&core, &CodegenOptions::default()).unwrap();
        let mut pz = Pz::new();
        let mut strings = StringTable::default();
        crate::constdata::intern_strings(&core, &mut pz, &mut strings).unwrap();
        generate(&core, &tags, &strings, &builtins, &CodegenOptions::default(), &mut pz).unwrap();

        for (_, proc) in pz.procs() {
            simulate_stack_effects(&pz, proc).unwrap();
        }
    }
}
