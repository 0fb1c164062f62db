//! Tag assignment, const-data interning and code generation for the
//! Plasma compiler.
//!
//! This crate picks up where `plasma-core`'s pipeline leaves off: it
//! installs the fixed builtin set, runs the core passes, then lowers the
//! resulting `Core` into a `plasma_bytecode::Pz` ready for serialization
//! or interpretation. It has no notion of source text or parsing.

pub mod builtins;
pub mod codegen;
pub mod constdata;
pub mod options;
pub mod tags;

pub use codegen::CodegenError;
pub use options::CodegenOptions;

use plasma_bytecode::Pz;
use plasma_core::core::Core;
use plasma_core::diagnostics::ErrorCord;
use plasma_core::interner::Interner;
use plasma_core::pipeline::run_core_passes;
use plasma_core::span::Span;

/// Compile `core` end to end: install builtins, run arity and type
/// inference, assign constructor tags, intern const data, then generate
/// bytecode.
///
/// Builtins are installed here rather than by the caller so the
/// inference passes and the code generator always see the same fixed
/// set — `bool_to_string`'s real `Core`-kind body, for instance, needs to
/// go through arity/type inference exactly like a user-defined function.
pub fn compile(core: &mut Core, interner: &mut Interner, options: &CodegenOptions) -> Result<Pz, ErrorCord> {
    let mut errors = ErrorCord::new();

    let builtin_table = builtins::install(core, interner);

    if let Err(pass_errors) = run_core_passes(core, interner) {
        errors.extend(pass_errors);
        return Err(errors);
    }

    let tag_table = match tags::assign_tags(core, options) {
        Ok(table) => table,
        Err(e) => {
            errors.limitation(Span::synthetic(), e.to_string());
            return Err(errors);
        }
    };

    let mut pz = Pz::new();
    let mut string_table = constdata::StringTable::default();
    if let Err(e) = constdata::intern_strings(core, &mut pz, &mut string_table) {
        errors.limitation(Span::synthetic(), e.to_string());
        return Err(errors);
    }

    if let Err(e) = codegen::generate(core, &tag_table, &string_table, &builtin_table, options, &mut pz) {
        errors.internal_error(Span::synthetic(), e.to_string());
        return Err(errors);
    }

    Ok(pz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegen::verify_program;
    use plasma_core::expr::{Const, Expr, ExprKind};
    use plasma_core::func::{Function, FunctionBody, Signature};
    use plasma_core::ty::Type;
    use plasma_core::vars::VarMap;

    #[test]
    fn an_empty_program_compiles_to_only_the_fixed_builtins() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let pz = compile(&mut core, &mut interner, &CodegenOptions::default()).unwrap();
        assert!(verify_program(&pz).is_ok());
    }

    #[test]
    fn a_constant_returning_function_compiles_and_verifies() {
        let mut core = Core::new();
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
                    expr: Expr::new(ExprKind::Constant(Const::Num(42)), Span::synthetic()),
                }),
            },
        );
        let mut interner = Interner::new();

        let pz = compile(&mut core, &mut interner, &CodegenOptions::default()).unwrap();
        assert!(verify_program(&pz).is_ok());
    }

    #[test]
    fn bool_to_string_compiles_end_to_end_and_verifies() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let pz = compile(&mut core, &mut interner, &CodegenOptions::default()).unwrap();
        assert!(verify_program(&pz).is_ok());
        assert!(pz.procs().any(|(_, p)| {
            p.blocks
                .as_ref()
                .map(|blocks| blocks.iter().any(|b| b.iter().any(|i| matches!(i, plasma_bytecode::Instruction::CJmpEq { .. }))))
                .unwrap_or(false)
        }));
    }

    #[test]
    fn too_many_non_nullary_constructors_surfaces_as_a_limitation() {
        use plasma_core::decl::{Constructor, TypeDef};

        let mut core = Core::new();
        let mut interner = Interner::new();
        let type_id = core.fresh_type_id();
        let mut ctor_ids = Vec::new();
        for i in 0..5 {
            let ctor_id = core.fresh_ctor_id();
            core.insert_ctor(
                ctor_id,
                Constructor {
                    name: interner.intern(&format!("C{i}")),
                    type_params: vec![],
                    fields: vec![(interner.intern("x"), Type::int())],
                },
            );
            ctor_ids.push(ctor_id);
        }
        core.insert_type(
            type_id,
            TypeDef { name: interner.intern("Overflowing"), type_params: vec![], ctors: ctor_ids },
        );

        let err = compile(&mut core, &mut interner, &CodegenOptions::default()).unwrap_err();
        use plasma_core::diagnostics::DiagnosticKind;
        assert_eq!(err.count_of(DiagnosticKind::Limitation), 1);
    }
}
