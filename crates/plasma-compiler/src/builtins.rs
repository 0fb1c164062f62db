//! The fixed builtins table (§4.5): arithmetic/comparison/bitwise
//! operators, the `Bool` and `List` types, the `IO`/`Environment`/`Time`
//! resources, and the handful of runtime-imported functions, installed
//! into `Core` once before compilation.

use std::collections::HashMap;

use indexmap::IndexMap;

use plasma_bytecode::{BinOp, Instruction, UnOp, Width};
use plasma_core::core::Core;
use plasma_core::decl::{Constructor, Resource, TypeDef};
use plasma_core::expr::{Const, Expr, ExprKind, Pattern};
use plasma_core::func::{Function, FunctionBody, Signature};
use plasma_core::ids::{CtorId, FuncId, ResourceId, TypeId};
use plasma_core::interner::{Interner, Symbol};
use plasma_core::span::Span;
use plasma_core::ty::{TVar, Type};
use plasma_core::vars::VarMap;

/// How a builtin function's body is realized.
#[derive(Clone, PartialEq, Debug)]
pub enum BuiltinKind {
    /// A canned instruction sequence spliced in place of the call.
    InlinePz(Vec<Instruction>),
    /// A real core body, lowered like any user-defined function
    /// (`bool_to_string` is the only one today).
    Core,
    /// A named import resolved by the external VM runtime.
    Runtime(Symbol),
}

/// The installed builtins: every builtin function's lowering strategy,
/// plus the well-known type/constructor/resource ids a caller (the code
/// generator, or tests) may need to look up by name.
#[derive(Clone, Debug, Default)]
pub struct BuiltinTable {
    kinds: IndexMap<FuncId, BuiltinKind>,
    funcs: HashMap<&'static str, FuncId>,
    types: HashMap<&'static str, TypeId>,
    ctors: HashMap<&'static str, CtorId>,
    resources: HashMap<&'static str, ResourceId>,
}

impl BuiltinTable {
    pub fn kind(&self, id: FuncId) -> Option<&BuiltinKind> {
        self.kinds.get(&id)
    }

    pub fn func(&self, name: &str) -> Option<FuncId> {
        self.funcs.get(name).copied()
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.types.get(name).copied()
    }

    pub fn ctor(&self, name: &str) -> Option<CtorId> {
        self.ctors.get(name).copied()
    }

    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.resources.get(name).copied()
    }
}

/// Install the fixed builtin set into `core`, returning the side table the
/// code generator uses to decide how to lower each call.
pub fn install(core: &mut Core, interner: &mut Interner) -> BuiltinTable {
    let mut table = BuiltinTable::default();

    let false_id = core.fresh_ctor_id();
    let true_id = core.fresh_ctor_id();
    core.insert_ctor(false_id, Constructor { name: interner.intern("False"), type_params: vec![], fields: vec![] });
    core.insert_ctor(true_id, Constructor { name: interner.intern("True"), type_params: vec![], fields: vec![] });
    let bool_type = core.fresh_type_id();
    core.insert_type(
        bool_type,
        TypeDef {
            name: interner.intern("Bool"),
            type_params: vec![],
            ctors: vec![false_id, true_id],
        },
    );
    table.ctors.insert("False", false_id);
    table.ctors.insert("True", true_id);
    table.types.insert("Bool", bool_type);
    let bool_ty = Type::Ref(bool_type, vec![]);

    let list_tvar = TVar(interner.intern("t"));
    let nil_id = core.fresh_ctor_id();
    let cons_id = core.fresh_ctor_id();
    let list_type = core.fresh_type_id();
    core.insert_ctor(nil_id, Constructor { name: interner.intern("Nil"), type_params: vec![list_tvar], fields: vec![] });
    core.insert_ctor(
        cons_id,
        Constructor {
            name: interner.intern("Cons"),
            type_params: vec![list_tvar],
            fields: vec![
                (interner.intern("head"), Type::Var(list_tvar)),
                (interner.intern("tail"), Type::Ref(list_type, vec![Type::Var(list_tvar)])),
            ],
        },
    );
    core.insert_type(
        list_type,
        TypeDef {
            name: interner.intern("List"),
            type_params: vec![list_tvar],
            ctors: vec![nil_id, cons_id],
        },
    );
    table.ctors.insert("Nil", nil_id);
    table.ctors.insert("Cons", cons_id);
    table.types.insert("List", list_type);

    for name in ["IO", "Environment", "Time"] {
        let id = core.fresh_resource_id();
        core.insert_resource(id, Resource { name: interner.intern(name) });
        table.resources.insert(name, id);
    }
    let io = table.resources["IO"];
    let environment = table.resources["Environment"];
    let time = table.resources["Time"];

    for (name, op) in [
        ("add_int", BinOp::Add),
        ("sub_int", BinOp::Sub),
        ("mul_int", BinOp::Mul),
        ("div_int", BinOp::Div),
        ("mod_int", BinOp::Mod),
        ("and_int", BinOp::And),
        ("or_int", BinOp::Or),
        ("xor_int", BinOp::Xor),
    ] {
        install_binary(core, &mut table, name, op, Type::int(), Type::int());
    }
    for (name, op) in [
        ("lt_int", BinOp::Lt),
        ("gt_int", BinOp::Gt),
        ("le_int", BinOp::Le),
        ("ge_int", BinOp::Ge),
        ("eq_int", BinOp::Eq),
        ("neq_int", BinOp::Neq),
    ] {
        install_binary(core, &mut table, name, op, Type::int(), bool_ty.clone());
    }
    install_binary(core, &mut table, "and_bool", BinOp::And, bool_ty.clone(), bool_ty.clone());
    install_binary(core, &mut table, "or_bool", BinOp::Or, bool_ty.clone(), bool_ty.clone());
    install_unary(core, &mut table, "not_bool", UnOp::Not, bool_ty.clone(), bool_ty.clone());

    install_runtime(core, interner, &mut table, "print", vec![Type::string()], vec![], vec![io]);
    install_runtime(core, interner, &mut table, "int_to_string", vec![Type::int()], vec![Type::string()], vec![]);
    install_runtime(
        core,
        interner,
        &mut table,
        "concat_string",
        vec![Type::string(), Type::string()],
        vec![Type::string()],
        vec![],
    );
    install_runtime(
        core,
        interner,
        &mut table,
        "setenv",
        vec![Type::string(), Type::string()],
        vec![],
        vec![environment],
    );
    install_runtime(core, interner, &mut table, "gettimeofday", vec![], vec![Type::int()], vec![time]);
    install_runtime(
        core,
        interner,
        &mut table,
        "set_parameter",
        vec![Type::string(), Type::int()],
        vec![],
        vec![],
    );
    install_runtime(core, interner, &mut table, "die", vec![Type::string()], vec![], vec![]);

    install_bool_to_string(core, interner, &mut table, bool_type, true_id, false_id);

    table
}

fn install_binary(core: &mut Core, table: &mut BuiltinTable, name: &'static str, op: BinOp, operand: Type, result: Type) {
    let id = core.fresh_func_id();
    core.insert_function(
        id,
        Function {
            signature: Signature {
                inputs: vec![operand.clone(), operand],
                outputs: vec![result],
                uses_resources: vec![],
                observes_resources: vec![],
                declared_arity: 1,
            },
            body: None,
        },
    );
    table.kinds.insert(id, BuiltinKind::InlinePz(vec![Instruction::BinOp(Width::WFast, op)]));
    table.funcs.insert(name, id);
}

fn install_unary(core: &mut Core, table: &mut BuiltinTable, name: &'static str, op: UnOp, operand: Type, result: Type) {
    let id = core.fresh_func_id();
    core.insert_function(
        id,
        Function {
            signature: Signature {
                inputs: vec![operand],
                outputs: vec![result],
                uses_resources: vec![],
                observes_resources: vec![],
                declared_arity: 1,
            },
            body: None,
        },
    );
    table.kinds.insert(id, BuiltinKind::InlinePz(vec![Instruction::UnOp(Width::WFast, op)]));
    table.funcs.insert(name, id);
}

#[allow(clippy::too_many_arguments)]
fn install_runtime(
    core: &mut Core,
    interner: &mut Interner,
    table: &mut BuiltinTable,
    name: &'static str,
    inputs: Vec<Type>,
    outputs: Vec<Type>,
    uses_resources: Vec<ResourceId>,
) {
    let id = core.fresh_func_id();
    let declared_arity = outputs.len() as u32;
    core.insert_function(
        id,
        Function {
            signature: Signature {
                inputs,
                outputs,
                uses_resources,
                observes_resources: vec![],
                declared_arity,
            },
            body: None,
        },
    );
    table.kinds.insert(id, BuiltinKind::Runtime(interner.intern(name)));
    table.funcs.insert(name, id);
}

/// Build `bool_to_string`'s real core body: `match b { True -> "True";
/// False -> "False" }`, exactly as §4.5 specifies, so it is lowered by the
/// ordinary `Match`/`Constant` codegen path rather than special-cased.
fn install_bool_to_string(
    core: &mut Core,
    interner: &mut Interner,
    table: &mut BuiltinTable,
    bool_type: TypeId,
    true_id: CtorId,
    false_id: CtorId,
) {
    let mut varmap = VarMap::new();
    let b = varmap.fresh(interner.intern("b"));

    let body_expr = Expr::new(
        ExprKind::Match {
            scrutinee: b,
            cases: vec![
                (
                    Pattern::Ctor(true_id, vec![]),
                    Expr::new(ExprKind::Constant(Const::Str("True".to_owned())), Span::synthetic()),
                ),
                (
                    Pattern::Ctor(false_id, vec![]),
                    Expr::new(ExprKind::Constant(Const::Str("False".to_owned())), Span::synthetic()),
                ),
            ],
        },
        Span::synthetic(),
    );

    let id = core.fresh_func_id();
    core.insert_function(
        id,
        Function {
            signature: Signature {
                inputs: vec![Type::Ref(bool_type, vec![])],
                outputs: vec![Type::string()],
                uses_resources: vec![],
                observes_resources: vec![],
                declared_arity: 1,
            },
            body: Some(FunctionBody { varmap, params: vec![b], expr: body_expr }),
        },
    );
    table.kinds.insert(id, BuiltinKind::Core);
    table.funcs.insert("bool_to_string", id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_and_list_types_are_installed() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let table = install(&mut core, &mut interner);

        assert!(table.type_id("Bool").is_some());
        assert!(table.type_id("List").is_some());
        assert!(table.ctor("True").is_some());
        assert!(table.ctor("False").is_some());
        assert!(table.ctor("Nil").is_some());
        assert!(table.ctor("Cons").is_some());
    }

    #[test]
    fn arithmetic_operator_is_inline_pz() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let table = install(&mut core, &mut interner);

        let add = table.func("add_int").unwrap();
        assert!(matches!(table.kind(add), Some(BuiltinKind::InlinePz(ops)) if ops.len() == 1));
    }

    #[test]
    fn runtime_function_carries_its_import_name() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let table = install(&mut core, &mut interner);

        let print = table.func("print").unwrap();
        match table.kind(print) {
            Some(BuiltinKind::Runtime(sym)) => assert_eq!(interner.resolve(*sym), "print"),
            other => panic!("expected a runtime builtin, got {other:?}"),
        }
    }

    #[test]
    fn bool_to_string_has_a_real_core_body() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let table = install(&mut core, &mut interner);

        let id = table.func("bool_to_string").unwrap();
        assert_eq!(table.kind(id), Some(&BuiltinKind::Core));
        let func = core.function(id).unwrap();
        assert!(func.body.is_some());
        assert!(matches!(func.body.as_ref().unwrap().expr.kind, ExprKind::Match { .. }));
    }

    #[test]
    fn print_declares_a_use_of_the_io_resource() {
        let mut core = Core::new();
        let mut interner = Interner::new();
        let table = install(&mut core, &mut interner);

        let print = table.func("print").unwrap();
        let io = table.resource("IO").unwrap();
        assert_eq!(core.function(print).unwrap().signature.uses_resources, vec![io]);
    }
}
