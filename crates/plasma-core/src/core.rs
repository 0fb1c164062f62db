//! The `Core` module table: the data shared by every pass.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::decl::{Constructor, Resource, TypeDef};
use crate::expr::ExprKind;
use crate::func::Function;
use crate::ids::{CtorId, FuncId, IdGen, ResourceId, TypeId};

/// A mapping from ids to their definitions, plus the call-graph's
/// dependency order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Core {
    functions: IndexMap<FuncId, Function>,
    types: IndexMap<TypeId, TypeDef>,
    ctors: IndexMap<CtorId, Constructor>,
    resources: IndexMap<ResourceId, Resource>,
    /// Strongly connected components of the call graph, in dependency
    /// order (callees before callers). Populated by the front end; see
    /// `crate::callgraph` for a reference implementation callers without
    /// a front end can use to compute it.
    sccs: Vec<Vec<FuncId>>,
    ids: IdGen,
}

impl Core {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_type_id(&mut self) -> TypeId {
        TypeId::from_raw(self.ids.next_raw())
    }

    pub fn fresh_ctor_id(&mut self) -> CtorId {
        CtorId::from_raw(self.ids.next_raw())
    }

    pub fn fresh_func_id(&mut self) -> FuncId {
        FuncId::from_raw(self.ids.next_raw())
    }

    pub fn fresh_resource_id(&mut self) -> ResourceId {
        ResourceId::from_raw(self.ids.next_raw())
    }

    pub fn insert_function(&mut self, id: FuncId, func: Function) {
        self.functions.insert(id, func);
    }

    pub fn insert_type(&mut self, id: TypeId, ty: TypeDef) {
        self.types.insert(id, ty);
    }

    pub fn insert_ctor(&mut self, id: CtorId, ctor: Constructor) {
        self.ctors.insert(id, ctor);
    }

    pub fn insert_resource(&mut self, id: ResourceId, resource: Resource) {
        self.resources.insert(id, resource);
    }

    pub fn set_sccs(&mut self, sccs: Vec<Vec<FuncId>>) {
        self.sccs = sccs;
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(&id)
    }

    pub fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(&id)
    }

    pub fn type_def(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(&id)
    }

    pub fn ctor(&self, id: CtorId) -> Option<&Constructor> {
        self.ctors.get(&id)
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn sccs(&self) -> &[Vec<FuncId>] {
        &self.sccs
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter().map(|(id, f)| (*id, f))
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types.iter().map(|(id, t)| (*id, t))
    }

    /// Check the structural invariants of the data model: every `ctor_id` referenced by
    /// a type belongs to that type; every `func_id` mentioned in an
    /// expression exists; every `resource_id` named in a signature exists.
    ///
    /// This is an opt-in check run once by the driver before the pipeline
    /// starts (and by tests), not re-verified by every pass.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (type_id, type_def) in &self.types {
            for ctor_id in &type_def.ctors {
                if !self.ctors.contains_key(ctor_id) {
                    return Err(InvariantViolation::DanglingCtor {
                        type_id: *type_id,
                        ctor_id: *ctor_id,
                    });
                }
            }
        }

        for (func_id, func) in &self.functions {
            for resource_id in func
                .signature
                .uses_resources
                .iter()
                .chain(&func.signature.observes_resources)
            {
                if !self.resources.contains_key(resource_id) {
                    return Err(InvariantViolation::DanglingResource {
                        func_id: *func_id,
                        resource_id: *resource_id,
                    });
                }
            }

            if let Some(body) = &func.body {
                self.check_expr_invariants(*func_id, &body.expr)?;
            }
        }

        Ok(())
    }

    fn check_expr_invariants(&self, owner: FuncId, expr: &crate::expr::Expr) -> Result<(), InvariantViolation> {
        if let ExprKind::Call { func, .. } = &expr.kind {
            if !self.functions.contains_key(func) {
                return Err(InvariantViolation::DanglingCall {
                    owner,
                    func_id: *func,
                });
            }
        }
        for child in expr.children() {
            self.check_expr_invariants(owner, child)?;
        }
        Ok(())
    }
}

/// A violated data-model invariant. These indicate a malformed `Core`
/// handed to this crate by the front end — not something any pass here
/// produces, so they are checked once up front rather than threaded
/// through every pass's error type.
#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
pub enum InvariantViolation {
    #[error("type {type_id} references constructor {ctor_id} which does not exist")]
    DanglingCtor { type_id: TypeId, ctor_id: CtorId },
    #[error("function {func_id} declares a use of resource {resource_id} which does not exist")]
    DanglingResource { func_id: FuncId, resource_id: ResourceId },
    #[error("function {owner} calls {func_id} which does not exist")]
    DanglingCall { owner: FuncId, func_id: FuncId },
}
