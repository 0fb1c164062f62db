//! Call-graph strongly-connected-component analysis.
//!
//! Arity inference and type inference both need functions
//! processed callee-before-caller, with mutually recursive functions
//! grouped so they can be solved together. This is Tarjan's algorithm,
//! run over the direct-call edges of a `Core`.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::core::Core;
use crate::expr::{Expr, ExprKind};
use crate::ids::FuncId;

/// Compute the call graph's strongly connected components, in dependency
/// order (a component's callees all appear at or before its own position).
///
/// Imported functions (no body) have no outgoing edges and each form their
/// own singleton component.
pub fn strongly_connected_components(core: &Core) -> Vec<Vec<FuncId>> {
    let mut edges: IndexMap<FuncId, Vec<FuncId>> = IndexMap::new();
    for (func_id, func) in core.functions() {
        let mut callees = Vec::new();
        if let Some(body) = &func.body {
            collect_calls(&body.expr, &mut callees);
        }
        edges.insert(func_id, callees);
    }

    let mut tarjan = Tarjan::new(&edges);
    for &func_id in edges.keys() {
        if !tarjan.indices.contains_key(&func_id) {
            tarjan.strong_connect(func_id);
        }
    }
    // Tarjan emits components callers-first; reverse for callee-before-caller.
    tarjan.components.reverse();
    tarjan.components
}

fn collect_calls(expr: &Expr, out: &mut Vec<FuncId>) {
    if let ExprKind::Call { func, .. } = &expr.kind {
        out.push(*func);
    }
    for child in expr.children() {
        collect_calls(child, out);
    }
}

struct Tarjan<'a> {
    edges: &'a IndexMap<FuncId, Vec<FuncId>>,
    indices: HashMap<FuncId, u32>,
    low_links: HashMap<FuncId, u32>,
    on_stack: HashMap<FuncId, bool>,
    stack: Vec<FuncId>,
    next_index: u32,
    components: Vec<Vec<FuncId>>,
}

impl<'a> Tarjan<'a> {
    fn new(edges: &'a IndexMap<FuncId, Vec<FuncId>>) -> Self {
        Self {
            edges,
            indices: HashMap::new(),
            low_links: HashMap::new(),
            on_stack: HashMap::new(),
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        }
    }

    fn strong_connect(&mut self, v: FuncId) {
        self.indices.insert(v, self.next_index);
        self.low_links.insert(v, self.next_index);
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v, true);

        let successors = self.edges.get(&v).cloned().unwrap_or_default();
        for w in successors {
            if !self.edges.contains_key(&w) {
                // Edge to a function outside this Core (shouldn't happen if
                // invariants hold); ignore rather than panic in a pass that
                // isn't the invariant checker.
                continue;
            }
            if !self.indices.contains_key(&w) {
                self.strong_connect(w);
                let w_low = self.low_links[&w];
                let v_low = self.low_links[&v];
                self.low_links.insert(v, v_low.min(w_low));
            } else if *self.on_stack.get(&w).unwrap_or(&false) {
                let w_index = self.indices[&w];
                let v_low = self.low_links[&v];
                self.low_links.insert(v, v_low.min(w_index));
            }
        }

        if self.low_links[&v] == self.indices[&v] {
            let mut component = Vec::new();
            loop {
                let w = self.stack.pop().expect("strongly connected component stack underflow");
                self.on_stack.insert(w, false);
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
