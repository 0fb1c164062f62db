//! Driver for the core IR passes, in their required order.

use crate::callgraph;
use crate::core::Core;
use crate::diagnostics::ErrorCord;
use crate::infer::{arity, types};
use crate::interner::Interner;
use crate::span::Span;

/// Run every core pass over `core`, in order:
///
/// 1. Check the structural invariants (catches a malformed `Core` from
///    the front end before any pass trusts its shape).
/// 2. Compute the call graph's strongly connected components.
/// 3. Infer arities.
/// 4. Infer types (depends on arities for `Match`), skipping any function
///    arity inference already failed for.
///
/// Returns accumulated diagnostics; passes after invariant-checking keep
/// running even once some functions have failed, so a single bad function
/// doesn't hide errors in the rest of the program. A function that fails
/// arity inference is not re-typed: §7.1 treats that as a per-function
/// skip rather than something type inference should rediscover and
/// report again.
pub fn run_core_passes(core: &mut Core, interner: &mut Interner) -> Result<(), ErrorCord> {
    let mut errors = ErrorCord::new();

    if let Err(violation) = core.check_invariants() {
        errors.internal_error(Span::synthetic(), violation.to_string());
        return Err(errors);
    }

    let sccs = callgraph::strongly_connected_components(core);
    core.set_sccs(sccs);

    let mut failed_arity = std::collections::HashSet::new();
    if let Err(arity_errors) = arity::infer_arities(core) {
        failed_arity = arity::failed_functions(&arity_errors);
        for e in arity_errors {
            errors.compile_error(Span::synthetic(), e.to_string());
        }
    }

    if let Err(type_errors) = types::infer_types(core, interner, &failed_arity) {
        for e in type_errors {
            errors.compile_error(Span::synthetic(), e.to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
