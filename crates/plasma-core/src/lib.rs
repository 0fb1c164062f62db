//! Core intermediate representation, inference and diagnostics for the
//! Plasma compiler.
//!
//! This crate owns the typed core IR (`Core`), the passes that annotate it
//! (arity inference, type inference) and the shared unification engine
//! they both run on. It has no notion of source text, parsing or
//! pretty-printing; it consumes and produces the IR directly.

pub mod callgraph;
pub mod core;
pub mod decl;
pub mod diagnostics;
pub mod expr;
pub mod func;
pub mod ids;
pub mod infer;
pub mod interner;
pub mod pipeline;
pub mod qname;
pub mod solve;
pub mod span;
pub mod ty;
pub mod vars;

pub use core::Core;
pub use diagnostics::{Diagnostic, DiagnosticKind, ErrorCord};
pub use interner::{Interner, Symbol};
pub use pipeline::run_core_passes;
pub use span::Span;
