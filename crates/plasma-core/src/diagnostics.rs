//! Diagnostic accumulation shared by every compiler pass.
//!
//! A diagnostic is tagged with one of three kinds: `Compile` for a problem
//! in the program being compiled, `Internal` for a bug in this compiler
//! (an invariant the front end or an earlier pass should have guaranteed),
//! and `Limitation` for valid input that runs past something this compiler
//! does not yet support (e.g. more than four non-nullary constructors in
//! one type).

use crate::span::Span;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiagnosticKind {
    Compile,
    Internal,
    Limitation,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
}

/// An accumulating collection of diagnostics from one or more passes.
///
/// Named after the bundle of individually-insignificant error reports a
/// pass gathers as it keeps going past the first problem, rather than
/// bailing out on it.
#[derive(Debug, Clone, Default)]
pub struct ErrorCord {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorCord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DiagnosticKind, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            kind,
            span,
            message: message.into(),
        });
    }

    pub fn compile_error(&mut self, span: Span, message: impl Into<String>) {
        self.push(DiagnosticKind::Compile, span, message);
    }

    pub fn internal_error(&mut self, span: Span, message: impl Into<String>) {
        self.push(DiagnosticKind::Internal, span, message);
    }

    pub fn limitation(&mut self, span: Span, message: impl Into<String>) {
        self.push(DiagnosticKind::Limitation, span, message);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn extend(&mut self, other: ErrorCord) {
        self.diagnostics.extend(other.diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut cord = ErrorCord::new();
        cord.compile_error(Span::synthetic(), "bad program");
        cord.internal_error(Span::synthetic(), "compiler bug");
        cord.compile_error(Span::synthetic(), "another bad program");

        assert_eq!(cord.len(), 3);
        assert_eq!(cord.count_of(DiagnosticKind::Compile), 2);
        assert_eq!(cord.count_of(DiagnosticKind::Internal), 1);
        assert_eq!(cord.count_of(DiagnosticKind::Limitation), 0);
    }

    #[test]
    fn extend_merges_in_order() {
        let mut a = ErrorCord::new();
        a.compile_error(Span::synthetic(), "first");
        let mut b = ErrorCord::new();
        b.compile_error(Span::synthetic(), "second");
        a.extend(b);
        let messages: Vec<&str> = a.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }
}
