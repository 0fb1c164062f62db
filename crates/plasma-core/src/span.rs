//! Source context carried through the IR but not interpreted here.
//!
//! Rendering a `Span` into a `filename:line:` prefix is the external
//! front end's job; this crate only carries the opaque context so error
//! messages can be correlated with it downstream.

use serde::{Deserialize, Serialize};

/// An opaque source position, as handed to us by the front end.
///
/// `0` is used as the "unknown/synthetic" sentinel for code introduced
/// by a pass itself (e.g. the builtins table, or a join block the code
/// generator invents).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The sentinel span for synthetic, pass-introduced code.
    pub fn synthetic() -> Self {
        Self::default()
    }
}
