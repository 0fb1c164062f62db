//! Machine-word widths used throughout the bytecode program.

use serde::{Deserialize, Serialize};

/// The closed set of widths a data array, struct field or stack value may
/// have.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
    /// The fastest integer width the target can operate on; used for
    /// unboxed arithmetic temporaries rather than a fixed bit count.
    WFast,
    /// A tagged machine pointer.
    WPtr,
}

impl Width {
    /// Byte size of this width, or `None` for the two target-dependent
    /// widths (`WFast`, `WPtr`), whose size is a runtime/VM parameter this
    /// crate does not need to know.
    pub fn bytes(self) -> Option<u32> {
        match self {
            Width::W8 => Some(1),
            Width::W16 => Some(2),
            Width::W32 => Some(4),
            Width::W64 => Some(8),
            Width::WFast | Width::WPtr => None,
        }
    }
}
