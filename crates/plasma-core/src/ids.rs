//! Opaque identifiers for core entities.
//!
//! Every kind of named entity carries an id allocated by a monotonic
//! counter. Ids are never reused or removed once allocated.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

id_type!(TypeId, "Identifies a user-declared algebraic type.");
id_type!(CtorId, "Identifies a constructor of some algebraic type.");
id_type!(FuncId, "Identifies a function (imported or with a body).");
id_type!(ResourceId, "Identifies a resource named in a function signature.");
id_type!(Var, "Identifies a program variable within one function body.");

id_type!(PzdId, "Identifies a bytecode data entry.");
id_type!(PzpId, "Identifies a bytecode procedure.");
id_type!(PzsId, "Identifies a bytecode struct layout.");
id_type!(PziId, "Identifies a bytecode import.");

/// Monotonic id allocator shared by every id kind produced from one counter
/// space. `Core` owns one for source ids; `Pz` owns a separate family of
/// counters for bytecode ids (see `plasma-bytecode::ids`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdGen {
    next: u32,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next raw index. Callers wrap it in the id newtype they need.
    pub fn next_raw(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}
