//! Declarations: user-defined algebraic types, constructors and resources.

use serde::{Deserialize, Serialize};

use crate::ids::CtorId;
use crate::interner::Symbol;
use crate::ty::{TVar, Type};

/// A constructor of some algebraic type.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Constructor {
    pub name: Symbol,
    pub type_params: Vec<TVar>,
    /// Ordered `(field_name, field_type)` pairs.
    pub fields: Vec<(Symbol, Type)>,
}

impl Constructor {
    pub fn is_nullary(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A user-declared algebraic type: its name, declared arity and the
/// constructors that belong to it, in declaration order.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: Symbol,
    pub type_params: Vec<TVar>,
    /// Constructor ids belonging to this type, in declaration order.
    /// Declaration order is significant: it drives tag assignment.
    pub ctors: Vec<CtorId>,
}

impl TypeDef {
    pub fn arity(&self) -> usize {
        self.type_params.len()
    }
}

/// A resource name usable in a function signature's `uses`/`observes` lists.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Resource {
    pub name: Symbol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullary_constructor_has_no_fields() {
        let c = Constructor {
            name: Symbol::from_raw(0),
            type_params: vec![],
            fields: vec![],
        };
        assert!(c.is_nullary());
    }

    #[test]
    fn constructor_with_fields_is_not_nullary() {
        let c = Constructor {
            name: Symbol::from_raw(0),
            type_params: vec![],
            fields: vec![(Symbol::from_raw(1), Type::int())],
        };
        assert!(!c.is_nullary());
    }
}
