//! Struct layouts: the shape of a heap-allocated object.

use serde::{Deserialize, Serialize};

use crate::width::Width;

/// A struct layout: an ordered sequence of field widths. Allocating a
/// struct reserves one machine word per entry, in order.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PzStruct {
    pub fields: Vec<Width>,
}

impl PzStruct {
    pub fn new(fields: Vec<Width>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_count_matches_layout() {
        let s = PzStruct::new(vec![Width::WPtr, Width::WFast]);
        assert_eq!(s.len(), 2);
        assert!(!s.is_empty());
    }
}
