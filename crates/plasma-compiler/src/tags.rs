//! Tag assignment: choosing how each constructor of each user-declared
//! algebraic type is encoded in a machine word (§4.3).
//!
//! The target ABI reserves the low `num_ptag_bits` bits of every heap
//! pointer as a primary tag; allocations are word-aligned, so zeroing
//! those bits yields a valid pointer. A type with no fielded constructors
//! needs no pointer tag at all and is represented as a raw integer (a
//! "strict enum"); otherwise nullary constructors share primary tag 0 and
//! fielded ones each claim the next tag in declaration order.

use indexmap::IndexMap;

use plasma_core::core::Core;
use plasma_core::ids::{CtorId, TypeId};

use crate::options::CodegenOptions;

/// How one `(type_id, ctor_id)` pair is encoded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CtorTagInfo {
    /// A strict-enum constructor: a raw, untagged integer. No pointer tag
    /// is reserved for this type.
    ConstantNoTag(u32),
    /// A nullary constructor sharing primary tag 0 with its siblings,
    /// distinguished by `word_bits` (0-based index among nullary
    /// constructors of the same type). A single nullary constructor at
    /// `word_bits = 0` is bit-identical to a null pointer.
    Constant { ptag: u8, word_bits: u32 },
    /// A heap-allocated constructor; its struct pointer carries primary
    /// tag `ptag` in its low bits.
    TaggedPointer { ptag: u8 },
}

/// Why tag assignment failed for some type.
#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
pub enum TagError {
    /// §4.3, §7.3: more non-nullary constructors than primary tags allow.
    /// The design-visible extension point (grouping the excess under the
    /// final primary tag and distinguishing them with a stored secondary
    /// tag) is deliberately not implemented.
    #[error("type {type_id} has more than {max_with_args} non-nullary constructors; secondary tags not supported")]
    Limitation { type_id: TypeId, max_with_args: u32 },
}

/// Every `(type_id, ctor_id)` pair's tag, queried by the code generator
/// for both construction and pattern-match lowering.
#[derive(Clone, Debug, Default)]
pub struct TagTable {
    tags: IndexMap<(TypeId, CtorId), CtorTagInfo>,
}

impl TagTable {
    pub fn get(&self, type_id: TypeId, ctor_id: CtorId) -> Option<CtorTagInfo> {
        self.tags.get(&(type_id, ctor_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Assign a `CtorTagInfo` to every constructor of every type in `core`.
/// Total over `(type_id, ctor_id)`: every pair gets exactly one entry, or
/// the whole pass fails with the type that can't be encoded.
pub fn assign_tags(core: &Core, options: &CodegenOptions) -> Result<TagTable, TagError> {
    let mut table = TagTable::default();
    let max_ptags = 1u32 << options.num_ptag_bits;

    for (type_id, type_def) in core.types() {
        let mut no_args = Vec::new();
        let mut with_args = Vec::new();
        for &ctor_id in &type_def.ctors {
            let ctor = core
                .ctor(ctor_id)
                .expect("Core::check_invariants guarantees every type's ctors exist");
            if ctor.is_nullary() {
                no_args.push(ctor_id);
            } else {
                with_args.push(ctor_id);
            }
        }

        if with_args.is_empty() {
            for (i, &ctor_id) in no_args.iter().enumerate() {
                table.tags.insert((type_id, ctor_id), CtorTagInfo::ConstantNoTag(i as u32));
            }
            continue;
        }

        let mut next_ptag: u32 = 0;
        if !no_args.is_empty() {
            for (i, &ctor_id) in no_args.iter().enumerate() {
                table.tags.insert(
                    (type_id, ctor_id),
                    CtorTagInfo::Constant { ptag: 0, word_bits: i as u32 },
                );
            }
            next_ptag = 1;
        }

        for &ctor_id in &with_args {
            if next_ptag >= max_ptags {
                return Err(TagError::Limitation {
                    type_id,
                    max_with_args: max_ptags - if no_args.is_empty() { 0 } else { 1 },
                });
            }
            table
                .tags
                .insert((type_id, ctor_id), CtorTagInfo::TaggedPointer { ptag: next_ptag as u8 });
            next_ptag += 1;
        }
    }

    Ok(table)
}
