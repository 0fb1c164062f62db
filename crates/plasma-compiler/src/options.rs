//! Tunables threaded into the passes this crate owns.

/// Knobs for tag assignment and code generation.
///
/// `num_ptag_bits` is fixed at `plasma_bytecode::NUM_PTAG_BITS` by
/// `Default`; it exists as a named field (rather than every call site
/// reading the constant directly) so the §9 open question about a
/// 64-bit, three-ptag-bit target has a single place to wire a future
/// override — not because this crate currently supports changing it. Any
/// non-default value here is untested against the VM runtime's ABI and
/// should not be used outside experimentation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CodegenOptions {
    pub num_ptag_bits: u32,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            num_ptag_bits: plasma_bytecode::NUM_PTAG_BITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_bytecode_abi_constant() {
        assert_eq!(CodegenOptions::default().num_ptag_bits, plasma_bytecode::NUM_PTAG_BITS);
    }
}
