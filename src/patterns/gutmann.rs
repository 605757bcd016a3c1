use rand::Rng;

/// The 35-pass Gutmann overwrite sequence.
///
/// Passes 1-4 and 32-35 are random; passes 5-31 cycle the fixed 15-value
/// table below to fill exactly 27 slots. Each random pass draws one byte,
/// so the sequence is an ordered list of plain pass values.
pub struct GutmannSequence;

impl GutmannSequence {
    /// Gutmann requires exactly 35 passes
    pub const PASS_COUNT: usize = 35;

    /// Random passes at the head and tail of the sequence
    pub const RANDOM_HEAD: usize = 4;
    pub const RANDOM_TAIL: usize = 4;

    /// Deterministic middle section: passes 5-31
    pub const FIXED_SLOTS: usize = 27;

    /// The fixed pattern table cycled across the middle passes
    pub const FIXED_TABLE: [u8; 15] = [
        0x55, 0xAA, 0x92, 0x49, 0x24, 0x12, 0x09, 0x04, 0x02, 0x01, 0x80, 0x40, 0x20, 0x10, 0x08,
    ];

    pub fn generate<R: Rng>(rng: &mut R) -> Vec<u8> {
        let mut passes = Vec::with_capacity(Self::PASS_COUNT);

        for _ in 0..Self::RANDOM_HEAD {
            passes.push(rng.gen());
        }

        for slot in 0..Self::FIXED_SLOTS {
            passes.push(Self::FIXED_TABLE[slot % Self::FIXED_TABLE.len()]);
        }

        for _ in 0..Self::RANDOM_TAIL {
            passes.push(rng.gen());
        }

        debug_assert_eq!(passes.len(), Self::PASS_COUNT);
        passes
    }
}
