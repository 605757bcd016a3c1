use rand::Rng;

/// DoD 5220.22-M three-pass overwrite sequence.
pub struct DoDSequence;

impl DoDSequence {
    /// Pass 1 pattern (all zeros)
    pub const PASS_1_PATTERN: u8 = 0x00;

    /// Pass 2 pattern (all ones)
    pub const PASS_2_PATTERN: u8 = 0xFF;

    /// The standard requires exactly 3 passes
    pub const PASS_COUNT: usize = 3;

    /// `[0x00, 0xFF, random]`; the third pass draws a fresh byte per call.
    pub fn generate<R: Rng>(rng: &mut R) -> Vec<u8> {
        vec![Self::PASS_1_PATTERN, Self::PASS_2_PATTERN, rng.gen()]
    }
}
