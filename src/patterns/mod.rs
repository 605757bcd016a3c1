pub mod dod;
pub mod gutmann;

#[cfg(test)]
mod dod_test;

// Re-export the pass sequence builders
pub use dod::DoDSequence;
pub use gutmann::GutmannSequence;

use crate::{TestPattern, WipeMethod};
use rand::Rng;

/// Fill a chunk buffer according to a test pattern.
///
/// `Random` draws fresh bytes on every call; a random chunk is never reused
/// across offsets, so a stuck device that echoes back a neighbouring chunk
/// still fails verification.
pub fn fill_chunk<R: Rng>(pattern: TestPattern, buf: &mut [u8], rng: &mut R) {
    match pattern {
        TestPattern::Ones => buf.fill(0xFF),
        TestPattern::Zeros => buf.fill(0x00),
        TestPattern::Random => rng.fill(buf),
    }
}

/// Build the ordered pass-byte list for a wipe method.
///
/// Random passes draw a single byte each: a wipe pass writes one value
/// across the whole range, which is what makes the final verification sweep
/// exact for every method.
pub fn wipe_sequence<R: Rng>(method: WipeMethod, passes: u32, rng: &mut R) -> Vec<u8> {
    match method {
        WipeMethod::Simple => vec![0x00],
        WipeMethod::DoD => DoDSequence::generate(rng),
        WipeMethod::Gutmann => GutmannSequence::generate(rng),
        WipeMethod::Custom => (0..passes).map(|_| rng.gen()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use test_case::test_case;

    #[test_case(TestPattern::Ones, 0xFF; "ones fill 0xFF")]
    #[test_case(TestPattern::Zeros, 0x00; "zeros fill 0x00")]
    fn fixed_patterns_fill_uniformly(pattern: TestPattern, expected: u8) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut buf = vec![0xA5u8; 4096];
        fill_chunk(pattern, &mut buf, &mut rng);
        assert!(buf.iter().all(|&b| b == expected));
    }

    #[test]
    fn random_fill_differs_between_chunks() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut first = vec![0u8; 4096];
        let mut second = vec![0u8; 4096];
        fill_chunk(TestPattern::Random, &mut first, &mut rng);
        fill_chunk(TestPattern::Random, &mut second, &mut rng);
        assert_ne!(first, second, "random chunks must not repeat");
    }

    #[test]
    fn simple_method_is_single_zero_pass() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(wipe_sequence(WipeMethod::Simple, 1, &mut rng), vec![0x00]);
    }

    #[test]
    fn custom_method_draws_independent_bytes() {
        let mut rng = StdRng::seed_from_u64(99);
        let seq = wipe_sequence(WipeMethod::Custom, 64, &mut rng);
        assert_eq!(seq.len(), 64);
        // 64 independent draws collapsing to one value would mean a broken rng
        let first = seq[0];
        assert!(seq.iter().any(|&b| b != first));
    }
}
