// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives the per-step traversal order and arena scatter, and must be
// reproducible from a seed so runs can be replayed in tests.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    /// Seed from the wall clock. Used when no seed is configured.
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(nanos ^ 0xD1B54A32D192ED03)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // Convert to [0,1).
        let x = self.next_u32();
        (x as f32) / (u32::MAX as f32 + 1.0)
    }

    #[inline]
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32_01()
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u64;
        let v = self.next_u64() % span;
        low + v as usize
    }

    /// Fill `order` with `0..n` sorted by `index ^ mask` for one freshly drawn mask.
    ///
    /// XOR with a fixed mask is a bijection on `u32`, so the result is always a
    /// permutation. It is a cheap shuffle, not a uniform one.
    pub fn masked_order(&mut self, n: usize, order: &mut Vec<usize>) {
        let mask = self.next_u32();
        order.clear();
        order.extend(0..n);
        order.sort_unstable_by_key(|&idx| ((idx as u32) ^ mask, idx));
    }

    /// Fill `order` with a uniform Fisher-Yates permutation of `0..n`.
    pub fn shuffled_order(&mut self, n: usize, order: &mut Vec<usize>) {
        order.clear();
        order.extend(0..n);
        for i in (1..n).rev() {
            let j = self.gen_range_usize(0, i + 1);
            order.swap(i, j);
        }
    }
}
