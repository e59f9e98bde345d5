use crate::config::Number;
use wide::f32x8;

const LANES: usize = 8;

/// Squared Euclidean distance between two vectors of equal length, eight lanes
/// at a time with a scalar tail.
///
/// The summation order depends only on the length, so the same pair of inputs
/// always produces the same bits.
pub fn squared_euclidean_simd(a: &[Number], b: &[Number]) -> Number {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = f32x8::splat(0.0);
    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail_a = chunks_a.remainder();
    let tail_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        let va = f32x8::from(lanes(ca));
        let vb = f32x8::from(lanes(cb));
        let diff = va - vb;
        acc += diff * diff;
    }

    let mut sum = acc.reduce_add();
    for (x, y) in tail_a.iter().zip(tail_b) {
        let diff = x - y;
        sum += diff * diff;
    }
    sum
}

fn lanes(chunk: &[Number]) -> [Number; LANES] {
    let mut out = [0.0; LANES];
    out.copy_from_slice(chunk);
    out
}
