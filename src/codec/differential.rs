//! Differential coding of the LL3 subband (§3.2: "the lowest-frequency
//! band is further decorrelated by first-differencing before entropy
//! coding").
//!
//! The LL3 band holds the coarsest, most strongly-correlated coefficients
//! in the tile; first-differencing it before RLGR coding is the same
//! "predict from the previous sample" idea the teacher applies per-pixel in
//! `translate.rs`'s palette delta paths, lifted here to a fixed 64-sample
//! band.

/// Encodes `ll3` (64 samples) in place as a first-difference sequence: the
/// first sample is kept as-is, every later sample becomes `ll3[i] -
/// ll3[i-1]`.
pub fn encode_ll3_differential(ll3: &mut [i16; 64]) {
    for i in (1..ll3.len()).rev() {
        ll3[i] = ll3[i].wrapping_sub(ll3[i - 1]);
    }
}

/// Inverse of `encode_ll3_differential`: reconstructs the band via running
/// cumulative sum.
pub fn decode_ll3_differential(ll3: &mut [i16; 64]) {
    for i in 1..ll3.len() {
        ll3[i] = ll3[i].wrapping_add(ll3[i - 1]);
    }
}
