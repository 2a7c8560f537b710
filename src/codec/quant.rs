//! Per-subband scalar shift quantization (§3.2).
//!
//! Each of the ten subbands carries a 4-bit quantization index in
//! `6..=15`; coefficients in that subband are right-shifted (with
//! round-to-nearest) by `index - 6` places on encode, and left-shifted back
//! on decode. This is the same "shift a bounded plane of int16 samples by a
//! per-band exponent" shape as the teacher's ZYWRLE per-level quantization
//! in `encoding/zywrle.rs`, generalized from Haar's fixed per-level factor
//! to an explicit, wire-carried factor per subband.

use super::subband::{Subband, SubbandView};
use super::CodecError;

/// Ten quantization indices, one per subband, in the order given by a
/// `QUANT_BAND_ORDER_*` table. Each value must be in `6..=15`.
pub type QuantValues = [u8; 10];

/// Validates that every quantization index is in the legal `6..=15` range.
pub fn validate_quant_values(values: &QuantValues) -> Result<(), CodecError> {
    for &v in values {
        if !(6..=15).contains(&v) {
            return Err(CodecError::InvalidQuant(v));
        }
    }
    Ok(())
}

/// Right-shift amount for a quantization index, per §3.2: `index - 6`.
#[inline]
fn shift_for(index: u8) -> u32 {
    (index - 6) as u32
}

/// Quantizes `coeffs` in place: for each subband in `order`, looks up its
/// quantization index and right-shifts (rounding to nearest) every sample in
/// that subband's range within `layout`.
pub fn quantize(
    coeffs: &mut [i16; 4096],
    layout: &[SubbandView; 10],
    order: &[Subband; 10],
    values: &QuantValues,
) -> Result<(), CodecError> {
    validate_quant_values(values)?;
    for (i, band) in order.iter().enumerate() {
        let shift = shift_for(values[i]);
        if shift == 0 {
            continue;
        }
        let view = super::subband::view_of(layout, *band);
        let round = 1i32 << (shift - 1);
        for sample in &mut coeffs[view.range()] {
            let rounded = *sample as i32 + round;
            *sample = (rounded >> shift) as i16;
        }
    }
    Ok(())
}

/// Inverse of `quantize`: left-shifts every subband's samples back up by
/// its quantization index's shift amount.
pub fn dequantize(
    coeffs: &mut [i16; 4096],
    layout: &[SubbandView; 10],
    order: &[Subband; 10],
    values: &QuantValues,
) -> Result<(), CodecError> {
    validate_quant_values(values)?;
    for (i, band) in order.iter().enumerate() {
        let shift = shift_for(values[i]);
        if shift == 0 {
            continue;
        }
        let view = super::subband::view_of(layout, *band);
        for sample in &mut coeffs[view.range()] {
            *sample = sample.wrapping_shl(shift);
        }
    }
    Ok(())
}

/// Expands a dequantized coefficient buffer to the 11.5 fixed-point
/// representation the color converter and DWT operate in. Called once,
/// immediately after `dequantize`, per §4.3.
pub fn expand_to_fixed_point(coeffs: &mut [i16; 4096]) {
    for sample in coeffs.iter_mut() {
        *sample = sample.wrapping_shl(5);
    }
}

/// Inverse of `expand_to_fixed_point`: drops the fixed-point fraction bits
/// before quantizing. Called once, immediately before `quantize`.
pub fn reduce_from_fixed_point(coeffs: &mut [i16; 4096]) {
    for sample in coeffs.iter_mut() {
        *sample >>= 5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::subband::{QUANT_BAND_ORDER_RFX, RFX_LAYOUT};

    #[test]
    fn rejects_out_of_range_index() {
        let mut values: QuantValues = [6; 10];
        values[3] = 20;
        assert!(validate_quant_values(&values).is_err());
    }

    #[test]
    fn zero_shift_is_lossless() {
        let mut coeffs = [0i16; 4096];
        coeffs[10] = 1234;
        let values: QuantValues = [6; 10];
        let original = coeffs;
        quantize(&mut coeffs, &RFX_LAYOUT, &QUANT_BAND_ORDER_RFX, &values).unwrap();
        assert_eq!(coeffs, original);
    }

    #[test]
    fn shift_round_trip_loses_only_lsbs() {
        let mut coeffs = [0i16; 4096];
        for (i, c) in coeffs.iter_mut().enumerate() {
            *c = (i % 200) as i16 - 100;
        }
        let values: QuantValues = [9; 10];
        quantize(&mut coeffs, &RFX_LAYOUT, &QUANT_BAND_ORDER_RFX, &values).unwrap();
        dequantize(&mut coeffs, &RFX_LAYOUT, &QUANT_BAND_ORDER_RFX, &values).unwrap();
        // Shift of 3 bits: every reconstructed value must be within the
        // quantization step of the original.
        for (i, c) in coeffs.iter().enumerate() {
            let orig = (i % 200) as i32 - 100;
            assert!((orig - *c as i32).abs() <= 8);
        }
    }
}
