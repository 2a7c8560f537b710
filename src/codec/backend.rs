//! Pluggable dispatch point for the numeric core of the codec (DWT,
//! quantization, color conversion), so a platform-specific SIMD
//! implementation can be swapped in without touching `codec::rfx` or
//! `codec::progressive`.
//!
//! Grounded on the teacher's `Encoding` trait in `encoding/mod.rs`, which
//! lets `get_encoder` hand back one of several concrete encodings behind a
//! single trait object; here the seam is the numeric kernels rather than
//! the wire encodings, but the shape — a trait the rest of the codec
//! programs against, with a default scalar implementation registered by
//! name — is the same.

use super::color::PixelFormat;
use super::subband::{Subband, SubbandView};
use super::CodecError;
use super::quant::QuantValues;

/// Numeric kernels used by the RFX/progressive pipeline. The default
/// implementation (`ScalarBackend`) is pure Rust; a build targeting a CPU
/// with wide integer SIMD could provide an alternate implementation behind
/// this same trait without changing any caller.
pub trait CodecBackend: Send + Sync {
    /// Applies the inverse 5/3 lifting DWT to a tile's coefficients.
    fn dwt_2d_decode(&self, coeffs: &mut [i16; 4096]) -> Result<(), CodecError>;

    /// Applies the forward 5/3 lifting DWT to a tile's coefficients.
    fn dwt_2d_encode(&self, coeffs: &mut [i16; 4096]) -> Result<(), CodecError>;

    /// Dequantizes a tile's coefficients in place.
    fn quantization_decode(
        &self,
        coeffs: &mut [i16; 4096],
        layout: &[SubbandView; 10],
        order: &[Subband; 10],
        values: &QuantValues,
    ) -> Result<(), CodecError>;

    /// Quantizes a tile's coefficients in place.
    fn quantization_encode(
        &self,
        coeffs: &mut [i16; 4096],
        layout: &[SubbandView; 10],
        order: &[Subband; 10],
        values: &QuantValues,
    ) -> Result<(), CodecError>;

    /// Converts a decoded tile's Y/Cb/Cr planes to packed RGB pixels.
    fn decode_ycbcr_to_rgb(
        &self,
        y: &[i16; 4096],
        cb: &[i16; 4096],
        cr: &[i16; 4096],
        format: PixelFormat,
        out: &mut [u8],
    ) -> Result<(), CodecError>;

    /// Converts packed RGB pixels to the Y/Cb/Cr planes the forward
    /// transform operates on.
    fn encode_rgb_to_ycbcr(
        &self,
        pixels: &[u8],
        format: PixelFormat,
        y: &mut [i16; 4096],
        cb: &mut [i16; 4096],
        cr: &mut [i16; 4096],
    ) -> Result<(), CodecError>;
}

/// Coarse description of what numeric shortcuts the running CPU supports;
/// reserved for a future SIMD backend to select on. The scalar backend
/// ignores this entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCaps {
    pub has_sse2: bool,
    pub has_avx2: bool,
    pub has_neon: bool,
}

impl CpuCaps {
    /// Detects the running CPU's capabilities relevant to a SIMD backend.
    /// Currently always reports no capabilities; `ScalarBackend` does not
    /// consult this, it exists so a future backend has a stable type to
    /// report against.
    pub fn detect() -> Self {
        Self::default()
    }
}

/// Pure-Rust scalar implementation of [`CodecBackend`], delegating directly
/// to the free functions in `dwt`, `quant`, and `color`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarBackend;

impl CodecBackend for ScalarBackend {
    fn dwt_2d_decode(&self, coeffs: &mut [i16; 4096]) -> Result<(), CodecError> {
        super::dwt::inverse_dwt_2d(coeffs)
    }

    fn dwt_2d_encode(&self, coeffs: &mut [i16; 4096]) -> Result<(), CodecError> {
        super::dwt::forward_dwt_2d(coeffs)
    }

    fn quantization_decode(
        &self,
        coeffs: &mut [i16; 4096],
        layout: &[SubbandView; 10],
        order: &[Subband; 10],
        values: &QuantValues,
    ) -> Result<(), CodecError> {
        super::quant::dequantize(coeffs, layout, order, values)
    }

    fn quantization_encode(
        &self,
        coeffs: &mut [i16; 4096],
        layout: &[SubbandView; 10],
        order: &[Subband; 10],
        values: &QuantValues,
    ) -> Result<(), CodecError> {
        super::quant::quantize(coeffs, layout, order, values)
    }

    fn decode_ycbcr_to_rgb(
        &self,
        y: &[i16; 4096],
        cb: &[i16; 4096],
        cr: &[i16; 4096],
        format: PixelFormat,
        out: &mut [u8],
    ) -> Result<(), CodecError> {
        super::color::ycbcr_to_pixels(y, cb, cr, format, out)
    }

    fn encode_rgb_to_ycbcr(
        &self,
        pixels: &[u8],
        format: PixelFormat,
        y: &mut [i16; 4096],
        cb: &mut [i16; 4096],
        cr: &mut [i16; 4096],
    ) -> Result<(), CodecError> {
        super::color::pixels_to_ycbcr(pixels, format, y, cb, cr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_backend_round_trips_dwt() {
        let backend = ScalarBackend;
        let mut coeffs = [0i16; 4096];
        coeffs[5] = 123;
        let original = coeffs;
        backend.dwt_2d_encode(&mut coeffs).unwrap();
        backend.dwt_2d_decode(&mut coeffs).unwrap();
        assert_eq!(coeffs, original);
    }
}
