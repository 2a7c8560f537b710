//! Named subband-view descriptors.
//!
//! The original implementation indexes into the flat 4096-coefficient tile
//! buffer with manual pointer arithmetic (base offset + extent) scattered
//! across the quantizer, differential coder, and DWT. Per the design notes
//! (§9 "Manual pointer arithmetic into subband offsets") this crate replaces
//! that with explicit named views so every offset is declared once.

/// One of the ten wavelet subbands produced by the three-level 5/3 DWT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subband {
    Hl1,
    Lh1,
    Hh1,
    Hl2,
    Lh2,
    Hh2,
    Hl3,
    Lh3,
    Hh3,
    Ll3,
}

/// A subband's location within the flat 4096-entry coefficient buffer.
#[derive(Debug, Clone, Copy)]
pub struct SubbandView {
    pub band: Subband,
    pub offset: usize,
    pub len: usize,
}

impl SubbandView {
    pub const fn new(band: Subband, offset: usize, len: usize) -> Self {
        Self { band, offset, len }
    }

    /// Index range of this subband inside the flat tile-coefficient buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// The RFX subband layout of §3.1: power-of-two sizes, offsets packed
/// tightly from the level-1 detail bands down to the level-3 low-pass band.
///
/// Ordering here is the quantization-table order (LL3, LH3, HL3, HH3, LH2,
/// HL2, HH2, LH1, HL1, HH1); the offset table instead follows the storage
/// order of §3.1 (HL1 first). Both tables describe the same ten bands.
pub const RFX_LAYOUT: [SubbandView; 10] = [
    SubbandView::new(Subband::Hl1, 0, 1024),
    SubbandView::new(Subband::Lh1, 1024, 1024),
    SubbandView::new(Subband::Hh1, 2048, 1024),
    SubbandView::new(Subband::Hl2, 3072, 256),
    SubbandView::new(Subband::Lh2, 3328, 256),
    SubbandView::new(Subband::Hh2, 3584, 256),
    SubbandView::new(Subband::Hl3, 3840, 64),
    SubbandView::new(Subband::Lh3, 3904, 64),
    SubbandView::new(Subband::Hh3, 3968, 64),
    SubbandView::new(Subband::Ll3, 4032, 64),
];

/// Quantization-table order for both RFX and progressive-RFX layouts: LL3,
/// LH3/HL3 (RFX) or LL3, HL3/LH3 (RDPEGFX) ... HH1. See `quant::QuantOrder`
/// for the two concrete orderings this indexes into.
pub const QUANT_BAND_ORDER_RFX: [Subband; 10] = [
    Subband::Ll3,
    Subband::Lh3,
    Subband::Hl3,
    Subband::Hh3,
    Subband::Lh2,
    Subband::Hl2,
    Subband::Hh2,
    Subband::Lh1,
    Subband::Hl1,
    Subband::Hh1,
];

/// RDPEGFX (progressive) quantization-table order: differs from
/// `QUANT_BAND_ORDER_RFX` by swapping each level's H/L pair (§9 open
/// question on subband ordering).
pub const QUANT_BAND_ORDER_RDPEGFX: [Subband; 10] = [
    Subband::Ll3,
    Subband::Hl3,
    Subband::Lh3,
    Subband::Hh3,
    Subband::Hl2,
    Subband::Lh2,
    Subband::Hh2,
    Subband::Hl1,
    Subband::Lh1,
    Subband::Hh1,
];

/// The progressive "extrapolated" subband layout (§3.1): when a progressive
/// surface is reduced below its natural resolution, bands are no longer
/// power-of-two sized — each level's detail bands grow by one row or column
/// to cover the extrapolated boundary sample. Selected in place of
/// `RFX_LAYOUT` when `DwtReduce::Extrapolate` is in force for a tile.
pub const PROGRESSIVE_EXTRAPOLATED_LAYOUT: [SubbandView; 10] = [
    SubbandView::new(Subband::Hl1, 0, 31 * 33),
    SubbandView::new(Subband::Lh1, 1023, 33 * 31),
    SubbandView::new(Subband::Hh1, 2046, 31 * 31),
    SubbandView::new(Subband::Hl2, 3007, 16 * 17),
    SubbandView::new(Subband::Lh2, 3279, 17 * 16),
    SubbandView::new(Subband::Hh2, 3551, 16 * 16),
    SubbandView::new(Subband::Hl3, 3807, 8 * 9),
    SubbandView::new(Subband::Lh3, 3879, 9 * 8),
    SubbandView::new(Subband::Hh3, 3951, 8 * 8),
    SubbandView::new(Subband::Ll3, 4015, 9 * 9),
];

/// Selects between the two DWT subband layouts a progressive tile can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DwtReduce {
    /// Standard power-of-two tile layout, same as non-progressive RFX.
    #[default]
    None,
    /// Non-power-of-two layout used when the surface has been reduced below
    /// its natural resolution and the boundary sample is extrapolated.
    Extrapolate,
}

impl DwtReduce {
    /// Returns the subband layout this mode selects.
    pub fn layout(self) -> &'static [SubbandView; 10] {
        match self {
            DwtReduce::None => &RFX_LAYOUT,
            DwtReduce::Extrapolate => &PROGRESSIVE_EXTRAPOLATED_LAYOUT,
        }
    }
}

/// Looks up a band's view within `layout`.
pub fn view_of(layout: &[SubbandView; 10], band: Subband) -> SubbandView {
    layout
        .iter()
        .copied()
        .find(|v| v.band == band)
        .expect("RFX_LAYOUT covers all ten subbands")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_contiguous_and_covers_4096() {
        let mut total = 0;
        for v in RFX_LAYOUT.iter() {
            total += v.len;
        }
        assert_eq!(total, 4096);
        // HH3 must land at offset 3968, not the alternate 3868 (§9 open question).
        assert_eq!(view_of(&RFX_LAYOUT, Subband::Hh3).offset, 3968);
    }

    #[test]
    fn extrapolated_layout_is_contiguous_and_covers_4096() {
        let mut total = 0;
        for v in PROGRESSIVE_EXTRAPOLATED_LAYOUT.iter() {
            total += v.len;
        }
        assert_eq!(total, 4096);
        assert_eq!(view_of(&PROGRESSIVE_EXTRAPOLATED_LAYOUT, Subband::Ll3).offset, 4015);
    }
}
