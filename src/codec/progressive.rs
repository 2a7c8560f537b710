//! Progressive bitmap codec: a RemoteFX-derived tile pipeline where each
//! tile is refined over several passes instead of sent once at full
//! fidelity (§3.4, §4.8).
//!
//! The first pass for a tile looks like an ordinary RFX tile decode (DWT,
//! dequantize, inverse transform) except that the quantization shift is
//! shallower, leaving headroom the later upgrade passes fill in bit by bit.
//! Each upgrade pass carries, per non-LL coefficient, either a further RAW
//! magnitude bit (first time a coefficient's sign is established) or a
//! sign-run-length (SRL) coded bit (once the sign is already known). This
//! mirrors the teacher's incremental `Framebuffer` damage-region tracking
//! in spirit — successive updates narrow down a value rather than replacing
//! it outright — generalized here to a bit-plane refinement of wavelet
//! coefficients instead of a pixel rectangle.

use super::bitstream::{BitReader, BitWriter};
use super::quant::QuantValues;
use super::subband::{DwtReduce, Subband, QUANT_BAND_ORDER_RDPEGFX};
use super::CodecError;

/// `PROGRESSIVE_WBT_*` block type tags. Placeholder values: numerically
/// identical to `rfx::BlockType`'s range since both enums only ever compare
/// against their own module's bytes, but the two block streams are not
/// interchangeable and a real wire implementation needs the actual
/// `PROGRESSIVE_WBT_*` constants here instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockType {
    Sync = 0xCCC0,
    FrameBegin = 0xCCC1,
    FrameEnd = 0xCCC2,
    Context = 0xCCC3,
    Region = 0xCCC4,
    TileSimple = 0xCCC5,
    TileFirst = 0xCCC6,
    TileUpgrade = 0xCCC7,
}

impl BlockType {
    fn from_u16(v: u16) -> Result<Self, CodecError> {
        Ok(match v {
            0xCCC0 => BlockType::Sync,
            0xCCC1 => BlockType::FrameBegin,
            0xCCC2 => BlockType::FrameEnd,
            0xCCC3 => BlockType::Context,
            0xCCC4 => BlockType::Region,
            0xCCC5 => BlockType::TileSimple,
            0xCCC6 => BlockType::TileFirst,
            0xCCC7 => BlockType::TileUpgrade,
            other => return Err(CodecError::BadBlockType(other)),
        })
    }
}

/// Set on a tile's flags when its first pass is differential against the
/// previous frame's reconstructed coefficients rather than an independent
/// value (§4.8 "RFX_TILE_DIFFERENCE").
pub const RFX_TILE_DIFFERENCE: u8 = 0x01;

/// Per-tile state carried across passes: the reconstructed coefficients so
/// far (`current`), which of those coefficients already have an established
/// sign (`sign`), and how many more refinement bits each plane's non-LL
/// subbands still owe before they match the non-progressive quantizer's
/// precision.
pub struct TileState {
    pub current: [Box<[i16; 4096]>; 3],
    pub sign: [Box<[i16; 4096]>; 3],
    pub bit_pos: [u32; 3],
    pub quant: [QuantValues; 3],
    pub prog_quant: [u8; 3],
    pub pass: u32,
    pub quality: u8,
}

impl TileState {
    /// Creates a fresh, all-zero tile state ready for a first pass.
    pub fn new(quant: [QuantValues; 3], prog_quant: [u8; 3]) -> Self {
        Self {
            current: [
                Box::new([0i16; 4096]),
                Box::new([0i16; 4096]),
                Box::new([0i16; 4096]),
            ],
            sign: [
                Box::new([0i16; 4096]),
                Box::new([0i16; 4096]),
                Box::new([0i16; 4096]),
            ],
            bit_pos: [0; 3],
            quant,
            prog_quant,
            pass: 0,
            quality: 0,
        }
    }

    /// `true` once the tile has been refined to the non-progressive
    /// quantizer's full precision (§4.8: `quality == 0xFF`).
    pub fn fully_refined(&self) -> bool {
        self.quality == 0xFF
    }
}

/// A progressive surface's grid of tile states plus the bookkeeping needed
/// to know which tiles a region update touched (§3.4).
pub struct Surface {
    pub surface_id: u32,
    pub width: u32,
    pub height: u32,
    pub grid_width: u32,
    pub grid_height: u32,
    tiles: Vec<Option<TileState>>,
    pub updated_tiles: Vec<u32>,
    pub last_frame_id: Option<u32>,
}

impl Surface {
    /// Creates a surface sized to cover `width x height` pixels in 64x64
    /// tiles, `grid_width * grid_height` tiles large.
    pub fn new(surface_id: u32, width: u32, height: u32) -> Self {
        let grid_width = width.div_ceil(64);
        let grid_height = height.div_ceil(64);
        let count = (grid_width * grid_height) as usize;
        let mut tiles = Vec::with_capacity(count);
        tiles.resize_with(count, || None);
        Self {
            surface_id,
            width,
            height,
            grid_width,
            grid_height,
            tiles,
            updated_tiles: Vec::new(),
            last_frame_id: None,
        }
    }

    /// Maps grid coordinates to a flat tile index, per §3.4's invariant
    /// `zIdx == yIdx * gridWidth + xIdx`.
    pub fn tile_index(&self, x_idx: u32, y_idx: u32) -> Result<u32, CodecError> {
        if x_idx >= self.grid_width || y_idx >= self.grid_height {
            return Err(CodecError::OutOfRangeTile {
                x: x_idx,
                y: y_idx,
                width: self.width,
                height: self.height,
            });
        }
        Ok(y_idx * self.grid_width + x_idx)
    }

    /// Borrows a tile's state, if a first pass has been applied to it yet.
    pub fn tile(&self, z_idx: u32) -> Option<&TileState> {
        self.tiles.get(z_idx as usize)?.as_ref()
    }

    /// Installs or replaces a tile's state (first pass), recording the
    /// update and growing the grid if a frame resize doubled its extent.
    pub fn set_tile(&mut self, z_idx: u32, state: TileState) -> Result<(), CodecError> {
        if z_idx as usize >= self.tiles.len() {
            self.tiles.resize_with((z_idx as usize + 1).max(self.tiles.len() * 2), || None);
        }
        self.tiles[z_idx as usize] = Some(state);
        self.updated_tiles.push(z_idx);
        Ok(())
    }

    /// Mutably borrows a tile's state for an upgrade pass; the tile must
    /// already have had a first pass applied (§4.8: upgrades a "no tile
    /// state yet" z-index is a protocol error).
    pub fn tile_mut(&mut self, z_idx: u32) -> Result<&mut TileState, CodecError> {
        self.tiles
            .get_mut(z_idx as usize)
            .and_then(|t| t.as_mut())
            .ok_or(CodecError::NoTileState(z_idx))
    }

    /// Called at the start of a new frame: resets the per-frame updated
    /// tile list (§5 "progressive numUpdatedTiles resets on frameId change").
    pub fn begin_frame(&mut self, frame_id: u32) {
        if self.last_frame_id != Some(frame_id) {
            self.updated_tiles.clear();
            self.last_frame_id = Some(frame_id);
        }
    }
}

/// Adaptive state for the sign-run-length (SRL) bitstream used by upgrade
/// passes (§4.8). `kp` adapts a zero-run-length parameter the same way the
/// RLGR coder's `kp` does, but over a two-mode (zero-run / unary-magnitude)
/// state machine specific to sign refinement rather than RLGR's run/GR
/// split.
struct SrlState {
    kp: i32,
    nz: u32,
    unary_mode: bool,
}

impl SrlState {
    fn new() -> Self {
        Self {
            kp: 8,
            nz: 0,
            unary_mode: false,
        }
    }
}

/// Reads one SRL-coded signed refinement value (a coefficient whose sign is
/// not yet established). Returns `0` while consuming a zero-run, or a
/// nonzero `±1..`-scaled value once the run breaks.
fn srl_read(r: &mut BitReader<'_>, state: &mut SrlState, num_bits: u32) -> i32 {
    if state.nz > 0 {
        state.nz -= 1;
        return 0;
    }
    if !state.unary_mode {
        let bit = r.get_bits(1);
        if bit == 0 {
            state.nz = 1u32 << (state.kp as u32 / 8);
            state.kp = (state.kp + 4).min(80);
            state.nz -= 1;
            return 0;
        }
        state.unary_mode = true;
        let k = state.kp as u32 / 8;
        if k > 0 {
            state.nz = r.get_bits(k);
        }
    }
    let sign = r.get_bits(1);
    state.kp = (state.kp - 6).max(0);
    let magnitude: u32 = if num_bits <= 1 {
        1
    } else {
        let cap = (1u32 << num_bits) - 1;
        let mut mag = 1u32;
        while mag < cap && r.get_bits(1) == 1 {
            mag += 1;
        }
        mag
    };
    if sign == 1 {
        -(magnitude as i32)
    } else {
        magnitude as i32
    }
}

/// Applies one tile's upgrade pass in place: for each plane, walks every
/// non-LL coefficient in `DwtReduce::None`'s layout order and either reads a
/// raw refinement bit (if the coefficient's sign is still unknown) or an
/// SRL-coded value (if it is already known), accumulating into `current`.
/// `srl`/`raw` are the per-plane bitstreams for this pass, already sliced to
/// their declared lengths.
///
/// `new_bit_pos` is `quant + progQuant` per §4.8's bookkeeping formula
/// (`progressive_rfx_upgrade_component`'s `quant_add(quant, quantProg,
/// &bitPos)`): the deepest quant value across this tile's bands plus the
/// plane's progressive quant increment. Once the upgrade stream is fully
/// consumed, both the SRL and RAW readers must have drained to exactly
/// their declared byte length; anything else means the declared lengths in
/// the tile header didn't match what the bitstream actually carried.
pub fn apply_upgrade_pass(
    tile: &mut TileState,
    plane: usize,
    srl_bytes: &[u8],
    raw_bytes: &[u8],
) -> Result<(), CodecError> {
    let layout = DwtReduce::None.layout();
    let deepest_quant = tile.quant[plane]
        .iter()
        .zip(QUANT_BAND_ORDER_RDPEGFX.iter())
        .map(|(q, _)| *q as u32)
        .max()
        .unwrap_or(tile.bit_pos[plane]);
    let new_bit_pos = deepest_quant + tile.prog_quant[plane] as u32;
    let num_bits = tile.bit_pos[plane].saturating_sub(new_bit_pos).max(1);

    let mut srl_reader = BitReader::attach(srl_bytes);
    let mut raw_reader = BitReader::attach(raw_bytes);
    let mut srl_state = SrlState::new();

    for band in QUANT_BAND_ORDER_RDPEGFX.iter() {
        let view = super::subband::view_of(layout, *band);
        let is_ll = *band == Subband::Ll3;
        for i in view.range() {
            if is_ll {
                let raw = raw_reader.get_bits(num_bits) as i32;
                tile.current[plane][i] += raw << new_bit_pos;
                continue;
            }
            if tile.sign[plane][i] != 0 {
                let raw = raw_reader.get_bits(num_bits) as i32;
                let signed = if tile.sign[plane][i] < 0 { -raw } else { raw };
                tile.current[plane][i] += signed << new_bit_pos;
            } else {
                let value = srl_read(&mut srl_reader, &mut srl_state, num_bits);
                if value != 0 {
                    tile.sign[plane][i] = if value < 0 { -1 } else { 1 };
                }
                tile.current[plane][i] += value << new_bit_pos;
            }
        }
    }

    let raw_consumed = raw_reader.processed_bytes();
    if raw_consumed != raw_bytes.len() {
        return Err(CodecError::UpgradeStreamDrainMismatch {
            stream: "raw",
            declared: raw_bytes.len(),
            consumed: raw_consumed,
        });
    }
    let srl_consumed = srl_reader.processed_bytes();
    if srl_consumed != srl_bytes.len() {
        return Err(CodecError::UpgradeStreamDrainMismatch {
            stream: "srl",
            declared: srl_bytes.len(),
            consumed: srl_consumed,
        });
    }

    tile.bit_pos[plane] = new_bit_pos;
    Ok(())
}

/// Writer side of `apply_upgrade_pass`'s SRL stream: mirrors `srl_read`'s
/// state machine so an encoder can produce a stream `srl_read` will
/// reconstruct into the same sequence of values.
fn srl_write(w: &mut BitWriter<'_>, state: &mut SrlState, value: i32, num_bits: u32) {
    if state.nz > 0 {
        state.nz -= 1;
        debug_assert_eq!(value, 0);
        return;
    }
    if value == 0 {
        if !state.unary_mode {
            w.put_bits(0, 1);
            state.nz = (1u32 << (state.kp as u32 / 8)).saturating_sub(1);
            state.kp = (state.kp + 4).min(80);
            return;
        }
    }
    if !state.unary_mode {
        w.put_bits(1, 1);
        state.unary_mode = true;
    }
    let sign = if value < 0 { 1 } else { 0 };
    w.put_bits(sign, 1);
    state.kp = (state.kp - 6).max(0);
    let magnitude = value.unsigned_abs().max(1);
    if num_bits > 1 {
        let cap = (1u32 << num_bits) - 1;
        let mut remaining = magnitude.min(cap);
        while remaining > 1 {
            w.put_bits(1, 1);
            remaining -= 1;
        }
        if magnitude < cap {
            w.put_bits(0, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_round_trips_known_values() {
        for v in [0xCCC0u16, 0xCCC4, 0xCCC7] {
            assert_eq!(BlockType::from_u16(v).unwrap() as u16, v);
        }
        assert!(BlockType::from_u16(0x0000).is_err());
    }

    #[test]
    fn surface_tile_index_matches_grid_invariant() {
        let surface = Surface::new(1, 200, 130);
        assert_eq!(surface.grid_width, 4);
        assert_eq!(surface.grid_height, 3);
        assert_eq!(surface.tile_index(1, 2).unwrap(), 2 * 4 + 1);
        assert!(surface.tile_index(4, 0).is_err());
    }

    #[test]
    fn surface_tracks_updated_tiles_and_resets_per_frame() {
        let mut surface = Surface::new(1, 64, 64);
        surface.begin_frame(5);
        surface
            .set_tile(0, TileState::new([[7; 10]; 3], [1, 1, 1]))
            .unwrap();
        assert_eq!(surface.updated_tiles.len(), 1);
        surface.begin_frame(6);
        assert!(surface.updated_tiles.is_empty());
    }

    #[test]
    fn upgrade_pass_on_missing_tile_is_an_error() {
        let mut surface = Surface::new(1, 64, 64);
        assert!(surface.tile_mut(0).is_err());
    }

    /// S3: a zero-run's first bit is 0, so `nz` is seeded from `kp`, `kp`
    /// bumps by `UP_GR`, and the call returns 0 while consuming one unit of
    /// the run; the following call drains the rest of the run.
    #[test]
    fn s3_progressive_srl_zero_run() {
        let buf = [0u8; 2];
        let mut r = BitReader::attach(&buf);
        let mut state = SrlState::new();
        assert_eq!(state.kp, 8);

        let first = srl_read(&mut r, &mut state, 4);
        assert_eq!(first, 0);
        assert_eq!(state.nz, 1);
        assert_eq!(state.kp, 12);

        let second = srl_read(&mut r, &mut state, 4);
        assert_eq!(second, 0);
        assert_eq!(state.nz, 0);
    }

    #[test]
    fn srl_round_trip_single_value() {
        let mut buf = [0u8; 16];
        let mut encode_state = SrlState::new();
        {
            let mut w = BitWriter::attach(&mut buf);
            srl_write(&mut w, &mut encode_state, 3, 4);
        }
        let mut decode_state = SrlState::new();
        let mut r = BitReader::attach(&buf);
        let value = srl_read(&mut r, &mut decode_state, 4);
        assert_eq!(value, 3);
    }

    #[test]
    fn tile_state_reports_full_refinement_at_quality_0xff() {
        let mut tile = TileState::new([[7; 10]; 3], [1, 1, 1]);
        assert!(!tile.fully_refined());
        tile.quality = 0xFF;
        assert!(tile.fully_refined());
    }
}
