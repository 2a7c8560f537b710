//! RemoteFX / Progressive bitmap codec: wavelet transform, quantization,
//! entropy coding, color conversion, and the RFX/progressive message
//! framing built on top of them.

pub mod backend;
pub mod bitstream;
pub mod bytestream;
pub mod color;
pub mod differential;
pub mod dwt;
pub mod progressive;
pub mod quant;
pub mod rfx;
pub mod rlgr;
pub mod subband;
pub mod tile_pool;

use thiserror::Error;

/// Errors raised while decoding or encoding RemoteFX / Progressive data.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A read needed more bytes than were available.
    #[error("short read: needed {needed} bytes, had {available}")]
    ShortRead { needed: usize, available: usize },

    /// A block's declared length did not match its actual encoded size.
    #[error("block length mismatch: header said {declared}, encoded {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// An unrecognized block type tag was encountered.
    #[error("unknown block type 0x{0:04x}")]
    BadBlockType(u16),

    /// The magic number at the start of a context/sync block was wrong.
    #[error("bad magic: expected 0x{expected:08x}, got 0x{actual:08x}")]
    BadMagic { expected: u32, actual: u32 },

    /// An unsupported codec/tile version was requested.
    #[error("unsupported version {0}")]
    BadVersion(u16),

    /// A quantization index fell outside the valid 6..=15 range (§3.2).
    #[error("quantization index {0} out of range (must be 6..=15)")]
    InvalidQuant(u8),

    /// A tile referenced coordinates outside the destination surface.
    #[error("tile at ({x}, {y}) is out of bounds for a {width}x{height} surface")]
    OutOfRangeTile {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// The RLGR bitstream ended before the expected number of values was
    /// produced.
    #[error("RLGR stream exhausted after {produced} of {expected} values")]
    RlgrUnderrun { produced: usize, expected: usize },

    /// A progressive surface command referenced a tile index that has no
    /// cached state yet (e.g. a SRL refinement pass before any RAW pass).
    #[error("no cached tile state for tile index {0}")]
    NoTileState(u32),

    /// A pixel format is not supported for color conversion.
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(&'static str),

    /// A progressive upgrade pass's SRL or RAW bitstream didn't drain to
    /// exactly its declared byte length once every coefficient in the pass
    /// had been consumed (§4.8).
    #[error("progressive upgrade {stream} stream consumed {consumed} of {declared} declared bytes")]
    UpgradeStreamDrainMismatch {
        stream: &'static str,
        declared: usize,
        consumed: usize,
    },
}
