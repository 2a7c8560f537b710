//! Length-prefixed frame reader/writer with cursor and endian-aware field
//! I/O, built on top of the `bytes` crate exactly the way the teacher's
//! `protocol.rs` builds RFB messages on `BytesMut`/`Buf`/`BufMut`.

use bytes::{Buf, BufMut, BytesMut};

use super::CodecError;

/// A read cursor over a `BytesMut` frame, with bounds-checked field access.
///
/// All multi-byte RFX/RDP fields are little-endian unless a method says
/// otherwise (`u16_be`), matching §6 of the design.
pub struct ByteReader<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> ByteReader<'a> {
    /// Wraps a buffer for cursor-style reads.
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    /// Remaining unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn require(&self, n: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < n {
            Err(CodecError::ShortRead {
                needed: n,
                available: self.buf.remaining(),
            })
        } else {
            Ok(())
        }
    }

    /// Reads a little-endian `u8`.
    pub fn u8(&mut self) -> Result<u8, CodecError> {
        self.require(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads a little-endian `u16`.
    pub fn u16(&mut self) -> Result<u16, CodecError> {
        self.require(2)?;
        Ok(self.buf.get_u16_le())
    }

    /// Reads a big-endian `u16` (used by a handful of legacy RFX fields).
    pub fn u16_be(&mut self) -> Result<u16, CodecError> {
        self.require(2)?;
        Ok(self.buf.get_u16())
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32, CodecError> {
        self.require(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Result<BytesMut, CodecError> {
        self.require(n)?;
        Ok(self.buf.split_to(n))
    }

    /// Skips `n` bytes, clamping to what remains.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.buf.remaining());
        self.buf.advance(n);
    }
}

/// A growable little-endian write buffer, mirroring the teacher's
/// `PixelFormat::write_to` / `Rectangle::write_header` idiom of building a
/// frame incrementally into a `BytesMut`.
#[derive(Default)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Creates a writer pre-sized to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends a `u8`.
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    /// Appends a little-endian `u16`.
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16_le(v);
        self
    }

    /// Appends a little-endian `u32`.
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32_le(v);
        self
    }

    /// Appends raw bytes.
    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.put_slice(b);
        self
    }

    /// Current length of the buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Patches a little-endian `u32` at `offset`, used for block-length
    /// fields that are only known after the payload has been emitted
    /// (§4.7: "Each tile block carries its coded length in its own 4-byte
    /// blockLen field (patched in after encoding the payload)").
    pub fn patch_u32(&mut self, offset: usize, v: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Consumes the writer, returning the assembled buffer.
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_fields() {
        let mut w = ByteWriter::new();
        w.u8(1).u16(2).u32(3).bytes(&[9, 9]);
        let mut bytes = w.into_inner();
        let mut r = ByteReader::new(&mut bytes);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.u16().unwrap(), 2);
        assert_eq!(r.u32().unwrap(), 3);
        assert_eq!(&r.bytes(2).unwrap()[..], &[9, 9]);
    }

    #[test]
    fn short_read_is_reported() {
        let mut bytes = BytesMut::from(&[1u8][..]);
        let mut r = ByteReader::new(&mut bytes);
        assert!(r.u32().is_err());
    }

    #[test]
    fn patch_u32_rewrites_length_field() {
        let mut w = ByteWriter::new();
        w.u32(0);
        w.bytes(&[1, 2, 3]);
        w.patch_u32(0, 42);
        let buf = w.into_inner();
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 42);
    }
}
