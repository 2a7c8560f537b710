//! Cross-module round-trip properties for the RemoteFX/Progressive codec
//! core (§8).

use rdpcore::codec::backend::{CodecBackend, ScalarBackend};
use rdpcore::codec::color::PixelFormat;
use rdpcore::codec::rfx::{Channel, CodecVersion, Context, EncodeTile, Rect};
use rdpcore::codec::rlgr::Mode;
use rdpcore::codec::subband::{QUANT_BAND_ORDER_RFX, RFX_LAYOUT};

#[test]
fn dwt_round_trip_on_structured_input() {
    let backend = ScalarBackend;
    let mut coeffs = [0i16; 4096];
    for (i, c) in coeffs.iter_mut().enumerate() {
        *c = ((i * 37) % 255) as i16 - 127;
    }
    let original = coeffs;
    backend.dwt_2d_encode(&mut coeffs).unwrap();
    backend.dwt_2d_decode(&mut coeffs).unwrap();
    assert_eq!(coeffs, original);
}

#[test]
fn quantizer_round_trip_bounded_error() {
    let backend = ScalarBackend;
    let mut coeffs = [0i16; 4096];
    for (i, c) in coeffs.iter_mut().enumerate() {
        *c = ((i % 300) as i16) - 150;
    }
    let original = coeffs;
    let values = [10u8; 10];
    backend
        .quantization_encode(&mut coeffs, &RFX_LAYOUT, &QUANT_BAND_ORDER_RFX, &values)
        .unwrap();
    backend
        .quantization_decode(&mut coeffs, &RFX_LAYOUT, &QUANT_BAND_ORDER_RFX, &values)
        .unwrap();
    for (orig, got) in original.iter().zip(coeffs.iter()) {
        assert!((*orig as i32 - *got as i32).abs() <= (1 << (10 - 6)));
    }
}

#[test]
fn rlgr_round_trip_mixed_stream() {
    use rdpcore::codec::rlgr::{decode, encode};
    let mut values: Vec<i16> = Vec::new();
    for i in 0..512i32 {
        values.push(match i % 7 {
            0 => 0,
            1 => 3,
            2 => -3,
            3 => 0,
            4 => 0,
            5 => 200,
            _ => -200,
        });
    }
    let mut buf = vec![0u8; 4096];
    let len = encode(Mode::Rlgr1, &values, &mut buf).unwrap();
    let decoded = decode(Mode::Rlgr1, &buf[..len], values.len()).unwrap();
    assert_eq!(decoded, values);
}

#[test]
fn color_round_trip_within_two_levels_per_channel() {
    let backend = ScalarBackend;
    let mut pixels = vec![0u8; 4096 * 4];
    for (i, chunk) in pixels.chunks_mut(4).enumerate() {
        chunk[0] = ((i * 3) % 256) as u8;
        chunk[1] = ((i * 5) % 256) as u8;
        chunk[2] = ((i * 7) % 256) as u8;
        chunk[3] = 0xFF;
    }
    let mut y = [0i16; 4096];
    let mut cb = [0i16; 4096];
    let mut cr = [0i16; 4096];
    backend
        .encode_rgb_to_ycbcr(&pixels, PixelFormat::Bgra32, &mut y, &mut cb, &mut cr)
        .unwrap();
    let mut out = vec![0u8; 4096 * 4];
    backend
        .decode_ycbcr_to_rgb(&y, &cb, &cr, PixelFormat::Bgra32, &mut out)
        .unwrap();
    for (orig, got) in pixels.chunks(4).zip(out.chunks(4)) {
        assert!((orig[0] as i32 - got[0] as i32).abs() <= 2);
        assert!((orig[1] as i32 - got[1] as i32).abs() <= 2);
        assert!((orig[2] as i32 - got[2] as i32).abs() <= 2);
    }
}

#[test]
fn rfx_tile_round_trip_within_eight_levels_per_channel() {
    let mut ctx = Context::new(PixelFormat::Rgba32);
    let mut pixels = vec![0u8; 4096 * 4];
    for (i, chunk) in pixels.chunks_mut(4).enumerate() {
        chunk[0] = ((i * 11) % 256) as u8;
        chunk[1] = ((i * 13) % 256) as u8;
        chunk[2] = ((i * 17) % 256) as u8;
        chunk[3] = 0xFF;
    }

    let mut w = rdpcore::codec::bytestream::ByteWriter::new();
    ctx.encode_tile(
        &EncodeTile {
            x_idx: 0,
            y_idx: 0,
            pixels: &pixels,
        },
        &mut w,
    )
    .unwrap();

    let mut bytes = w.into_inner();
    let mut r = rdpcore::codec::bytestream::ByteReader::new(&mut bytes);
    let tile = ctx.decode_tile(&mut r).unwrap();

    for (orig, got) in pixels.chunks(4).zip(tile.pixels.chunks(4)) {
        assert!((orig[0] as i32 - got[0] as i32).abs() <= 8);
        assert!((orig[1] as i32 - got[1] as i32).abs() <= 8);
        assert!((orig[2] as i32 - got[2] as i32).abs() <= 8);
    }
}

/// A full frame follows §4.7's encode driver order: SYNC / CONTEXT /
/// CODEC_VERSIONS / CHANNELS once up front, then FRAME_BEGIN / REGION /
/// TILESET / FRAME_END per frame.
#[test]
fn full_frame_sequence_round_trips_in_order() {
    let mut ctx = Context::new(PixelFormat::Bgra32);
    let mut w = rdpcore::codec::bytestream::ByteWriter::new();

    ctx.write_sync(&mut w);
    ctx.write_context(&mut w, 1, Mode::Rlgr3);
    ctx.write_codec_versions(&mut w, &[CodecVersion { codec_id: 1, version: 0x0100 }]);
    ctx.write_channels(&mut w, &[Channel { channel_id: 0, width: 128, height: 64 }]);

    let rects = vec![Rect { x: 0, y: 0, width: 64, height: 64 }, Rect { x: 64, y: 0, width: 64, height: 64 }];
    let pixels_a = vec![96u8; 4096 * 4];
    let pixels_b = vec![160u8; 4096 * 4];
    let tiles = vec![
        EncodeTile { x_idx: 0, y_idx: 0, pixels: &pixels_a },
        EncodeTile { x_idx: 1, y_idx: 0, pixels: &pixels_b },
    ];

    ctx.write_frame_begin(&mut w, 0, 1);
    ctx.write_region(&mut w, &rects);
    ctx.encode_tileset(&tiles, &mut w).unwrap();
    ctx.write_frame_end(&mut w);

    let mut bytes = w.into_inner();
    let mut r = rdpcore::codec::bytestream::ByteReader::new(&mut bytes);

    ctx.read_sync(&mut r).unwrap();
    let (codec_id, tile_size, mode) = ctx.read_context(&mut r).unwrap();
    assert_eq!((codec_id, tile_size, mode), (1, 64, Mode::Rlgr3));
    let versions = ctx.read_codec_versions(&mut r).unwrap();
    assert_eq!(versions[0].version, 0x0100);
    let channels = ctx.read_channels(&mut r).unwrap();
    assert_eq!(channels[0].width, 128);

    let (frame_idx, num_regions) = ctx.read_frame_begin(&mut r).unwrap();
    assert_eq!((frame_idx, num_regions), (0, 1));
    let decoded_rects = ctx.read_region(&mut r).unwrap();
    assert_eq!(decoded_rects, rects);
    let decoded_tiles = ctx.decode_tileset(&mut r).unwrap();
    assert_eq!(decoded_tiles.len(), 2);
    ctx.read_frame_end(&mut r).unwrap();
    assert_eq!(r.remaining(), 0);
}

/// S2: the exact bytes a `WBT_SYNC` block must encode to.
#[test]
fn s2_sync_block_matches_exact_wire_bytes() {
    let ctx = Context::new(PixelFormat::Bgra32);
    let mut w = rdpcore::codec::bytestream::ByteWriter::new();
    ctx.write_sync(&mut w);
    let bytes = w.into_inner();
    assert_eq!(
        &bytes[..],
        &[0xC0, 0xCC, 0x0C, 0x00, 0x00, 0x00, 0xCA, 0xAC, 0xCC, 0xCA, 0x00, 0x01][..]
    );
}
