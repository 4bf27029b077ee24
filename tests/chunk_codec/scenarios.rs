//! Wire-level scenarios: exact bytes for the simple cases, interleaving,
//! protocol violations and mid-stream frame-size changes.

use bytes::BytesMut;
use chunkstream::message::datatype;
use chunkstream::{ChunkHeader, Encoder, FrameReader};

use super::{body, decoder, drive, pump_all};

fn chunk(header: &ChunkHeader, payload: &[u8]) -> Vec<u8> {
    let mut bytes = header.encode().unwrap();
    bytes.extend_from_slice(payload);
    bytes
}

#[test]
fn single_small_message_wire_bytes() {
    let mut encoder = Encoder::new();
    encoder
        .send(body(0, 50), datatype::INVOKE, 1, 0)
        .unwrap();
    let out = pump_all(&mut encoder);

    // format 0 on channel 3: timestamp 0, length 50, invoke, stream 1
    let mut expected = vec![
        0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x32, 0x14, 0x01, 0x00, 0x00, 0x00,
    ];
    expected.extend_from_slice(&body(0, 50));
    assert_eq!(&out[..], &expected[..]);

    // and back through the decoder in one piece
    let mut decoder = decoder();
    decoder.push(&out);
    drive(&mut decoder);

    let dispatched = &decoder.dispatcher().0;
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].stream_id, 1);
    assert_eq!(dispatched[0].datatype, datatype::INVOKE);
    assert_eq!(dispatched[0].timestamp, 0);
    assert_eq!(dispatched[0].body, body(0, 50));
}

#[test]
fn interleaved_channels_reassemble_independently() {
    // channel 3 carries 300 bytes, channel 4 carries 200; their frames
    // alternate on the wire
    let ch3 = ChunkHeader::full(3, 0, 300, datatype::INVOKE, 1).unwrap();
    let ch4 = ChunkHeader::full(4, 0, 200, datatype::NOTIFY, 1).unwrap();
    let ch3_cont = ChunkHeader::continuation(3).unwrap();
    let ch4_cont = ChunkHeader::continuation(4).unwrap();

    let big = body(1, 300);
    let small = body(2, 200);

    let mut wire = Vec::new();
    wire.extend_from_slice(&chunk(&ch3, &big[..128]));
    wire.extend_from_slice(&chunk(&ch4, &small[..128]));
    wire.extend_from_slice(&chunk(&ch3_cont, &big[128..256]));
    wire.extend_from_slice(&chunk(&ch4_cont, &small[128..]));
    wire.extend_from_slice(&chunk(&ch3_cont, &big[256..]));

    let mut decoder = decoder();
    decoder.push(&wire);
    drive(&mut decoder);

    // channel 4 completes on its second frame, channel 3 on its third
    let dispatched = &decoder.dispatcher().0;
    assert_eq!(dispatched.len(), 2);
    assert_eq!(dispatched[0].datatype, datatype::NOTIFY);
    assert_eq!(dispatched[0].body, small);
    assert_eq!(dispatched[1].datatype, datatype::INVOKE);
    assert_eq!(dispatched[1].body, big);
}

#[test]
fn relative_header_on_fresh_channel_is_a_protocol_error() {
    let mut reader = FrameReader::new();
    reader.push(&[0xC3]);
    reader.step().expect_err("continuation with no prior header");
}

#[test]
fn frame_size_change_mid_message() {
    // a 500-byte message: one 128-byte frame at the default size, then
    // 64-byte frames once the change takes effect
    let mut encoder = Encoder::new();
    let mut out = BytesMut::new();

    encoder
        .send(body(9, 500), datatype::INVOKE, 1, 0)
        .unwrap();
    encoder.step(&mut out).unwrap();
    assert_eq!(out.len(), 12 + 128);

    encoder.set_frame_size(64);
    encoder.step(&mut out).unwrap();
    assert_eq!(out.len(), 12 + 128 + 1 + 64);
    encoder.step(&mut out).unwrap();
    assert_eq!(out.len(), 12 + 128 + 1 + 64 + 1 + 64);

    // the decoder tracks the same change and still reassembles the body
    let out = {
        let rest = pump_all(&mut encoder);
        let mut all = BytesMut::from(&out[..]);
        all.extend_from_slice(&rest);
        all
    };

    let mut decoder = decoder();
    decoder.push(&out[..12 + 128]);
    drive(&mut decoder);
    decoder.set_frame_size(64);
    decoder.push(&out[12 + 128..]);
    drive(&mut decoder);

    let dispatched = &decoder.dispatcher().0;
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].body, body(9, 500));
}

#[test]
fn streamable_frames_reach_the_dispatcher_immediately() {
    let audio = ChunkHeader::full(5, 100, 300, datatype::AUDIO, 1).unwrap();
    let cont = ChunkHeader::continuation(5).unwrap();
    let samples = body(7, 300);

    let mut decoder = decoder();
    decoder.push(&chunk(&audio, &samples[..128]));
    decoder.push(&chunk(&cont, &samples[128..256]));
    decoder.push(&chunk(&cont, &samples[256..]));
    drive(&mut decoder);

    // three pieces, all at the accumulated stream timestamp
    let dispatched = &decoder.dispatcher().0;
    assert_eq!(dispatched.len(), 3);
    for piece in dispatched {
        assert_eq!(piece.datatype, datatype::AUDIO);
        assert_eq!(piece.timestamp, 100);
    }
    let stitched: Vec<u8> = dispatched
        .iter()
        .flat_map(|piece| piece.body.iter().copied())
        .collect();
    assert_eq!(&stitched[..], &samples[..]);
}
