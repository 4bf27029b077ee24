//! Header-compression behavior: the encoder must pick the smallest form
//! that still lets the decoder reconstruct every absolute header.

use chunkstream::message::datatype;
use chunkstream::{Encoder, Frame, FrameReader, Step};

use super::{body, pump_all};

fn read_all(wire: &[u8]) -> Vec<Frame> {
    let mut reader = FrameReader::new();
    reader.push(wire);

    let mut frames = Vec::new();
    loop {
        match reader.step().expect("decode error") {
            Step::Ready(frame) => frames.push(frame),
            Step::NeedMore | Step::Exhausted => break,
        }
    }
    frames
}

#[test]
fn format_sequence_shrinks_as_headers_repeat() {
    let mut encoder = Encoder::new();
    let mut offsets = Vec::new();
    let mut wire = Vec::new();

    // four messages, drained one at a time so they share channel 3:
    // new channel, timestamp-only change, length change, exact repeat
    let messages = [
        (0u32, 100usize),
        (40, 100),
        (80, 200),
        (80, 200),
    ];
    for (timestamp, len) in messages.iter().copied() {
        encoder
            .send(body(0, len), datatype::NOTIFY, 1, timestamp)
            .unwrap();
        offsets.push(wire.len());
        wire.extend_from_slice(&pump_all(&mut encoder));
    }

    // leading byte of each message's opening chunk: format in the top bits
    assert_eq!(wire[offsets[0]] >> 6, 0, "fresh channel needs format 0");
    assert_eq!(wire[offsets[1]] >> 6, 2, "timestamp-only change is format 2");
    assert_eq!(wire[offsets[2]] >> 6, 1, "length change is format 1");
    assert_eq!(wire[offsets[3]] >> 6, 3, "exact repeat is format 3");

    // every form still resolves to the right absolute header
    let frames = read_all(&wire);
    let openers: Vec<&Frame> = frames.iter().filter(|frame| frame.started).collect();
    assert_eq!(openers.len(), messages.len());

    for (frame, (timestamp, len)) in openers.iter().zip(messages.iter().copied()) {
        assert_eq!(frame.header.timestamp, timestamp);
        assert_eq!(frame.header.body_length, len as u32);
        assert_eq!(frame.header.datatype, datatype::NOTIFY);
        assert_eq!(frame.header.stream_id, 1);
    }
}

#[test]
fn continuation_frames_inherit_the_opening_header() {
    let mut encoder = Encoder::new();
    encoder
        .send(body(3, 300), datatype::NOTIFY, 1, 500)
        .unwrap();
    let wire = pump_all(&mut encoder);

    let frames = read_all(&wire);
    assert_eq!(frames.len(), 3);
    assert!(frames[0].started && !frames[0].complete);
    assert!(!frames[1].started && !frames[1].complete);
    assert!(!frames[2].started && frames[2].complete);

    for frame in &frames {
        assert_eq!(frame.header.timestamp, 500);
        assert_eq!(frame.header.body_length, 300);
    }
}

#[test]
fn timestamp_rewind_forces_a_full_header() {
    let mut encoder = Encoder::new();
    let mut wire = Vec::new();

    encoder
        .send(body(0, 10), datatype::NOTIFY, 1, 1000)
        .unwrap();
    wire.extend_from_slice(&pump_all(&mut encoder));
    let rewind_offset = wire.len();

    // a backward seek: deltas are unsigned, so this cannot compress
    encoder
        .send(body(0, 10), datatype::NOTIFY, 1, 250)
        .unwrap();
    wire.extend_from_slice(&pump_all(&mut encoder));
    assert_eq!(wire[rewind_offset] >> 6, 0);

    let frames = read_all(&wire);
    assert_eq!(frames[1].header.timestamp, 250);
}

#[test]
fn extended_timestamps_survive_the_trip() {
    let mut encoder = Encoder::new();
    encoder
        .send(body(1, 20), datatype::NOTIFY, 1, 0x0100_0000)
        .unwrap();
    let wire = pump_all(&mut encoder);

    // 12-byte header grows by the 4-byte extended timestamp
    assert_eq!(wire.len(), 16 + 20);

    let frames = read_all(&wire);
    assert_eq!(frames[0].header.timestamp, 0x0100_0000);
}
