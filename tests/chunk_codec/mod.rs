//! End-to-end tests for the chunk codec: wire-level scenarios, the
//! encode/decode round trip and header-compression behavior.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use chunkstream::{Decoder, Dispatcher, EncodeStep, Encoder, MessageStream, Step, StreamFactory};

mod compression;
mod scenarios;

/// A stream double: just the running clock plus its id.
pub struct TestStream {
    pub id: u32,
    pub timestamp: u32,
}

impl MessageStream for TestStream {
    fn timestamp(&self) -> u32 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }
}

#[derive(Default)]
pub struct Streams(pub HashMap<u32, TestStream>);

impl StreamFactory for Streams {
    type Stream = TestStream;

    fn stream_for(&mut self, stream_id: u32) -> &mut TestStream {
        self.0.entry(stream_id).or_insert(TestStream {
            id: stream_id,
            timestamp: 0,
        })
    }
}

/// One dispatched message as the application would see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub stream_id: u32,
    pub datatype: u8,
    pub timestamp: u32,
    pub body: Bytes,
}

#[derive(Default)]
pub struct Recorder(pub Vec<Dispatched>);

impl Dispatcher<TestStream> for Recorder {
    fn dispatch(&mut self, stream: &mut TestStream, datatype: u8, timestamp: u32, body: Bytes) {
        self.0.push(Dispatched {
            stream_id: stream.id,
            datatype,
            timestamp,
            body,
        });
    }
}

pub fn decoder() -> Decoder<Recorder, Streams> {
    Decoder::new(Recorder::default(), Streams::default())
}

/// Step the decoder until it runs out of buffered data.
pub fn drive(decoder: &mut Decoder<Recorder, Streams>) {
    loop {
        match decoder.step().expect("decode error") {
            Step::Ready(()) => continue,
            Step::NeedMore | Step::Exhausted => break,
        }
    }
}

/// Pump the encoder until it reports idle, collecting the wire bytes.
pub fn pump_all(encoder: &mut Encoder) -> BytesMut {
    let mut out = BytesMut::new();
    loop {
        match encoder.step(&mut out).expect("encode error") {
            EncodeStep::Produced => continue,
            EncodeStep::Idle => break,
        }
    }
    out
}

/// A recognizable body: a counting pattern seeded differently per message.
pub fn body(seed: u8, len: usize) -> Bytes {
    Bytes::from(
        (0..len)
            .map(|i| seed.wrapping_add(i as u8))
            .collect::<Vec<u8>>(),
    )
}
