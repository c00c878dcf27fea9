// Copyright 2015-2023 Swim Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::scan::{measure_value, Measure};
use crate::{varint, AsyncReader, AsyncWriter, Reader, WireError, Writer};
use bytes::{Buf, BytesMut};
use tokio_util::sync::CancellationToken;

fn encode_with<F>(f: F) -> BytesMut
where
    F: FnOnce(&mut Writer<'_>),
{
    let mut buffer = BytesMut::new();
    let mut writer = Writer::new(&mut buffer);
    f(&mut writer);
    buffer
}

const INT_BOUNDARIES: [i64; 15] = [
    0,
    1,
    127,
    128,
    255,
    256,
    65535,
    65536,
    4294967295,
    4294967296,
    -1,
    -32,
    -33,
    -129,
    -32769,
];

#[test]
fn int_round_trip() {
    for n in &INT_BOUNDARIES {
        let buffer = encode_with(|w| w.write_int(*n).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        assert_eq!(reader.read_i64().unwrap(), *n);
        assert!(!input.has_remaining());
    }
}

#[test]
fn int_shortest_encoding() {
    assert_eq!(encode_with(|w| w.write_int(5).unwrap()).as_ref(), &[0x05]);
    assert_eq!(encode_with(|w| w.write_int(-1).unwrap()).as_ref(), &[0xff]);
    assert_eq!(
        encode_with(|w| w.write_int(-33).unwrap()).as_ref(),
        &[0xd0, 0xdf]
    );
    assert_eq!(
        encode_with(|w| w.write_int(200).unwrap()).as_ref(),
        &[0xcc, 0xc8]
    );
    assert_eq!(
        encode_with(|w| w.write_int(1000).unwrap()).as_ref(),
        &[0xcd, 0x03, 0xe8]
    );
    assert_eq!(
        encode_with(|w| w.write_uint(u64::MAX).unwrap()).len(),
        9
    );
}

#[test]
fn uint_round_trip() {
    for n in &[0u64, 127, 128, 255, 256, 65535, 65536, u32::MAX as u64, u64::MAX] {
        let buffer = encode_with(|w| w.write_uint(*n).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        assert_eq!(reader.read_u64().unwrap(), *n);
    }
}

#[test]
fn u64_too_large_for_i64() {
    let buffer = encode_with(|w| w.write_uint(u64::MAX).unwrap());
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    assert_eq!(reader.read_i64(), Err(WireError::IntegerOverflow));
}

#[test]
fn bool_and_nil() {
    let buffer = encode_with(|w| {
        w.write_bool(true).unwrap();
        w.write_bool(false).unwrap();
        w.write_nil().unwrap();
    });
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    assert!(reader.read_bool().unwrap());
    assert!(!reader.read_bool().unwrap());
    assert!(reader.try_read_nil().unwrap());
}

#[test]
fn try_read_nil_leaves_input() {
    let buffer = encode_with(|w| w.write_int(12).unwrap());
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    assert!(!reader.try_read_nil().unwrap());
    assert_eq!(reader.read_i64().unwrap(), 12);
}

#[test]
fn float_round_trip() {
    let buffer = encode_with(|w| {
        w.write_f32(1.5f32).unwrap();
        w.write_f64(-2.25f64).unwrap();
    });
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    assert_eq!(reader.read_f32().unwrap(), 1.5f32);
    assert_eq!(reader.read_f64().unwrap(), -2.25f64);
}

const STR_LENGTHS: [usize; 5] = [0, 31, 32, 256, u16::MAX as usize + 1];

#[test]
fn string_round_trip_at_boundaries() {
    for len in &STR_LENGTHS {
        let text: String = std::iter::repeat('a').take(*len).collect();
        let buffer = encode_with(|w| w.write_str(&text).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        assert_eq!(reader.read_string().unwrap(), text);
    }
}

#[test]
fn bin_round_trip_at_boundaries() {
    for len in &[0usize, 255, 256, u16::MAX as usize + 1] {
        let blob: Vec<u8> = std::iter::repeat(7u8).take(*len).collect();
        let buffer = encode_with(|w| w.write_bin(&blob).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        assert_eq!(reader.read_bin().unwrap().as_ref(), blob.as_slice());
    }
}

#[test]
fn ext_round_trip() {
    for len in &[1usize, 2, 3, 4, 8, 16, 17, 300] {
        let body: Vec<u8> = (0..*len).map(|i| i as u8).collect();
        let buffer = encode_with(|w| w.write_ext(7, &body).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        let (code, data) = reader.read_ext().unwrap();
        assert_eq!(code, 7);
        assert_eq!(data.as_ref(), body.as_slice());
    }
}

#[test]
fn try_read_ext_mismatch_leaves_input() {
    let buffer = encode_with(|w| w.write_ext(9, &[1, 2, 3, 4]).unwrap());
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    assert!(reader.try_read_ext(2).unwrap().is_none());
    let (code, data) = reader.read_ext().unwrap();
    assert_eq!(code, 9);
    assert_eq!(data.as_ref(), &[1, 2, 3, 4]);
}

#[test]
fn try_read_ext_non_ext_leaves_input() {
    let buffer = encode_with(|w| w.write_str("hello").unwrap());
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    assert!(reader.try_read_ext(2).unwrap().is_none());
    assert_eq!(reader.read_string().unwrap(), "hello");
}

#[test]
fn ref_ext_round_trip() {
    for seq in &[0u64, 1, 127, 128, 300, 1 << 20, u64::MAX] {
        let buffer = encode_with(|w| w.write_ref_ext(2, *seq).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        let body = reader.try_read_ext(2).unwrap().expect("reference token");
        assert_eq!(varint::decode(body.as_ref()).unwrap(), *seq);
    }
}

#[test]
fn array_and_map_headers() {
    for len in &[0u32, 15, 16, u16::MAX as u32, u16::MAX as u32 + 1] {
        let buffer = encode_with(|w| w.write_array_header(*len).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        assert_eq!(reader.read_array_header().unwrap(), *len);

        let buffer = encode_with(|w| w.write_map_header(*len).unwrap());
        let mut input = buffer.freeze();
        let mut reader = Reader::new(&mut input);
        assert_eq!(reader.read_map_header().unwrap(), *len);
    }
}

#[test]
fn probing_headers() {
    let buffer = encode_with(|w| w.write_map_header(2).unwrap());
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    assert_eq!(reader.try_read_array_header().unwrap(), None);
    assert_eq!(reader.try_read_map_header().unwrap(), Some(2));
}

#[test]
fn truncated_input_fails() {
    let buffer = encode_with(|w| w.write_str("some text").unwrap());
    let mut input = buffer.freeze();
    let _ = input.split_off(4);
    let mut reader = Reader::new(&mut input);
    assert_eq!(reader.read_string(), Err(WireError::Incomplete));
}

#[test]
fn skip_value_consumes_nested_structures() {
    let buffer = encode_with(|w| {
        w.write_map_header(2).unwrap();
        w.write_str("inner").unwrap();
        w.write_array_header(3).unwrap();
        w.write_int(1).unwrap();
        w.write_int(2).unwrap();
        w.write_int(3).unwrap();
        w.write_str("blob").unwrap();
        w.write_bin(&[1, 2, 3]).unwrap();
        w.write_int(42).unwrap();
    });
    let mut input = buffer.freeze();
    let mut reader = Reader::new(&mut input);
    reader.skip_value().unwrap();
    assert_eq!(reader.read_i64().unwrap(), 42);
    assert!(!input.has_remaining());
}

#[test]
fn measure_complete_and_incomplete() {
    let buffer = encode_with(|w| {
        w.write_map_header(1).unwrap();
        w.write_str("key").unwrap();
        w.write_array_header(2).unwrap();
        w.write_int(10).unwrap();
        w.write_int(20).unwrap();
    });
    let len = buffer.len();
    assert_eq!(measure_value(buffer.as_ref()).unwrap(), Measure::Complete(len));
    assert_eq!(
        measure_value(&buffer.as_ref()[..len - 1]).unwrap(),
        Measure::Incomplete
    );
    assert_eq!(measure_value(&[]).unwrap(), Measure::Incomplete);
}

#[test]
fn varint_round_trip() {
    for n in &[0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
        let mut buf = [0u8; varint::MAX_LEN];
        let len = varint::encode(*n, &mut buf);
        assert_eq!(varint::decode(&buf[..len]).unwrap(), *n);
    }
    assert_eq!(varint::decode(&[0x80]), Err(WireError::BadVarint));
    assert_eq!(varint::decode(&[0x01, 0x01]), Err(WireError::BadVarint));
}

#[tokio::test]
async fn async_reader_isolates_structures() {
    let buffer = encode_with(|w| {
        w.write_array_header(2).unwrap();
        w.write_int(1).unwrap();
        w.write_str("two").unwrap();
        w.write_int(99).unwrap();
    });
    let data = buffer.freeze();
    let mut source: &[u8] = data.as_ref();
    let mut reader = AsyncReader::new(&mut source, CancellationToken::new());

    let mut structure = reader.next_structure().await.unwrap();
    let mut sync_reader = Reader::new(&mut structure);
    assert_eq!(sync_reader.read_array_header().unwrap(), 2);
    assert_eq!(sync_reader.read_i64().unwrap(), 1);
    assert_eq!(sync_reader.read_string().unwrap(), "two");

    let n = reader.with_buffer(|r| r.read_i64()).await.unwrap();
    assert_eq!(n, 99);
}

#[tokio::test]
async fn async_reader_eof_mid_structure() {
    let buffer = encode_with(|w| w.write_str("truncated me").unwrap());
    let data = buffer.freeze();
    let mut source: &[u8] = &data.as_ref()[..4];
    let mut reader = AsyncReader::new(&mut source, CancellationToken::new());
    assert_eq!(
        reader.next_structure().await.unwrap_err(),
        WireError::Incomplete
    );
}

#[tokio::test]
async fn async_writer_thresholded_flush() {
    let (mut local, mut remote) = tokio::io::duplex(1 << 16);
    let cancel = CancellationToken::new();
    let mut writer = AsyncWriter::new(&mut local, cancel);
    {
        let mut staging = writer.staging();
        staging.write_str("payload").unwrap();
    }
    assert!(writer.is_time_to_flush(4));
    assert!(!writer.is_time_to_flush(1024));
    writer.finish().await.unwrap();
    assert_eq!(writer.unflushed(), 0);
    drop(writer);
    drop(local);

    let mut received = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut remote, &mut received)
        .await
        .unwrap();
    let mut input: &[u8] = received.as_ref();
    let mut reader = Reader::new(&mut input);
    assert_eq!(reader.read_string().unwrap(), "payload");
}

#[tokio::test]
async fn cancelled_reader_fails_promptly() {
    let (mut local, _remote) = tokio::io::duplex(8);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut reader = AsyncReader::new(&mut local, cancel);
    assert_eq!(
        reader.next_structure().await.unwrap_err(),
        WireError::Cancelled
    );
}
