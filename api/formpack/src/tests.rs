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

use crate::config::{MultiDimFormat, NamingPolicy, SerializerOptions};
use crate::error::SerializationError;
use crate::shape::{
    ConstructorShape, DictionaryShape, KnownSubtype, ObjectShape, ParameterShape, PropertyShape,
    SequenceShape, Shaped, SharedShape, TypeShape,
};
use crate::{Converter, MessagePackSerializer, SerializationContext};
use bytes::Bytes;
use chrono::DateTime;
use formpack_wire::{Reader, Writer};
use half::f16;
use num_bigint::{BigInt, BigUint};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use semver::Version;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

fn validate<T: Shaped + PartialEq + Debug>(value: &T) {
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(value).expect("encoding failed");
    let restored: T = serializer
        .from_slice(bytes.as_ref())
        .expect("decoding failed");
    assert_eq!(&restored, value);
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn primitive_round_trips() {
    validate(&true);
    validate(&false);
    validate(&42i8);
    validate(&-12000i16);
    validate(&1234567i32);
    validate(&-105678750199i64);
    validate(&250u8);
    validate(&u16::MAX);
    validate(&u32::MAX);
    validate(&u64::MAX);
    validate(&1.5f32);
    validate(&-2.25f64);
    validate(&String::from("some text"));
    validate(&'λ');
    validate(&());
}

#[test]
fn wide_integer_round_trips() {
    validate(&(42i128));
    validate(&i128::MAX);
    validate(&i128::MIN);
    validate(&(42u128));
    validate(&u128::MAX);
}

#[test]
fn intrinsic_round_trips() {
    validate(&(BigInt::from(i64::MAX) * BigInt::from(-1000)));
    validate(&(BigUint::from(u64::MAX) * BigUint::from(12u8)));
    validate(&DateTime::from_timestamp(1_600_000_000, 123).expect("timestamp"));
    validate(&Duration::new(5, 600));
    validate(&Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef));
    validate(&Url::parse("https://example.com/path?q=1").expect("url"));
    validate(&"-123.4500".parse::<Decimal>().expect("decimal"));
    validate(&Version::parse("1.2.3-alpha.1+build5").expect("version"));
}

#[test]
fn half_floats_widen_to_f32() {
    validate(&f16::from_f32(1.5));
    validate(&f16::from_f32(-0.25));
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&f16::from_f32(1.5)).unwrap();
    assert_eq!(bytes.as_ref()[0], 0xca);
}

#[test]
fn decimals_and_versions_are_strings() {
    let serializer = MessagePackSerializer::new();
    let bytes = serializer
        .to_bytes(&"12.75".parse::<Decimal>().expect("decimal"))
        .unwrap();
    assert_eq!(bytes.as_ref()[0] & 0xe0, 0xa0);
    assert!(contains(bytes.as_ref(), b"12.75"));

    let bytes = serializer
        .to_bytes(&Version::parse("1.2.3").expect("version"))
        .unwrap();
    assert_eq!(bytes.as_ref()[0] & 0xe0, 0xa0);
    assert!(contains(bytes.as_ref(), b"1.2.3"));
}

#[test]
fn byte_buffers_use_bin() {
    let blob: Vec<u8> = vec![1, 2, 3, 250];
    validate(&blob);
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&blob).unwrap();
    assert_eq!(bytes.as_ref()[0], 0xc4);
    validate(&Bytes::from_static(b"raw bytes"));
}

#[test]
fn collection_round_trips() {
    validate(&vec![1i64, -2, 3]);
    validate(&Some(17i64));
    validate(&(None as Option<i64>));
    let mut map = HashMap::new();
    map.insert("first".to_string(), 1i64);
    map.insert("second".to_string(), 2i64);
    validate(&map);
    let mut nested = HashMap::new();
    nested.insert("values".to_string(), vec![1i64, 2, 3]);
    validate(&nested);
}

#[test]
fn nil_into_non_optional_fails() {
    let serializer = MessagePackSerializer::new();
    let result: Result<i64, _> = serializer.from_slice(&[0xc0]);
    assert!(matches!(result, Err(SerializationError::UnexpectedNil(_))));
}

#[test]
fn truncated_input_fails() {
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&String::from("some text")).unwrap();
    let result: Result<String, _> = serializer.from_slice(&bytes.as_ref()[..3]);
    assert!(matches!(result, Err(SerializationError::TruncatedInput)));
}

#[derive(Debug, PartialEq, Default, Clone)]
struct Person {
    first_name: String,
    last_name: String,
}

impl Shaped for Person {
    fn shape() -> TypeShape<Person> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::readwrite(
                    "first_name",
                    |p: &Person| &p.first_name,
                    |p: &mut Person, v| p.first_name = v,
                ))
                .with_property(PropertyShape::readwrite(
                    "last_name",
                    |p: &Person| &p.last_name,
                    |p: &mut Person, v| p.last_name = v,
                ))
                .with_constructor(ConstructorShape::parameterless(Person::default)),
        )
    }
}

fn andrew() -> Person {
    Person {
        first_name: "Andrew".to_string(),
        last_name: "Arnott".to_string(),
    }
}

#[test]
fn map_shaped_object_round_trip() {
    validate(&andrew());
}

#[test]
fn map_shaped_object_wire_form() {
    let options = SerializerOptions {
        naming_policy: NamingPolicy::PascalCase,
        ..SerializerOptions::default()
    };
    let serializer = MessagePackSerializer::with_options(options);
    let bytes = serializer.to_bytes(&andrew()).unwrap();

    let mut expected = vec![0x82u8];
    expected.push(0xa9);
    expected.extend_from_slice(b"FirstName");
    expected.push(0xa6);
    expected.extend_from_slice(b"Andrew");
    expected.push(0xa8);
    expected.extend_from_slice(b"LastName");
    expected.push(0xa6);
    expected.extend_from_slice(b"Arnott");
    assert_eq!(bytes.as_ref(), expected.as_slice());

    let restored: Person = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored, andrew());
}

#[test]
fn naming_policy_camel_case() {
    let options = SerializerOptions {
        naming_policy: NamingPolicy::CamelCase,
        ..SerializerOptions::default()
    };
    let serializer = MessagePackSerializer::with_options(options);
    let bytes = serializer.to_bytes(&andrew()).unwrap();
    assert!(contains(bytes.as_ref(), b"firstName"));
    assert!(contains(bytes.as_ref(), b"lastName"));
    let restored: Person = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored, andrew());
}

#[test]
fn unknown_fields_are_skipped() {
    let mut buffer = bytes::BytesMut::new();
    let mut writer = Writer::new(&mut buffer);
    writer.write_map_header(3).unwrap();
    writer.write_str("first_name").unwrap();
    writer.write_str("Andrew").unwrap();
    writer.write_str("age").unwrap();
    writer.write_array_header(2).unwrap();
    writer.write_int(1).unwrap();
    writer.write_int(2).unwrap();
    writer.write_str("last_name").unwrap();
    writer.write_str("Arnott").unwrap();

    let serializer = MessagePackSerializer::new();
    let restored: Person = serializer.from_slice(buffer.as_ref()).unwrap();
    assert_eq!(restored, andrew());
}

#[derive(Debug, PartialEq)]
struct Account {
    id: String,
    balance: i64,
}

impl Shaped for Account {
    fn shape() -> TypeShape<Account> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::getter("id", |a: &Account| &a.id))
                .with_property(PropertyShape::getter("balance", |a: &Account| &a.balance))
                .with_constructor(ConstructorShape::parameterized(
                    vec![
                        ParameterShape::new::<String>("id", 0),
                        ParameterShape::new::<i64>("balance", 1),
                    ],
                    |bag| {
                        Ok(Account {
                            id: bag.take(0)?,
                            balance: bag.take(1)?,
                        })
                    },
                )),
        )
    }
}

#[test]
fn parameterized_constructor_round_trip() {
    validate(&Account {
        id: "acct-17".to_string(),
        balance: -250,
    });
}

#[test]
fn parameterized_constructor_accepts_pascal_case_keys() {
    let mut buffer = bytes::BytesMut::new();
    let mut writer = Writer::new(&mut buffer);
    writer.write_map_header(2).unwrap();
    writer.write_str("Id").unwrap();
    writer.write_str("acct-17").unwrap();
    writer.write_str("Balance").unwrap();
    writer.write_int(40).unwrap();

    let serializer = MessagePackSerializer::new();
    let restored: Account = serializer.from_slice(buffer.as_ref()).unwrap();
    assert_eq!(
        restored,
        Account {
            id: "acct-17".to_string(),
            balance: 40
        }
    );
}

#[derive(Debug, PartialEq, Default)]
struct PackedPoint {
    x: i64,
    y: i64,
    w: i64,
}

impl Shaped for PackedPoint {
    fn shape() -> TypeShape<PackedPoint> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(
                    PropertyShape::readwrite(
                        "x",
                        |p: &PackedPoint| &p.x,
                        |p: &mut PackedPoint, v| p.x = v,
                    )
                    .with_key(0),
                )
                .with_property(
                    PropertyShape::readwrite(
                        "y",
                        |p: &PackedPoint| &p.y,
                        |p: &mut PackedPoint, v| p.y = v,
                    )
                    .with_key(1),
                )
                .with_property(
                    PropertyShape::readwrite(
                        "w",
                        |p: &PackedPoint| &p.w,
                        |p: &mut PackedPoint, v| p.w = v,
                    )
                    .with_key(3),
                )
                .with_constructor(ConstructorShape::parameterless(PackedPoint::default)),
        )
    }
}

#[test]
fn keyed_object_pads_absent_slots_with_nil() {
    let value = PackedPoint { x: 7, y: -2, w: 9 };
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&value).unwrap();
    assert_eq!(bytes.as_ref(), &[0x94, 0x07, 0xfe, 0xc0, 0x09]);
    let restored: PackedPoint = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored, value);
}

#[derive(Debug, PartialEq)]
struct Segment {
    start: i64,
    end: i64,
}

impl Shaped for Segment {
    fn shape() -> TypeShape<Segment> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::getter("start", |s: &Segment| &s.start).with_key(0))
                .with_property(PropertyShape::getter("end", |s: &Segment| &s.end).with_key(1))
                .with_constructor(ConstructorShape::parameterized(
                    vec![
                        ParameterShape::new::<i64>("start", 0),
                        ParameterShape::with_default::<i64>("end", 1, || 99),
                    ],
                    |bag| {
                        Ok(Segment {
                            start: bag.take(0)?,
                            end: bag.take(1)?,
                        })
                    },
                )),
        )
    }
}

#[test]
fn keyed_object_with_constructor_round_trip() {
    validate(&Segment { start: 3, end: 11 });
}

#[test]
fn keyed_object_missing_trailing_slots_default() {
    let serializer = MessagePackSerializer::new();
    let restored: Segment = serializer.from_slice(&[0x91, 0x05]).unwrap();
    assert_eq!(restored, Segment { start: 5, end: 99 });
}

#[derive(Debug)]
struct MixedKeys {
    a: i64,
    b: i64,
}

impl Shaped for MixedKeys {
    fn shape() -> TypeShape<MixedKeys> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(
                    PropertyShape::readwrite(
                        "a",
                        |m: &MixedKeys| &m.a,
                        |m: &mut MixedKeys, v| m.a = v,
                    )
                    .with_key(0),
                )
                .with_property(PropertyShape::readwrite(
                    "b",
                    |m: &MixedKeys| &m.b,
                    |m: &mut MixedKeys, v| m.b = v,
                )),
        )
    }
}

#[test]
fn mixed_key_attributes_fail_construction() {
    let serializer = MessagePackSerializer::new();
    let result = serializer.converter_for::<MixedKeys>();
    assert!(matches!(
        result,
        Err(SerializationError::ShapeConstruction(_))
    ));
}

trait Payload: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn code(&self) -> &i64;
}

#[derive(Debug, PartialEq)]
struct Note {
    code: i64,
}

impl Payload for Note {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn code(&self) -> &i64 {
        &self.code
    }
}

#[derive(Debug, PartialEq, Default)]
struct TaggedNote {
    code: i64,
    tag: String,
}

impl Payload for TaggedNote {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn code(&self) -> &i64 {
        &self.code
    }
}

impl Shaped for TaggedNote {
    fn shape() -> TypeShape<TaggedNote> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::readwrite(
                    "code",
                    |n: &TaggedNote| &n.code,
                    |n: &mut TaggedNote, v| n.code = v,
                ))
                .with_property(PropertyShape::readwrite(
                    "tag",
                    |n: &TaggedNote| &n.tag,
                    |n: &mut TaggedNote, v| n.tag = v,
                ))
                .with_constructor(ConstructorShape::parameterless(TaggedNote::default)),
        )
    }
}

impl Shaped for Box<dyn Payload> {
    fn shape() -> TypeShape<Box<dyn Payload>> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::getter("code", |p: &Box<dyn Payload>| p.code()))
                .with_constructor(ConstructorShape::parameterized(
                    vec![ParameterShape::new::<i64>("code", 0)],
                    |bag| Ok(Box::new(Note { code: bag.take(0)? }) as Box<dyn Payload>),
                ))
                .with_subtype(KnownSubtype::new::<TaggedNote>(
                    1,
                    |p: &Box<dyn Payload>| p.as_any().downcast_ref::<TaggedNote>(),
                    |n| Box::new(n) as Box<dyn Payload>,
                )),
        )
    }
}

#[test]
fn union_base_encodes_with_nil_alias() {
    let serializer = MessagePackSerializer::new();
    let value: Box<dyn Payload> = Box::new(Note { code: 5 });
    let bytes = serializer.to_bytes(&value).unwrap();
    let mut expected = vec![0x92u8, 0xc0, 0x81, 0xa4];
    expected.extend_from_slice(b"code");
    expected.push(0x05);
    assert_eq!(bytes.as_ref(), expected.as_slice());

    let restored: Box<dyn Payload> = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(*restored.code(), 5);
    assert!(restored.as_any().downcast_ref::<Note>().is_some());
}

#[test]
fn subtype_as_static_type_is_a_plain_map() {
    let serializer = MessagePackSerializer::new();
    let value = TaggedNote {
        code: 5,
        tag: "six".to_string(),
    };
    let bytes = serializer.to_bytes(&value).unwrap();
    assert_eq!(bytes.as_ref()[0], 0x82);
    validate(&value);
}

#[test]
fn subtype_as_declared_type_round_trips_through_alias() {
    let serializer = MessagePackSerializer::new();
    let value: Box<dyn Payload> = Box::new(TaggedNote {
        code: 5,
        tag: "six".to_string(),
    });
    let bytes = serializer.to_bytes(&value).unwrap();
    assert_eq!(bytes.as_ref()[0], 0x92);
    assert_eq!(bytes.as_ref()[1], 0x01);

    let restored: Box<dyn Payload> = serializer.from_slice(bytes.as_ref()).unwrap();
    let tagged = restored
        .as_any()
        .downcast_ref::<TaggedNote>()
        .expect("expected a TaggedNote");
    assert_eq!(
        tagged,
        &TaggedNote {
            code: 5,
            tag: "six".to_string()
        }
    );
}

#[test]
fn unknown_alias_fails() {
    let serializer = MessagePackSerializer::new();
    let result: Result<Box<dyn Payload>, _> = serializer.from_slice(&[0x92, 0x07, 0x80]);
    assert!(matches!(result, Err(SerializationError::DecodeFormat(_))));
}

#[derive(Debug, PartialEq, Default)]
struct OtherNote {
    code: i64,
}

impl Payload for OtherNote {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn code(&self) -> &i64 {
        &self.code
    }
}

impl Shaped for OtherNote {
    fn shape() -> TypeShape<OtherNote> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::readwrite(
                    "code",
                    |n: &OtherNote| &n.code,
                    |n: &mut OtherNote, v| n.code = v,
                ))
                .with_constructor(ConstructorShape::parameterless(OtherNote::default)),
        )
    }
}

#[derive(Default)]
struct AliasedPair(Option<Box<dyn Payload>>);

impl Shaped for AliasedPair {
    fn shape() -> TypeShape<AliasedPair> {
        TypeShape::Object(
            ObjectShape::new()
                .with_subtype(KnownSubtype::new::<TaggedNote>(
                    1,
                    |_: &AliasedPair| None,
                    |n| AliasedPair(Some(Box::new(n) as Box<dyn Payload>)),
                ))
                .with_subtype(KnownSubtype::new::<OtherNote>(
                    1,
                    |_: &AliasedPair| None,
                    |n| AliasedPair(Some(Box::new(n) as Box<dyn Payload>)),
                ))
                .with_constructor(ConstructorShape::parameterless(AliasedPair::default)),
        )
    }
}

#[test]
fn duplicate_alias_fails_construction() {
    let serializer = MessagePackSerializer::new();
    let result = serializer.converter_for::<AliasedPair>();
    assert!(matches!(
        result,
        Err(SerializationError::ShapeConstruction(_))
    ));
}

#[derive(Debug, PartialEq)]
struct Settings {
    retries: i64,
    label: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            retries: 3,
            label: String::new(),
        }
    }
}

impl Shaped for Settings {
    fn shape() -> TypeShape<Settings> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::readwrite_with_default(
                    "retries",
                    |s: &Settings| &s.retries,
                    |s: &mut Settings, v| s.retries = v,
                    || 3,
                ))
                .with_property(PropertyShape::readwrite_with_default(
                    "label",
                    |s: &Settings| &s.label,
                    |s: &mut Settings, v| s.label = v,
                    String::new,
                ))
                .with_constructor(ConstructorShape::parameterless(Settings::default)),
        )
    }
}

#[test]
fn default_values_are_suppressed_when_configured() {
    let options = SerializerOptions {
        serialize_default_values: false,
        ..SerializerOptions::default()
    };
    let serializer = MessagePackSerializer::with_options(options);
    let value = Settings {
        retries: 3,
        label: "verbose".to_string(),
    };
    let bytes = serializer.to_bytes(&value).unwrap();
    assert_eq!(bytes.as_ref()[0], 0x81);
    assert!(!contains(bytes.as_ref(), b"retries"));

    let restored: Settings = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored, value);
}

#[test]
fn default_values_are_written_by_default() {
    let serializer = MessagePackSerializer::new();
    let value = Settings {
        retries: 3,
        label: "verbose".to_string(),
    };
    let bytes = serializer.to_bytes(&value).unwrap();
    assert_eq!(bytes.as_ref()[0], 0x82);
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum Color {
    Red = 1,
    Green = 2,
    Blue = 4,
}

impl Shaped for Color {
    fn shape() -> TypeShape<Color> {
        TypeShape::Enum(crate::shape::EnumShape::new(
            |c: &Color| *c as i64,
            |n| match n {
                1 => Some(Color::Red),
                2 => Some(Color::Green),
                4 => Some(Color::Blue),
                _ => None,
            },
        ))
    }
}

#[test]
fn enums_serialize_as_their_underlying_integer() {
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&Color::Green).unwrap();
    assert_eq!(bytes.as_ref(), &[0x02]);
    validate(&Color::Red);
    validate(&Color::Blue);

    let result: Result<Color, _> = serializer.from_slice(&[0x03]);
    assert!(matches!(result, Err(SerializationError::DecodeFormat(_))));
}

#[derive(Debug, PartialEq)]
struct Levels(Vec<i32>);

fn levels_iter(l: &Levels) -> Box<dyn Iterator<Item = &i32> + Send + '_> {
    Box::new(l.0.iter())
}

impl Shaped for Levels {
    fn shape() -> TypeShape<Levels> {
        TypeShape::Sequence(SequenceShape::span(Levels, levels_iter, |l: &Levels| l.0.len()))
    }
}

#[derive(Debug, PartialEq, Default)]
struct TagSet(BTreeSet<String>);

fn tag_set_iter(t: &TagSet) -> Box<dyn Iterator<Item = &String> + Send + '_> {
    Box::new(t.0.iter())
}

impl Shaped for TagSet {
    fn shape() -> TypeShape<TagSet> {
        TypeShape::Sequence(SequenceShape::enumerable(
            |elements| TagSet(elements.collect()),
            tag_set_iter,
            |t: &TagSet| t.0.len(),
        ))
    }
}

struct Snapshot(Vec<i64>);

fn snapshot_iter(s: &Snapshot) -> Box<dyn Iterator<Item = &i64> + Send + '_> {
    Box::new(s.0.iter())
}

impl Shaped for Snapshot {
    fn shape() -> TypeShape<Snapshot> {
        TypeShape::Sequence(SequenceShape::write_only(snapshot_iter, |s: &Snapshot| s.0.len()))
    }
}

#[derive(Debug, PartialEq)]
struct Index(Vec<(String, i64)>);

fn index_iter(i: &Index) -> Box<dyn Iterator<Item = (&String, &i64)> + Send + '_> {
    Box::new(i.0.iter().map(|(k, v)| (k, v)))
}

impl Shaped for Index {
    fn shape() -> TypeShape<Index> {
        TypeShape::Dictionary(DictionaryShape::span(Index, index_iter, |i: &Index| i.0.len()))
    }
}

#[test]
fn construction_strategies() {
    validate(&Levels(vec![-4, 0, 250_000]));
    let mut tags = BTreeSet::new();
    tags.insert("alpha".to_string());
    tags.insert("beta".to_string());
    validate(&TagSet(tags));
    validate(&Index(vec![
        ("first".to_string(), 1),
        ("second".to_string(), 2),
    ]));

    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&Snapshot(vec![1, 2, 3])).unwrap();
    assert_eq!(bytes.as_ref()[0], 0x93);
    let result: Result<Snapshot, _> = serializer.from_slice(bytes.as_ref());
    assert!(matches!(result, Err(SerializationError::NotSupported(_))));
}

#[derive(Debug, PartialEq)]
struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

fn grid_iter(g: &Grid) -> Box<dyn Iterator<Item = &f64> + Send + '_> {
    Box::new(g.data.iter())
}

impl Shaped for Grid {
    fn shape() -> TypeShape<Grid> {
        TypeShape::Sequence(SequenceShape::multi_dim(
            2,
            |g: &Grid| vec![g.rows, g.cols],
            grid_iter,
            |dims, data| {
                if dims.len() != 2 || dims[0] * dims[1] != data.len() {
                    return Err("grid dimensions do not match the element count".to_string());
                }
                Ok(Grid {
                    rows: dims[0],
                    cols: dims[1],
                    data,
                })
            },
        ))
    }
}

fn sample_grid() -> Grid {
    Grid {
        rows: 2,
        cols: 3,
        data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
    }
}

#[test]
fn multi_dim_nested_format() {
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&sample_grid()).unwrap();
    assert_eq!(bytes.as_ref()[0], 0x92);
    let restored: Grid = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored, sample_grid());
}

#[test]
fn multi_dim_flat_format() {
    let options = SerializerOptions {
        multi_dim_format: MultiDimFormat::Flat,
        ..SerializerOptions::default()
    };
    let serializer = MessagePackSerializer::with_options(options);
    let bytes = serializer.to_bytes(&sample_grid()).unwrap();
    assert_eq!(bytes.as_ref()[0], 0x98);
    assert_eq!(&bytes.as_ref()[1..3], &[0x02, 0x03]);
    let restored: Grid = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored, sample_grid());
}

#[derive(Debug)]
struct Labels {
    first: Arc<str>,
    second: Arc<str>,
}

impl Default for Labels {
    fn default() -> Self {
        Labels {
            first: Arc::from(""),
            second: Arc::from(""),
        }
    }
}

impl Shaped for Labels {
    fn shape() -> TypeShape<Labels> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::readwrite(
                    "first",
                    |l: &Labels| &l.first,
                    |l: &mut Labels, v| l.first = v,
                ))
                .with_property(PropertyShape::readwrite(
                    "second",
                    |l: &Labels| &l.second,
                    |l: &mut Labels, v| l.second = v,
                ))
                .with_constructor(ConstructorShape::parameterless(Labels::default)),
        )
    }
}

fn preserving() -> MessagePackSerializer {
    MessagePackSerializer::with_options(SerializerOptions {
        preserve_references: true,
        ..SerializerOptions::default()
    })
}

#[test]
fn shared_strings_are_written_once_and_aliased() {
    let shared: Arc<str> = Arc::from("x");
    let value = Labels {
        first: shared.clone(),
        second: shared,
    };

    let serializer = preserving();
    let bytes = serializer.to_bytes(&value).unwrap();
    let occurrences = bytes
        .as_ref()
        .windows(2)
        .filter(|w| *w == [0xa1, b'x'])
        .count();
    assert_eq!(occurrences, 1);
    assert!(contains(bytes.as_ref(), &[0xd4, 0x02, 0x00]));

    let restored: Labels = serializer.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored.first.as_ref(), "x");
    assert!(Arc::ptr_eq(&restored.first, &restored.second));
}

#[test]
fn shared_strings_without_tracking_are_plain() {
    let shared: Arc<str> = Arc::from("x");
    let value = Labels {
        first: shared.clone(),
        second: shared,
    };
    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&value).unwrap();
    let occurrences = bytes
        .as_ref()
        .windows(2)
        .filter(|w| *w == [0xa1, b'x'])
        .count();
    assert_eq!(occurrences, 2);
}

#[derive(Debug, PartialEq, Default)]
struct Chain {
    value: i64,
    next: Option<Arc<Chain>>,
}

impl Shaped for Arc<Chain> {
    fn shape() -> TypeShape<Arc<Chain>> {
        TypeShape::Shared(SharedShape::plain())
    }
}

impl Shaped for Chain {
    fn shape() -> TypeShape<Chain> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::readwrite(
                    "value",
                    |c: &Chain| &c.value,
                    |c: &mut Chain, v| c.value = v,
                ))
                .with_property(PropertyShape::readwrite(
                    "next",
                    |c: &Chain| &c.next,
                    |c: &mut Chain, v| c.next = v,
                ))
                .with_constructor(ConstructorShape::parameterless(Chain::default)),
        )
    }
}

fn chain_of(values: &[i64]) -> Chain {
    let mut next = None;
    for &value in values[1..].iter().rev() {
        next = Some(Arc::new(Chain { value, next }));
    }
    Chain {
        value: values[0],
        next,
    }
}

#[test]
fn recursive_type_round_trip() {
    let chain = chain_of(&[1, 2, 3]);
    validate(&chain);

    let serializer = MessagePackSerializer::new();
    let bytes = serializer.to_bytes(&chain).unwrap();
    // Three nested two-field maps.
    assert_eq!(
        bytes.as_ref().iter().filter(|b| **b == 0x82).count(),
        3
    );
}

#[test]
fn depth_budget_is_enforced() {
    let options = SerializerOptions {
        max_depth: 2,
        ..SerializerOptions::default()
    };
    let shallow = MessagePackSerializer::with_options(options);
    let chain = chain_of(&[1, 2, 3]);
    assert!(matches!(
        shallow.to_bytes(&chain),
        Err(SerializationError::DepthExceeded)
    ));

    let deep_enough = MessagePackSerializer::with_options(SerializerOptions {
        max_depth: 3,
        ..SerializerOptions::default()
    });
    let bytes = deep_enough.to_bytes(&chain).unwrap();
    let restored: Chain = deep_enough.from_slice(bytes.as_ref()).unwrap();
    assert_eq!(restored, chain);

    let too_shallow = MessagePackSerializer::with_options(SerializerOptions {
        max_depth: 2,
        ..SerializerOptions::default()
    });
    assert!(matches!(
        too_shallow.from_slice::<Chain>(bytes.as_ref()),
        Err(SerializationError::DepthExceeded)
    ));
}

#[derive(Default)]
struct Ring {
    label: String,
    next: Option<Arc<Mutex<Ring>>>,
}

impl Shaped for Arc<Mutex<Ring>> {
    fn shape() -> TypeShape<Arc<Mutex<Ring>>> {
        TypeShape::Shared(SharedShape::cell())
    }
}

impl Shaped for Ring {
    fn shape() -> TypeShape<Ring> {
        TypeShape::Object(
            ObjectShape::new()
                .with_property(PropertyShape::readwrite(
                    "label",
                    |r: &Ring| &r.label,
                    |r: &mut Ring, v| r.label = v,
                ))
                .with_property(PropertyShape::readwrite(
                    "next",
                    |r: &Ring| &r.next,
                    |r: &mut Ring, v| r.next = v,
                ))
                .with_constructor(ConstructorShape::parameterless(Ring::default)),
        )
    }
}

#[test]
fn self_loop_round_trips_with_reference_preservation() {
    let node = Arc::new(Mutex::new(Ring {
        label: "root".to_string(),
        next: None,
    }));
    node.lock().next = Some(node.clone());

    let serializer = preserving();
    let bytes = serializer.to_bytes(&node).unwrap();
    assert!(contains(bytes.as_ref(), &[0xd4, 0x02, 0x00]));

    let restored: Arc<Mutex<Ring>> = serializer.from_slice(bytes.as_ref()).unwrap();
    let guard = restored.lock();
    assert_eq!(guard.label, "root");
    let next = guard.next.as_ref().expect("self loop lost");
    assert!(Arc::ptr_eq(next, &restored));
}

#[test]
fn unknown_reference_fails() {
    let serializer = preserving();
    // A bare reference token with no recorded antecedent.
    let result: Result<Arc<Mutex<Ring>>, _> = serializer.from_slice(&[0xd4, 0x02, 0x00]);
    assert!(matches!(result, Err(SerializationError::NotSupported(_))));
}

struct ShoutingString;

impl Converter<Person> for ShoutingString {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Person,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_str(&value.first_name.to_uppercase())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Person, SerializationError> {
        Ok(Person {
            first_name: reader.read_string()?,
            last_name: String::new(),
        })
    }
}

#[test]
fn user_converters_take_precedence() {
    let serializer = MessagePackSerializer::new().with_converter::<Person>(Arc::new(ShoutingString));
    let bytes = serializer.to_bytes(&andrew()).unwrap();
    let mut input: &[u8] = bytes.as_ref();
    let mut reader = Reader::new(&mut input);
    assert_eq!(reader.read_string().unwrap(), "ANDREW");
}

#[test]
fn converters_are_memoized_across_threads() {
    let serializer = MessagePackSerializer::new();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let converter = serializer.converter_for::<Chain>().expect("synthesis");
                let mut ctx_bytes = bytes::BytesMut::new();
                let mut writer = Writer::new(&mut ctx_bytes);
                let mut ctx = SerializationContext::new(&serializer);
                converter
                    .write(&mut writer, &chain_of(&[1, 2]), &mut ctx)
                    .expect("write");
            });
        }
    });
}

#[tokio::test]
async fn async_round_trip_with_small_flush_threshold() {
    let options = SerializerOptions {
        unflushed_bytes_threshold: 8,
        ..SerializerOptions::default()
    };
    let serializer = MessagePackSerializer::with_options(options);
    let value = vec![andrew(); 5];

    let (mut local, mut remote) = tokio::io::duplex(1 << 16);
    serializer
        .encode_async(&value, &mut local, CancellationToken::new())
        .await
        .expect("async encode");
    drop(local);

    let restored: Vec<Person> = serializer
        .decode_async(&mut remote, CancellationToken::new())
        .await
        .expect("async decode");
    assert_eq!(restored, value);
}

#[tokio::test]
async fn async_decode_from_sync_encoding() {
    let serializer = MessagePackSerializer::new();
    let value = Segment { start: 3, end: 11 };
    let bytes = serializer.to_bytes(&value).unwrap();

    let mut source: &[u8] = bytes.as_ref();
    let restored: Segment = serializer
        .decode_async(&mut source, CancellationToken::new())
        .await
        .expect("async decode");
    assert_eq!(restored, value);
}

#[tokio::test]
async fn cancellation_is_honoured() {
    let serializer = MessagePackSerializer::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (mut local, _remote) = tokio::io::duplex(8);
    let result = serializer
        .encode_async(&vec![1i64; 100], &mut local, cancel.clone())
        .await;
    assert!(matches!(result, Err(SerializationError::Cancelled)));

    let (mut read_local, _write_remote) = tokio::io::duplex(8);
    let result: Result<Vec<i64>, _> = serializer.decode_async(&mut read_local, cancel).await;
    assert!(matches!(result, Err(SerializationError::Cancelled)));
}

#[test]
fn name_transforms() {
    assert_eq!(crate::config::to_camel_case("first_name"), "firstName");
    assert_eq!(crate::config::to_pascal_case("first_name"), "FirstName");
    assert_eq!(crate::config::to_camel_case("id"), "id");
    assert_eq!(crate::config::to_pascal_case("id"), "Id");
    assert_eq!(crate::config::to_pascal_case("FirstName"), "FirstName");
}
