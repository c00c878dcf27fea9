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

//! Built-in converters, resolved by type identity before any shape is
//! visited. Big integers are written as extensions holding the big endian
//! magnitude (signed values carry a leading sign byte); timestamps,
//! durations and UUIDs are extension-typed; decimals, versions and URLs
//! are strings; half-precision floats widen to the 32 bit float format.

use crate::context::SerializationContext;
use crate::convert::deny_nil;
use crate::convert::shared::SharedStrConverter;
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::shape::{Shaped, TypeShape};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use formpack_wire::{Reader, Writer, BIG_INT_EXT, BIG_UINT_EXT, DURATION_EXT, TIMESTAMP_EXT, UUID_EXT};
use half::f16;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use semver::Version;
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

macro_rules! primitive_shaped {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Shaped for $ty {
                fn shape() -> TypeShape<$ty> {
                    TypeShape::Primitive
                }
            }
        )*
    };
}

primitive_shaped! {
    bool,
    i8, i16, i32, i64, i128,
    u8, u16, u32, u64, u128,
    f16, f32, f64,
    String, char,
    (),
    Bytes,
    BigInt, BigUint, Decimal,
    DateTime<Utc>, Duration, Uuid, Url, Version,
}

impl Shaped for Box<str> {
    fn shape() -> TypeShape<Box<str>> {
        TypeShape::Primitive
    }
}

impl Shaped for Arc<str> {
    fn shape() -> TypeShape<Arc<str>> {
        TypeShape::Primitive
    }
}

struct BoolConverter;

impl Converter<bool> for BoolConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &bool,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_bool(*value)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<bool, SerializationError> {
        deny_nil(reader, "bool")?;
        Ok(reader.read_bool()?)
    }
}

fn int_out_of_range(ty: &'static str) -> SerializationError {
    SerializationError::DecodeFormat(format!("integer out of range for {}", ty))
}

macro_rules! signed_converter {
    ($name:ident, $ty:ty) => {
        struct $name;

        impl Converter<$ty> for $name {
            fn write(
                &self,
                writer: &mut Writer<'_>,
                value: &$ty,
                _ctx: &mut SerializationContext<'_>,
            ) -> Result<(), SerializationError> {
                writer.write_int(*value as i64)?;
                Ok(())
            }

            fn read(
                &self,
                reader: &mut Reader<'_>,
                _ctx: &mut SerializationContext<'_>,
            ) -> Result<$ty, SerializationError> {
                deny_nil(reader, stringify!($ty))?;
                let n = reader.read_i64()?;
                <$ty>::try_from(n).map_err(|_| int_out_of_range(stringify!($ty)))
            }
        }
    };
}

macro_rules! unsigned_converter {
    ($name:ident, $ty:ty) => {
        struct $name;

        impl Converter<$ty> for $name {
            fn write(
                &self,
                writer: &mut Writer<'_>,
                value: &$ty,
                _ctx: &mut SerializationContext<'_>,
            ) -> Result<(), SerializationError> {
                writer.write_uint(*value as u64)?;
                Ok(())
            }

            fn read(
                &self,
                reader: &mut Reader<'_>,
                _ctx: &mut SerializationContext<'_>,
            ) -> Result<$ty, SerializationError> {
                deny_nil(reader, stringify!($ty))?;
                let n = reader.read_u64()?;
                <$ty>::try_from(n).map_err(|_| int_out_of_range(stringify!($ty)))
            }
        }
    };
}

signed_converter!(I8Converter, i8);
signed_converter!(I16Converter, i16);
signed_converter!(I32Converter, i32);
signed_converter!(I64Converter, i64);
unsigned_converter!(U8Converter, u8);
unsigned_converter!(U16Converter, u16);
unsigned_converter!(U32Converter, u32);
unsigned_converter!(U64Converter, u64);

fn write_big_int(writer: &mut Writer<'_>, value: &BigInt) -> Result<(), SerializationError> {
    let (sign, bytes) = value.to_bytes_be();
    let mut body = Vec::with_capacity(bytes.len() + 1);
    body.push(if sign == Sign::Minus { 0u8 } else { 1u8 });
    body.extend_from_slice(&bytes);
    writer.write_ext(BIG_INT_EXT, &body)?;
    Ok(())
}

fn parse_big_int(body: &[u8]) -> Result<BigInt, SerializationError> {
    match body.split_first() {
        Some((&sign_byte, magnitude)) => {
            let sign = if sign_byte == 0 { Sign::Minus } else { Sign::Plus };
            Ok(BigInt::from_bytes_be(sign, magnitude))
        }
        None => Err(SerializationError::DecodeFormat(
            "big integer extension with an empty body".to_owned(),
        )),
    }
}

struct BigIntConverter;

impl Converter<BigInt> for BigIntConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &BigInt,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        write_big_int(writer, value)
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<BigInt, SerializationError> {
        deny_nil(reader, "BigInt")?;
        match reader.try_read_ext(BIG_INT_EXT)? {
            Some(body) => parse_big_int(body.as_ref()),
            None => Ok(BigInt::from(reader.read_i64()?)),
        }
    }
}

struct BigUintConverter;

impl Converter<BigUint> for BigUintConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &BigUint,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_ext(BIG_UINT_EXT, &value.to_bytes_be())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<BigUint, SerializationError> {
        deny_nil(reader, "BigUint")?;
        match reader.try_read_ext(BIG_UINT_EXT)? {
            Some(body) => Ok(BigUint::from_bytes_be(body.as_ref())),
            None => Ok(BigUint::from(reader.read_u64()?)),
        }
    }
}

struct DecimalConverter;

impl Converter<Decimal> for DecimalConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Decimal,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_str(&value.to_string())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Decimal, SerializationError> {
        deny_nil(reader, "Decimal")?;
        let text = reader.read_string()?;
        text.parse::<Decimal>()
            .map_err(|e| SerializationError::DecodeFormat(format!("invalid decimal: {}", e)))
    }
}

struct I128Converter;

impl Converter<i128> for I128Converter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &i128,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        match i64::try_from(*value) {
            Ok(n) => {
                writer.write_int(n)?;
                Ok(())
            }
            Err(_) => write_big_int(writer, &BigInt::from(*value)),
        }
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<i128, SerializationError> {
        deny_nil(reader, "i128")?;
        match reader.try_read_ext(BIG_INT_EXT)? {
            Some(body) => parse_big_int(body.as_ref())?
                .to_i128()
                .ok_or_else(|| int_out_of_range("i128")),
            None => Ok(reader.read_i64()? as i128),
        }
    }
}

struct U128Converter;

impl Converter<u128> for U128Converter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &u128,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        match u64::try_from(*value) {
            Ok(n) => {
                writer.write_uint(n)?;
                Ok(())
            }
            Err(_) => {
                writer.write_ext(BIG_UINT_EXT, &BigUint::from(*value).to_bytes_be())?;
                Ok(())
            }
        }
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<u128, SerializationError> {
        deny_nil(reader, "u128")?;
        match reader.try_read_ext(BIG_UINT_EXT)? {
            Some(body) => BigUint::from_bytes_be(body.as_ref())
                .to_u128()
                .ok_or_else(|| int_out_of_range("u128")),
            None => Ok(reader.read_u64()? as u128),
        }
    }
}

struct F16Converter;

impl Converter<f16> for F16Converter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &f16,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_f32(value.to_f32())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<f16, SerializationError> {
        deny_nil(reader, "f16")?;
        Ok(f16::from_f32(reader.read_f32()?))
    }
}

struct F32Converter;

impl Converter<f32> for F32Converter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &f32,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_f32(*value)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<f32, SerializationError> {
        deny_nil(reader, "f32")?;
        Ok(reader.read_f32()?)
    }
}

struct F64Converter;

impl Converter<f64> for F64Converter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &f64,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_f64(*value)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<f64, SerializationError> {
        deny_nil(reader, "f64")?;
        Ok(reader.read_f64()?)
    }
}

struct StringConverter;

impl Converter<String> for StringConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &String,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_str(value)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<String, SerializationError> {
        deny_nil(reader, "String")?;
        Ok(reader.read_string()?)
    }
}

struct BoxStrConverter;

impl Converter<Box<str>> for BoxStrConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Box<str>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_str(value)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Box<str>, SerializationError> {
        deny_nil(reader, "Box<str>")?;
        Ok(reader.read_string()?.into_boxed_str())
    }
}

struct CharConverter;

impl Converter<char> for CharConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &char,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let mut buf = [0u8; 4];
        writer.write_str(value.encode_utf8(&mut buf))?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<char, SerializationError> {
        deny_nil(reader, "char")?;
        let text = reader.read_string()?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(SerializationError::DecodeFormat(
                "expected a string of exactly one character".to_owned(),
            )),
        }
    }
}

struct UnitConverter;

impl Converter<()> for UnitConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        _value: &(),
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_nil()?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        if reader.try_read_nil()? {
            Ok(())
        } else {
            Err(SerializationError::DecodeFormat(
                "expected nil for the unit value".to_owned(),
            ))
        }
    }
}

struct BinVecConverter;

impl Converter<Vec<u8>> for BinVecConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Vec<u8>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_bin(value)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Vec<u8>, SerializationError> {
        deny_nil(reader, "Vec<u8>")?;
        Ok(reader.read_bin()?.to_vec())
    }
}

struct BytesConverter;

impl Converter<Bytes> for BytesConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Bytes,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_bin(value.as_ref())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Bytes, SerializationError> {
        deny_nil(reader, "Bytes")?;
        Ok(reader.read_bin()?)
    }
}

struct TimestampConverter;

impl Converter<DateTime<Utc>> for TimestampConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &DateTime<Utc>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let mut body = [0u8; 12];
        body[..4].copy_from_slice(&value.timestamp_subsec_nanos().to_be_bytes());
        body[4..].copy_from_slice(&value.timestamp().to_be_bytes());
        writer.write_ext(TIMESTAMP_EXT, &body)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<DateTime<Utc>, SerializationError> {
        deny_nil(reader, "DateTime<Utc>")?;
        let (code, body) = reader.read_ext()?;
        if code != TIMESTAMP_EXT || body.len() != 12 {
            return Err(SerializationError::DecodeFormat(
                "malformed timestamp extension".to_owned(),
            ));
        }
        let body = body.as_ref();
        let nanos = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let secs = i64::from_be_bytes([
            body[4], body[5], body[6], body[7], body[8], body[9], body[10], body[11],
        ]);
        DateTime::<Utc>::from_timestamp(secs, nanos).ok_or_else(|| {
            SerializationError::DecodeFormat("timestamp out of range".to_owned())
        })
    }
}

struct DurationConverter;

impl Converter<Duration> for DurationConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Duration,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let mut body = [0u8; 12];
        body[..8].copy_from_slice(&value.as_secs().to_be_bytes());
        body[8..].copy_from_slice(&value.subsec_nanos().to_be_bytes());
        writer.write_ext(DURATION_EXT, &body)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Duration, SerializationError> {
        deny_nil(reader, "Duration")?;
        let (code, body) = reader.read_ext()?;
        if code != DURATION_EXT || body.len() != 12 {
            return Err(SerializationError::DecodeFormat(
                "malformed duration extension".to_owned(),
            ));
        }
        let body = body.as_ref();
        let secs = u64::from_be_bytes([
            body[0], body[1], body[2], body[3], body[4], body[5], body[6], body[7],
        ]);
        let nanos = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        Ok(Duration::new(secs, nanos))
    }
}

struct UuidConverter;

impl Converter<Uuid> for UuidConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Uuid,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_ext(UUID_EXT, value.as_bytes())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Uuid, SerializationError> {
        deny_nil(reader, "Uuid")?;
        let (code, body) = reader.read_ext()?;
        if code != UUID_EXT {
            return Err(SerializationError::DecodeFormat(
                "malformed UUID extension".to_owned(),
            ));
        }
        Uuid::from_slice(body.as_ref())
            .map_err(|_| SerializationError::DecodeFormat("malformed UUID extension".to_owned()))
    }
}

struct UrlConverter;

impl Converter<Url> for UrlConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Url,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_str(value.as_str())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Url, SerializationError> {
        deny_nil(reader, "Url")?;
        let text = reader.read_string()?;
        Url::parse(&text)
            .map_err(|e| SerializationError::DecodeFormat(format!("invalid URL: {}", e)))
    }
}

struct VersionConverter;

impl Converter<Version> for VersionConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Version,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_str(&value.to_string())?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<Version, SerializationError> {
        deny_nil(reader, "Version")?;
        let text = reader.read_string()?;
        Version::parse(&text)
            .map_err(|e| SerializationError::DecodeFormat(format!("invalid version: {}", e)))
    }
}

fn entry<T: 'static, U: Send + Sync + 'static>(
    converter: Arc<dyn Converter<U>>,
) -> Option<Arc<dyn Converter<T>>> {
    let erased: Box<dyn Any> = Box::new(converter);
    erased
        .downcast::<Arc<dyn Converter<T>>>()
        .ok()
        .map(|boxed| *boxed)
}

/// Look up the built-in converter for `T`, if `T` is an intrinsic type.
pub(crate) fn builtin<T: 'static>() -> Option<Arc<dyn Converter<T>>> {
    macro_rules! table {
        ($($ty:ty => $converter:expr,)*) => {
            $(
                if TypeId::of::<T>() == TypeId::of::<$ty>() {
                    return entry::<T, $ty>(Arc::new($converter));
                }
            )*
        };
    }
    table! {
        bool => BoolConverter,
        i8 => I8Converter,
        i16 => I16Converter,
        i32 => I32Converter,
        i64 => I64Converter,
        i128 => I128Converter,
        u8 => U8Converter,
        u16 => U16Converter,
        u32 => U32Converter,
        u64 => U64Converter,
        u128 => U128Converter,
        f16 => F16Converter,
        f32 => F32Converter,
        f64 => F64Converter,
        String => StringConverter,
        Box<str> => BoxStrConverter,
        Arc<str> => SharedStrConverter,
        char => CharConverter,
        () => UnitConverter,
        Vec<u8> => BinVecConverter,
        Bytes => BytesConverter,
        BigInt => BigIntConverter,
        BigUint => BigUintConverter,
        Decimal => DecimalConverter,
        DateTime<Utc> => TimestampConverter,
        Duration => DurationConverter,
        Uuid => UuidConverter,
        Url => UrlConverter,
        Version => VersionConverter,
    }
    None
}
