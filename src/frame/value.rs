// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the dynamic CQL value union and the metadata-driven
//! encode/decode path used by the result decoder.

use super::{
    cql_type::CqlType,
    decoder::ColumnDecoder,
    encoder::{
        ColumnEncoder,
        Null,
        Unset,
    },
    Blob,
};
use chrono::{
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
};
use std::{
    convert::TryInto,
    net::IpAddr,
};
use thiserror::Error;
use uuid::Uuid;

/// An arbitrary precision integer as the minimal-length big-endian
/// two's-complement byte string the wire carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CqlVarint(Vec<u8>);

impl CqlVarint {
    /// Create a varint from big-endian two's-complement bytes. The
    /// representation is normalized to the minimal length.
    pub fn from_be_bytes(bytes: Vec<u8>) -> Self {
        Self(normalize_varint(bytes))
    }

    /// Get the minimal-length big-endian two's-complement bytes.
    pub fn as_be_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to an i64 if the value fits.
    pub fn to_i64(&self) -> Option<i64> {
        if self.0.len() > 8 {
            return None;
        }
        let fill = if self.0[0] & 0x80 != 0 { 0xFF } else { 0x00 };
        let mut bytes = [fill; 8];
        bytes[8 - self.0.len()..].copy_from_slice(&self.0);
        Some(i64::from_be_bytes(bytes))
    }

    /// Convert to an i128 if the value fits.
    pub fn to_i128(&self) -> Option<i128> {
        if self.0.len() > 16 {
            return None;
        }
        let fill = if self.0[0] & 0x80 != 0 { 0xFF } else { 0x00 };
        let mut bytes = [fill; 16];
        bytes[16 - self.0.len()..].copy_from_slice(&self.0);
        Some(i128::from_be_bytes(bytes))
    }
}

impl From<i64> for CqlVarint {
    fn from(v: i64) -> Self {
        Self::from_be_bytes(v.to_be_bytes().to_vec())
    }
}

impl From<i32> for CqlVarint {
    fn from(v: i32) -> Self {
        Self::from_be_bytes(v.to_be_bytes().to_vec())
    }
}

impl From<i128> for CqlVarint {
    fn from(v: i128) -> Self {
        Self::from_be_bytes(v.to_be_bytes().to_vec())
    }
}

/// Strip redundant sign-extension bytes, keeping at least one byte.
fn normalize_varint(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.is_empty() {
        return vec![0];
    }
    let mut skip = 0;
    while skip + 1 < bytes.len() {
        let (first, second) = (bytes[skip], bytes[skip + 1]);
        if (first == 0x00 && second & 0x80 == 0) || (first == 0xFF && second & 0x80 != 0) {
            skip += 1;
        } else {
            break;
        }
    }
    bytes.drain(..skip);
    bytes
}

/// An arbitrary precision decimal: a scale and an unscaled varint, so that the
/// value is `unscaled * 10^(-scale)`. The scale is preserved across the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CqlDecimal {
    scale: i32,
    unscaled: CqlVarint,
}

impl CqlDecimal {
    /// Create a decimal from a scale and an unscaled value.
    pub fn new(scale: i32, unscaled: CqlVarint) -> Self {
        Self { scale, unscaled }
    }

    /// Get the scale.
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Get the unscaled value.
    pub fn unscaled(&self) -> &CqlVarint {
        &self.unscaled
    }
}

/// The CQL duration type: months, days and nanoseconds, each vint coded on the
/// wire. The three components do not reduce into one another (a month is not a
/// fixed number of days).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CqlDuration {
    pub months: i32,
    pub days: i32,
    pub nanoseconds: i64,
}

/// Write a zig-zag vint to a buffer.
pub(crate) fn write_vint(value: i64, buffer: &mut Vec<u8>) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    write_unsigned_vint(zigzag, buffer);
}

/// Read a zig-zag vint from a slice.
pub(crate) fn read_vint(start: &mut usize, slice: &[u8]) -> anyhow::Result<i64> {
    let zigzag = read_unsigned_vint(start, slice)?;
    Ok((zigzag >> 1) as i64 ^ -((zigzag & 1) as i64))
}

fn write_unsigned_vint(value: u64, buffer: &mut Vec<u8>) {
    let lz = (value | 1).leading_zeros() as usize;
    let size = (639 - lz * 9) >> 6;
    if size == 1 {
        buffer.push(value as u8);
        return;
    }
    let extra = size - 1;
    if extra == 8 {
        buffer.push(0xFF);
    } else {
        let mask = !(0xFFu8 >> extra);
        buffer.push(mask | (value >> (8 * extra)) as u8);
    }
    for i in (0..extra).rev() {
        buffer.push((value >> (8 * i)) as u8);
    }
}

fn read_unsigned_vint(start: &mut usize, slice: &[u8]) -> anyhow::Result<u64> {
    anyhow::ensure!(slice.len() > *start, "Not enough bytes for vint");
    let first = slice[*start];
    *start += 1;
    let extra = first.leading_ones() as usize;
    anyhow::ensure!(slice.len() >= *start + extra, "Not enough bytes for vint");
    let mut value = if extra >= 8 { 0 } else { (first & (0xFF >> extra)) as u64 };
    for _ in 0..extra {
        value = (value << 8) | slice[*start] as u64;
        *start += 1;
    }
    Ok(value)
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ValueEncodeError {
    #[error("Value does not match the declared type {0:?}")]
    TypeMismatch(CqlType),
    #[error("Ascii value contains a non-ascii byte")]
    NonAscii,
    #[error("Unset is only valid as a top-level bind value")]
    NestedUnset,
    #[error("Value is too large! Max value length is {}", i32::MAX)]
    ValueTooLarge,
}

/// A dynamic CQL value, mirroring the type descriptor tree. `Null` and
/// `Unset` are first-class members, distinguishable from empty values.
#[derive(Clone, Debug, PartialEq)]
pub enum CqlValue {
    Ascii(String),
    Bigint(i64),
    Blob(Blob),
    Boolean(bool),
    Counter(i64),
    Decimal(CqlDecimal),
    Double(f64),
    Float(f32),
    Int(i32),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Varchar(String),
    Varint(CqlVarint),
    Timeuuid(Uuid),
    Inet(IpAddr),
    Date(NaiveDate),
    Time(NaiveTime),
    Smallint(i16),
    Tinyint(i8),
    Duration(CqlDuration),
    List(Vec<CqlValue>),
    /// Map entries in wire order; the server does not preserve insertion order.
    Map(Vec<(CqlValue, CqlValue)>),
    Set(Vec<CqlValue>),
    /// Udt fields in declared order.
    Udt(Vec<(String, CqlValue)>),
    Tuple(Vec<CqlValue>),
    /// An opaque custom type payload.
    Custom(Blob),
    Null,
    Unset,
}

impl CqlValue {
    /// Encode this value as a length-prefixed cell. Scalars reuse the
    /// [`ColumnEncoder`] impls of their Rust representations; collections
    /// recurse per element.
    pub fn encode(&self, buffer: &mut Vec<u8>) -> Result<(), ValueEncodeError> {
        match self {
            CqlValue::Null => encode_scalar(&Null, buffer),
            CqlValue::Unset => encode_scalar(&Unset, buffer),
            CqlValue::Ascii(s) => {
                if !s.is_ascii() {
                    return Err(ValueEncodeError::NonAscii);
                }
                encode_scalar(s.as_str(), buffer)
            }
            CqlValue::Varchar(s) => encode_scalar(s.as_str(), buffer),
            CqlValue::Bigint(v) | CqlValue::Counter(v) => encode_scalar(v, buffer),
            CqlValue::Blob(b) | CqlValue::Custom(b) => encode_scalar(b, buffer),
            CqlValue::Boolean(v) => encode_scalar(v, buffer),
            CqlValue::Decimal(d) => encode_scalar(d, buffer),
            CqlValue::Double(v) => encode_scalar(v, buffer),
            CqlValue::Float(v) => encode_scalar(v, buffer),
            CqlValue::Int(v) => encode_scalar(v, buffer),
            CqlValue::Timestamp(v) => encode_scalar(v, buffer),
            CqlValue::Uuid(v) | CqlValue::Timeuuid(v) => encode_scalar(v, buffer),
            CqlValue::Varint(v) => encode_scalar(v, buffer),
            CqlValue::Inet(v) => encode_scalar(v, buffer),
            CqlValue::Date(v) => encode_scalar(v, buffer),
            CqlValue::Time(v) => encode_scalar(v, buffer),
            CqlValue::Smallint(v) => encode_scalar(v, buffer),
            CqlValue::Tinyint(v) => encode_scalar(v, buffer),
            CqlValue::Duration(d) => encode_scalar(d, buffer),
            CqlValue::List(elements) | CqlValue::Set(elements) => {
                let mut body = Vec::new();
                body.extend((elements.len() as i32).to_be_bytes());
                for element in elements {
                    element.reject_unset()?;
                    element.encode(&mut body)?;
                }
                write_collection_cell(body, buffer)
            }
            CqlValue::Map(entries) => {
                let mut body = Vec::new();
                body.extend((entries.len() as i32).to_be_bytes());
                for (key, value) in entries {
                    key.reject_unset()?;
                    value.reject_unset()?;
                    key.encode(&mut body)?;
                    value.encode(&mut body)?;
                }
                write_collection_cell(body, buffer)
            }
            CqlValue::Tuple(elements) => {
                let mut body = Vec::new();
                for element in elements {
                    element.reject_unset()?;
                    element.encode(&mut body)?;
                }
                write_collection_cell(body, buffer)
            }
            CqlValue::Udt(fields) => {
                let mut body = Vec::new();
                for (_, value) in fields {
                    value.reject_unset()?;
                    value.encode(&mut body)?;
                }
                write_collection_cell(body, buffer)
            }
        }
    }

    /// Encode this value to a new buffer.
    pub fn encode_new(&self) -> Result<Vec<u8>, ValueEncodeError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    fn reject_unset(&self) -> Result<(), ValueEncodeError> {
        if matches!(self, CqlValue::Unset) {
            Err(ValueEncodeError::NestedUnset)
        } else {
            Ok(())
        }
    }

    /// Check this value against a declared type without encoding it.
    pub fn check(&self, kind: &CqlType) -> Result<(), ValueEncodeError> {
        let matches = match (self, kind) {
            (CqlValue::Null, _) | (CqlValue::Unset, _) => true,
            (CqlValue::Ascii(_), CqlType::Ascii)
            | (CqlValue::Varchar(_), CqlType::Varchar | CqlType::Ascii)
            | (CqlValue::Bigint(_), CqlType::Bigint)
            | (CqlValue::Counter(_), CqlType::Counter | CqlType::Bigint)
            | (CqlValue::Blob(_), CqlType::Blob)
            | (CqlValue::Custom(_), CqlType::Custom(_))
            | (CqlValue::Boolean(_), CqlType::Boolean)
            | (CqlValue::Decimal(_), CqlType::Decimal)
            | (CqlValue::Double(_), CqlType::Double)
            | (CqlValue::Float(_), CqlType::Float)
            | (CqlValue::Int(_), CqlType::Int)
            | (CqlValue::Timestamp(_), CqlType::Timestamp)
            | (CqlValue::Uuid(_), CqlType::Uuid | CqlType::Timeuuid)
            | (CqlValue::Timeuuid(_), CqlType::Timeuuid)
            | (CqlValue::Varint(_), CqlType::Varint)
            | (CqlValue::Inet(_), CqlType::Inet)
            | (CqlValue::Date(_), CqlType::Date)
            | (CqlValue::Time(_), CqlType::Time)
            | (CqlValue::Smallint(_), CqlType::Smallint)
            | (CqlValue::Tinyint(_), CqlType::Tinyint)
            | (CqlValue::Duration(_), CqlType::Duration) => true,
            (CqlValue::List(elements), CqlType::List(e)) | (CqlValue::Set(elements), CqlType::Set(e)) => {
                return elements.iter().try_for_each(|v| v.check(e));
            }
            (CqlValue::Map(entries), CqlType::Map(k, v)) => {
                return entries.iter().try_for_each(|(key, value)| {
                    key.check(k)?;
                    value.check(v)
                });
            }
            (CqlValue::Tuple(elements), CqlType::Tuple(types)) => {
                if elements.len() != types.len() {
                    false
                } else {
                    return elements.iter().zip(types).try_for_each(|(v, t)| v.check(t));
                }
            }
            (CqlValue::Udt(values), CqlType::Udt { fields, .. }) => {
                if values.len() > fields.len() {
                    false
                } else {
                    return values.iter().zip(fields).try_for_each(|((_, v), (_, t))| v.check(t));
                }
            }
            _ => false,
        };
        if matches {
            Ok(())
        } else {
            Err(ValueEncodeError::TypeMismatch(kind.clone()))
        }
    }

    /// Decode a cell of a declared type. A missing cell (length -1) decodes to
    /// `Null`.
    pub fn try_decode(cell: Option<&[u8]>, kind: &CqlType) -> anyhow::Result<Self> {
        let slice = match cell {
            None => return Ok(CqlValue::Null),
            Some(slice) => slice,
        };
        Ok(match kind {
            CqlType::Ascii => {
                let s = String::try_decode_column(slice)?;
                anyhow::ensure!(s.is_ascii(), "Non-ascii byte in ascii value");
                CqlValue::Ascii(s)
            }
            CqlType::Varchar => CqlValue::Varchar(String::try_decode_column(slice)?),
            CqlType::Bigint => CqlValue::Bigint(i64::try_decode_column(slice)?),
            CqlType::Counter => CqlValue::Counter(i64::try_decode_column(slice)?),
            CqlType::Blob => CqlValue::Blob(Blob::try_decode_column(slice)?),
            CqlType::Custom(_) => CqlValue::Custom(Blob::try_decode_column(slice)?),
            CqlType::Boolean => CqlValue::Boolean(bool::try_decode_column(slice)?),
            CqlType::Decimal => CqlValue::Decimal(CqlDecimal::try_decode_column(slice)?),
            CqlType::Double => CqlValue::Double(f64::try_decode_column(slice)?),
            CqlType::Float => CqlValue::Float(f32::try_decode_column(slice)?),
            CqlType::Int => CqlValue::Int(i32::try_decode_column(slice)?),
            CqlType::Timestamp => CqlValue::Timestamp(NaiveDateTime::try_decode_column(slice)?),
            CqlType::Uuid => CqlValue::Uuid(Uuid::try_decode_column(slice)?),
            CqlType::Varint => CqlValue::Varint(CqlVarint::try_decode_column(slice)?),
            CqlType::Timeuuid => CqlValue::Timeuuid(Uuid::try_decode_column(slice)?),
            CqlType::Inet => CqlValue::Inet(IpAddr::try_decode_column(slice)?),
            CqlType::Date => CqlValue::Date(NaiveDate::try_decode_column(slice)?),
            CqlType::Time => CqlValue::Time(NaiveTime::try_decode_column(slice)?),
            CqlType::Smallint => CqlValue::Smallint(i16::try_decode_column(slice)?),
            CqlType::Tinyint => CqlValue::Tinyint(i8::try_decode_column(slice)?),
            CqlType::Duration => CqlValue::Duration(CqlDuration::try_decode_column(slice)?),
            CqlType::List(e) => CqlValue::List(Self::decode_elements(slice, e)?),
            CqlType::Set(e) => CqlValue::Set(Self::decode_elements(slice, e)?),
            CqlType::Map(k, v) => {
                anyhow::ensure!(slice.len() >= 4, "Not enough bytes for map length");
                let count = i32::from_be_bytes(slice[0..4].try_into()?);
                anyhow::ensure!(count >= 0, "Invalid map length: {}", count);
                let mut start = 4;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let key = Self::try_decode(read_cell(&mut start, slice)?, k)?;
                    let value = Self::try_decode(read_cell(&mut start, slice)?, v)?;
                    entries.push((key, value));
                }
                CqlValue::Map(entries)
            }
            CqlType::Tuple(types) => {
                let mut start = 0;
                let mut elements = Vec::with_capacity(types.len());
                for t in types {
                    // trailing tuple elements may be absent entirely
                    if start >= slice.len() {
                        elements.push(CqlValue::Null);
                    } else {
                        elements.push(Self::try_decode(read_cell(&mut start, slice)?, t)?);
                    }
                }
                CqlValue::Tuple(elements)
            }
            CqlType::Udt { fields, .. } => {
                let mut start = 0;
                let mut values = Vec::with_capacity(fields.len());
                for (name, t) in fields {
                    if start >= slice.len() {
                        values.push((name.clone(), CqlValue::Null));
                    } else {
                        values.push((name.clone(), Self::try_decode(read_cell(&mut start, slice)?, t)?));
                    }
                }
                CqlValue::Udt(values)
            }
        })
    }

    fn decode_elements(slice: &[u8], kind: &CqlType) -> anyhow::Result<Vec<CqlValue>> {
        anyhow::ensure!(slice.len() >= 4, "Not enough bytes for collection length");
        let count = i32::from_be_bytes(slice[0..4].try_into()?);
        anyhow::ensure!(count >= 0, "Invalid collection length: {}", count);
        let mut start = 4;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            elements.push(Self::try_decode(read_cell(&mut start, slice)?, kind)?);
        }
        Ok(elements)
    }

    /// Check whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    /// Get the value as a str if it is a text-like variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CqlValue::Ascii(s) | CqlValue::Varchar(s) => Some(s),
            _ => None,
        }
    }
}

/// Delegate one scalar to the [`ColumnEncoder`] impl of its representation;
/// those write the cell length prefix themselves.
fn encode_scalar<E: ColumnEncoder + ?Sized>(value: &E, buffer: &mut Vec<u8>) -> Result<(), ValueEncodeError> {
    value.encode(buffer).map_err(|_| ValueEncodeError::ValueTooLarge)
}

/// Prefix a collection body with its byte length.
fn write_collection_cell(body: Vec<u8>, buffer: &mut Vec<u8>) -> Result<(), ValueEncodeError> {
    if body.len() > i32::MAX as usize {
        return Err(ValueEncodeError::ValueTooLarge);
    }
    buffer.extend(i32::to_be_bytes(body.len() as i32));
    buffer.extend(body);
    Ok(())
}

/// Read one cell (an `[int]` length and that many bytes) from a slice.
fn read_cell<'a>(start: &mut usize, slice: &'a [u8]) -> anyhow::Result<Option<&'a [u8]>> {
    anyhow::ensure!(slice.len() >= *start + 4, "Not enough bytes for cell length");
    let length = i32::from_be_bytes(slice[*start..][..4].try_into()?);
    *start += 4;
    if length < 0 {
        anyhow::ensure!(length == -1, "Invalid cell length: {}", length);
        return Ok(None);
    }
    anyhow::ensure!(slice.len() >= *start + length as usize, "Not enough bytes for cell");
    let res = &slice[*start..][..length as usize];
    *start += length as usize;
    Ok(Some(res))
}

macro_rules! impl_value_from {
    ($t:ty, $variant:ident) => {
        impl From<$t> for CqlValue {
            fn from(v: $t) -> Self {
                CqlValue::$variant(v.into())
            }
        }
    };
}

impl_value_from!(i64, Bigint);
impl_value_from!(i32, Int);
impl_value_from!(i16, Smallint);
impl_value_from!(i8, Tinyint);
impl_value_from!(f64, Double);
impl_value_from!(f32, Float);
impl_value_from!(bool, Boolean);
impl_value_from!(String, Varchar);
impl_value_from!(&str, Varchar);
impl_value_from!(Blob, Blob);
impl_value_from!(IpAddr, Inet);
impl_value_from!(Uuid, Uuid);
impl_value_from!(NaiveDate, Date);
impl_value_from!(NaiveTime, Time);
impl_value_from!(NaiveDateTime, Timestamp);
impl_value_from!(CqlVarint, Varint);
impl_value_from!(CqlDecimal, Decimal);
impl_value_from!(CqlDuration, Duration);

impl<T: Into<CqlValue>> From<Option<T>> for CqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => CqlValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn roundtrip(value: CqlValue, kind: CqlType) {
        value.check(&kind).unwrap();
        let cell = value.encode_new().unwrap();
        let decoded = CqlValue::try_decode(read_cell(&mut 0, &cell).unwrap(), &kind).unwrap();
        assert_eq!(decoded, value, "round trip failed for {:?}", kind);
    }

    #[test]
    fn scalar_roundtrips() {
        roundtrip(CqlValue::Int(-42), CqlType::Int);
        roundtrip(CqlValue::Bigint(i64::MIN), CqlType::Bigint);
        roundtrip(CqlValue::Smallint(-300), CqlType::Smallint);
        roundtrip(CqlValue::Tinyint(-5), CqlType::Tinyint);
        roundtrip(CqlValue::Boolean(true), CqlType::Boolean);
        roundtrip(CqlValue::Double(1.5e300), CqlType::Double);
        roundtrip(CqlValue::Float(-0.25), CqlType::Float);
        roundtrip(CqlValue::Varchar("Hello World برای همه".to_owned()), CqlType::Varchar);
        roundtrip(CqlValue::Ascii("plain".to_owned()), CqlType::Ascii);
        roundtrip(CqlValue::Blob(vec![0, 1, 2, 255].into()), CqlType::Blob);
        roundtrip(CqlValue::Inet(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))), CqlType::Inet);
        roundtrip(CqlValue::Uuid(Uuid::from_u128(0x1234_5678_9abc_def0)), CqlType::Uuid);
        roundtrip(
            CqlValue::Duration(CqlDuration {
                months: 14,
                days: -3,
                nanoseconds: 86_400_000_000_001,
            }),
            CqlType::Duration,
        );
    }

    #[test]
    fn varint_boundary_roundtrips() {
        for v in [0i128, 1, -1, 127, 128, -128, -129, i64::MAX as i128, i64::MIN as i128] {
            let varint = CqlVarint::from(v);
            roundtrip(CqlValue::Varint(varint.clone()), CqlType::Varint);
            assert_eq!(varint.to_i128(), Some(v));
        }
        // 10^40, which exceeds both i64 and i128
        let huge = CqlVarint::from_be_bytes(vec![
            0x1D, 0x63, 0x29, 0xF1, 0xC3, 0x5C, 0xA4, 0xBF, 0xAB, 0xB9, 0xF5, 0x61, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]);
        roundtrip(CqlValue::Varint(huge.clone()), CqlType::Varint);
        assert_eq!(huge.to_i64(), None);
        assert_eq!(huge.to_i128(), None);
    }

    #[test]
    fn varint_minimal_encoding() {
        assert_eq!(CqlVarint::from(0i64).as_be_bytes(), &[0x00]);
        assert_eq!(CqlVarint::from(-1i64).as_be_bytes(), &[0xFF]);
        assert_eq!(CqlVarint::from(127i64).as_be_bytes(), &[0x7F]);
        assert_eq!(CqlVarint::from(128i64).as_be_bytes(), &[0x00, 0x80]);
        assert_eq!(CqlVarint::from(-128i64).as_be_bytes(), &[0x80]);
        assert_eq!(CqlVarint::from(-129i64).as_be_bytes(), &[0xFF, 0x7F]);
    }

    #[test]
    fn decimal_preserves_scale() {
        let decimal = CqlDecimal::new(4, CqlVarint::from(31_4159i64));
        roundtrip(CqlValue::Decimal(decimal.clone()), CqlType::Decimal);
        assert_eq!(decimal.scale(), 4);
    }

    #[test]
    fn date_bias() {
        let epoch = CqlValue::Date(NaiveDate::from_ymd(1970, 1, 1));
        let cell = epoch.encode_new().unwrap();
        assert_eq!(&cell[4..], &[0x80, 0x00, 0x00, 0x00]);
        let before = CqlValue::Date(NaiveDate::from_ymd(1969, 12, 31));
        let cell = before.encode_new().unwrap();
        assert_eq!(&cell[4..], &[0x7F, 0xFF, 0xFF, 0xFF]);
        roundtrip(epoch, CqlType::Date);
        roundtrip(before, CqlType::Date);
    }

    #[test]
    fn pre_epoch_timestamp() {
        let ts = CqlValue::Timestamp(NaiveDateTime::from_timestamp(-1, 750_000_000));
        roundtrip(ts.clone(), CqlType::Timestamp);
        let cell = ts.encode_new().unwrap();
        assert_eq!(i64::from_be_bytes(cell[4..].try_into().unwrap()), -250);
    }

    #[test]
    fn collection_roundtrips() {
        roundtrip(
            CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2), CqlValue::Int(3)]),
            CqlType::List(Box::new(CqlType::Int)),
        );
        roundtrip(
            CqlValue::Set(vec![CqlValue::Varchar("a".to_owned()), CqlValue::Varchar("b".to_owned())]),
            CqlType::Set(Box::new(CqlType::Varchar)),
        );
        roundtrip(
            CqlValue::Map(vec![
                (CqlValue::Varchar("k".to_owned()), CqlValue::Bigint(1)),
                (CqlValue::Varchar("v".to_owned()), CqlValue::Bigint(2)),
            ]),
            CqlType::Map(Box::new(CqlType::Varchar), Box::new(CqlType::Bigint)),
        );
        roundtrip(
            CqlValue::Tuple(vec![CqlValue::Int(7), CqlValue::Null, CqlValue::Varchar("x".to_owned())]),
            CqlType::Tuple(vec![CqlType::Int, CqlType::Double, CqlType::Varchar]),
        );
        roundtrip(
            CqlValue::Udt(vec![
                ("street".to_owned(), CqlValue::Varchar("main".to_owned())),
                ("zip".to_owned(), CqlValue::Int(12345)),
            ]),
            CqlType::Udt {
                keyspace: "ks".to_owned(),
                name: "address".to_owned(),
                fields: vec![("street".to_owned(), CqlType::Varchar), ("zip".to_owned(), CqlType::Int)],
            },
        );
    }

    #[test]
    fn type_mismatch_is_rejected() {
        assert!(CqlValue::Int(1).check(&CqlType::Bigint).is_err());
        assert!(CqlValue::Varchar("x".to_owned()).check(&CqlType::Blob).is_err());
        assert!(CqlValue::List(vec![CqlValue::Int(1)])
            .check(&CqlType::List(Box::new(CqlType::Varchar)))
            .is_err());
    }

    #[test]
    fn nested_unset_is_rejected() {
        let list = CqlValue::List(vec![CqlValue::Unset]);
        assert!(matches!(list.encode_new(), Err(ValueEncodeError::NestedUnset)));
    }

    #[test]
    fn null_and_unset_cells() {
        assert_eq!(CqlValue::Null.encode_new().unwrap(), (-1i32).to_be_bytes());
        assert_eq!(CqlValue::Unset.encode_new().unwrap(), (-2i32).to_be_bytes());
    }
}
