// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the column value decoder.

use super::{
    value::{
        read_vint,
        CqlDecimal,
        CqlDuration,
        CqlVarint,
    },
    Blob,
};
use anyhow::anyhow;
use chrono::{
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
};
use std::{
    collections::HashMap,
    convert::TryInto,
    hash::Hash,
    net::{
        IpAddr,
        Ipv4Addr,
        Ipv6Addr,
    },
};
use uuid::Uuid;

/// The column decoder trait. Decodes a single cell whose length prefix has
/// already been stripped.
pub trait ColumnDecoder {
    /// Decode the column.
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self>
    where
        Self: Sized;
}

impl<T: ColumnDecoder> ColumnDecoder for Option<T> {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        if slice.is_empty() {
            Ok(None)
        } else {
            T::try_decode_column(slice).map(Into::into)
        }
    }
}

macro_rules! impl_integer_decoder {
    ($t:ty) => {
        impl ColumnDecoder for $t {
            fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
                Ok(<$t>::from_be_bytes(slice.try_into()?))
            }
        }
    };
}

impl_integer_decoder!(i64);
impl_integer_decoder!(u64);
impl_integer_decoder!(i32);
impl_integer_decoder!(u32);
impl_integer_decoder!(i16);
impl_integer_decoder!(u16);
impl_integer_decoder!(i8);
impl_integer_decoder!(f64);
impl_integer_decoder!(f32);

impl ColumnDecoder for u8 {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(slice.len() == 1, "Invalid tinyint length: {}", slice.len());
        Ok(slice[0])
    }
}

impl ColumnDecoder for bool {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(slice.len() == 1, "Invalid boolean length: {}", slice.len());
        Ok(slice[0] != 0)
    }
}

impl ColumnDecoder for String {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(String::from_utf8(slice.to_vec())?)
    }
}

impl ColumnDecoder for Uuid {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(Uuid::from_slice(slice)?)
    }
}

impl ColumnDecoder for IpAddr {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(if slice.len() == 4 {
            IpAddr::V4(Ipv4Addr::try_decode_column(slice)?)
        } else {
            IpAddr::V6(Ipv6Addr::try_decode_column(slice)?)
        })
    }
}

impl ColumnDecoder for Ipv4Addr {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let octets: [u8; 4] = slice.try_into()?;
        Ok(Ipv4Addr::from(octets))
    }
}

impl ColumnDecoder for Ipv6Addr {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let octets: [u8; 16] = slice.try_into()?;
        Ok(Ipv6Addr::from(octets))
    }
}

impl ColumnDecoder for Blob {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(Blob(slice.to_vec()))
    }
}

impl<E> ColumnDecoder for Vec<E>
where
    E: ColumnDecoder,
{
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(slice.len() >= 4, "Not enough bytes for list length");
        let list_len = i32::from_be_bytes(slice[0..4].try_into()?);
        anyhow::ensure!(list_len >= 0, "Invalid list length: {}", list_len);
        let mut list: Vec<E> = Vec::with_capacity(list_len as usize);
        let mut element_start = 4;
        for _ in 0..list_len {
            anyhow::ensure!(
                slice.len() >= element_start + 4,
                "Not enough bytes for list element length"
            );
            let length = i32::from_be_bytes(slice[element_start..][..4].try_into()?);
            element_start += 4;
            if length > 0 {
                anyhow::ensure!(
                    slice.len() >= element_start + length as usize,
                    "Not enough bytes for list element"
                );
                list.push(E::try_decode_column(&slice[element_start..][..length as usize])?);
                element_start += length as usize;
            } else {
                list.push(E::try_decode_column(&[])?);
            }
        }
        Ok(list)
    }
}

impl<K, V, S> ColumnDecoder for HashMap<K, V, S>
where
    K: Eq + Hash + ColumnDecoder,
    V: ColumnDecoder,
    S: ::std::hash::BuildHasher + Default,
{
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(slice.len() >= 4, "Not enough bytes for map length");
        let map_len = i32::from_be_bytes(slice[0..4].try_into()?);
        anyhow::ensure!(map_len >= 0, "Invalid map length: {}", map_len);
        let mut map: HashMap<K, V, S> = HashMap::default();
        let mut pair_start = 4;
        for _ in 0..map_len {
            let k = decode_cell(slice, &mut pair_start)?;
            let v = decode_cell(slice, &mut pair_start)?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

fn decode_cell<T: ColumnDecoder>(slice: &[u8], start: &mut usize) -> anyhow::Result<T> {
    anyhow::ensure!(slice.len() >= *start + 4, "Not enough bytes for cell length");
    let length = i32::from_be_bytes(slice[*start..][..4].try_into()?);
    *start += 4;
    if length > 0 {
        anyhow::ensure!(slice.len() >= *start + length as usize, "Not enough bytes for cell");
        let res = T::try_decode_column(&slice[*start..][..length as usize])?;
        *start += length as usize;
        Ok(res)
    } else {
        T::try_decode_column(&[])
    }
}

macro_rules! impl_tuple_decoder {
    ($($t:tt),*) => {
        impl<$($t: ColumnDecoder),*> ColumnDecoder for ($($t,)*) {
            fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
                let mut start = 0;
                let res = ($(
                    decode_cell::<$t>(slice, &mut start)?,
                )*);
                Ok(res)
            }
        }
    };
}

impl_tuple_decoder!(T1);
impl_tuple_decoder!(T1, T2);
impl_tuple_decoder!(T1, T2, T3);
impl_tuple_decoder!(T1, T2, T3, T4);
impl_tuple_decoder!(T1, T2, T3, T4, T5);
impl_tuple_decoder!(T1, T2, T3, T4, T5, T6);
impl_tuple_decoder!(T1, T2, T3, T4, T5, T6, T7);
impl_tuple_decoder!(T1, T2, T3, T4, T5, T6, T7, T8);

impl ColumnDecoder for NaiveDate {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let raw = u32::from_be_bytes(slice.try_into()?);
        let num_days = raw as i64 - (1i64 << 31);
        let epoch = NaiveDate::from_ymd(1970, 1, 1);
        epoch
            .checked_add_signed(chrono::Duration::days(num_days))
            .ok_or_else(|| anyhow!("Date overflows the supported range"))
    }
}

impl ColumnDecoder for NaiveTime {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let nanos = i64::from_be_bytes(slice.try_into()?);
        anyhow::ensure!(
            (0..86_400_000_000_000).contains(&nanos),
            "Time value out of range: {}",
            nanos
        );
        let (secs, nanos) = (nanos / 1_000_000_000, nanos % 1_000_000_000);
        Ok(NaiveTime::from_num_seconds_from_midnight(secs as u32, nanos as u32))
    }
}

impl ColumnDecoder for NaiveDateTime {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let millis = i64::from_be_bytes(slice.try_into()?);
        let (mut secs, mut millis_rem) = (millis / 1_000, millis % 1_000);
        if millis_rem < 0 {
            // pre-epoch timestamps carry a negative remainder
            secs -= 1;
            millis_rem += 1_000;
        }
        Ok(NaiveDateTime::from_timestamp(secs, millis_rem as u32 * 1_000_000))
    }
}

impl ColumnDecoder for CqlVarint {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(!slice.is_empty(), "Varint must be at least one byte");
        Ok(CqlVarint::from_be_bytes(slice.to_vec()))
    }
}

impl ColumnDecoder for CqlDecimal {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(slice.len() >= 5, "Not enough bytes for decimal");
        let scale = i32::from_be_bytes(slice[0..4].try_into()?);
        Ok(CqlDecimal::new(scale, CqlVarint::from_be_bytes(slice[4..].to_vec())))
    }
}

impl ColumnDecoder for CqlDuration {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let mut start = 0;
        let months = read_vint(&mut start, slice)?;
        let days = read_vint(&mut start, slice)?;
        let nanoseconds = read_vint(&mut start, slice)?;
        anyhow::ensure!(start == slice.len(), "Trailing bytes after duration");
        Ok(CqlDuration {
            months: months.try_into()?,
            days: days.try_into()?,
            nanoseconds,
        })
    }
}
