// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the version 3/4 Cassandra native frame protocol.
//! See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec` for more details.

pub mod bind;
pub mod consistency;
pub mod cql_type;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod opcode;
pub mod requests;
pub mod responses;
pub mod value;

pub use self::{
    requests::{
        auth_response::*,
        batch::*,
        batch_flags::*,
        execute::*,
        options::*,
        prepare::*,
        query::*,
        query_flags::*,
        register::*,
        startup::*,
        *,
    },
    responses::{
        auth_challenge::*,
        auth_success::*,
        authenticate::*,
        error::*,
        event::*,
        ready::*,
        result::*,
        supported::*,
        *,
    },
};
use crate::compression::CompressionError;
pub use bind::*;
pub use consistency::Consistency;
use core::fmt::Debug;
pub use cql_type::CqlType;
pub use decoder::ColumnDecoder;
pub use encoder::{
    ColumnEncoder,
    Null,
    Unset,
};
pub use header::{
    Header,
    ProtocolVersion,
};
pub use opcode::OpCode;
use std::{
    collections::HashMap,
    convert::TryInto,
    net::{
        IpAddr,
        SocketAddr,
    },
    ops::{
        Deref,
        DerefMut,
    },
};
use thiserror::Error;
use uuid::Uuid;
pub use value::{
    CqlDecimal,
    CqlDuration,
    CqlValue,
    CqlVarint,
    ValueEncodeError,
};

/// The protocol mandates that no frame body may exceed 256 MiB; receivers
/// usually enforce a lower configured ceiling.
pub const MAX_FRAME_LENGTH: u32 = 256 * 1024 * 1024;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Invalid frame opcode. Expected {0:x}, got {1:x}")]
    WrongHeaderOpcode(u8, u8),
    #[error("Invalid frame header: {0}")]
    InvalidHeader(anyhow::Error),
    #[error("Invalid frame body: {0}")]
    InvalidBody(anyhow::Error),
    #[error("Invalid frame: {0}")]
    InvalidFrame(anyhow::Error),
    #[error("Payload is too small")]
    TooSmall,
    #[error("Frame body length {0} exceeds the maximum of {1}")]
    Oversized(u32, u32),
    #[error("Unknown frame flags: {0:#x}")]
    UnknownFlags(u8),
    #[error(transparent)]
    CompressionError(#[from] CompressionError),
}

/// A wrapper for a `Vec<u8>` that can be used to encode and decode values as the `blob` CQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

#[allow(missing_docs)]
impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Blob(data)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Blob {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Blob {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self {
        Blob(v)
    }
}

/// Read a `[string]` from a payload into an owned String.
///
/// `[string]`: A `[short]` n, followed by n bytes representing a UTF-8 string.
pub fn read_string(start: &mut usize, payload: &[u8]) -> anyhow::Result<String> {
    Ok(read_str(start, payload)?.to_owned())
}

/// Read a `[long string]` from a payload into an owned String.
///
/// `[long string]`: An `[int]` n, followed by n bytes representing a UTF-8 string.
pub fn read_long_string(start: &mut usize, payload: &[u8]) -> anyhow::Result<String> {
    Ok(read_long_str(start, payload)?.to_owned())
}

/// Read a `[string]` from a payload into a borrowed str.
///
/// `[string]`: A `[short]` n, followed by n bytes representing a UTF-8 string.
pub fn read_str<'a>(start: &mut usize, payload: &'a [u8]) -> anyhow::Result<&'a str> {
    let length = read_short(start, payload)? as usize;
    anyhow::ensure!(payload.len() >= *start + length, "Not enough bytes for string");
    let res = std::str::from_utf8(&payload[*start..][..length])?;
    *start += length;
    Ok(res)
}

/// Read a `[long string]` from a payload into a borrowed str.
///
/// `[long string]`: An `[int]` n, followed by n bytes representing a UTF-8 string.
pub fn read_long_str<'a>(start: &mut usize, payload: &'a [u8]) -> anyhow::Result<&'a str> {
    let length = read_int(start, payload)?;
    anyhow::ensure!(length >= 0, "Invalid long string length: {}", length);
    anyhow::ensure!(
        payload.len() >= *start + length as usize,
        "Not enough bytes for string"
    );
    let res = std::str::from_utf8(&payload[*start..][..length as usize])?;
    *start += length as usize;
    Ok(res)
}

/// Write a `[string]` to a payload.
///
/// The length field counts BYTES of the UTF-8 encoding, never code points.
pub fn write_string(s: &str, payload: &mut Vec<u8>) {
    payload.extend((s.len() as u16).to_be_bytes());
    payload.extend(s.as_bytes());
}

/// Write a `[long string]` to a payload.
pub fn write_long_string(s: &str, payload: &mut Vec<u8>) {
    payload.extend((s.len() as i32).to_be_bytes());
    payload.extend(s.as_bytes());
}

/// Read a `[byte]` from a payload into a `u8`.
pub fn read_byte(start: &mut usize, payload: &[u8]) -> anyhow::Result<u8> {
    anyhow::ensure!(payload.len() > *start, "Not enough bytes");
    let res = payload[*start];
    *start += 1;
    Ok(res)
}

/// Write a `[byte]` to a payload.
pub fn write_byte(b: u8, payload: &mut Vec<u8>) {
    payload.push(b);
}

/// Read a `[short]` from a payload into a u16.
///
/// `[short]`: A 2 bytes unsigned integer
pub fn read_short(start: &mut usize, payload: &[u8]) -> anyhow::Result<u16> {
    anyhow::ensure!(payload.len() >= *start + 2, "Not enough bytes for short");
    let res = u16::from_be_bytes(payload[*start..][..2].try_into()?);
    *start += 2;
    Ok(res)
}

/// Write a `[short]` to a payload.
pub fn write_short(v: u16, payload: &mut Vec<u8>) {
    payload.extend(v.to_be_bytes());
}

/// Read an `[int]` from a payload into an i32.
pub fn read_int(start: &mut usize, payload: &[u8]) -> anyhow::Result<i32> {
    anyhow::ensure!(payload.len() >= *start + 4, "Not enough bytes for int");
    let res = i32::from_be_bytes(payload[*start..][..4].try_into()?);
    *start += 4;
    Ok(res)
}

/// Write an `[int]` to a payload.
pub fn write_int(v: i32, payload: &mut Vec<u8>) {
    payload.extend(v.to_be_bytes());
}

/// Read a `[long]` from a payload into an i64.
pub fn read_long(start: &mut usize, payload: &[u8]) -> anyhow::Result<i64> {
    anyhow::ensure!(payload.len() >= *start + 8, "Not enough bytes for long");
    let res = i64::from_be_bytes(payload[*start..][..8].try_into()?);
    *start += 8;
    Ok(res)
}

/// Write a `[long]` to a payload.
pub fn write_long(v: i64, payload: &mut Vec<u8>) {
    payload.extend(v.to_be_bytes());
}

/// Read a `[bytes]` from a payload into a borrowed slice.
///
/// `[bytes]`: An `[int]` n, followed by n bytes if `n >= 0`. If `n == -1`, no
/// byte follows and the value represented is `null`.
pub fn read_bytes<'a>(start: &mut usize, payload: &'a [u8]) -> anyhow::Result<Option<&'a [u8]>> {
    let length = read_int(start, payload)?;
    if length < 0 {
        anyhow::ensure!(length == -1, "Invalid bytes length: {}", length);
        return Ok(None);
    }
    anyhow::ensure!(payload.len() >= *start + length as usize, "Not enough bytes");
    let res = &payload[*start..][..length as usize];
    *start += length as usize;
    Ok(Some(res))
}

/// Write a `[bytes]` to a payload.
pub fn write_bytes(b: &[u8], payload: &mut Vec<u8>) {
    payload.extend((b.len() as i32).to_be_bytes());
    payload.extend(b);
}

/// Write a null `[bytes]` (length -1) to a payload.
pub fn write_null_bytes(payload: &mut Vec<u8>) {
    payload.extend(i32::to_be_bytes(-1));
}

/// Read a `[short bytes]` from a payload into a borrowed slice.
///
/// `[short bytes]`: A `[short]` n, followed by n bytes.
pub fn read_short_bytes<'a>(start: &mut usize, payload: &'a [u8]) -> anyhow::Result<&'a [u8]> {
    let length = read_short(start, payload)? as usize;
    anyhow::ensure!(payload.len() >= *start + length, "Not enough bytes");
    let res = &payload[*start..][..length];
    *start += length;
    Ok(res)
}

/// Write a `[short bytes]` to a payload.
pub fn write_short_bytes(b: &[u8], payload: &mut Vec<u8>) {
    payload.extend((b.len() as u16).to_be_bytes());
    payload.extend(b);
}

/// Read a `[uuid]` (16 raw bytes) from a payload.
pub fn read_uuid(start: &mut usize, payload: &[u8]) -> anyhow::Result<Uuid> {
    anyhow::ensure!(payload.len() >= *start + 16, "Not enough bytes for uuid");
    let res = Uuid::from_slice(&payload[*start..][..16])?;
    *start += 16;
    Ok(res)
}

/// Write a `[uuid]` to a payload.
pub fn write_uuid(uuid: Uuid, payload: &mut Vec<u8>) {
    payload.extend(uuid.as_bytes());
}

/// Read a `[string list]` from a payload into a `Vec<String>`.
///
/// `[string list]`: A `[short]` n, followed by n `[string]`.
pub fn read_string_list(start: &mut usize, payload: &[u8]) -> anyhow::Result<Vec<String>> {
    let list_len = read_short(start, payload)? as usize;
    let mut list = Vec::with_capacity(list_len);
    for _ in 0..list_len {
        list.push(read_string(start, payload)?);
    }
    Ok(list)
}

/// Write a `[string list]` to a payload.
pub fn write_string_list(l: &[String], payload: &mut Vec<u8>) {
    payload.extend((l.len() as u16).to_be_bytes());
    for s in l {
        write_string(s, payload);
    }
}

/// Read a list of any type that can be read from a payload into a `Vec<T>`.
/// Uses `[short]` for the length of the list.
pub fn read_list<T: FromPayload>(start: &mut usize, payload: &[u8]) -> anyhow::Result<Vec<T>> {
    let list_len = read_short(start, payload)? as usize;
    let mut list = Vec::with_capacity(list_len);
    for _ in 0..list_len {
        list.push(T::from_payload(start, payload)?);
    }
    Ok(list)
}

/// Write a list of any type that can be written to a payload.
/// Uses `[short]` for the length of the list.
pub fn write_list<T: ToPayload>(l: Vec<T>, payload: &mut Vec<u8>) {
    payload.extend((l.len() as u16).to_be_bytes());
    for v in l {
        T::to_payload(v, payload);
    }
}

/// Read a `[string map]` from a payload into a `HashMap<String, String>`.
///
/// `[string map]`: A `[short]` n, followed by n pair `<k><v>` where `<k>` and `<v>` are `[string]`.
pub fn read_string_map(start: &mut usize, payload: &[u8]) -> anyhow::Result<HashMap<String, String>> {
    let length = read_short(start, payload)? as usize;
    let mut map = HashMap::with_capacity(length);
    for _ in 0..length {
        map.insert(read_string(start, payload)?, read_string(start, payload)?);
    }
    Ok(map)
}

/// Write a `[string map]` to a payload.
pub fn write_string_map(m: &HashMap<String, String>, payload: &mut Vec<u8>) {
    payload.extend((m.len() as u16).to_be_bytes());
    for (k, v) in m {
        write_string(k, payload);
        write_string(v, payload);
    }
}

/// Read a `[string multimap]` from a payload into a `HashMap<String, Vec<String>>`.
///
/// `[string multimap]`: A `[short]` n, followed by n pair `<k><v>` where `<k>` is a `[string]` and
/// `<v>` is a `[string list]`.
pub fn read_string_multimap(start: &mut usize, payload: &[u8]) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let length = read_short(start, payload)? as usize;
    let mut multimap = HashMap::with_capacity(length);
    for _ in 0..length {
        multimap.insert(read_string(start, payload)?, read_string_list(start, payload)?);
    }
    Ok(multimap)
}

/// Write a `[string multimap]` to a payload.
pub fn write_string_multimap(m: &HashMap<String, Vec<String>>, payload: &mut Vec<u8>) {
    payload.extend((m.len() as u16).to_be_bytes());
    for (k, v) in m {
        write_string(k, payload);
        write_string_list(v, payload);
    }
}

/// Read a `[bytes map]` from a payload into a `HashMap<String, Vec<u8>>`.
///
/// `[bytes map]`: A `[short]` n, followed by n pair `<k><v>` where `<k>` is a `[string]` and
/// `<v>` is a `[bytes]`. Null values decode as empty.
pub fn read_bytes_map(start: &mut usize, payload: &[u8]) -> anyhow::Result<HashMap<String, Vec<u8>>> {
    let length = read_short(start, payload)? as usize;
    let mut map = HashMap::with_capacity(length);
    for _ in 0..length {
        let key = read_string(start, payload)?;
        let value = read_bytes(start, payload)?.unwrap_or_default().to_vec();
        map.insert(key, value);
    }
    Ok(map)
}

/// Write a `[bytes map]` to a payload.
pub fn write_bytes_map(m: &HashMap<String, Vec<u8>>, payload: &mut Vec<u8>) {
    payload.extend((m.len() as u16).to_be_bytes());
    for (k, v) in m {
        write_string(k, payload);
        write_bytes(v, payload);
    }
}

/// Read an `[inet]` from a payload into a `SocketAddr`.
///
/// `[inet]`: One `[byte]` n that represents the address size, followed by n
/// `[byte]` representing the IP address (n is either 4 or 16), followed by one
/// `[int]` representing the port.
pub fn read_inet(start: &mut usize, payload: &[u8]) -> anyhow::Result<SocketAddr> {
    let address_len = read_byte(start, payload)? as usize;
    let ip = read_ip_addr(start, payload, address_len)?;
    let port = read_int(start, payload)?;
    Ok(SocketAddr::new(ip, port as u16))
}

/// Write an `[inet]` to a payload.
pub fn write_inet(a: SocketAddr, payload: &mut Vec<u8>) {
    match a.ip() {
        IpAddr::V4(ip) => {
            payload.push(4u8);
            payload.extend(ip.octets());
        }
        IpAddr::V6(ip) => {
            payload.push(16u8);
            payload.extend(ip.octets());
        }
    }
    payload.extend((a.port() as i32).to_be_bytes());
}

fn read_ip_addr(start: &mut usize, payload: &[u8], address_len: usize) -> anyhow::Result<IpAddr> {
    anyhow::ensure!(
        payload.len() >= *start + address_len,
        "Not enough bytes for inet address"
    );
    let ip = match address_len {
        4 => IpAddr::V4(u32::from_be_bytes(payload[*start..][..4].try_into()?).into()),
        16 => IpAddr::V6(u128::from_be_bytes(payload[*start..][..16].try_into()?).into()),
        n => anyhow::bail!("Invalid inet address length: {}", n),
    };
    *start += address_len;
    Ok(ip)
}

/// Read a prepared statement id (`[short bytes]`, opaque to the client) from a payload.
pub fn read_prepared_id(start: &mut usize, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    anyhow::ensure!(!payload[*start..].is_empty(), "Not enough bytes for prepared id");
    Ok(read_short_bytes(start, payload)?.to_vec())
}

/// Write a prepared statement id to a payload.
pub fn write_prepared_id(id: &[u8], payload: &mut Vec<u8>) {
    write_short_bytes(id, payload);
}

/// Defines a type that can be read from a frame payload.
pub trait FromPayload: Sized {
    /// Read this value from a frame payload. This method should read the payload beginning with the given `start`
    /// index, and update it by adding the number of bytes read.
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self>;
}

impl FromPayload for String {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        read_string(start, payload)
    }
}

impl FromPayload for SocketAddr {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        read_inet(start, payload)
    }
}

/// Defines a type that can be written to a frame payload.
pub trait ToPayload {
    /// Write this value to a frame payload.
    fn to_payload(self, payload: &mut Vec<u8>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_length_is_byte_count() {
        let s = "Hello World برای همه";
        let mut payload = Vec::new();
        write_string(s, &mut payload);
        assert_eq!(
            u16::from_be_bytes(payload[0..2].try_into().unwrap()) as usize,
            s.as_bytes().len()
        );
        assert_ne!(s.as_bytes().len(), s.chars().count());
        let decoded = read_string(&mut 0, &payload).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn bytes_null_and_empty_are_distinct() {
        let mut payload = Vec::new();
        write_null_bytes(&mut payload);
        write_bytes(&[], &mut payload);
        let mut start = 0;
        assert_eq!(read_bytes(&mut start, &payload).unwrap(), None);
        assert_eq!(read_bytes(&mut start, &payload).unwrap(), Some(&[][..]));
    }

    #[test]
    fn inet_roundtrip_includes_port() {
        let addrs: [SocketAddr; 2] = [([127, 0, 0, 1], 9042).into(), "[2001:db8::1]:19042".parse().unwrap()];
        for addr in addrs {
            let mut payload = Vec::new();
            write_inet(addr, &mut payload);
            assert_eq!(read_inet(&mut 0, &payload).unwrap(), addr);
        }
    }

    #[test]
    fn truncated_reads_fail() {
        assert!(read_string(&mut 0, &[0, 5, b'a']).is_err());
        assert!(read_int(&mut 0, &[0, 0]).is_err());
        assert!(read_uuid(&mut 0, &[0; 8]).is_err());
    }

    #[test]
    fn multimap_roundtrip() {
        let mut m = HashMap::new();
        m.insert("CQL_VERSION".to_owned(), vec!["3.0.0".to_owned(), "3.4.5".to_owned()]);
        m.insert("COMPRESSION".to_owned(), vec!["lz4".to_owned(), "snappy".to_owned()]);
        let mut payload = Vec::new();
        write_string_multimap(&m, &mut payload);
        assert_eq!(read_string_multimap(&mut 0, &payload).unwrap(), m);
    }
}
