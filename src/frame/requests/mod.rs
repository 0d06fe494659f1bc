// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the version 3/4 request frame protocol.
//! See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec` for more details.

pub mod auth_response;
pub mod batch;
pub mod batch_flags;
pub mod execute;
pub mod options;
pub mod prepare;
pub mod query;
pub mod query_flags;
pub mod register;
pub mod startup;

use super::*;
use crate::compression::Compression;
use derive_builder::Builder;
use derive_more::{
    From,
    TryInto,
};
use std::convert::TryFrom;
use super::header::ProtocolVersion;
use thiserror::Error;

/// Possible request frame bodies.
#[derive(Clone, Debug, From, TryInto)]
#[allow(missing_docs)]
pub enum RequestBody {
    Startup(StartupFrame),
    Options(OptionsFrame),
    Query(QueryFrame),
    Prepare(PrepareFrame),
    Execute(ExecuteFrame),
    Register(RegisterFrame),
    Batch(BatchFrame),
    AuthResponse(AuthResponseFrame),
}

impl RequestBody {
    /// Get the frame type's opcode.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Startup(_) => opcode::STARTUP,
            Self::Options(_) => opcode::OPTIONS,
            Self::Query(_) => opcode::QUERY,
            Self::Prepare(_) => opcode::PREPARE,
            Self::Execute(_) => opcode::EXECUTE,
            Self::Register(_) => opcode::REGISTER,
            Self::Batch(_) => opcode::BATCH,
            Self::AuthResponse(_) => opcode::AUTH_RESPONSE,
        }
    }
}

impl ToPayload for RequestBody {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self {
            Self::Startup(frame) => frame.to_payload(payload),
            Self::Query(frame) => frame.to_payload(payload),
            Self::Prepare(frame) => frame.to_payload(payload),
            Self::Execute(frame) => frame.to_payload(payload),
            Self::Batch(frame) => frame.to_payload(payload),
            Self::AuthResponse(frame) => frame.to_payload(payload),
            Self::Register(frame) => frame.to_payload(payload),
            Self::Options(_) => (),
        }
    }
}

/// A request frame, which contains a [`Header`] and a [`RequestBody`].
#[derive(Clone, Debug)]
pub struct RequestFrame {
    pub(crate) header: Header,
    pub(crate) body: RequestBody,
}

impl<T: Into<RequestBody>> From<T> for RequestFrame {
    fn from(body: T) -> Self {
        let body = body.into();
        Self {
            header: Header::from_opcode(body.opcode()),
            body,
        }
    }
}

impl Deref for RequestFrame {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl TryFrom<&[u8]> for RequestFrame {
    type Error = FrameError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        RequestFrame::from_payload(&mut 0, payload).map_err(FrameError::InvalidFrame)
    }
}

impl FromPayload for RequestFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let header = Header::from_payload(start, payload)?;
        let body = match header.opcode() {
            opcode::STARTUP => {
                RequestBody::Startup(StartupFrame::from_payload(start, payload).map_err(FrameError::InvalidBody)?)
            }
            opcode::OPTIONS => RequestBody::Options(OptionsFrame),
            opcode::QUERY => {
                RequestBody::Query(QueryFrame::from_payload(start, payload).map_err(FrameError::InvalidBody)?)
            }
            opcode::PREPARE => {
                RequestBody::Prepare(PrepareFrame::from_payload(start, payload).map_err(FrameError::InvalidBody)?)
            }
            opcode::EXECUTE => {
                RequestBody::Execute(ExecuteFrame::from_payload(start, payload).map_err(FrameError::InvalidBody)?)
            }
            opcode::REGISTER => {
                RequestBody::Register(RegisterFrame::from_payload(start, payload).map_err(FrameError::InvalidBody)?)
            }
            opcode::BATCH => {
                RequestBody::Batch(BatchFrame::from_payload(start, payload).map_err(FrameError::InvalidBody)?)
            }
            opcode::AUTH_RESPONSE => RequestBody::AuthResponse(
                AuthResponseFrame::from_payload(start, payload).map_err(FrameError::InvalidBody)?,
            ),
            c => anyhow::bail!("Unknown request frame opcode: {}", c),
        };
        Ok(Self { header, body })
    }
}

impl ToPayload for RequestFrame {
    fn to_payload(mut self, payload: &mut Vec<u8>) {
        // First write the body to a separate buffer so that we can determine its length
        let mut body_buf = Vec::new();
        self.body.to_payload(&mut body_buf);

        // Set the length on the header
        self.header.set_body_len(body_buf.len() as u32);

        // Finally write the header and body
        self.header.to_payload(payload);
        payload.extend(body_buf);
    }
}

impl RequestFrame {
    /// Get the frame body.
    pub fn body(&self) -> &RequestBody {
        &self.body
    }
    /// Consume the frame and get the body.
    pub fn into_body(self) -> RequestBody {
        self.body
    }
    /// Set the protocol version to send this frame with.
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        *self.header.version_mut() = header::Version::request(version);
        self
    }
    /// Set the stream id for this frame.
    pub fn with_stream(mut self, stream: i16) -> Self {
        self.header.set_stream(stream);
        self
    }
    /// Serialize the header and body into a payload.
    pub fn build_payload(self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.to_payload(&mut payload);
        payload
    }
    /// Serialize this frame and apply a given compression.
    pub fn encode<C: Compression>(self) -> Result<Vec<u8>, FrameError> {
        Ok(C::compress(self.build_payload())?)
    }
}

/// A single bound value, as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// A value with its encoded bytes
    Set(Vec<u8>),
    /// A null value (length -1)
    Null,
    /// A not-set value (length -2), leaving any existing cell unchanged
    Unset,
}

impl FromPayload for Value {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let length = read_int(start, payload)?;
        match length {
            -1 => Ok(Value::Null),
            -2 => Ok(Value::Unset),
            l if l < 0 => anyhow::bail!("Invalid value length: {}", l),
            _ => {
                anyhow::ensure!(payload.len() >= *start + length as usize, "Not enough bytes for value");
                let res = Value::Set(payload[*start..][..length as usize].to_vec());
                *start += length as usize;
                Ok(res)
            }
        }
    }
}

impl ToPayload for Value {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self {
            Value::Set(value) => {
                payload.extend((value.len() as i32).to_be_bytes());
                payload.extend_from_slice(&value);
            }
            Value::Null => {
                payload.extend(i32::to_be_bytes(-1));
            }
            Value::Unset => {
                payload.extend(i32::to_be_bytes(-2));
            }
        }
    }
}

/// A pre-serialized list of bound values. Values (and their optional names)
/// are stored back to back in one buffer; the view records their offsets.
#[derive(Default, Clone)]
pub struct Values {
    buffer: Vec<u8>,
    view: Vec<ValueRef>,
}

#[derive(Copy, Clone, Debug)]
struct ValueRef {
    name_start: usize,
    name_len: usize,
    value_start: usize,
    value_len: usize,
}

impl Values {
    /// Get the serialized values buffer.
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the name and serialized bytes of the value at the given index.
    pub fn get(&self, idx: usize) -> Option<(Option<&str>, &[u8])> {
        self.view.get(idx).map(|r| {
            let name = (r.name_len > 0)
                .then(|| std::str::from_utf8(&self.buffer[r.name_start..][..r.name_len]).ok())
                .flatten();
            (name, &self.buffer[r.value_start..][..r.value_len])
        })
    }

    /// Push a serialized value with an optional name.
    pub fn push(&mut self, name: Option<&str>, value: &[u8]) {
        let (name_start, name_len) = self.push_name(name);
        let value_start = self.buffer.len();
        self.buffer.extend_from_slice(value);
        self.view.push(ValueRef {
            name_start,
            name_len,
            value_start,
            value_len: value.len(),
        });
    }

    /// Push a null value with an optional name.
    pub fn push_null(&mut self, name: Option<&str>) {
        let (name_start, name_len) = self.push_name(name);
        let value_start = self.buffer.len();
        write_int(-1, &mut self.buffer);
        self.view.push(ValueRef {
            name_start,
            name_len,
            value_start,
            value_len: 4,
        });
    }

    /// Push an unset value with an optional name.
    pub fn push_unset(&mut self, name: Option<&str>) {
        let (name_start, name_len) = self.push_name(name);
        let value_start = self.buffer.len();
        write_int(-2, &mut self.buffer);
        self.view.push(ValueRef {
            name_start,
            name_len,
            value_start,
            value_len: 4,
        });
    }

    fn push_name(&mut self, name: Option<&str>) -> (usize, usize) {
        match name {
            Some(name) => {
                let name_start = self.buffer.len() + 2;
                write_string(name, &mut self.buffer);
                (name_start, name.len())
            }
            None => (0, 0),
        }
    }

    /// Iterate the values with their optional names.
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &[u8])> + '_ {
        (0..self.view.len()).filter_map(move |idx| self.get(idx))
    }

    /// Get the number of values.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Check whether no values were bound.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Check whether any value carries a name.
    pub fn has_names(&self) -> bool {
        self.view.iter().any(|r| r.name_len > 0)
    }
}

impl Debug for Values {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Values").field(&self.iter().collect::<Vec<_>>()).finish()
    }
}

/// Read positional values from a payload.
pub fn read_values(start: &mut usize, payload: &[u8]) -> anyhow::Result<Values> {
    let values_count = read_short(start, payload)? as usize;
    let mut values = Values::default();
    for _ in 0..values_count {
        match Value::from_payload(start, payload)? {
            Value::Set(bytes) => {
                let mut cell = Vec::with_capacity(bytes.len() + 4);
                write_bytes(&bytes, &mut cell);
                values.push(None, &cell);
            }
            Value::Null => values.push_null(None),
            Value::Unset => values.push_unset(None),
        }
    }
    Ok(values)
}

/// Read named values from a payload.
pub fn read_named_values(start: &mut usize, payload: &[u8]) -> anyhow::Result<Values> {
    let values_count = read_short(start, payload)? as usize;
    let mut values = Values::default();
    for _ in 0..values_count {
        let name = read_string(start, payload)?;
        match Value::from_payload(start, payload)? {
            Value::Set(bytes) => {
                let mut cell = Vec::with_capacity(bytes.len() + 4);
                write_bytes(&bytes, &mut cell);
                values.push(Some(&name), &cell);
            }
            Value::Null => values.push_null(Some(&name)),
            Value::Unset => values.push_unset(Some(&name)),
        }
    }
    Ok(values)
}
