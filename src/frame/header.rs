// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the 9-byte frame header.

use super::{
    FromPayload,
    ToPayload,
};
use std::convert::{
    TryFrom,
    TryInto,
};

/// The ignore flag.
pub const IGNORE: u8 = 0x00;
/// The compression flag.
pub const COMPRESSION: u8 = 0x01;
/// The tracing flag.
pub const TRACING: u8 = 0x02;
/// The custom payload flag.
pub const CUSTOM_PAYLOAD: u8 = 0x04;
/// The warning flag.
pub const WARNING: u8 = 0x08;
/// Mask of the flag bits defined by the protocol; anything outside it is rejected.
pub const KNOWN_FLAGS: u8 = COMPRESSION | TRACING | CUSTOM_PAYLOAD | WARNING;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Request = 0,
    Response = 1,
}

/// Protocol versions this crate speaks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProtocolVersion {
    V3 = 0x03,
    V4 = 0x04,
}

impl ProtocolVersion {
    /// Parse a version from the low bits of the header version byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x7f {
            0x03 => Some(Self::V3),
            0x04 => Some(Self::V4),
            _ => None,
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V4
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Version(pub(crate) u8);

impl Default for Version {
    fn default() -> Self {
        Self(ProtocolVersion::default() as u8)
    }
}

impl Version {
    pub fn request(protocol: ProtocolVersion) -> Self {
        Self(protocol as u8)
    }

    pub fn response(protocol: ProtocolVersion) -> Self {
        Self(protocol as u8 | 0x80)
    }

    /// The direction bit (high bit of the version byte).
    pub fn direction(&self) -> Direction {
        match self.0 & 0x80 {
            0 => Direction::Request,
            _ => Direction::Response,
        }
    }

    pub fn version(&self) -> u8 {
        self.0 & 0x7f
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Flags(pub(crate) u8);

impl Flags {
    pub fn compression(&self) -> bool {
        self.0 & COMPRESSION != 0
    }

    pub fn set_compression(&mut self, value: bool) {
        if value {
            self.0 |= COMPRESSION;
        } else {
            self.0 &= !COMPRESSION;
        }
    }

    pub fn tracing(&self) -> bool {
        self.0 & TRACING != 0
    }

    pub fn set_tracing(&mut self, value: bool) {
        if value {
            self.0 |= TRACING;
        } else {
            self.0 &= !TRACING;
        }
    }

    pub fn custom_payload(&self) -> bool {
        self.0 & CUSTOM_PAYLOAD != 0
    }

    pub fn set_custom_payload(&mut self, value: bool) {
        if value {
            self.0 |= CUSTOM_PAYLOAD;
        } else {
            self.0 &= !CUSTOM_PAYLOAD;
        }
    }

    pub fn warning(&self) -> bool {
        self.0 & WARNING != 0
    }

    pub fn set_warning(&mut self, value: bool) {
        if value {
            self.0 |= WARNING;
        } else {
            self.0 &= !WARNING;
        }
    }

    /// Get the flag bits the protocol does not define, if any are set.
    pub fn unknown(&self) -> Option<u8> {
        match self.0 & !KNOWN_FLAGS {
            0 => None,
            unknown => Some(unknown),
        }
    }
}

/// The fixed 9-byte frame header.
///
/// Stream ids are i16; negative ids are reserved for server-initiated frames
/// (events use -1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    version: Version,
    flags: Flags,
    stream: i16,
    opcode: u8,
    body_len: u32,
}

impl Header {
    pub fn direction(&self) -> Direction {
        self.version.direction()
    }

    pub fn version(&self) -> u8 {
        self.version.version()
    }

    pub fn version_mut(&mut self) -> &mut Version {
        &mut self.version
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    pub fn compression(&self) -> bool {
        self.flags.compression()
    }

    pub fn tracing(&self) -> bool {
        self.flags.tracing()
    }

    pub fn custom_payload(&self) -> bool {
        self.flags.custom_payload()
    }

    pub fn warning(&self) -> bool {
        self.flags.warning()
    }

    pub fn stream(&self) -> i16 {
        self.stream
    }

    pub fn set_stream(&mut self, stream: i16) {
        self.stream = stream;
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn set_opcode(&mut self, opcode: u8) {
        self.opcode = opcode;
    }

    pub fn body_len(&self) -> u32 {
        self.body_len
    }

    pub fn set_body_len(&mut self, body_len: u32) {
        self.body_len = body_len;
    }

    pub fn from_opcode(opcode: u8) -> Self {
        Self {
            version: Version::default(),
            flags: Flags::default(),
            stream: 0,
            opcode,
            body_len: 0,
        }
    }
}

impl TryFrom<&[u8]> for Header {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        anyhow::ensure!(bytes.len() == 9, "Invalid header length");
        Ok(Header {
            version: Version(bytes[0]),
            flags: Flags(bytes[1]),
            stream: i16::from_be_bytes([bytes[2], bytes[3]]),
            opcode: bytes[4],
            body_len: u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
        })
    }
}

impl FromPayload for Header {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(payload.len() >= *start + 9, "Payload is too small");
        let header = payload[*start..][..9].try_into()?;
        *start += 9;
        Ok(header)
    }
}

impl ToPayload for Header {
    fn to_payload(self, payload: &mut Vec<u8>) {
        if self.body_len() > 0 {
            payload.reserve(9 + self.body_len() as usize);
        }
        payload.extend(Into::<[u8; 9]>::into(self));
    }
}

impl Into<[u8; 9]> for Header {
    fn into(self) -> [u8; 9] {
        let stream = self.stream.to_be_bytes();
        [
            self.version.0,
            self.flags.0,
            stream[0],
            stream[1],
            self.opcode,
            (self.body_len >> 24) as u8,
            (self.body_len >> 16) as u8,
            (self.body_len >> 8) as u8,
            self.body_len as u8,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut header = Header::from_opcode(0x07);
        header.set_stream(-1);
        header.set_body_len(42);
        let bytes: [u8; 9] = header.into();
        let parsed = Header::try_from(&bytes[..]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.stream(), -1);
        assert_eq!(parsed.direction(), Direction::Request);
    }

    #[test]
    fn unknown_flags_are_detected() {
        let mut flags = Flags(0x10);
        assert_eq!(flags.unknown(), Some(0x10));
        flags = Flags(WARNING | TRACING);
        assert_eq!(flags.unknown(), None);
    }
}
