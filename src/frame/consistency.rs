// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the consistency enum.

use super::{
    read_short,
    write_short,
    FromPayload,
    ToPayload,
};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::{
    convert::TryFrom,
    fmt::Display,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
/// The consistency level enum.
pub enum Consistency {
    /// The any consistency level.
    Any = 0x0,
    /// The one consistency level.
    One = 0x1,
    /// The two consistency level.
    Two = 0x2,
    /// The three consistency level.
    Three = 0x3,
    /// The quorum consistency level.
    Quorum = 0x4,
    /// The all consistency level.
    All = 0x5,
    /// The local quorum consistency level.
    LocalQuorum = 0x6,
    /// The each quorum consistency level.
    EachQuorum = 0x7,
    /// The serial consistency level.
    Serial = 0x8,
    /// The local serial consistency level.
    LocalSerial = 0x9,
    /// The local one consistency level.
    LocalOne = 0xA,
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::LocalOne
    }
}

impl Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Consistency::Any => write!(f, "ANY"),
            Consistency::One => write!(f, "ONE"),
            Consistency::Two => write!(f, "TWO"),
            Consistency::Three => write!(f, "THREE"),
            Consistency::Quorum => write!(f, "QUORUM"),
            Consistency::All => write!(f, "ALL"),
            Consistency::LocalQuorum => write!(f, "LOCAL_QUORUM"),
            Consistency::EachQuorum => write!(f, "EACH_QUORUM"),
            Consistency::Serial => write!(f, "SERIAL"),
            Consistency::LocalSerial => write!(f, "LOCAL_SERIAL"),
            Consistency::LocalOne => write!(f, "LOCAL_ONE"),
        }
    }
}

impl TryFrom<u16> for Consistency {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Consistency::from_u16(value).ok_or_else(|| anyhow::anyhow!("Invalid consistency level: {:#x}", value))
    }
}

impl FromPayload for Consistency {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Consistency::try_from(read_short(start, payload)?)
    }
}

impl ToPayload for Consistency {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short(self as u16, payload);
    }
}
