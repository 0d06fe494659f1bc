// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the CQL type descriptor tree as it appears in result
//! metadata, keyed by the protocol's type option ids.

use super::{
    read_short,
    read_string,
    write_short,
    write_string,
    FromPayload,
    ToPayload,
};

/// A CQL type descriptor, parsed from column metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CqlType {
    /// A custom type, identified by the fully qualified server class name.
    Custom(String),
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Timestamp,
    Uuid,
    Varchar,
    Varint,
    Timeuuid,
    Inet,
    Date,
    Time,
    Smallint,
    Tinyint,
    Duration,
    /// A list with an element type.
    List(Box<CqlType>),
    /// A map with key and value types.
    Map(Box<CqlType>, Box<CqlType>),
    /// A set with an element type.
    Set(Box<CqlType>),
    /// A user defined type with its keyspace, name, and ordered fields.
    Udt {
        keyspace: String,
        name: String,
        fields: Vec<(String, CqlType)>,
    },
    /// A tuple with ordered member types.
    Tuple(Vec<CqlType>),
}

impl FromPayload for CqlType {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let id = read_short(start, payload)?;
        Ok(match id {
            0x0000 => CqlType::Custom(read_string(start, payload)?),
            0x0001 => CqlType::Ascii,
            0x0002 => CqlType::Bigint,
            0x0003 => CqlType::Blob,
            0x0004 => CqlType::Boolean,
            0x0005 => CqlType::Counter,
            0x0006 => CqlType::Decimal,
            0x0007 => CqlType::Double,
            0x0008 => CqlType::Float,
            0x0009 => CqlType::Int,
            0x000B => CqlType::Timestamp,
            0x000C => CqlType::Uuid,
            0x000D => CqlType::Varchar,
            0x000E => CqlType::Varint,
            0x000F => CqlType::Timeuuid,
            0x0010 => CqlType::Inet,
            0x0011 => CqlType::Date,
            0x0012 => CqlType::Time,
            0x0013 => CqlType::Smallint,
            0x0014 => CqlType::Tinyint,
            0x0015 => CqlType::Duration,
            0x0020 => CqlType::List(Box::new(CqlType::from_payload(start, payload)?)),
            0x0021 => CqlType::Map(
                Box::new(CqlType::from_payload(start, payload)?),
                Box::new(CqlType::from_payload(start, payload)?),
            ),
            0x0022 => CqlType::Set(Box::new(CqlType::from_payload(start, payload)?)),
            0x0030 => {
                let keyspace = read_string(start, payload)?;
                let name = read_string(start, payload)?;
                let n = read_short(start, payload)? as usize;
                let mut fields = Vec::with_capacity(n);
                for _ in 0..n {
                    fields.push((read_string(start, payload)?, CqlType::from_payload(start, payload)?));
                }
                CqlType::Udt { keyspace, name, fields }
            }
            0x0031 => {
                let n = read_short(start, payload)? as usize;
                let mut types = Vec::with_capacity(n);
                for _ in 0..n {
                    types.push(CqlType::from_payload(start, payload)?);
                }
                CqlType::Tuple(types)
            }
            _ => anyhow::bail!("Unknown CQL type option: {:#x}", id),
        })
    }
}

impl ToPayload for CqlType {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self {
            CqlType::Custom(class) => {
                write_short(0x0000, payload);
                write_string(&class, payload);
            }
            CqlType::Ascii => write_short(0x0001, payload),
            CqlType::Bigint => write_short(0x0002, payload),
            CqlType::Blob => write_short(0x0003, payload),
            CqlType::Boolean => write_short(0x0004, payload),
            CqlType::Counter => write_short(0x0005, payload),
            CqlType::Decimal => write_short(0x0006, payload),
            CqlType::Double => write_short(0x0007, payload),
            CqlType::Float => write_short(0x0008, payload),
            CqlType::Int => write_short(0x0009, payload),
            CqlType::Timestamp => write_short(0x000B, payload),
            CqlType::Uuid => write_short(0x000C, payload),
            CqlType::Varchar => write_short(0x000D, payload),
            CqlType::Varint => write_short(0x000E, payload),
            CqlType::Timeuuid => write_short(0x000F, payload),
            CqlType::Inet => write_short(0x0010, payload),
            CqlType::Date => write_short(0x0011, payload),
            CqlType::Time => write_short(0x0012, payload),
            CqlType::Smallint => write_short(0x0013, payload),
            CqlType::Tinyint => write_short(0x0014, payload),
            CqlType::Duration => write_short(0x0015, payload),
            CqlType::List(e) => {
                write_short(0x0020, payload);
                e.to_payload(payload);
            }
            CqlType::Map(k, v) => {
                write_short(0x0021, payload);
                k.to_payload(payload);
                v.to_payload(payload);
            }
            CqlType::Set(e) => {
                write_short(0x0022, payload);
                e.to_payload(payload);
            }
            CqlType::Udt { keyspace, name, fields } => {
                write_short(0x0030, payload);
                write_string(&keyspace, payload);
                write_string(&name, payload);
                write_short(fields.len() as u16, payload);
                for (field, kind) in fields {
                    write_string(&field, payload);
                    kind.to_payload(payload);
                }
            }
            CqlType::Tuple(types) => {
                write_short(0x0031, payload);
                write_short(types.len() as u16, payload);
                for t in types {
                    t.to_payload(payload);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_type_roundtrip() {
        let kind = CqlType::Map(
            Box::new(CqlType::Varchar),
            Box::new(CqlType::List(Box::new(CqlType::Tuple(vec![
                CqlType::Int,
                CqlType::Udt {
                    keyspace: "ks".to_owned(),
                    name: "address".to_owned(),
                    fields: vec![("street".to_owned(), CqlType::Varchar), ("zip".to_owned(), CqlType::Int)],
                },
            ])))),
        );
        let mut payload = Vec::new();
        kind.clone().to_payload(&mut payload);
        assert_eq!(CqlType::from_payload(&mut 0, &payload).unwrap(), kind);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let payload = [0x00u8, 0x40];
        assert!(CqlType::from_payload(&mut 0, &payload).is_err());
    }
}
