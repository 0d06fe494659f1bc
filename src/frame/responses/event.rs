// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the EVENT frame.

use super::*;
use std::{
    net::SocketAddr,
    str::FromStr,
};

/// An event pushed by the server, always on stream id -1. A client will only
/// receive events for the types it has registered to using a [`RegisterFrame`].
#[derive(Clone, Debug)]
pub struct EventFrame {
    /// The event type.
    pub event_type: EventType,
}

impl EventFrame {
    /// Get the event type.
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }
}

impl FromPayload for EventFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            event_type: EventType::from_payload(start, payload)?,
        })
    }
}

/// Event types
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum EventType {
    TopologyChange {
        change_type: TopologyChangeType,
        address: SocketAddr,
    },
    StatusChange {
        change_type: StatusChangeType,
        address: SocketAddr,
    },
    SchemaChange {
        change_type: SchemaChangeType,
        target: SchemaChangeTarget,
    },
}

impl FromPayload for EventType {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(match read_str(start, payload)? {
            "TOPOLOGY_CHANGE" => Self::TopologyChange {
                change_type: TopologyChangeType::from_payload(start, payload)?,
                address: read_inet(start, payload)?,
            },
            "STATUS_CHANGE" => Self::StatusChange {
                change_type: StatusChangeType::from_payload(start, payload)?,
                address: read_inet(start, payload)?,
            },
            "SCHEMA_CHANGE" => Self::SchemaChange {
                change_type: SchemaChangeType::from_payload(start, payload)?,
                target: SchemaChangeTarget::from_payload(start, payload)?,
            },
            e => anyhow::bail!("Unknown event type: {}", e),
        })
    }
}

/// Events related to change in the cluster topology. Currently, events are sent
/// when new nodes are added to the cluster, and when nodes are removed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TopologyChangeType {
    NewNode,
    RemovedNode,
}

impl FromStr for TopologyChangeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NEW_NODE" => TopologyChangeType::NewNode,
            "REMOVED_NODE" => TopologyChangeType::RemovedNode,
            _ => return Err(anyhow::anyhow!("Invalid topology change type: {}", s)),
        })
    }
}

impl FromPayload for TopologyChangeType {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        TopologyChangeType::from_str(read_str(start, payload)?)
    }
}

/// Events related to change of node status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StatusChangeType {
    Up,
    Down,
}

impl FromStr for StatusChangeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "UP" => StatusChangeType::Up,
            "DOWN" => StatusChangeType::Down,
            _ => return Err(anyhow::anyhow!("Invalid status change type: {}", s)),
        })
    }
}

impl FromPayload for StatusChangeType {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        StatusChangeType::from_str(read_str(start, payload)?)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SchemaChangeType {
    Created,
    Updated,
    Dropped,
}

impl FromStr for SchemaChangeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CREATED" => SchemaChangeType::Created,
            "UPDATED" => SchemaChangeType::Updated,
            "DROPPED" => SchemaChangeType::Dropped,
            _ => return Err(anyhow::anyhow!("Invalid schema change type: {}", s)),
        })
    }
}

impl FromPayload for SchemaChangeType {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        SchemaChangeType::from_str(read_str(start, payload)?)
    }
}

/// What a schema change event (or result) applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SchemaChangeTarget {
    Keyspace(String),
    Table {
        keyspace: String,
        table: String,
    },
    Type {
        keyspace: String,
        name: String,
    },
    Function {
        keyspace: String,
        name: String,
        args: Vec<String>,
    },
    Aggregate {
        keyspace: String,
        name: String,
        args: Vec<String>,
    },
}

impl FromPayload for SchemaChangeTarget {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let target_type = read_string(start, payload)?;
        Ok(match target_type.as_str() {
            "KEYSPACE" => {
                let keyspace = read_string(start, payload)?;
                SchemaChangeTarget::Keyspace(keyspace)
            }
            "TABLE" => {
                let keyspace = read_string(start, payload)?;
                let table = read_string(start, payload)?;
                SchemaChangeTarget::Table { keyspace, table }
            }
            "TYPE" => {
                let keyspace = read_string(start, payload)?;
                let name = read_string(start, payload)?;
                SchemaChangeTarget::Type { keyspace, name }
            }
            "FUNCTION" => {
                let keyspace = read_string(start, payload)?;
                let name = read_string(start, payload)?;
                let args = read_string_list(start, payload)?;
                SchemaChangeTarget::Function { keyspace, name, args }
            }
            "AGGREGATE" => {
                let keyspace = read_string(start, payload)?;
                let name = read_string(start, payload)?;
                let args = read_string_list(start, payload)?;
                SchemaChangeTarget::Aggregate { keyspace, name, args }
            }
            _ => anyhow::bail!("Unknown schema change target type"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_change_event_decode() {
        let mut payload = Vec::new();
        write_string("STATUS_CHANGE", &mut payload);
        write_string("UP", &mut payload);
        write_inet(([10, 0, 0, 7], 9042).into(), &mut payload);
        let frame = EventFrame::from_payload(&mut 0, &payload).unwrap();
        match frame.event_type() {
            EventType::StatusChange { change_type, address } => {
                assert_eq!(*change_type, StatusChangeType::Up);
                assert_eq!(*address, ([10, 0, 0, 7], 9042).into());
            }
            _ => panic!("Expected a status change event"),
        }
    }

    #[test]
    fn schema_change_event_decode() {
        let mut payload = Vec::new();
        write_string("SCHEMA_CHANGE", &mut payload);
        write_string("CREATED", &mut payload);
        write_string("TABLE", &mut payload);
        write_string("ks", &mut payload);
        write_string("tbl", &mut payload);
        let frame = EventFrame::from_payload(&mut 0, &payload).unwrap();
        match frame.event_type() {
            EventType::SchemaChange { change_type, target } => {
                assert_eq!(*change_type, SchemaChangeType::Created);
                assert_eq!(
                    *target,
                    SchemaChangeTarget::Table {
                        keyspace: "ks".to_owned(),
                        table: "tbl".to_owned()
                    }
                );
            }
            _ => panic!("Expected a schema change event"),
        }
    }
}
