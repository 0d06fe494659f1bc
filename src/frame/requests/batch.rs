// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the BATCH frame.

use super::*;

/**
    Allows executing a list of queries (prepared or not) as a batch. The body
    of the message must be:

    `<type><n><query_1>...<query_n><consistency><flags>[<serial_consistency>][<timestamp>]`

    where each `<query_i>` is a `[byte]` kind (0 for a query string, 1 for a
    prepared id), the query or id, and its values preceded by a `[short]` count.

    The server will respond with a RESULT message.
*/
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(strip_option))]
pub struct BatchFrame {
    #[builder(default)]
    pub(crate) batch_type: BatchType,
    #[builder(private, default)]
    pub(crate) queries: Vec<BatchQuery>,
    #[builder(default)]
    pub(crate) consistency: Consistency,
    #[builder(default)]
    pub(crate) serial_consistency: Option<Consistency>,
    #[builder(default)]
    pub(crate) timestamp: Option<i64>,
}

impl BatchFrame {
    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    pub fn queries(&self) -> &Vec<BatchQuery> {
        &self.queries
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub fn serial_consistency(&self) -> Option<Consistency> {
        self.serial_consistency
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Get the flags byte as it will appear on the wire.
    pub fn effective_flags(&self) -> BatchFlags {
        let mut flags = BatchFlags::default();
        flags.set_serial_consistency(self.serial_consistency.is_some());
        flags.set_default_timestamp(self.timestamp.is_some());
        flags
    }
}

impl FromPayload for BatchFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let batch_type = read_byte(start, payload)?.try_into()?;
        let query_count = read_short(start, payload)? as usize;
        let mut queries = Vec::with_capacity(query_count);
        for _ in 0..query_count {
            let query_kind = read_byte(start, payload)?;
            queries.push(match query_kind {
                0 => {
                    let statement = read_long_string(start, payload)?;
                    let values_count = read_short(start, payload)? as usize;
                    let mut values = Vec::with_capacity(values_count);
                    for _ in 0..values_count {
                        values.push(Value::from_payload(start, payload)?);
                    }
                    BatchQuery::Query { statement, values }
                }
                1 => {
                    let id = read_prepared_id(start, payload)?;
                    let values_count = read_short(start, payload)? as usize;
                    let mut values = Vec::with_capacity(values_count);
                    for _ in 0..values_count {
                        values.push(Value::from_payload(start, payload)?);
                    }
                    BatchQuery::Prepared { id, values }
                }
                _ => anyhow::bail!("Invalid query kind: {}", query_kind),
            });
        }
        let consistency = Consistency::from_payload(start, payload)?;
        let flags = BatchFlags(read_byte(start, payload)?);
        let serial_consistency = if flags.serial_consistency() {
            Some(Consistency::from_payload(start, payload)?)
        } else {
            None
        };
        let timestamp = if flags.default_timestamp() {
            Some(read_long(start, payload)?)
        } else {
            None
        };
        Ok(Self {
            batch_type,
            queries,
            consistency,
            serial_consistency,
            timestamp,
        })
    }
}

impl ToPayload for BatchFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        let flags = self.effective_flags();
        write_byte(self.batch_type as u8, payload);
        write_short(self.queries.len() as u16, payload);
        for query in self.queries {
            match &query {
                BatchQuery::Query { statement, values: _ } => {
                    write_byte(0, payload);
                    write_long_string(statement, payload);
                }
                BatchQuery::Prepared { id, values: _ } => {
                    write_byte(1, payload);
                    write_prepared_id(id, payload);
                }
            }
            let (BatchQuery::Query { statement: _, values } | BatchQuery::Prepared { id: _, values }) = query;
            write_short(values.len() as u16, payload);
            for value in values {
                value.to_payload(payload);
            }
        }
        write_short(self.consistency as u16, payload);
        write_byte(flags.0, payload);
        if let Some(consistency) = self.serial_consistency {
            write_short(consistency as u16, payload);
        }
        if let Some(timestamp) = self.timestamp {
            write_long(timestamp, payload);
        }
    }
}

/// One entry of a batch: either a query string or a prepared id, with its
/// positional values.
#[derive(Clone, Debug)]
pub enum BatchQuery {
    Query { statement: String, values: Vec<Value> },
    Prepared { id: Vec<u8>, values: Vec<Value> },
}

/// The batch kind byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BatchType {
    /// The batch will be logged.
    Logged = 0,
    /// The batch will be unlogged.
    Unlogged = 1,
    /// The batch will be a "counter" batch.
    Counter = 2,
}

impl TryFrom<u8> for BatchType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Logged),
            1 => Ok(Self::Unlogged),
            2 => Ok(Self::Counter),
            _ => Err(anyhow::anyhow!("Invalid batch type: {}", value)),
        }
    }
}

impl Default for BatchType {
    fn default() -> Self {
        BatchType::Logged
    }
}

impl BatchFrameBuilder {
    /// Set the batch type to logged. See https://cassandra.apache.org/doc/latest/cql/dml.html#batch
    pub fn logged(mut self) -> Self {
        self.batch_type.replace(BatchType::Logged);
        self
    }
    /// Set the batch type to unlogged. See https://cassandra.apache.org/doc/latest/cql/dml.html#unlogged-batches
    pub fn unlogged(mut self) -> Self {
        self.batch_type.replace(BatchType::Unlogged);
        self
    }
    /// Set the batch type to counter. See https://cassandra.apache.org/doc/latest/cql/dml.html#counter-batches
    pub fn counter(mut self) -> Self {
        self.batch_type.replace(BatchType::Counter);
        self
    }

    /// Add a query statement to the Batch frame.
    pub fn statement(mut self, statement: &str) -> Self {
        self.queries.get_or_insert_with(Vec::new).push(BatchQuery::Query {
            statement: statement.to_string(),
            values: Default::default(),
        });
        self
    }
    /// Add a prepared id to the Batch frame.
    pub fn id(mut self, id: Vec<u8>) -> Self {
        self.queries.get_or_insert_with(Vec::new).push(BatchQuery::Prepared {
            id,
            values: Default::default(),
        });
        self
    }
}

#[derive(Debug, Error)]
pub enum BatchBindError {
    #[error("No statements to bind values for")]
    NoStatements,
    #[error("Batch values are positional, {0} cannot be bound by name")]
    NamedValue(String),
    #[error(transparent)]
    Value(#[from] ValueEncodeError),
    #[error("Batch encode error: {0}")]
    EncodeError(#[from] anyhow::Error),
}

/// Values bind to the most recently added batch query.
impl Binder for BatchFrameBuilder {
    type Error = BatchBindError;

    fn bind_cell(mut self, name: Option<&str>, cell: Vec<u8>) -> Result<Self, Self::Error> {
        if let Some(name) = name {
            return Err(BatchBindError::NamedValue(name.to_owned()));
        }
        // re-read the cell as a batch value, its length prefix carries the
        // null/unset sentinels
        let value = Value::from_payload(&mut 0, &cell)?;
        let query = self
            .queries
            .as_mut()
            .and_then(|queries| queries.last_mut())
            .ok_or(BatchBindError::NoStatements)?;
        match query {
            BatchQuery::Query { values, .. } | BatchQuery::Prepared { values, .. } => {
                values.push(value);
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Uncompressed;

    #[test]
    fn simple_batch_builder_test() {
        let frame = BatchFrameBuilder::default()
            .logged()
            .statement("INSERT INTO ks.tbl (id, data) VALUES (?, ?)")
            .value("first")
            .unwrap()
            .value("second")
            .unwrap()
            .id(vec![0; 16]) // add a second, prepared, query to the batch
            .value("third")
            .unwrap()
            .consistency(Consistency::One)
            .build()
            .unwrap();
        let _payload = RequestFrame::from(frame).encode::<Uncompressed>().unwrap();
    }

    #[test]
    fn batch_frame_roundtrip() {
        let frame = BatchFrameBuilder::default()
            .unlogged()
            .statement("UPDATE ks.tbl SET data = ? WHERE id = ?")
            .value(1_i64)
            .unwrap()
            .null_value()
            .unwrap()
            .consistency(Consistency::Two)
            .timestamp(99)
            .build()
            .unwrap();
        let mut payload = Vec::new();
        frame.clone().to_payload(&mut payload);
        let parsed = BatchFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(parsed.batch_type(), BatchType::Unlogged);
        assert_eq!(parsed.queries().len(), 1);
        assert_eq!(parsed.consistency(), Consistency::Two);
        assert_eq!(parsed.timestamp(), Some(99));
        match &parsed.queries()[0] {
            BatchQuery::Query { values, .. } => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[1], Value::Null);
            }
            _ => panic!("Expected a query statement"),
        }
    }
}
