// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the QUERY frame.

use super::*;

/**
    Performs a CQL query. The body of the message must be:

    `<query><query_parameters>`

    where `<query>` is a `[long string]` representing the query and

    `<query_parameters>` must be

    `<consistency><flags>[<n>[name_1]<value_1>...[name_n]<value_n>][<result_page_size>][<paging_state>][<serial_consistency>][<timestamp>]`

    where:
    - `<consistency>` is the `[consistency]` level for the operation.
    - `<flags>` is a `[byte]` whose bits define the options for this query and
        in particular influence what the remainder of the message contains. See [`QueryFlags`].

    Note that the consistency is ignored by some queries (USE, CREATE, ALTER,
    TRUNCATE, ...).

    The server will respond to a QUERY message with a RESULT message, the content
    of which depends on the query.
*/
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(strip_option))]
pub struct QueryFrame {
    /// The query statement
    pub(crate) statement: String,
    #[builder(default)]
    /// The consistency level
    pub(crate) consistency: Consistency,
    #[builder(private, default)]
    /// The bound values list
    pub(crate) values: Values,
    #[builder(default)]
    /// The query flags not implied by other fields
    pub(crate) flags: QueryFlags,
    #[builder(default)]
    /// The page size
    pub(crate) page_size: Option<i32>,
    #[builder(default)]
    /// The paging state
    pub(crate) paging_state: Option<Vec<u8>>,
    #[builder(default)]
    /// The serial consistency level
    pub(crate) serial_consistency: Option<Consistency>,
    #[builder(default)]
    /// The timestamp
    pub(crate) timestamp: Option<i64>,
}

impl QueryFrame {
    /// Get the query statement.
    pub fn statement(&self) -> &String {
        &self.statement
    }

    /// Get the consistency level.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Get the bound values.
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Get the page size.
    pub fn page_size(&self) -> Option<i32> {
        self.page_size
    }

    /// Get the paging state.
    pub fn paging_state(&self) -> &Option<Vec<u8>> {
        &self.paging_state
    }

    /// Get the serial consistency level.
    pub fn serial_consistency(&self) -> Option<Consistency> {
        self.serial_consistency
    }

    /// Get the timestamp.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Get the flags byte as it will appear on the wire; bits are derived from
    /// the present optional fields.
    pub fn effective_flags(&self) -> QueryFlags {
        effective_query_flags(
            self.flags,
            &self.values,
            self.page_size,
            &self.paging_state,
            self.serial_consistency,
            self.timestamp,
        )
    }
}

pub(crate) fn effective_query_flags(
    mut flags: QueryFlags,
    values: &Values,
    page_size: Option<i32>,
    paging_state: &Option<Vec<u8>>,
    serial_consistency: Option<Consistency>,
    timestamp: Option<i64>,
) -> QueryFlags {
    flags.set_values(!values.is_empty());
    flags.set_named_values(values.has_names());
    flags.set_page_size(page_size.is_some());
    flags.set_paging_state(paging_state.is_some());
    flags.set_serial_consistency(serial_consistency.is_some());
    flags.set_default_timestamp(timestamp.is_some());
    flags
}

pub(crate) fn query_parameters_to_payload(
    consistency: Consistency,
    flags: QueryFlags,
    values: Values,
    page_size: Option<i32>,
    paging_state: Option<Vec<u8>>,
    serial_consistency: Option<Consistency>,
    timestamp: Option<i64>,
    payload: &mut Vec<u8>,
) {
    write_short(consistency as u16, payload);
    write_byte(flags.0, payload);
    if flags.values() {
        write_short(values.len() as u16, payload);
        payload.extend(values.payload());
    }
    if let Some(page_size) = page_size {
        write_int(page_size, payload);
    }
    if let Some(paging_state) = paging_state {
        write_bytes(&paging_state, payload);
    }
    if let Some(serial_consistency) = serial_consistency {
        write_short(serial_consistency as u16, payload);
    }
    if let Some(timestamp) = timestamp {
        write_long(timestamp, payload);
    }
}

pub(crate) struct QueryParameters {
    pub(crate) consistency: Consistency,
    pub(crate) flags: QueryFlags,
    pub(crate) values: Values,
    pub(crate) page_size: Option<i32>,
    pub(crate) paging_state: Option<Vec<u8>>,
    pub(crate) serial_consistency: Option<Consistency>,
    pub(crate) timestamp: Option<i64>,
}

pub(crate) fn query_parameters_from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<QueryParameters> {
    let consistency = Consistency::from_payload(start, payload)?;
    let flags = QueryFlags(read_byte(start, payload)?);
    let values = if !flags.values() {
        Values::default()
    } else if flags.named_values() {
        read_named_values(start, payload)?
    } else {
        read_values(start, payload)?
    };
    let page_size = if flags.page_size() {
        Some(read_int(start, payload)?)
    } else {
        None
    };
    let paging_state = if flags.paging_state() {
        read_bytes(start, payload)?.map(|b| b.to_vec())
    } else {
        None
    };
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
    Ok(QueryParameters {
        consistency,
        flags,
        values,
        page_size,
        paging_state,
        serial_consistency,
        timestamp,
    })
}

impl FromPayload for QueryFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let statement = read_long_string(start, payload)?;
        let params = query_parameters_from_payload(start, payload)?;
        Ok(Self {
            statement,
            consistency: params.consistency,
            flags: params.flags,
            values: params.values,
            page_size: params.page_size,
            paging_state: params.paging_state,
            serial_consistency: params.serial_consistency,
            timestamp: params.timestamp,
        })
    }
}

impl ToPayload for QueryFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        payload.reserve(
            self.statement.len()
                + self.values.payload().len()
                + self.paging_state.as_ref().map(|s| s.len()).unwrap_or_default()
                + 23,
        );
        let flags = self.effective_flags();
        write_long_string(&self.statement, payload);
        query_parameters_to_payload(
            self.consistency,
            flags,
            self.values,
            self.page_size,
            self.paging_state,
            self.serial_consistency,
            self.timestamp,
            payload,
        );
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum QueryBindError {
    #[error(transparent)]
    Value(#[from] ValueEncodeError),
}

impl Binder for QueryFrameBuilder {
    type Error = QueryBindError;

    fn bind_cell(mut self, name: Option<&str>, cell: Vec<u8>) -> Result<Self, Self::Error> {
        self.values.get_or_insert_with(Values::default).push(name, &cell);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Uncompressed;

    #[test]
    fn simple_query_builder_test() {
        let frame = QueryFrameBuilder::default()
            .statement("INSERT INTO ks.tbl (id, data, meta) VALUES (?, ?, ?)".to_owned())
            .consistency(Consistency::One)
            .value("some data")
            .unwrap()
            .value(0_i64)
            .unwrap()
            .unset_value()
            .unwrap()
            .build()
            .unwrap();
        assert!(frame.effective_flags().values());
        let _payload = RequestFrame::from(frame).encode::<Uncompressed>().unwrap();
    }

    #[test]
    fn query_frame_roundtrip() {
        let frame = QueryFrameBuilder::default()
            .statement("SELECT * FROM ks.tbl WHERE id = ?".to_owned())
            .consistency(Consistency::Quorum)
            .value(42_i32)
            .unwrap()
            .page_size(100)
            .paging_state(vec![1, 2, 3])
            .serial_consistency(Consistency::LocalSerial)
            .timestamp(1234567890)
            .build()
            .unwrap();
        let mut payload = Vec::new();
        frame.clone().to_payload(&mut payload);
        let parsed = QueryFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(parsed.statement(), frame.statement());
        assert_eq!(parsed.consistency(), Consistency::Quorum);
        assert_eq!(parsed.page_size(), Some(100));
        assert_eq!(parsed.paging_state(), &Some(vec![1, 2, 3]));
        assert_eq!(parsed.serial_consistency(), Some(Consistency::LocalSerial));
        assert_eq!(parsed.timestamp(), Some(1234567890));
        assert_eq!(parsed.values().len(), 1);
    }
}
