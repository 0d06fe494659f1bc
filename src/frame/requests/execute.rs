// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the EXECUTE frame.

use super::{
    query::{
        effective_query_flags,
        query_parameters_from_payload,
        query_parameters_to_payload,
    },
    *,
};

/**
   Executes a prepared query. The body of the message must be:

   `<id><query_parameters>`

   where `<id>` is the prepared query ID. It's the `[short bytes]` returned as a
   response to a PREPARE message. As for `<query_parameters>`, it has the exact
   same definition as in [`QueryFrame`].

   The response from the server will be a [`ResultFrame`].
*/
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(strip_option))]
pub struct ExecuteFrame {
    /// The prepared ID, opaque bytes assigned by the server
    pub(crate) id: Vec<u8>,
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

impl ExecuteFrame {
    /// Get the prepared ID.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Replace the prepared ID, e.g. after a re-prepare.
    pub fn set_id(&mut self, id: Vec<u8>) {
        self.id = id;
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

    /// Get the flags byte as it will appear on the wire.
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

impl FromPayload for ExecuteFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let id = read_prepared_id(start, payload)?;
        let params = query_parameters_from_payload(start, payload)?;
        Ok(Self {
            id,
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

impl ToPayload for ExecuteFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        payload.reserve(
            self.id.len()
                + self.values.payload().len()
                + self.paging_state.as_ref().map(|s| s.len()).unwrap_or_default()
                + 25,
        );
        let flags = self.effective_flags();
        write_prepared_id(&self.id, payload);
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
pub enum ExecuteBindError {
    #[error(transparent)]
    Value(#[from] ValueEncodeError),
}

impl Binder for ExecuteFrameBuilder {
    type Error = ExecuteBindError;

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
    fn simple_execute_builder_test() {
        let frame = ExecuteFrameBuilder::default()
            .id(vec![0xDE, 0xAD, 0xBE, 0xEF])
            .consistency(Consistency::One)
            .value("some data")
            .unwrap()
            .value(0_i64)
            .unwrap()
            .unset_value()
            .unwrap()
            .build()
            .unwrap();
        let _payload = RequestFrame::from(frame).encode::<Uncompressed>().unwrap();
    }

    #[test]
    fn execute_frame_roundtrip() {
        let frame = ExecuteFrameBuilder::default()
            .id(vec![1, 2, 3, 4, 5, 6, 7, 8])
            .consistency(Consistency::LocalQuorum)
            .value(7_i32)
            .unwrap()
            .page_size(500)
            .build()
            .unwrap();
        let mut payload = Vec::new();
        frame.clone().to_payload(&mut payload);
        let parsed = ExecuteFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(parsed.id(), frame.id());
        assert_eq!(parsed.consistency(), Consistency::LocalQuorum);
        assert_eq!(parsed.page_size(), Some(500));
        assert_eq!(parsed.values().len(), 1);
    }
}
