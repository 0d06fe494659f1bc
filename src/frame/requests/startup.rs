// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the STARTUP frame.

use super::*;
use std::collections::HashMap;

/// The required startup option naming the CQL version to use.
pub const CQL_VERSION: &str = "CQL_VERSION";
/// The startup option naming the compression algorithm, if any.
pub const COMPRESSION: &str = "COMPRESSION";
/// The optional startup option naming the driver.
pub const DRIVER_NAME: &str = "DRIVER_NAME";
/// The optional startup option naming the driver version.
pub const DRIVER_VERSION: &str = "DRIVER_VERSION";

/**
    Initialize the connection. The server will respond by either a READY message
    (in which case the connection is ready for queries) or an AUTHENTICATE message
    (in which case credentials will need to be provided using AUTH_RESPONSE).

    This must be the first message of the connection, except for OPTIONS that can
    be sent before to find out the options supported by the server.
*/
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", build_fn(validate = "Self::validate"))]
pub struct StartupFrame {
    /// The startup options; `CQL_VERSION` is mandatory.
    pub(crate) options: HashMap<String, String>,
}

impl StartupFrame {
    pub fn new(options: HashMap<String, String>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }
}

impl FromPayload for StartupFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            options: read_string_map(start, payload)?,
        })
    }
}

impl ToPayload for StartupFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_string_map(&self.options, payload);
    }
}

impl StartupFrameBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(options) = &self.options {
            if !options.contains_key(CQL_VERSION) {
                return Err(format!("Startup options require the {} key", CQL_VERSION));
            }
        }
        Ok(())
    }

    /// Add a startup option.
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options
            .get_or_insert_with(Default::default)
            .insert(key.to_owned(), value.to_owned());
        self
    }

    /// Set the CQL version option.
    pub fn cql_version(self, version: &str) -> Self {
        self.with_option(CQL_VERSION, version)
    }

    /// Set the compression option.
    pub fn compression(self, kind: &str) -> Self {
        self.with_option(COMPRESSION, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_startup_builder_test() {
        let frame = StartupFrameBuilder::default()
            .cql_version("3.0.0")
            .with_option(DRIVER_NAME, "cassandra-cql")
            .build()
            .unwrap();
        assert_eq!(frame.options().len(), 2);
    }

    #[test]
    fn startup_without_cql_version_is_rejected() {
        assert!(StartupFrameBuilder::default()
            .with_option(COMPRESSION, "lz4")
            .build()
            .is_err());
    }

    #[test]
    fn startup_roundtrip() {
        let frame = StartupFrameBuilder::default().cql_version("3.0.0").build().unwrap();
        let mut payload = Vec::new();
        frame.clone().to_payload(&mut payload);
        let parsed = StartupFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(parsed.options(), frame.options());
    }
}
