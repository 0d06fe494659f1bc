// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTHENTICATE frame.

use super::*;

/// Indicates that the server requires authentication, and which authentication
/// mechanism to use. The body is a single `[string]` naming the authenticator
/// class in use.
#[derive(Clone, Debug)]
pub struct AuthenticateFrame {
    /// The authenticator class name.
    pub(crate) authenticator: String,
}

impl AuthenticateFrame {
    /// Get the authenticator class name.
    pub fn authenticator(&self) -> &String {
        &self.authenticator
    }
}

impl FromPayload for AuthenticateFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            authenticator: read_string(start, payload)?,
        })
    }
}
