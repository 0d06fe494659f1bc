// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTH_SUCCESS frame.

use super::*;

/// Indicates the success of the authentication phase. The body is a single
/// `[bytes]` token holding final information from the server that the client
/// may require to finish the authentication process.
#[derive(Clone, Debug)]
pub struct AuthSuccessFrame {
    /// The final authentication token.
    pub(crate) token: Vec<u8>,
}

impl AuthSuccessFrame {
    /// Get the final authentication token.
    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl FromPayload for AuthSuccessFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            token: read_bytes(start, payload)?.unwrap_or_default().to_vec(),
        })
    }
}
