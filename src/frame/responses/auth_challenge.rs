// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTH_CHALLENGE frame.

use super::*;

/// A server authentication challenge (see the AUTH_RESPONSE frame for more
/// details). The body is a single `[bytes]` token.
#[derive(Clone, Debug)]
pub struct AuthChallengeFrame {
    /// The authentication token.
    pub(crate) token: Vec<u8>,
}

impl AuthChallengeFrame {
    /// Get the authentication token.
    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl FromPayload for AuthChallengeFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            token: read_bytes(start, payload)?.unwrap_or_default().to_vec(),
        })
    }
}
