// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTH_RESPONSE frame.

use super::*;

/**
    Answers a server authentication challenge.

    Authentication in the protocol is SASL based. The server sends authentication
    challenges (a bytes token) to which the client answers with this message. Those
    exchanges continue until the server accepts the authentication by sending a
    AUTH_SUCCESS message after a client AUTH_RESPONSE. Note that the exchange
    begins with the client sending an initial AUTH_RESPONSE in response to a
    server AUTHENTICATE request.

    The body of this message is a single `[bytes]` token. The details of what this
    token contains (and when it can be null/empty, if ever) depends on the actual
    authenticator used.

    The response to a AUTH_RESPONSE is either a follow-up AUTH_CHALLENGE message,
    an AUTH_SUCCESS message or an ERROR message.
*/
#[derive(Debug, Clone, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(strip_option))]
pub struct AuthResponseFrame {
    #[allow(missing_docs)]
    pub(crate) token: Vec<u8>,
}

impl AuthResponseFrame {
    /// Get the authentication token.
    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl FromPayload for AuthResponseFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            token: read_bytes(start, payload)?.unwrap_or_default().to_vec(),
        })
    }
}

impl ToPayload for AuthResponseFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_bytes(&self.token, payload);
    }
}

impl AuthResponseFrameBuilder {
    /// Set the initial authentication token using an [`Authenticator`]
    pub fn auth_token(mut self, authenticator: &impl Authenticator) -> Self {
        self.token.replace(authenticator.initial_token());
        self
    }
}

/// The SASL challenge/response hook. The connection calls `initial_token` in
/// answer to AUTHENTICATE and `evaluate_challenge` for every AUTH_CHALLENGE.
pub trait Authenticator: Clone + Send + Sync + 'static {
    /// Produce the initial SASL token.
    fn initial_token(&self) -> Vec<u8>;
    /// Answer a server challenge. Returning an error terminates the connection.
    fn evaluate_challenge(&self, challenge: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// An authenticator for servers which allow all connections.
#[derive(Debug, Clone, Default)]
pub struct AllowAllAuth;

impl Authenticator for AllowAllAuth {
    fn initial_token(&self) -> Vec<u8> {
        vec![0]
    }

    fn evaluate_challenge(&self, _challenge: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("Unexpected auth challenge")
    }
}

/// A SASL PLAIN username/password authenticator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PasswordAuth {
    user: String,
    pass: String,
}

impl Default for PasswordAuth {
    fn default() -> Self {
        Self::new("cassandra".to_owned(), "cassandra".to_owned())
    }
}

impl PasswordAuth {
    /// Create a new password authenticator.
    pub fn new(user: String, pass: String) -> Self {
        Self { user, pass }
    }
}

impl Authenticator for PasswordAuth {
    fn initial_token(&self) -> Vec<u8> {
        // SASL PLAIN: authzid NUL authcid NUL passwd
        let mut token = Vec::with_capacity(self.user.len() + self.pass.len() + 2);
        token.push(0);
        token.extend_from_slice(self.user.as_bytes());
        token.push(0);
        token.extend_from_slice(self.pass.as_bytes());
        token
    }

    fn evaluate_challenge(&self, _challenge: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("PLAIN authentication does not expect a challenge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_token_layout() {
        let auth = PasswordAuth::new("user".to_owned(), "pass".to_owned());
        assert_eq!(auth.initial_token(), b"\0user\0pass");
    }

    #[test]
    fn auth_response_roundtrip() {
        let frame = AuthResponseFrameBuilder::default()
            .auth_token(&PasswordAuth::default())
            .build()
            .unwrap();
        let mut payload = Vec::new();
        frame.clone().to_payload(&mut payload);
        let parsed = AuthResponseFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(parsed.token(), frame.token());
    }
}
