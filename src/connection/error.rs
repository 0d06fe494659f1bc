// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the client-side request error kinds.

use crate::frame::{
    ErrorFrame,
    FrameError,
    ValueEncodeError,
};
use thiserror::Error;

/// Everything that can go wrong between submitting a request and receiving its
/// response. Server errors are carried verbatim in the `Cql` variant.
#[derive(Debug, Error)]
pub enum RequestError {
    /// A value or frame could not be encoded.
    #[error("Encode error: {0}")]
    Encode(anyhow::Error),
    /// A frame could not be decoded or violated the framing rules. Receiving
    /// this poisons the connection, as framing is lost.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The server refused the request.
    #[error("Cql error: {0}")]
    Cql(ErrorFrame),
    /// The response did not arrive within the request deadline. The stream id
    /// stays reserved until the server answers; the connection is unaffected.
    #[error("Request timed out")]
    Timeout,
    /// The submission queue (or the stream id pool, under the fail-fast
    /// policy) is exhausted.
    #[error("Request queue is full")]
    QueueFull,
    /// The connection was closed before the response arrived.
    #[error("Connection closed")]
    ConnectionClosed,
    /// The peer broke the protocol contract.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(anyhow::Error),
    /// The socket failed.
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    /// Check whether this error is an UNPREPARED server error.
    pub fn is_unprepared(&self) -> bool {
        matches!(self, RequestError::Cql(e) if e.is_unprepared())
    }
}

impl From<ValueEncodeError> for RequestError {
    fn from(e: ValueEncodeError) -> Self {
        RequestError::Encode(e.into())
    }
}
