// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Wire codec and connection core for the Cassandra native protocol.
//!
//! This crate implements the CQL binary protocol (v3/v4) frame layer and a
//! multiplexed single-socket connection on top of it: typed value
//! encoding/decoding, request/response correlation by stream id, the
//! prepared statement lifecycle, and paging/consistency semantics.
//!
//! Pooling, topology discovery and routing are left to higher layers.

/// Frame compression implementations
pub mod compression;
/// The multiplexed connection and its state machine
pub mod connection;
/// The frame protocol implementation
pub mod frame;

pub mod prelude {
    pub use super::{
        compression::*,
        connection::*,
        frame::*,
    };
}
