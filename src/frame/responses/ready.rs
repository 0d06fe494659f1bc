// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the READY frame.

/// Indicates that the server is ready to process queries. The body of a READY
/// message is empty.
#[derive(Copy, Clone, Debug)]
pub struct ReadyFrame;
