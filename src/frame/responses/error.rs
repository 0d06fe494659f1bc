// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the ERROR frame decoder. Server errors are modeled
//! the way the rest of the crate models wire data: one tagged union per
//! grammar, with the code-dependent payload inlined into its variant.

use super::*;
use anyhow::bail;
use std::{
    fmt::Display,
    str::FromStr,
};
use thiserror::Error;

/// The Error code of `SERVER_ERROR`.
pub const SERVER_ERROR: i32 = 0x0000;
/// The Error code of `PROTOCOL_ERROR`.
pub const PROTOCOL_ERROR: i32 = 0x000A;
/// The Error code of `BAD_CREDENTIALS`.
pub const BAD_CREDENTIALS: i32 = 0x0100;
/// The Error code of `UNAVAILABLE_EXCEPTION`.
pub const UNAVAILABLE_EXCEPTION: i32 = 0x1000;
/// The Error code of `OVERLOADED`.
pub const OVERLOADED: i32 = 0x1001;
/// The Error code of `IS_BOOTSTRAPPING`.
pub const IS_BOOTSTRAPPING: i32 = 0x1002;
/// The Error code of `TRUNCATE_ERROR`.
pub const TRUNCATE_ERROR: i32 = 0x1003;
/// The Error code of `WRITE_TIMEOUT`.
pub const WRITE_TIMEOUT: i32 = 0x1100;
/// The Error code of `READ_TIMEOUT`.
pub const READ_TIMEOUT: i32 = 0x1200;
/// The Error code of `READ_FAILURE`.
pub const READ_FAILURE: i32 = 0x1300;
/// The Error code of `FUNCTION_FAILURE`.
pub const FUNCTION_FAILURE: i32 = 0x1400;
/// The Error code of `WRITE_FAILURE`.
pub const WRITE_FAILURE: i32 = 0x1500;
/// The Error code of `SYNTAX_ERROR`.
pub const SYNTAX_ERROR: i32 = 0x2000;
/// The Error code of `UNAUTHORIZED`.
pub const UNAUTHORIZED: i32 = 0x2100;
/// The Error code of `INVALID`.
pub const INVALID: i32 = 0x2200;
/// The Error code of `CONFIG_ERROR`.
pub const CONFIG_ERROR: i32 = 0x2300;
/// The Error code of `ALREADY_EXISTS`.
pub const ALREADY_EXISTS: i32 = 0x2400;
/// The Error code of `UNPREPARED`.
pub const UNPREPARED: i32 = 0x2500;

/// A server error, surfaced structurally: the message string and the decoded
/// error kind with its payload.
#[derive(Error, Debug, Clone)]
#[error("{message} ({kind})")]
pub struct ErrorFrame {
    /// The server's message string.
    pub(crate) message: String,
    /// The error kind with its code-dependent payload.
    pub(crate) kind: CqlErrorKind,
}

impl ErrorFrame {
    /// Get the server's message string.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CqlErrorKind {
        &self.kind
    }

    /// Get the wire code of the error kind.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Check whether the server rejected the protocol version; the connection
    /// downgrades and retries on this.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self.kind, CqlErrorKind::ProtocolError)
    }

    /// Check whether the server evicted the prepared statement; the
    /// connection re-prepares and retries on this.
    pub fn is_unprepared(&self) -> bool {
        matches!(self.kind, CqlErrorKind::Unprepared { .. })
    }

    /// Get the statement id the server no longer knows, if this is an
    /// UNPREPARED error.
    pub fn unprepared_id(&self) -> Option<&[u8]> {
        match &self.kind {
            CqlErrorKind::Unprepared { id } => Some(id),
            _ => None,
        }
    }
}

impl FromPayload for ErrorFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let code = read_int(start, payload)?;
        let message = read_string(start, payload)?;
        let kind = CqlErrorKind::read(code, start, payload)?;
        Ok(ErrorFrame { message, kind })
    }
}

/// Every server error kind the protocol defines, tagged by its wire code,
/// with the code-dependent payload inlined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CqlErrorKind {
    /// Something unexpected happened server side.
    ServerError,
    /// The frame, or its contents, were malformed; also how the server
    /// rejects an unsupported protocol version.
    ProtocolError,
    /// Authentication was required and failed.
    BadCredentials,
    /// Not enough replicas were alive to reach the consistency level.
    Unavailable {
        /// The consistency level of the query that triggered the error.
        consistency: Consistency,
        /// How many replica acknowledgements the level requires.
        required: i32,
        /// How many replicas were known alive when the request was processed.
        alive: i32,
    },
    /// The coordinator shed the request.
    Overloaded,
    /// The coordinator was still bootstrapping.
    IsBootstrapping,
    /// A truncation failed.
    TruncateError,
    /// A write reached the coordinator but too few replicas answered in time.
    WriteTimeout {
        /// The consistency level of the query that triggered the error.
        consistency: Consistency,
        /// How many replicas acknowledged.
        received: i32,
        /// How many acknowledgements the level requires.
        block_for: i32,
        /// What sort of write timed out.
        write_type: WriteType,
    },
    /// A read reached the coordinator but too few replicas answered in time.
    ReadTimeout {
        /// The consistency level of the query that triggered the error.
        consistency: Consistency,
        /// How many replicas answered.
        received: i32,
        /// How many answers the level requires.
        block_for: i32,
        /// Whether the replica asked for the data responded.
        data_present: bool,
    },
    /// Replicas failed a read outright.
    ReadFailure {
        /// The consistency level of the query that triggered the error.
        consistency: Consistency,
        /// How many replicas answered.
        received: i32,
        /// How many answers the level requires.
        block_for: i32,
        /// How many replicas failed.
        failures: i32,
        /// Whether the replica asked for the data responded.
        data_present: bool,
    },
    /// A server-side function threw.
    FunctionFailure {
        /// The keyspace of the failed function.
        keyspace: String,
        /// The name of the failed function.
        function: String,
        /// One CQL type string per argument of the failed function.
        arg_types: Vec<String>,
    },
    /// Replicas failed a write outright.
    WriteFailure {
        /// The consistency level of the query that triggered the error.
        consistency: Consistency,
        /// How many replicas acknowledged.
        received: i32,
        /// How many acknowledgements the level requires.
        block_for: i32,
        /// How many replicas failed.
        failures: i32,
        /// What sort of write failed.
        write_type: WriteType,
    },
    /// The statement did not parse.
    SyntaxError,
    /// The user lacks the permission.
    Unauthorized,
    /// The statement parsed but is invalid.
    Invalid,
    /// The statement is invalid against the server configuration.
    ConfigError,
    /// The keyspace or table to create already exists.
    AlreadyExists {
        /// The colliding keyspace, or the keyspace of the colliding table.
        keyspace: String,
        /// The colliding table; empty when a keyspace creation collided.
        table: String,
    },
    /// The prepared statement id is unknown to the server. Recovered locally
    /// by a single re-prepare.
    Unprepared {
        /// The evicted id.
        id: Vec<u8>,
    },
}

impl CqlErrorKind {
    /// The wire code of this kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::ServerError => SERVER_ERROR,
            Self::ProtocolError => PROTOCOL_ERROR,
            Self::BadCredentials => BAD_CREDENTIALS,
            Self::Unavailable { .. } => UNAVAILABLE_EXCEPTION,
            Self::Overloaded => OVERLOADED,
            Self::IsBootstrapping => IS_BOOTSTRAPPING,
            Self::TruncateError => TRUNCATE_ERROR,
            Self::WriteTimeout { .. } => WRITE_TIMEOUT,
            Self::ReadTimeout { .. } => READ_TIMEOUT,
            Self::ReadFailure { .. } => READ_FAILURE,
            Self::FunctionFailure { .. } => FUNCTION_FAILURE,
            Self::WriteFailure { .. } => WRITE_FAILURE,
            Self::SyntaxError => SYNTAX_ERROR,
            Self::Unauthorized => UNAUTHORIZED,
            Self::Invalid => INVALID,
            Self::ConfigError => CONFIG_ERROR,
            Self::AlreadyExists { .. } => ALREADY_EXISTS,
            Self::Unprepared { .. } => UNPREPARED,
        }
    }

    /// Decode the code-dependent payload that follows the message string.
    fn read(code: i32, start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(match code {
            SERVER_ERROR => Self::ServerError,
            PROTOCOL_ERROR => Self::ProtocolError,
            BAD_CREDENTIALS => Self::BadCredentials,
            UNAVAILABLE_EXCEPTION => Self::Unavailable {
                consistency: Consistency::from_payload(start, payload)?,
                required: read_int(start, payload)?,
                alive: read_int(start, payload)?,
            },
            OVERLOADED => Self::Overloaded,
            IS_BOOTSTRAPPING => Self::IsBootstrapping,
            TRUNCATE_ERROR => Self::TruncateError,
            WRITE_TIMEOUT => Self::WriteTimeout {
                consistency: Consistency::from_payload(start, payload)?,
                received: read_int(start, payload)?,
                block_for: read_int(start, payload)?,
                write_type: WriteType::from_str(read_str(start, payload)?)?,
            },
            READ_TIMEOUT => Self::ReadTimeout {
                consistency: Consistency::from_payload(start, payload)?,
                received: read_int(start, payload)?,
                block_for: read_int(start, payload)?,
                data_present: read_byte(start, payload)? != 0,
            },
            READ_FAILURE => Self::ReadFailure {
                consistency: Consistency::from_payload(start, payload)?,
                received: read_int(start, payload)?,
                block_for: read_int(start, payload)?,
                failures: read_int(start, payload)?,
                data_present: read_byte(start, payload)? != 0,
            },
            FUNCTION_FAILURE => Self::FunctionFailure {
                keyspace: read_string(start, payload)?,
                function: read_string(start, payload)?,
                arg_types: read_string_list(start, payload)?,
            },
            WRITE_FAILURE => Self::WriteFailure {
                consistency: Consistency::from_payload(start, payload)?,
                received: read_int(start, payload)?,
                block_for: read_int(start, payload)?,
                failures: read_int(start, payload)?,
                write_type: WriteType::from_str(read_str(start, payload)?)?,
            },
            SYNTAX_ERROR => Self::SyntaxError,
            UNAUTHORIZED => Self::Unauthorized,
            INVALID => Self::Invalid,
            CONFIG_ERROR => Self::ConfigError,
            ALREADY_EXISTS => Self::AlreadyExists {
                keyspace: read_string(start, payload)?,
                table: read_string(start, payload)?,
            },
            UNPREPARED => Self::Unprepared {
                id: read_prepared_id(start, payload)?,
            },
            _ => bail!("Unknown error code: {:#06x}", code),
        })
    }
}

impl Display for CqlErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerError => write!(f, "server error"),
            Self::ProtocolError => write!(f, "protocol error"),
            Self::BadCredentials => write!(f, "bad credentials"),
            Self::Unavailable {
                consistency,
                required,
                alive,
            } => write!(f, "unavailable at {}: required {}, alive {}", consistency, required, alive),
            Self::Overloaded => write!(f, "overloaded"),
            Self::IsBootstrapping => write!(f, "bootstrapping"),
            Self::TruncateError => write!(f, "truncate error"),
            Self::WriteTimeout {
                consistency,
                received,
                block_for,
                write_type,
            } => write!(
                f,
                "{} write timeout at {}: received {} of {}",
                write_type, consistency, received, block_for
            ),
            Self::ReadTimeout {
                consistency,
                received,
                block_for,
                data_present,
            } => write!(
                f,
                "read timeout at {}: received {} of {}, data present: {}",
                consistency, received, block_for, data_present
            ),
            Self::ReadFailure {
                consistency,
                received,
                block_for,
                failures,
                data_present,
            } => write!(
                f,
                "read failure at {}: received {} of {}, {} failed, data present: {}",
                consistency, received, block_for, failures, data_present
            ),
            Self::FunctionFailure {
                keyspace,
                function,
                arg_types,
            } => write!(f, "function {}.{}({}) failed", keyspace, function, arg_types.join(", ")),
            Self::WriteFailure {
                consistency,
                received,
                block_for,
                failures,
                write_type,
            } => write!(
                f,
                "{} write failure at {}: received {} of {}, {} failed",
                write_type, consistency, received, block_for, failures
            ),
            Self::SyntaxError => write!(f, "syntax error"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Invalid => write!(f, "invalid query"),
            Self::ConfigError => write!(f, "config error"),
            Self::AlreadyExists { keyspace, table } if table.is_empty() => {
                write!(f, "keyspace {} already exists", keyspace)
            }
            Self::AlreadyExists { keyspace, table } => write!(f, "table {}.{} already exists", keyspace, table),
            Self::Unprepared { id } => write!(f, "unprepared statement {:02x?}", id),
        }
    }
}

/// The sort of write behind a timeout or failure, as the server names it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum WriteType {
    Simple,
    Batch,
    UnloggedBatch,
    Counter,
    BatchLog,
    Cas,
    View,
    Cdc,
}

impl Display for WriteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteType::Simple => write!(f, "SIMPLE"),
            WriteType::Batch => write!(f, "BATCH"),
            WriteType::UnloggedBatch => write!(f, "UNLOGGED_BATCH"),
            WriteType::Counter => write!(f, "COUNTER"),
            WriteType::BatchLog => write!(f, "BATCH_LOG"),
            WriteType::Cas => write!(f, "CAS"),
            WriteType::View => write!(f, "VIEW"),
            WriteType::Cdc => write!(f, "CDC"),
        }
    }
}

impl FromStr for WriteType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SIMPLE" => WriteType::Simple,
            "BATCH" => WriteType::Batch,
            "UNLOGGED_BATCH" => WriteType::UnloggedBatch,
            "COUNTER" => WriteType::Counter,
            "BATCH_LOG" => WriteType::BatchLog,
            "CAS" => WriteType::Cas,
            "VIEW" => WriteType::View,
            "CDC" => WriteType::Cdc,
            _ => bail!("Unexpected write type: {}", s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprepared_error_decode() {
        let mut payload = Vec::new();
        write_int(UNPREPARED, &mut payload);
        write_string("Prepared query with ID deadbeef not found", &mut payload);
        write_short_bytes(&[0xDE, 0xAD, 0xBE, 0xEF], &mut payload);
        let frame = ErrorFrame::from_payload(&mut 0, &payload).unwrap();
        assert!(frame.is_unprepared());
        assert_eq!(frame.code(), UNPREPARED);
        assert_eq!(frame.unprepared_id(), Some(&[0xDE, 0xAD, 0xBE, 0xEF][..]));
    }

    #[test]
    fn write_timeout_error_decode() {
        let mut payload = Vec::new();
        write_int(WRITE_TIMEOUT, &mut payload);
        write_string("Operation timed out", &mut payload);
        write_short(Consistency::Quorum as u16, &mut payload);
        write_int(1, &mut payload);
        write_int(2, &mut payload);
        write_string("SIMPLE", &mut payload);
        let frame = ErrorFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(
            frame.kind(),
            &CqlErrorKind::WriteTimeout {
                consistency: Consistency::Quorum,
                received: 1,
                block_for: 2,
                write_type: WriteType::Simple,
            }
        );
        assert_eq!(frame.to_string(), "Operation timed out (SIMPLE write timeout at QUORUM: received 1 of 2)");
    }

    #[test]
    fn read_timeout_data_present_is_a_bool() {
        let mut payload = Vec::new();
        write_int(READ_TIMEOUT, &mut payload);
        write_string("Operation timed out", &mut payload);
        write_short(Consistency::One as u16, &mut payload);
        write_int(0, &mut payload);
        write_int(1, &mut payload);
        write_byte(1, &mut payload);
        let frame = ErrorFrame::from_payload(&mut 0, &payload).unwrap();
        match frame.kind() {
            CqlErrorKind::ReadTimeout { data_present, .. } => assert!(*data_present),
            kind => panic!("Expected a read timeout, got {:?}", kind),
        }
    }

    #[test]
    fn already_exists_error_decode() {
        let mut payload = Vec::new();
        write_int(ALREADY_EXISTS, &mut payload);
        write_string("Cannot add existing table", &mut payload);
        write_string("ks", &mut payload);
        write_string("tbl", &mut payload);
        let frame = ErrorFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(
            frame.kind(),
            &CqlErrorKind::AlreadyExists {
                keyspace: "ks".to_owned(),
                table: "tbl".to_owned(),
            }
        );
    }

    #[test]
    fn unknown_code_is_rejected() {
        let mut payload = Vec::new();
        write_int(0x7777, &mut payload);
        write_string("?", &mut payload);
        assert!(ErrorFrame::from_payload(&mut 0, &payload).is_err());
    }
}
