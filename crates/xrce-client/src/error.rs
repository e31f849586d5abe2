// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the XRCE client.

use std::fmt;

/// Result type for XRCE client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the XRCE client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer too small for the requested read or write.
    BufferTooSmall,

    /// Malformed or truncated wire data.
    DecodingError,

    /// Invalid session or submessage header.
    InvalidHeader,

    /// Invalid parameter (bad history size, zero-sized buffer, ...).
    InvalidParameter,

    /// A fixed-capacity table or window is full.
    ResourceExhausted,

    /// A transport-level I/O error (message only, not the original error).
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::DecodingError => write!(f, "malformed wire data"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
