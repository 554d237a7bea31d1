// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error taxonomy shared by readers, tessellation, scene building and writers

use thiserror::Error;

/// Errors raised by the exchange pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Unparseable or unsupported input, or an unsupported protocol/mode argument
    #[error("format error: {0}")]
    Format(String),

    /// Geometry could not be turned into a renderable mesh or polyline
    #[error("tessellation error: {0}")]
    Tessellation(String),

    /// Document hierarchy violates the tree invariant or is too deep
    #[error("structure error: {0}")]
    Structure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn tessellation(message: impl Into<String>) -> Self {
        Self::Tessellation(message.into())
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Io(err.into())
        } else {
            Self::Format(format!("invalid JSON: {}", err))
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::format("bad header").to_string(),
            "format error: bad header"
        );
        assert_eq!(
            Error::structure("too deep").to_string(),
            "structure error: too deep"
        );
    }

    #[test]
    fn test_json_syntax_error_is_format() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Format(_)));
    }
}
