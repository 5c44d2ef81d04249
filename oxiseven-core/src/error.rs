//! Error types for OxiSeven codec operations.
//!
//! One enum covers every failure the codec engine can report to its caller.
//! Running out of input mid-stream is not an error: the decoder reports it as
//! a stream status.

use std::io;
use thiserror::Error;

/// The main error type for OxiSeven operations.
#[derive(Debug, Error)]
pub enum OxiSevenError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The compressed stream violates a range-coder or dictionary invariant.
    #[error("Corrupted input at output position {offset}: {message}")]
    CorruptedInput {
        /// Decoded output position where the corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// The source closed before enough bytes arrived.
    #[error("Truncated input: source closed while {needed} more bytes were required")]
    TruncatedInput {
        /// Minimum number of bytes that were still required.
        needed: usize,
    },

    /// Invalid stream header (properties byte or dictionary size).
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Rejected encoder or decoder configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// A driver was invoked in a state that does not allow the call.
    #[error("Bad state: {message}")]
    BadState {
        /// Description of the contract violation.
        message: String,
    },
}

/// Result type alias for OxiSeven operations.
pub type Result<T> = std::result::Result<T, OxiSevenError>;

impl OxiSevenError {
    /// Create a corrupted input error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedInput {
            offset,
            message: message.into(),
        }
    }

    /// Create a truncated input error.
    pub fn truncated(needed: usize) -> Self {
        Self::TruncatedInput { needed }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a bad state error.
    pub fn bad_state(message: impl Into<String>) -> Self {
        Self::BadState {
            message: message.into(),
        }
    }

    /// Whether this error reports damaged or incomplete compressed data,
    /// as opposed to a configuration or usage problem.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::CorruptedInput { .. } | Self::TruncatedInput { .. } | Self::InvalidHeader { .. }
        )
    }
}
