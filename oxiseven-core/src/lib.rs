//! # OxiSeven Core
//!
//! Core components shared by the OxiSeven codec crates.
//!
//! - [`error`]: the error taxonomy every codec reports through
//! - [`traits`]: chunk-driven [`Compressor`] / [`Decompressor`] traits
//! - `async_io`: Tokio adapters over those traits (feature `async-io`)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Driver: chunked execution, backpressure, cancel         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Codec: LZMA encoder / decoder (oxiseven-lzma)           │
//! ├─────────────────────────────────────────────────────────┤
//! │ Core (this crate): errors, codec traits, async adapters │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxiseven_core::{DecompressStatus, OxiSevenError};
//!
//! let err = OxiSevenError::truncated(4);
//! assert!(err.is_data_error());
//! assert_ne!(DecompressStatus::Done, DecompressStatus::NeedsInput);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod traits;

#[cfg(feature = "async-io")]
pub mod async_io;

// Re-exports for convenience
pub use error::{OxiSevenError, Result};
pub use traits::{CompressStatus, Compressor, DecompressStatus, Decompressor, FlushMode};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{OxiSevenError, Result};
    pub use crate::traits::{
        CompressStatus, Compressor, DecompressStatus, Decompressor, FlushMode,
    };
}
