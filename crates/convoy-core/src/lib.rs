//! convoy-core — shared domain types for the Convoy orchestration core.
//!
//! Everything here is an in-process representation re-derived from backend
//! queries; nothing in this crate talks to a backend.

pub mod arn;
pub mod bytesize;
pub mod error;
pub mod image;
pub mod types;

pub use error::{BackendError, Partial};
pub use image::{Image, ImageError};
pub use types::*;
