//! Shared relay core types

pub mod error;

pub use error::{RelayError, RelayResult};
