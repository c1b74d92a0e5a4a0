//! Common building blocks shared across the runtime crates

pub mod errors;
pub mod policy;
