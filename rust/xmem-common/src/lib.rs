//! Core definitions (error types and result helpers) shared by all xmem-* crates.

pub mod error;
pub mod result;

pub use result::Result;
