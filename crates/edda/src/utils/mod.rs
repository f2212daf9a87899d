//! Shared numeric helpers for the decoder stack.

pub mod linear_algebra;
pub mod masks;
