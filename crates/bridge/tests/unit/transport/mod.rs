//! Transport layer tests.

/// Frame encoding and decoding over in-memory readers.
pub mod frame;
