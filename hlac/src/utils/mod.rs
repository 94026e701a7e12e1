//! Utility functions and supporting infrastructure.
//!
//! Provides little-endian bit I/O, integer vector helpers and error types.

pub mod bitstream_io;
pub mod errors;
pub mod vector_ops;
