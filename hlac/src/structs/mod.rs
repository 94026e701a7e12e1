//! Wire structures and configuration.
//!
//! Contains the container header with its block table, the per-cycle header
//! and the encoder options shared by the codec pipeline.

pub mod cycle_header;
pub mod header;
pub mod options;
