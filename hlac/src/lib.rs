//! Lossless block codec for 16-bit PCM audio.
//!
//! ## Technical Overview
//!
//! Streams hold mono or stereo 16-bit samples and reconstruct them bit for
//! bit. Each channel is cut into blocks of
//! [`COMPRESSION_BLOCK_SIZE`](process::COMPRESSION_BLOCK_SIZE) samples, and
//! every block decodes on its own, so random access costs one table lookup.
//!
//! ### Stream Organization
//!
//! **Container**: header with version, checksum, flags, sample format and a
//! byte offset for every channel block.
//! **Blocks**: sequences of cycles, each a header followed by a packed payload.
//!
//! ### Cycle Kinds
//!
//! - Template: samples packed at the narrowest lossless width
//! - Delta: difference from the current template
//! - Diff: quarter-rate values plus interpolation errors
//!
//! Packed widths are 0, 1, 2, 4, 6, 8, 10, 12, 14 and 16 bits.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//!
//! use hlac::process::decode::open_for_decode;
//! use hlac::process::encode::encode;
//!
//! let left: Vec<i16> = (0..10_000).map(|i| ((i % 200) * 100 - 10_000) as i16).collect();
//! let right = vec![0i16; 10_000];
//!
//! let bytes = encode(&[&left[..], &right[..]], 44100)?;
//!
//! let mut reader = open_for_decode(Cursor::new(bytes))?;
//! assert_eq!(reader.channel_count(), 2);
//!
//! // Decode from an arbitrary position
//! let mut l = vec![0i16; 500];
//! let mut r = vec![0i16; 500];
//! let outcome = reader.decode(4000, 500, &mut [&mut l[..], &mut r[..]])?;
//!
//! assert!(!outcome.truncated);
//! assert_eq!(l, &left[4000..4500]);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// The codec pipeline.
///
/// 1. **Packing** ([`process::packing`]): Fixed-width sample packers.
///
/// 2. **Analysis** ([`process::analyze`]): Bit-depth and period search.
///
/// 3. **Encoding** ([`process::encode`]): Cycle selection per block and the
///    stream [`Writer`](process::encode::Writer).
///
/// 4. **Decoding** ([`process::decode`]): Per-channel block state machines
///    behind a seekable [`Reader`](process::decode::Reader).
pub mod process;

/// Wire structures and encoder configuration.
///
/// - **Container Header** ([`structs::header`]): Checksum, format and block table
/// - **Cycle Header** ([`structs::cycle_header`]): Cycle kind, width and length
/// - **Options** ([`structs::options`]): Compressor options and presets
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Vector Operations** ([`utils::vector_ops`]): Wrapping sample arithmetic
pub mod utils;
