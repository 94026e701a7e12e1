//! Container header.
//!
//! ## Layout (little-endian)
//!
//! | bytes | field                                              |
//! |-------|----------------------------------------------------|
//! | 1     | version                                            |
//! | 4     | checksum                                           |
//! | 1     | flags: bit 7 encrypted, bits 0-3 global bit shift  |
//! | 1     | sample data: bits 6-7 rate index, bits 2-5 channel |
//! |       | count, bit 1 24-bit samples, bit 0 compression     |
//! | 4     | block count                                        |
//! | 4 * n | block offsets, relative to the end of the header   |
//!
//! Block offsets are stored frame by frame: entry `b * channels + c` locates
//! block `b` of channel `c`. Offsets strictly increase.
//!
//! ## Legacy Streams
//!
//! A first byte below [`HLAC_VERSION`] marks a monolithic stream without a
//! block table: 0 for stereo, any other value for mono, followed by
//! interleaved 16-bit little-endian samples at 44.1 kHz.

use std::io::Read;

use anyhow::{Result, bail};
use log::{debug, trace};

use crate::process::COMPRESSION_BLOCK_SIZE;
use crate::utils::errors::HeaderError;

/// Version byte written by the encoder.
pub const HLAC_VERSION: u8 = 2;

/// Low half of the header checksum.
pub const CHECKSUM_SEED: u16 = 0x1A2B;

/// Size of the fixed part of the header.
pub const FIXED_HEADER_SIZE: usize = 11;

/// Rate assumed for legacy monolithic streams.
pub const LEGACY_SAMPLE_RATE: u32 = 44100;

const FLAG_ENCRYPTED: u8 = 0x80;
const FLAG_BIT_SHIFT_MASK: u8 = 0x0F;

const SAMPLE_DATA_24_BIT: u8 = 0x02;
const SAMPLE_DATA_COMPRESSED: u8 = 0x01;

/// Upper bound on entries reserved before the block table is read.
const MAX_PREALLOCATED_OFFSETS: usize = 1 << 16;

/// Sample rates representable in the two-bit rate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz88200,
    Hz96000,
}

impl SampleRate {
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            44100 => Some(Self::Hz44100),
            48000 => Some(Self::Hz48000),
            88200 => Some(Self::Hz88200),
            96000 => Some(Self::Hz96000),
            _ => None,
        }
    }

    pub fn hz(self) -> u32 {
        match self {
            Self::Hz44100 => 44100,
            Self::Hz48000 => 48000,
            Self::Hz88200 => 88200,
            Self::Hz96000 => 96000,
        }
    }

    fn index(self) -> u8 {
        self as u8
    }

    fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => Self::Hz44100,
            1 => Self::Hz48000,
            2 => Self::Hz88200,
            _ => Self::Hz96000,
        }
    }
}

/// Builds the header checksum: the seed in the low half and the product of
/// its two bytes in the high half.
pub fn create_checksum() -> u32 {
    let [lo, hi] = CHECKSUM_SEED.to_le_bytes();
    let product = lo as u32 * hi as u32;
    product << 16 | CHECKSUM_SEED as u32
}

pub fn validate_checksum(checksum: u32) -> bool {
    if checksum == 0 {
        return false;
    }

    let lo = (checksum & 0xFF) as u8;
    let hi = ((checksum >> 8) & 0xFF) as u8;
    lo as u32 * hi as u32 == checksum >> 16
}

/// Parsed header of a block-based stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlacHeader {
    pub version: u8,
    pub global_bit_shift: u8,
    pub sample_rate: SampleRate,
    pub channels: u8,
    pub compressed: bool,
    pub block_offsets: Vec<u32>,
}

/// What the first bytes of a stream describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLayout {
    Blocks(HlacHeader),
    Monolith { channels: u8 },
}

impl HlacHeader {
    pub fn new(sample_rate: SampleRate, channels: u8, compressed: bool) -> Self {
        Self {
            version: HLAC_VERSION,
            global_bit_shift: 0,
            sample_rate,
            channels,
            compressed,
            block_offsets: Vec::new(),
        }
    }

    pub fn header_size(&self) -> usize {
        FIXED_HEADER_SIZE + 4 * self.block_offsets.len()
    }

    /// Number of blocks per channel.
    pub fn frame_blocks(&self) -> usize {
        self.block_offsets.len() / self.channels.max(1) as usize
    }

    /// Samples per channel, rounded up to whole blocks.
    pub fn total_samples(&self) -> u64 {
        (self.frame_blocks() * COMPRESSION_BLOCK_SIZE) as u64
    }

    /// Offset of block `block` of `channel`, relative to the data region.
    pub fn block_offset(&self, block: usize, channel: usize) -> Option<u32> {
        self.block_offsets
            .get(block * self.channels as usize + channel)
            .copied()
    }

    fn sample_data(&self) -> u8 {
        let compression = if self.compressed {
            SAMPLE_DATA_COMPRESSED
        } else {
            0
        };
        self.sample_rate.index() << 6 | (self.channels & 0x0F) << 2 | compression
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_size());
        out.push(self.version);
        out.extend_from_slice(&create_checksum().to_le_bytes());
        out.push(self.global_bit_shift & FLAG_BIT_SHIFT_MASK);
        out.push(self.sample_data());
        out.extend_from_slice(&(self.block_offsets.len() as u32).to_le_bytes());
        for offset in &self.block_offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out
    }
}

fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], consumed: &mut usize) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => bail!(HeaderError::Truncated {
                expected: *consumed + buf.len(),
                found: *consumed + filled,
            }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    *consumed += filled;
    Ok(())
}

/// Reads and validates the header at the current position of `reader`.
pub fn read_stream_header<R: Read>(reader: &mut R) -> Result<StreamLayout> {
    let mut consumed = 0;
    let mut byte = [0u8; 1];
    let mut word = [0u8; 4];

    read_field(reader, &mut byte, &mut consumed)?;
    let version = byte[0];

    if version < HLAC_VERSION {
        let channels = if version == 0 { 2 } else { 1 };
        debug!("Legacy monolithic stream with {channels} channel(s)");
        return Ok(StreamLayout::Monolith { channels });
    }

    if version > HLAC_VERSION {
        bail!(HeaderError::UnsupportedVersion(version));
    }

    read_field(reader, &mut word, &mut consumed)?;
    let checksum = u32::from_le_bytes(word);
    if !validate_checksum(checksum) {
        bail!(HeaderError::CorruptHeader(checksum));
    }

    read_field(reader, &mut byte, &mut consumed)?;
    let flags = byte[0];
    if flags & FLAG_ENCRYPTED != 0 {
        bail!(HeaderError::Encrypted);
    }

    read_field(reader, &mut byte, &mut consumed)?;
    let sample_data = byte[0];
    if sample_data & SAMPLE_DATA_24_BIT != 0 {
        bail!(HeaderError::UnsupportedSampleFormat(24));
    }

    let channels = (sample_data >> 2) & 0x0F;
    if channels == 0 {
        bail!(HeaderError::InvalidChannelCount(channels));
    }

    read_field(reader, &mut word, &mut consumed)?;
    let block_count = u32::from_le_bytes(word) as usize;
    if block_count % channels as usize != 0 {
        bail!(HeaderError::InvalidBlockTable {
            index: block_count,
            reason: "block count is not a multiple of the channel count",
        });
    }

    let mut block_offsets = Vec::with_capacity(block_count.min(MAX_PREALLOCATED_OFFSETS));
    for index in 0..block_count {
        read_field(reader, &mut word, &mut consumed)?;
        let offset = u32::from_le_bytes(word);
        if block_offsets.last().is_some_and(|&prev| offset <= prev) {
            bail!(HeaderError::InvalidBlockTable {
                index,
                reason: "offsets must strictly increase",
            });
        }
        block_offsets.push(offset);
    }

    let header = HlacHeader {
        version,
        global_bit_shift: flags & FLAG_BIT_SHIFT_MASK,
        sample_rate: SampleRate::from_index(sample_data >> 6),
        channels,
        compressed: sample_data & SAMPLE_DATA_COMPRESSED != 0,
        block_offsets,
    };

    trace!("{header:?}");
    debug!(
        "HLAC v{} stream: {} Hz, {} channel(s), {} block(s) per channel, compressed: {}",
        header.version,
        header.sample_rate.hz(),
        header.channels,
        header.frame_blocks(),
        header.compressed
    );

    Ok(StreamLayout::Blocks(header))
}
