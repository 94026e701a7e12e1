use crate::process::packing::BitPacker;
use crate::process::{COMPRESSION_BLOCK_SIZE, diff};
use crate::utils::errors::DecodeError;

/// Serialized size of a [`CycleHeader`].
pub const CYCLE_HEADER_SIZE: usize = 3;

const TEMPLATE_FLAG: u8 = 0x20;
const DIFF_FLAGS: u8 = 0xC0;
const DEPTH_MASK: u8 = 0x1F;

const MIN_DIFF_LOG2: u8 = diff::MIN_DIFF_LENGTH.trailing_zeros() as u8;
const MAX_DIFF_LOG2: u8 = COMPRESSION_BLOCK_SIZE.trailing_zeros() as u8;

/// Header preceding every cycle payload.
///
/// Wire form: one control byte followed by a little-endian u16.
///
/// | control bits | meaning                                  |
/// |--------------|------------------------------------------|
/// | 5            | template (also set for diff cycles)      |
/// | 6-7          | diff                                     |
/// | 0-4          | bit depth (template and delta cycles)    |
///
/// The u16 holds the sample count for template and delta cycles. For diff
/// cycles it holds the full-value depth in bits 0-4, the error depth in bits
/// 5-9 and log2 of the cycle length in bits 10-13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleHeader {
    /// Samples packed directly; the cycle becomes the new template.
    Template { packer: BitPacker, num_samples: u16 },

    /// Difference from the leading samples of the current template.
    Delta { packer: BitPacker, num_samples: u16 },

    /// Quarter-rate full values followed by interpolation errors; the
    /// reconstructed cycle becomes the new template.
    Diff {
        full: BitPacker,
        error: BitPacker,
        log2_len: u8,
    },
}

impl CycleHeader {
    pub fn to_bytes(&self) -> [u8; CYCLE_HEADER_SIZE] {
        let (control, field) = match *self {
            CycleHeader::Template {
                packer,
                num_samples,
            } => (TEMPLATE_FLAG | packer.width(), num_samples),
            CycleHeader::Delta {
                packer,
                num_samples,
            } => (packer.width(), num_samples),
            CycleHeader::Diff {
                full,
                error,
                log2_len,
            } => (
                TEMPLATE_FLAG | DIFF_FLAGS,
                full.width() as u16 | (error.width() as u16) << 5 | (log2_len as u16) << 10,
            ),
        };

        let field = field.to_le_bytes();
        [control, field[0], field[1]]
    }

    pub fn from_bytes(bytes: [u8; CYCLE_HEADER_SIZE]) -> Result<Self, DecodeError> {
        let control = bytes[0];
        let field = u16::from_le_bytes([bytes[1], bytes[2]]);

        let packer_for = |width: u8| {
            BitPacker::for_width(width).ok_or(DecodeError::UnsupportedBitDepth(width))
        };

        if control & DIFF_FLAGS != 0 {
            let log2_len = ((field >> 10) & 0xF) as u8;
            if !(MIN_DIFF_LOG2..=MAX_DIFF_LOG2).contains(&log2_len) {
                return Err(DecodeError::InvalidDiffLength(log2_len));
            }

            return Ok(CycleHeader::Diff {
                full: packer_for((field & 0x1F) as u8)?,
                error: packer_for(((field >> 5) & 0x1F) as u8)?,
                log2_len,
            });
        }

        if field == 0 {
            return Err(DecodeError::EmptyCycle);
        }

        let packer = packer_for(control & DEPTH_MASK)?;

        if control & TEMPLATE_FLAG != 0 {
            Ok(CycleHeader::Template {
                packer,
                num_samples: field,
            })
        } else {
            Ok(CycleHeader::Delta {
                packer,
                num_samples: field,
            })
        }
    }

    /// Number of samples the cycle reconstructs.
    pub fn num_samples(&self) -> usize {
        match *self {
            CycleHeader::Template { num_samples, .. } | CycleHeader::Delta { num_samples, .. } => {
                num_samples as usize
            }
            CycleHeader::Diff { log2_len, .. } => 1 << log2_len,
        }
    }

    /// Whether the reconstructed cycle replaces the template.
    pub fn is_template(&self) -> bool {
        !matches!(self, CycleHeader::Delta { .. })
    }

    /// Number of payload bytes following the header.
    pub fn payload_size(&self) -> usize {
        match *self {
            CycleHeader::Template {
                packer,
                num_samples,
            }
            | CycleHeader::Delta {
                packer,
                num_samples,
            } => packer.byte_count(num_samples as usize),
            CycleHeader::Diff { full, error, .. } => {
                let len = self.num_samples();
                full.byte_count(diff::num_full_values(len))
                    + error.byte_count(diff::num_error_values(len))
            }
        }
    }
}
