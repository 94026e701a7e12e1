//! Fixed-width sample packers.
//!
//! One [`BitPacker`] exists per supported width. Widths 2 to 14 store
//! `v + (2^(b-1) - 1)` as an unsigned `b`-bit field, width 1 stores the raw
//! low bit, width 16 stores the two's complement value unchanged (which is
//! byte-identical to i16 little-endian) and width 0 stores nothing.
//!
//! Bit layout: value `i` occupies bits `[i*b, (i+1)*b)` of the payload,
//! counted from the least significant bit of byte 0. The trailing partial
//! byte is zero-padded.

use std::io;

use crate::utils::bitstream_io::{BitstreamIoWriter, BsIoSliceReader};

/// Packed widths in increasing order.
pub const SUPPORTED_WIDTHS: [u8; 10] = [0, 1, 2, 4, 6, 8, 10, 12, 14, 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BitPacker {
    Zero = 0,
    One = 1,
    Two = 2,
    Four = 4,
    Six = 6,
    Eight = 8,
    Ten = 10,
    Twelve = 12,
    Fourteen = 14,
    Sixteen = 16,
}

static PACKERS: [Option<BitPacker>; 17] = [
    Some(BitPacker::Zero),
    Some(BitPacker::One),
    Some(BitPacker::Two),
    None,
    Some(BitPacker::Four),
    None,
    Some(BitPacker::Six),
    None,
    Some(BitPacker::Eight),
    None,
    Some(BitPacker::Ten),
    None,
    Some(BitPacker::Twelve),
    None,
    Some(BitPacker::Fourteen),
    None,
    Some(BitPacker::Sixteen),
];

impl BitPacker {
    /// Looks up the packer for `width`. Odd widths above 1 and anything
    /// above 16 have no packer.
    #[inline]
    pub fn for_width(width: u8) -> Option<BitPacker> {
        PACKERS.get(width as usize).copied().flatten()
    }

    #[inline]
    pub const fn width(self) -> u8 {
        self as u8
    }

    /// Exact payload size for `num_values` values.
    #[inline]
    pub const fn byte_count(self, num_values: usize) -> usize {
        (num_values * self.width() as usize).div_ceil(8)
    }

    /// Largest magnitude a value may have to survive packing.
    #[inline]
    pub const fn max_magnitude(self) -> u16 {
        match self {
            BitPacker::Zero => 0,
            BitPacker::One => 1,
            BitPacker::Sixteen => u16::MAX,
            _ => Self::bias(self.width()) as u16,
        }
    }

    /// Whether every value in `data` round-trips through this packer.
    pub fn can_pack(self, data: &[i16]) -> bool {
        match self {
            BitPacker::Zero => data.iter().all(|&v| v == 0),
            BitPacker::One => data.iter().all(|&v| v == 0 || v == 1),
            BitPacker::Sixteen => true,
            _ => data
                .iter()
                .all(|v| v.unsigned_abs() <= self.max_magnitude()),
        }
    }

    #[inline(always)]
    const fn bias(width: u8) -> i32 {
        (1 << (width - 1)) - 1
    }

    /// Appends the packed form of `data` to `out`.
    pub fn pack(self, data: &[i16], out: &mut Vec<u8>) -> io::Result<()> {
        debug_assert!(self.can_pack(data), "values exceed {} bits", self.width());

        let width = self.width() as u32;
        match self {
            BitPacker::Zero => return Ok(()),
            BitPacker::Sixteen => {
                out.reserve(data.len() * 2);
                for v in data {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                return Ok(());
            }
            _ => {}
        }

        out.reserve(self.byte_count(data.len()));
        let mut writer = BitstreamIoWriter::new(out);

        if self == BitPacker::One {
            for &v in data {
                writer.put(v & 1 != 0)?;
            }
        } else {
            let bias = Self::bias(self.width());
            for &v in data {
                writer.put_n::<u16>(width, (v as i32 + bias) as u16)?;
            }
        }

        writer.finish()?;
        Ok(())
    }

    /// Fills `dst` from a packed payload. `data` must hold at least
    /// [`byte_count`](Self::byte_count)`(dst.len())` bytes.
    pub fn unpack(self, data: &[u8], dst: &mut [i16]) -> io::Result<()> {
        let needed = self.byte_count(dst.len());
        if data.len() < needed {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "unpack: {} bytes for {} values at {} bits, need {}",
                    data.len(),
                    dst.len(),
                    self.width(),
                    needed
                ),
            ));
        }

        match self {
            BitPacker::Zero => dst.fill(0),
            BitPacker::Sixteen => {
                for (d, chunk) in dst.iter_mut().zip(data.chunks_exact(2)) {
                    *d = i16::from_le_bytes([chunk[0], chunk[1]]);
                }
            }
            BitPacker::One => {
                let mut reader = BsIoSliceReader::from_slice(&data[..needed]);
                for d in dst.iter_mut() {
                    *d = reader.get()? as i16;
                }
            }
            _ => {
                let width = self.width() as u32;
                let bias = Self::bias(self.width());
                let mut reader = BsIoSliceReader::from_slice(&data[..needed]);
                for d in dst.iter_mut() {
                    let stored: u16 = reader.get_n(width)?;
                    *d = (stored as i32 - bias) as i16;
                }
            }
        }

        Ok(())
    }
}
