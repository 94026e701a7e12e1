//! Bit-level I/O over little-endian packed payloads.
//!
//! Packed cycle payloads store value `i` of width `b` in bits `[i*b, (i+1)*b)`,
//! counting from the least significant bit of the first byte. These wrappers
//! keep that layout in one place for the packers.

use std::io;

use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, LittleEndian, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, LittleEndian>,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R) -> Self {
        Self {
            bs: BitReader::new(read),
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self::new(io::Cursor::new(buf))
    }
}

/// Appends little-endian packed values to a byte sink.
///
/// Call [`finish`](Self::finish) to zero-pad the last partial byte.
pub struct BitstreamIoWriter<W: io::Write> {
    bs: BitWriter<W, LittleEndian>,
}

impl<W: io::Write> BitstreamIoWriter<W> {
    pub fn new(write: W) -> Self {
        Self {
            bs: BitWriter::new(write),
        }
    }

    #[inline(always)]
    pub fn put(&mut self, bit: bool) -> io::Result<()> {
        self.bs.write_bit(bit)
    }

    #[inline(always)]
    pub fn put_n<I: UnsignedInteger>(&mut self, n: u32, value: I) -> io::Result<()> {
        self.bs.write_unsigned_var(n, value)
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.bs.byte_align()?;
        Ok(self.bs.into_writer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsb_first_layout() -> io::Result<()> {
        let mut out = Vec::new();
        let mut writer = BitstreamIoWriter::new(&mut out);
        writer.put_n::<u16>(4, 0x3)?;
        writer.put_n::<u16>(4, 0xA)?;
        writer.put_n::<u16>(6, 0x3F)?;
        writer.finish()?;

        assert_eq!(out, vec![0xA3, 0x3F]);

        let mut reader = BsIoSliceReader::from_slice(&out);
        assert_eq!(reader.get_n::<u16>(4)?, 0x3);
        assert_eq!(reader.get_n::<u16>(4)?, 0xA);
        assert_eq!(reader.get_n::<u16>(6)?, 0x3F);
        assert_eq!(reader.get_n::<u16>(2)?, 0);

        Ok(())
    }

    #[test]
    fn test_read_past_end() {
        let data = [0xFFu8];
        let mut reader = BsIoSliceReader::from_slice(&data);
        assert!(reader.get_n::<u16>(6).is_ok());
        let err = reader.get_n::<u16>(6).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
