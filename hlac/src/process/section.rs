//! Scoped access to part of a stream.
//!
//! [`Reader::map_section`] copies the bytes covering a block span into memory
//! once and decodes from there; the bytes are released when the
//! [`MappedSection`] is dropped. [`Reader::subsection`] exposes a window of
//! the stream whose sample 0 is an arbitrary stream position.

use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;

use anyhow::{Result, bail};
use log::{debug, trace};

use crate::process::COMPRESSION_BLOCK_SIZE;
use crate::process::decode::{DecodeOutcome, Reader, read_at};
use crate::structs::header::StreamLayout;
use crate::utils::errors::{DecodeError, SectionError};

/// In-memory bytes standing in for a byte range of the original stream.
///
/// Positions are absolute stream positions. Reads outside the held range
/// report end of stream.
#[derive(Debug, Clone)]
pub struct SectionCursor {
    base: u64,
    bytes: Vec<u8>,
    position: u64,
}

impl SectionCursor {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes,
            position: base,
        }
    }

    /// Byte range of the original stream held in memory.
    pub fn byte_range(&self) -> Range<u64> {
        self.base..self.base + self.bytes.len() as u64
    }
}

impl Read for SectionCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.byte_range().contains(&self.position) {
            return Ok(0);
        }

        let start = (self.position - self.base) as usize;
        let n = buf.len().min(self.bytes.len() - start);
        buf[..n].copy_from_slice(&self.bytes[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for SectionCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
            SeekFrom::End(d) => self.byte_range().end.checked_add_signed(d),
        };

        let Some(target) = target else {
            let offset = match pos {
                SeekFrom::Start(p) => p as i64,
                SeekFrom::Current(d) | SeekFrom::End(d) => d,
            };
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                SectionError::SeekOutsideView(offset),
            ));
        };

        self.position = target;
        Ok(target)
    }
}

/// Decoder over an in-memory copy of a block span.
pub struct MappedSection {
    reader: Reader<SectionCursor>,
    samples: Range<u64>,
}

impl MappedSection {
    /// Samples that can be decoded from this section.
    pub fn sample_range(&self) -> Range<u64> {
        self.samples.clone()
    }

    pub fn byte_range(&self) -> Range<u64> {
        self.reader_cursor().byte_range()
    }

    fn reader_cursor(&self) -> &SectionCursor {
        self.reader.inner()
    }

    pub fn channel_count(&self) -> usize {
        self.reader.channel_count()
    }

    /// Decodes like [`Reader::decode`]; `start` is a stream position.
    pub fn decode(
        &mut self,
        start: u64,
        num_samples: usize,
        dest: &mut [&mut [i16]],
    ) -> Result<DecodeOutcome> {
        let end = start.checked_add(num_samples as u64);
        if start < self.samples.start || end.is_none_or(|end| end > self.samples.end) {
            bail!(SectionError::OutsideMappedRange {
                start,
                end: start.saturating_add(num_samples as u64),
                mapped_start: self.samples.start,
                mapped_end: self.samples.end,
            });
        }

        self.reader.decode(start, num_samples, dest)
    }
}

impl Drop for MappedSection {
    fn drop(&mut self) {
        let bytes = self.byte_range();
        trace!("Releasing section bytes {}..{}", bytes.start, bytes.end);
    }
}

/// Window onto a [`Reader`] whose sample 0 is `start` in the stream.
pub struct Subsection<'a, R: Read + Seek> {
    reader: &'a mut Reader<R>,
    start: u64,
    length: u64,
}

impl<R: Read + Seek> Subsection<'_, R> {
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Decodes window samples `start..start + num_samples`.
    pub fn decode(
        &mut self,
        start: u64,
        num_samples: usize,
        dest: &mut [&mut [i16]],
    ) -> Result<DecodeOutcome> {
        let end = start.checked_add(num_samples as u64);
        if end.is_none_or(|end| end > self.length) {
            bail!(DecodeError::OutOfRange {
                start,
                end: start.saturating_add(num_samples as u64),
                total: self.length,
            });
        }

        self.reader.decode(self.start + start, num_samples, dest)
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Borrows the reader as a window of `length` samples from `start`.
    pub fn subsection(&mut self, start: u64, length: u64) -> Result<Subsection<'_, R>> {
        let total = self.total_samples();
        if start.checked_add(length).is_none_or(|end| end > total) {
            bail!(SectionError::InvalidSubsection {
                start,
                length,
                total,
            });
        }

        Ok(Subsection {
            reader: self,
            start,
            length,
        })
    }

    /// Copies the bytes needed to decode `range` into memory.
    ///
    /// The section covers whole blocks: from the block holding `range.start`
    /// up to the block after the one holding `range.end`.
    pub fn map_section(&mut self, range: Range<u64>) -> Result<MappedSection> {
        let total = self.total_samples();
        if range.start > range.end || range.end > total {
            bail!(DecodeError::OutOfRange {
                start: range.start,
                end: range.end,
                total,
            });
        }

        let data_start = self.data_start();
        let layout = self.layout().clone();
        let (samples, bytes) = match &layout {
            StreamLayout::Blocks(header) => {
                let block_size = COMPRESSION_BLOCK_SIZE as u64;
                let first_block = (range.start / block_size) as usize;
                let end_block = (range.end / block_size) as usize + 1;

                let samples = first_block as u64 * block_size
                    ..(end_block as u64 * block_size).min(total);
                let byte_start =
                    data_start + header.block_offset(first_block, 0).unwrap_or(0) as u64;
                let byte_end = match header.block_offset(end_block, 0) {
                    Some(offset) => data_start + offset as u64,
                    None => self.inner_mut().seek(SeekFrom::End(0))?,
                };
                (samples, byte_start..byte_end.max(byte_start))
            }
            StreamLayout::Monolith { channels } => {
                let frame_bytes = 2 * *channels as u64;
                (
                    range.clone(),
                    data_start + range.start * frame_bytes..data_start + range.end * frame_bytes,
                )
            }
        };

        let mut buffer = vec![0u8; (bytes.end - bytes.start) as usize];
        if !read_at(self.inner_mut(), bytes.start, &mut buffer)? {
            bail!(DecodeError::TruncatedStream {
                position: bytes.start,
                needed: buffer.len(),
            });
        }

        debug!(
            "Mapped samples {}..{} from bytes {}..{}",
            samples.start, samples.end, bytes.start, bytes.end
        );

        let mut reader = Reader::from_parts(
            SectionCursor::new(bytes.start, buffer),
            layout,
            data_start,
            total,
        );
        reader.set_fail_level(self.fail_level());

        Ok(MappedSection { reader, samples })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::process::decode::open_for_decode;
    use crate::process::encode::encode;

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i * 37) % 20000) as i16 - 10000).collect()
    }

    #[test]
    fn test_cursor_maps_absolute_positions() -> io::Result<()> {
        let mut cursor = SectionCursor::new(100, vec![1, 2, 3, 4]);
        let mut buf = [0u8; 2];

        cursor.seek(SeekFrom::Start(102))?;
        cursor.read_exact(&mut buf)?;
        assert_eq!(buf, [3, 4]);
        assert_eq!(cursor.read(&mut buf)?, 0);

        cursor.seek(SeekFrom::Start(10))?;
        assert_eq!(cursor.read(&mut buf)?, 0);

        assert_eq!(cursor.seek(SeekFrom::End(-1))?, 103);
        assert!(cursor.seek(SeekFrom::Current(-200)).is_err());
        Ok(())
    }

    #[test]
    fn test_mapped_section_decodes_range() {
        let samples = ramp(20_000);
        let bytes = encode(&[&samples[..]], 44100).unwrap();
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();

        let mut section = reader.map_section(5000..9000).unwrap();
        assert_eq!(section.sample_range(), 4096..12_288);

        let mut out = vec![0i16; 4000];
        let outcome = section.decode(5000, 4000, &mut [&mut out[..]]).unwrap();
        assert_eq!(outcome.samples, 4000);
        assert_eq!(out, &samples[5000..9000]);

        let err = section.decode(12_000, 500, &mut [&mut out[..500]]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SectionError>(),
            Some(SectionError::OutsideMappedRange { .. })
        ));

        let err = section.decode(u64::MAX, 1, &mut [&mut out[..1]]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SectionError>(),
            Some(SectionError::OutsideMappedRange { end: u64::MAX, .. })
        ));
    }

    #[test]
    fn test_mapped_section_at_stream_end() {
        let samples = ramp(10_000);
        let bytes = encode(&[&samples[..]], 44100).unwrap();
        let len = bytes.len() as u64;
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();

        let mut section = reader.map_section(9000..12_288).unwrap();
        assert_eq!(section.byte_range().end, len);

        let mut out = vec![0i16; 1000];
        section.decode(9000, 1000, &mut [&mut out[..]]).unwrap();
        assert_eq!(out, &samples[9000..]);
    }

    #[test]
    fn test_subsection_window() {
        let samples = ramp(9000);
        let bytes = encode(&[&samples[..]], 44100).unwrap();
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();

        let mut window = reader.subsection(3000, 2000).unwrap();
        assert_eq!(window.len(), 2000);

        let mut out = vec![0i16; 100];
        window.decode(1900, 100, &mut [&mut out[..]]).unwrap();
        assert_eq!(out, &samples[4900..5000]);

        let err = window.decode(1950, 100, &mut [&mut out[..]]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::OutOfRange { .. })
        ));

        let err = window.decode(u64::MAX - 10, 100, &mut [&mut out[..]]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::OutOfRange {
                start: u64::MAX - 10,
                end: u64::MAX,
                total: 2000
            })
        );

        let err = reader.subsection(12_000, 1000).err().unwrap();
        assert_eq!(
            err.downcast_ref::<SectionError>(),
            Some(&SectionError::InvalidSubsection {
                start: 12_000,
                length: 1000,
                total: 12_288
            })
        );
    }
}
