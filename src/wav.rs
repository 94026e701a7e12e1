use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use crate::byteorder::WriteBytesLe;
use crate::impl_u16_enum;
use hlacd_macros::{ToBytes, riff_chunk};

pub const RIFF_ID: &[u8; 4] = b"RIFF";
pub const WAVE_ID: &[u8; 4] = b"WAVE";
pub const DATA_ID: &[u8; 4] = b"data";

const BITS_PER_SAMPLE: u16 = 16;

pub trait RiffChunk {
    fn chunk_id(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    /// Writes id, size and body, padding odd bodies to an even length.
    fn write_all<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let data = self.chunk_data();
        let size = u32::try_from(data.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "RIFF chunk too large"))?;

        writer.write_all(self.chunk_id())?;
        writer.write_all(&size.to_le_bytes())?;
        writer.write_all(&data)?;
        if data.len() % 2 == 1 {
            writer.write_all(&[0])?;
        }
        Ok(())
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Pcm = 0x0001,
    Extensible = 0xFFFE,
}

impl_u16_enum!(FormatTag);

impl FormatTag {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(FormatTag::Pcm),
            0xFFFE => Some(FormatTag::Extensible),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, ToBytes)]
#[riff_chunk(b"fmt ")]
pub struct FmtChunk {
    pub format_tag: FormatTag,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FmtChunk {
    /// 16-bit integer PCM.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        let block_align = channels * BITS_PER_SAMPLE / 8;
        Self {
            format_tag: FormatTag::Pcm,
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn parse_fmt(body: &[u8]) -> io::Result<FmtChunk> {
    if body.len() < 16 {
        return Err(invalid_data(format!("fmt chunk too short: {} bytes", body.len())));
    }

    let tag = read_u16(body, 0);
    let format_tag = FormatTag::from_u16(tag)
        .ok_or_else(|| invalid_data(format!("Unsupported WAV format tag 0x{tag:04X}")))?;

    Ok(FmtChunk {
        format_tag,
        channels: read_u16(body, 2),
        sample_rate: read_u32(body, 4),
        byte_rate: read_u32(body, 8),
        block_align: read_u16(body, 12),
        bits_per_sample: read_u16(body, 14),
    })
}

/// Decoded contents of a 16-bit PCM WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    pub format: FmtChunk,
    /// One buffer per channel.
    pub channels: Vec<Vec<i16>>,
}

impl WavAudio {
    pub fn sample_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Reads a RIFF/WAVE file holding 16-bit PCM.
///
/// Unknown chunks are skipped. A data chunk whose size runs past the end of
/// the input (as written by streaming tools) is read to the end.
pub fn read_wav<R: Read>(mut reader: R) -> io::Result<WavAudio> {
    let mut riff = [0u8; 12];
    reader.read_exact(&mut riff)?;
    if &riff[0..4] != RIFF_ID || &riff[8..12] != WAVE_ID {
        return Err(invalid_data("Not a RIFF/WAVE file"));
    }

    let mut format = None;
    loop {
        let mut chunk_header = [0u8; 8];
        match reader.read_exact(&mut chunk_header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let size = read_u32(&chunk_header, 4) as u64;

        match &chunk_header[0..4] {
            b"fmt " => {
                let mut body = vec![0u8; size as usize];
                reader.read_exact(&mut body)?;
                format = Some(parse_fmt(&body)?);
                if size % 2 == 1 {
                    io::copy(&mut (&mut reader).take(1), &mut io::sink())?;
                }
            }
            b"data" => {
                let format = format.ok_or_else(|| invalid_data("data chunk before fmt chunk"))?;
                if format.bits_per_sample != BITS_PER_SAMPLE {
                    return Err(invalid_data(format!(
                        "Only 16-bit PCM is supported, found {} bits",
                        format.bits_per_sample
                    )));
                }
                if !(1..=2).contains(&format.channels) {
                    return Err(invalid_data(format!(
                        "Only mono and stereo are supported, found {} channels",
                        format.channels
                    )));
                }

                let mut data = Vec::new();
                (&mut reader).take(size).read_to_end(&mut data)?;
                let channels = deinterleave(&data, format.channels as usize);
                return Ok(WavAudio { format, channels });
            }
            _ => {
                let skip = size + size % 2;
                let skipped = io::copy(&mut (&mut reader).take(skip), &mut io::sink())?;
                if skipped < skip {
                    break;
                }
            }
        }
    }

    Err(invalid_data("WAV file does not contain a data chunk"))
}

fn deinterleave(data: &[u8], channel_count: usize) -> Vec<Vec<i16>> {
    let frame_bytes = 2 * channel_count;
    let frames = data.len() / frame_bytes;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];

    for frame in data.chunks_exact(frame_bytes) {
        for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(2)) {
            channel.push(i16::from_le_bytes([sample[0], sample[1]]));
        }
    }
    channels
}

/// RIFF/WAVE writer for 16-bit PCM.
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    format: FmtChunk,
    riff_size_position: u64,
    data_size_position: u64,
    data_written: u64,
    finished: bool,
}

impl<W: Write + Seek> WavWriter<W> {
    /// Writes the RIFF, fmt and data headers with placeholder sizes.
    pub fn new(writer: W, sample_rate: u32, channels: u16) -> io::Result<Self> {
        let mut writer = BufWriter::new(writer);
        let format = FmtChunk::pcm16(sample_rate, channels);

        writer.write_all(RIFF_ID)?;
        let riff_size_position = writer.stream_position()?;
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(WAVE_ID)?;

        format.write_all(&mut writer)?;

        writer.write_all(DATA_ID)?;
        let data_size_position = writer.stream_position()?;
        writer.write_all(&0u32.to_le_bytes())?;

        Ok(Self {
            writer,
            format,
            riff_size_position,
            data_size_position,
            data_written: 0,
            finished: false,
        })
    }

    /// Interleaves one buffer per channel and appends the frames.
    pub fn write_channels(&mut self, channels: &[&[i16]]) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "WAV writer already finished",
            ));
        }
        if channels.len() != self.format.channels as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Expected {} channel(s), got {}",
                    self.format.channels,
                    channels.len()
                ),
            ));
        }

        let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let mut buffer = Vec::with_capacity(frames * channels.len() * 2);
        for i in 0..frames {
            for channel in channels {
                channel[i].write_le(&mut buffer);
            }
        }

        self.writer.write_all(&buffer)?;
        self.data_written += buffer.len() as u64;
        Ok(())
    }

    /// Patches the RIFF and data sizes. Later calls do nothing.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }

        let data_size = u32::try_from(self.data_written)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "WAV data exceeds 4 GiB"))?;
        let current_pos = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer.write_all(&data_size.to_le_bytes())?;

        let riff_size = (current_pos - self.riff_size_position - 4) as u32;
        self.writer.seek(SeekFrom::Start(self.riff_size_position))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(current_pos))?;
        self.writer.flush()?;

        self.finished = true;
        Ok(())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }
}

impl<W: Write + Seek> Drop for WavWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_fmt_chunk_layout() {
        let mut bytes = Vec::new();
        FmtChunk::pcm16(44100, 2).write_all(&mut bytes).unwrap();

        assert_eq!(&bytes[0..4], b"fmt ");
        assert_eq!(read_u32(&bytes, 4), 16);
        assert_eq!(read_u16(&bytes, 8), 1);
        assert_eq!(read_u16(&bytes, 10), 2);
        assert_eq!(read_u32(&bytes, 12), 44100);
        assert_eq!(read_u32(&bytes, 16), 176_400);
        assert_eq!(read_u16(&bytes, 20), 4);
        assert_eq!(read_u16(&bytes, 22), 16);
    }

    #[test]
    fn test_write_then_read() -> io::Result<()> {
        let left: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN];
        let right: Vec<i16> = vec![5, 4, 3, 2, 1];

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, 48000, 2)?;
            writer.write_channels(&[&left[..2], &right[..2]])?;
            writer.write_channels(&[&left[2..], &right[2..]])?;
            assert_eq!(writer.data_written(), 20);
            writer.finish()?;
        }

        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 44 + 20);
        assert_eq!(read_u32(&bytes, 4), 36 + 20);
        assert_eq!(read_u32(&bytes, 40), 20);

        let audio = read_wav(&bytes[..])?;
        assert_eq!(audio.format, FmtChunk::pcm16(48000, 2));
        assert_eq!(audio.channels, vec![left, right]);
        assert_eq!(audio.sample_count(), 5);
        Ok(())
    }

    #[test]
    fn test_read_skips_unknown_chunks() -> io::Result<()> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF\0\0\0\0WAVE");
        bytes.extend_from_slice(b"LIST\x03\0\0\0abc\0");
        FmtChunk::pcm16(44100, 1).write_all(&mut bytes)?;
        bytes.extend_from_slice(b"data\xFF\xFF\xFF\xFF");
        bytes.extend_from_slice(&[0x10, 0x00, 0xF0, 0xFF]);

        let audio = read_wav(&bytes[..])?;
        assert_eq!(audio.channels, vec![vec![16, -16]]);
        Ok(())
    }

    #[test]
    fn test_read_rejects_24_bit() {
        let mut fmt = FmtChunk::pcm16(48000, 2);
        fmt.bits_per_sample = 24;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF\0\0\0\0WAVE");
        fmt.write_all(&mut bytes).unwrap();
        bytes.extend_from_slice(b"data\0\0\0\0");

        let err = read_wav(&bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_read_rejects_missing_data() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF\0\0\0\0WAVE");
        FmtChunk::pcm16(48000, 1).write_all(&mut bytes).unwrap();

        assert!(read_wav(&bytes[..]).is_err());
        assert!(read_wav(&b"RIFX\0\0\0\0WAVE"[..]).is_err());
    }
}
