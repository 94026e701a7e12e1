use std::io::{self, Read, Seek, SeekFrom};

use anyhow::{Result, bail};
use log::Level::Warn;
use log::{debug, trace, warn};

use crate::log_or_err;
use crate::process::COMPRESSION_BLOCK_SIZE;
use crate::process::cycle::{self, DiffBuffers, MAX_PAYLOAD_SIZE};
use crate::structs::cycle_header::{CYCLE_HEADER_SIZE, CycleHeader};
use crate::structs::header::{HlacHeader, LEGACY_SAMPLE_RATE, StreamLayout, read_stream_header};
use crate::utils::errors::DecodeError;
use crate::utils::vector_ops;

/// Scale from 16-bit PCM to `[-1.0, 1.0)`.
const F32_GAIN: f32 = 1.0 / 32768.0;

/// Result of a [`Reader::decode`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Samples written to every destination channel.
    pub samples: usize,

    /// The stream ended or was corrupt before the request was satisfied.
    pub truncated: bool,
}

/// Position of a [`BlockDecoder`] within its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// The block offset has not been looked up yet.
    BlockStart,
    AwaitingCycleHeader,
    DecodingTemplate { remaining: usize },
    DecodingDelta { remaining: usize },
    DecodingDiff { remaining: usize },
    /// Uncompressed block.
    Raw,
}

impl BlockState {
    fn for_cycle(header: &CycleHeader, remaining: usize) -> Self {
        match header {
            CycleHeader::Template { .. } => BlockState::DecodingTemplate { remaining },
            CycleHeader::Delta { .. } => BlockState::DecodingDelta { remaining },
            CycleHeader::Diff { .. } => BlockState::DecodingDiff { remaining },
        }
    }

    fn with_remaining(self, remaining: usize) -> Self {
        if remaining == 0 {
            return BlockState::AwaitingCycleHeader;
        }

        match self {
            BlockState::DecodingTemplate { .. } => BlockState::DecodingTemplate { remaining },
            BlockState::DecodingDelta { .. } => BlockState::DecodingDelta { remaining },
            BlockState::DecodingDiff { .. } => BlockState::DecodingDiff { remaining },
            state => state,
        }
    }
}

/// Per-channel cycle stream decoder.
///
/// Keeps its own byte position so several channels can share one source.
/// All buffers are sized at construction; decoding does not allocate.
#[derive(Debug, Clone)]
pub struct BlockDecoder {
    pub fail_level: log::Level,

    channel: usize,
    state: BlockState,
    block: usize,
    position: u64,
    block_remaining: usize,
    skip: usize,

    template: Vec<i16>,
    template_len: usize,
    cycle: Vec<i16>,
    cycle_len: usize,
    payload: Vec<u8>,
    diff: DiffBuffers,
}

impl BlockDecoder {
    pub fn new(channel: usize) -> Self {
        Self {
            fail_level: log::Level::Error,
            channel,
            state: BlockState::BlockStart,
            block: 0,
            position: 0,
            block_remaining: 0,
            skip: 0,
            template: vec![0; COMPRESSION_BLOCK_SIZE],
            template_len: 0,
            cycle: vec![0; COMPRESSION_BLOCK_SIZE],
            cycle_len: 0,
            payload: vec![0; MAX_PAYLOAD_SIZE],
            diff: DiffBuffers::default(),
        }
    }

    /// Repositions to `sample`. The block offset is resolved lazily.
    pub fn seek(&mut self, sample: u64) {
        let block_size = COMPRESSION_BLOCK_SIZE as u64;
        self.block = (sample / block_size) as usize;
        self.skip = (sample % block_size) as usize;
        self.state = BlockState::BlockStart;
    }

    /// Fills `dst` with the next samples of this channel.
    pub fn decode<R: Read + Seek>(
        &mut self,
        source: &mut R,
        header: &HlacHeader,
        data_start: u64,
        dst: &mut [i16],
    ) -> Result<DecodeOutcome> {
        let mut written = 0;

        while written < dst.len() {
            match self.state {
                BlockState::BlockStart => {
                    let Some(offset) = header.block_offset(self.block, self.channel) else {
                        warn!(
                            "Channel {}: block {} is not in the block table",
                            self.channel, self.block
                        );
                        return Ok(DecodeOutcome {
                            samples: written,
                            truncated: true,
                        });
                    };

                    self.position = data_start + offset as u64;
                    self.block_remaining = COMPRESSION_BLOCK_SIZE;
                    self.template_len = 0;
                    self.state = if header.compressed {
                        BlockState::AwaitingCycleHeader
                    } else {
                        BlockState::Raw
                    };
                    trace!(
                        "Channel {}: block {} at byte {}",
                        self.channel, self.block, self.position
                    );
                }
                BlockState::AwaitingCycleHeader => {
                    if self.block_remaining == 0 {
                        self.block += 1;
                        self.state = BlockState::BlockStart;
                        continue;
                    }

                    if !self.read_cycle(source)? {
                        return Ok(DecodeOutcome {
                            samples: written,
                            truncated: true,
                        });
                    }
                }
                BlockState::DecodingTemplate { remaining }
                | BlockState::DecodingDelta { remaining }
                | BlockState::DecodingDiff { remaining } => {
                    let skipped = remaining.min(self.skip);
                    self.skip -= skipped;
                    let remaining = remaining - skipped;

                    let n = remaining.min(dst.len() - written);
                    let start = self.cycle_len - remaining;
                    dst[written..written + n].copy_from_slice(&self.cycle[start..start + n]);
                    written += n;

                    self.state = self.state.with_remaining(remaining - n);
                }
                BlockState::Raw => {
                    if self.block_remaining == 0 {
                        self.block += 1;
                        self.state = BlockState::BlockStart;
                        continue;
                    }

                    if self.skip > 0 {
                        let skipped = self.skip.min(self.block_remaining);
                        self.position += 2 * skipped as u64;
                        self.block_remaining -= skipped;
                        self.skip -= skipped;
                        continue;
                    }

                    let n = self
                        .block_remaining
                        .min(dst.len() - written)
                        .min(MAX_PAYLOAD_SIZE / 2);
                    let bytes = &mut self.payload[..2 * n];
                    if !read_at(source, self.position, bytes)? {
                        warn!(
                            "{}",
                            DecodeError::TruncatedStream {
                                position: self.position,
                                needed: 2 * n,
                            }
                        );
                        return Ok(DecodeOutcome {
                            samples: written,
                            truncated: true,
                        });
                    }

                    for (d, pair) in dst[written..written + n]
                        .iter_mut()
                        .zip(bytes.chunks_exact(2))
                    {
                        *d = i16::from_le_bytes([pair[0], pair[1]]);
                    }

                    self.position += 2 * n as u64;
                    self.block_remaining -= n;
                    written += n;
                }
            }
        }

        Ok(DecodeOutcome {
            samples: written,
            truncated: false,
        })
    }

    /// Reads the next cycle header and payload and reconstructs the cycle.
    /// Returns `false` when decoding has to stop.
    fn read_cycle<R: Read + Seek>(&mut self, source: &mut R) -> Result<bool> {
        let mut bytes = [0u8; CYCLE_HEADER_SIZE];
        if !read_at(source, self.position, &mut bytes)? {
            warn!(
                "{}",
                DecodeError::TruncatedStream {
                    position: self.position,
                    needed: CYCLE_HEADER_SIZE,
                }
            );
            return Ok(false);
        }

        let header = match CycleHeader::from_bytes(bytes) {
            Ok(header) => header,
            Err(err) => {
                log_or_err!(self, Warn, err);
                return Ok(false);
            }
        };

        let len = header.num_samples();
        if len > self.block_remaining {
            log_or_err!(
                self,
                Warn,
                DecodeError::CycleOverrun {
                    length: len,
                    remaining: self.block_remaining,
                }
            );
            return Ok(false);
        }

        if !header.is_template() && len > self.template_len {
            log_or_err!(
                self,
                Warn,
                DecodeError::DeltaWithoutTemplate {
                    length: len,
                    template: self.template_len,
                }
            );
            return Ok(false);
        }

        let payload_size = header.payload_size();
        let payload_start = self.position + CYCLE_HEADER_SIZE as u64;

        // A delta inside the skipped prefix leaves the template untouched.
        if !header.is_template() && self.skip >= len {
            trace!("Channel {}: skipping {header:?}", self.channel);
            self.skip -= len;
            self.block_remaining -= len;
            self.position = payload_start + payload_size as u64;
            return Ok(true);
        }

        let payload = &mut self.payload[..payload_size];
        if !read_at(source, payload_start, payload)? {
            warn!(
                "{}",
                DecodeError::TruncatedStream {
                    position: payload_start,
                    needed: payload_size,
                }
            );
            return Ok(false);
        }

        cycle::reconstruct(
            &header,
            payload,
            &self.template[..self.template_len],
            &mut self.cycle[..len],
            &mut self.diff,
        )?;

        if header.is_template() {
            self.template[..len].copy_from_slice(&self.cycle[..len]);
            self.template_len = len;
        }

        trace!("Channel {}: {header:?}", self.channel);

        self.cycle_len = len;
        self.block_remaining -= len;
        self.position = payload_start + payload_size as u64;
        self.state = BlockState::for_cycle(&header, len);
        Ok(true)
    }
}

/// Reads `buf` at `position`. Returns `false` when the source ends first.
pub(crate) fn read_at<R: Read + Seek>(
    source: &mut R,
    position: u64,
    buf: &mut [u8],
) -> io::Result<bool> {
    source.seek(SeekFrom::Start(position))?;
    match source.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Random-access decoder over an encoded stream.
///
/// The header is read once on open. Decoding from the current position
/// continues the running block state; any other start position seeks first,
/// which costs one division and no I/O until the next read.
pub struct Reader<R: Read + Seek> {
    inner: R,
    layout: StreamLayout,
    data_start: u64,
    total_samples: u64,
    channels: usize,
    decoders: Vec<BlockDecoder>,
    cursor: Option<u64>,
    scratch: Vec<u8>,
    fail_level: log::Level,
}

/// Opens `inner` for decoding. Fails when the header does not validate.
pub fn open_for_decode<R: Read + Seek>(inner: R) -> Result<Reader<R>> {
    Reader::new(inner)
}

impl<R: Read + Seek> Reader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let layout = read_stream_header(&mut inner)?;

        let (data_start, total_samples) = match &layout {
            StreamLayout::Blocks(header) => (header.header_size() as u64, header.total_samples()),
            StreamLayout::Monolith { channels } => {
                let len = inner.seek(SeekFrom::End(0))?;
                (1, len.saturating_sub(1) / *channels as u64 / 2)
            }
        };

        let reader = Self::from_parts(inner, layout, data_start, total_samples);
        debug!(
            "Opened stream: {} Hz, {} channel(s), {} samples",
            reader.sample_rate(),
            reader.channel_count(),
            reader.total_samples()
        );
        Ok(reader)
    }

    pub(crate) fn from_parts(
        inner: R,
        layout: StreamLayout,
        data_start: u64,
        total_samples: u64,
    ) -> Self {
        let channels = match &layout {
            StreamLayout::Blocks(header) => header.channels as usize,
            StreamLayout::Monolith { channels } => *channels as usize,
        };

        Self {
            inner,
            layout,
            data_start,
            total_samples,
            channels,
            decoders: (0..channels).map(BlockDecoder::new).collect(),
            cursor: Some(0),
            scratch: vec![0; MAX_PAYLOAD_SIZE],
            fail_level: log::Level::Error,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match &self.layout {
            StreamLayout::Blocks(header) => header.sample_rate.hz(),
            StreamLayout::Monolith { .. } => LEGACY_SAMPLE_RATE,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Samples per channel. Block-based streams report whole blocks.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn layout(&self) -> &StreamLayout {
        &self.layout
    }

    /// The container header, `None` for legacy streams.
    pub fn header(&self) -> Option<&HlacHeader> {
        match &self.layout {
            StreamLayout::Blocks(header) => Some(header),
            StreamLayout::Monolith { .. } => None,
        }
    }

    pub(crate) fn data_start(&self) -> u64 {
        self.data_start
    }

    pub(crate) fn inner(&self) -> &R {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn fail_level(&self) -> log::Level {
        self.fail_level
    }

    /// Sets the level at which corrupt cycle data fails a decode call.
    ///
    /// - `log::Level::Error`: corrupt cycles end the call as truncated (default)
    /// - `log::Level::Warn`: corrupt cycles are returned as errors (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
        for decoder in &mut self.decoders {
            decoder.fail_level = level;
        }
    }

    /// Sample index the next sequential decode starts at, if known.
    pub fn position(&self) -> Option<u64> {
        self.cursor
    }

    /// Positions every channel at `sample`.
    pub fn seek(&mut self, sample: u64) -> Result<()> {
        if sample > self.total_samples {
            bail!(DecodeError::OutOfRange {
                start: sample,
                end: sample,
                total: self.total_samples,
            });
        }

        for decoder in &mut self.decoders {
            decoder.seek(sample);
        }
        self.cursor = Some(sample);
        Ok(())
    }

    /// End of `start..start + num_samples`, if it lies within the stream.
    fn checked_end(&self, start: u64, num_samples: usize) -> Result<u64> {
        let total = self.total_samples;
        match start.checked_add(num_samples as u64) {
            Some(end) if end <= total => Ok(end),
            _ => bail!(DecodeError::OutOfRange {
                start,
                end: start.saturating_add(num_samples as u64),
                total,
            }),
        }
    }

    fn check_dest(
        &self,
        num_samples: usize,
        lens: impl ExactSizeIterator<Item = usize>,
    ) -> Result<()> {
        if lens.len() < self.channels {
            bail!(DecodeError::ChannelMismatch {
                expected: self.channels,
                found: lens.len(),
            });
        }

        if let Some((channel, found)) = lens
            .take(self.channels)
            .enumerate()
            .find(|&(_, len)| len < num_samples)
        {
            bail!(DecodeError::DestinationTooShort {
                channel,
                needed: num_samples,
                found,
            });
        }
        Ok(())
    }

    /// Decodes `num_samples` samples per channel starting at `start` into
    /// `dest[channel][..num_samples]`.
    pub fn decode(
        &mut self,
        start: u64,
        num_samples: usize,
        dest: &mut [&mut [i16]],
    ) -> Result<DecodeOutcome> {
        let end = self.checked_end(start, num_samples)?;
        self.check_dest(num_samples, dest.iter().map(|d| d.len()))?;

        if self.cursor != Some(start) {
            self.seek(start)?;
        }
        // Unknown until every channel succeeds.
        self.cursor = None;

        let outcome = match &self.layout {
            StreamLayout::Blocks(header) => {
                let mut outcome = DecodeOutcome {
                    samples: num_samples,
                    truncated: false,
                };
                for (decoder, d) in self.decoders.iter_mut().zip(dest.iter_mut()) {
                    let channel = decoder.decode(
                        &mut self.inner,
                        header,
                        self.data_start,
                        &mut d[..num_samples],
                    )?;
                    outcome.samples = outcome.samples.min(channel.samples);
                    outcome.truncated |= channel.truncated;
                }

                if header.global_bit_shift > 0 {
                    let shift = header.global_bit_shift as u32;
                    for d in dest.iter_mut().take(self.channels) {
                        for v in d[..outcome.samples].iter_mut() {
                            *v = v.wrapping_shl(shift);
                        }
                    }
                }

                outcome
            }
            StreamLayout::Monolith { .. } => self.decode_monolith(start, num_samples, dest)?,
        };

        if !outcome.truncated {
            self.cursor = Some(start + outcome.samples as u64);
        }

        Ok(outcome)
    }

    /// Same as [`Reader::decode`] with samples scaled to `[-1.0, 1.0)`.
    pub fn decode_f32(
        &mut self,
        start: u64,
        num_samples: usize,
        dest: &mut [&mut [f32]],
    ) -> Result<DecodeOutcome> {
        self.checked_end(start, num_samples)?;
        self.check_dest(num_samples, dest.iter().map(|d| d.len()))?;

        let mut buffers = vec![vec![0i16; num_samples.min(COMPRESSION_BLOCK_SIZE)]; self.channels];
        let mut written = 0;
        while written < num_samples {
            let chunk = (num_samples - written).min(COMPRESSION_BLOCK_SIZE);
            let outcome = {
                let mut pcm: Vec<&mut [i16]> =
                    buffers.iter_mut().map(|b| &mut b[..chunk]).collect();
                self.decode(start + written as u64, chunk, &mut pcm)?
            };

            for (d, buffer) in dest.iter_mut().zip(&buffers) {
                for (out, &v) in d[written..written + outcome.samples]
                    .iter_mut()
                    .zip(&buffer[..outcome.samples])
                {
                    *out = v as f32 * F32_GAIN;
                }
            }
            written += outcome.samples;

            if outcome.truncated {
                return Ok(DecodeOutcome {
                    samples: written,
                    truncated: true,
                });
            }
        }

        Ok(DecodeOutcome {
            samples: written,
            truncated: false,
        })
    }

    fn decode_monolith(
        &mut self,
        start: u64,
        num_samples: usize,
        dest: &mut [&mut [i16]],
    ) -> Result<DecodeOutcome> {
        let frame_bytes = 2 * self.channels;
        let frames_per_chunk = self.scratch.len() / frame_bytes;
        let mut written = 0;

        while written < num_samples {
            let frames = (num_samples - written).min(frames_per_chunk);
            let position = self.data_start + (start + written as u64) * frame_bytes as u64;
            let bytes = &mut self.scratch[..frames * frame_bytes];

            if !read_at(&mut self.inner, position, bytes)? {
                warn!(
                    "{}",
                    DecodeError::TruncatedStream {
                        position,
                        needed: bytes.len(),
                    }
                );
                return Ok(DecodeOutcome {
                    samples: written,
                    truncated: true,
                });
            }

            for (i, frame) in bytes.chunks_exact(frame_bytes).enumerate() {
                for (d, pair) in dest.iter_mut().zip(frame.chunks_exact(2)) {
                    d[written + i] = i16::from_le_bytes([pair[0], pair[1]]);
                }
            }
            written += frames;
        }

        Ok(DecodeOutcome {
            samples: written,
            truncated: false,
        })
    }

    /// Peak magnitude per channel over `start..start + num_samples`.
    pub fn read_max_levels(&mut self, start: u64, num_samples: usize) -> Result<Vec<u16>> {
        let mut levels = vec![0u16; self.channels];
        let end = self.checked_end(start, num_samples)?;
        let mut buffers = vec![vec![0i16; COMPRESSION_BLOCK_SIZE]; self.channels];
        let mut pos = start;

        while pos < end {
            let chunk = ((end - pos) as usize).min(COMPRESSION_BLOCK_SIZE);
            let outcome = {
                let mut dest: Vec<&mut [i16]> =
                    buffers.iter_mut().map(|b| &mut b[..chunk]).collect();
                self.decode(pos, chunk, &mut dest)?
            };

            for (level, buffer) in levels.iter_mut().zip(&buffers) {
                *level = (*level).max(vector_ops::max_abs(&buffer[..outcome.samples]));
            }

            if outcome.truncated {
                break;
            }
            pos += chunk as u64;
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::process::encode::{encode, encode_with_options};
    use crate::structs::header::FIXED_HEADER_SIZE;
    use crate::structs::options::{CompressorOptions, Preset};

    fn signal(len: usize, seed: u32) -> Vec<i16> {
        let mut state = seed;
        (0..len)
            .map(|i| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let tone = ((i as f64 * 0.05).sin() * 9000.0) as i32;
                (tone + (state >> 27) as i32) as i16
            })
            .collect()
    }

    fn decode_all(bytes: Vec<u8>, len: usize) -> (Vec<Vec<i16>>, DecodeOutcome) {
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();
        let mut out = vec![vec![0i16; len]; reader.channel_count()];
        let outcome = {
            let mut dest: Vec<&mut [i16]> = out.iter_mut().map(|c| c.as_mut_slice()).collect();
            reader.decode(0, len, &mut dest).unwrap()
        };
        (out, outcome)
    }

    #[test]
    fn test_stereo_round_trip() {
        let left = signal(9000, 1);
        let right = signal(9000, 2);
        let bytes = encode(&[&left[..], &right[..]], 44100).unwrap();

        let (out, outcome) = decode_all(bytes, 9000);
        assert!(!outcome.truncated);
        assert_eq!(outcome.samples, 9000);
        assert_eq!(out[0], left);
        assert_eq!(out[1], right);
    }

    #[test]
    fn test_chunked_decode_resumes_mid_cycle() {
        let samples = signal(10_000, 3);
        let bytes = encode(&[&samples[..]], 48000).unwrap();
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();

        let mut out = vec![0i16; 10_000];
        let mut pos = 0;
        for chunk in [1usize, 7, 333, 4096, 1000, 4563] {
            let outcome = reader
                .decode(pos as u64, chunk, &mut [&mut out[pos..pos + chunk]])
                .unwrap();
            assert_eq!(outcome.samples, chunk);
            pos += chunk;
        }
        assert_eq!(out, samples);
    }

    #[test]
    fn test_seek_skips_into_block() {
        let samples = signal(12_288, 4);
        let bytes = encode(&[&samples[..]], 44100).unwrap();
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();

        for start in [0usize, 1, 150, 4095, 4096, 9000, 12_287] {
            let mut out = [0i16; 1];
            reader.decode(start as u64, 1, &mut [&mut out[..]]).unwrap();
            assert_eq!(out[0], samples[start], "sample {start}");
        }

        reader.seek(5000).unwrap();
        assert_eq!(reader.position(), Some(5000));
        assert!(reader.seek(20_000).is_err());
    }

    #[test]
    fn test_uncompressed_stream() {
        let samples = signal(5000, 5);
        let bytes = encode_with_options(
            &[&samples[..]],
            96000,
            CompressorOptions::preset(Preset::Uncompressed),
        )
        .unwrap();
        assert_eq!(bytes.len(), FIXED_HEADER_SIZE + 8 + 4 * COMPRESSION_BLOCK_SIZE);

        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.sample_rate(), 96000);

        let mut out = vec![0i16; 3000];
        reader.decode(2000, 3000, &mut [&mut out[..]]).unwrap();
        assert_eq!(out, &samples[2000..5000]);
    }

    #[test]
    fn test_legacy_monolith() {
        let mut bytes = vec![0u8];
        for i in 0..100i16 {
            bytes.extend_from_slice(&i.to_le_bytes());
            bytes.extend_from_slice(&(-i).to_le_bytes());
        }
        bytes.push(0xAA);

        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.channel_count(), 2);
        assert_eq!(reader.sample_rate(), LEGACY_SAMPLE_RATE);
        assert_eq!(reader.total_samples(), 100);
        assert!(reader.header().is_none());

        let mut left = [0i16; 10];
        let mut right = [0i16; 10];
        reader.decode(90, 10, &mut [&mut left[..], &mut right[..]]).unwrap();
        assert_eq!(left[0], 90);
        assert_eq!(right[9], -99);
    }

    #[test]
    fn test_truncated_stream_returns_partial_samples() {
        let samples = signal(8192, 6);
        let mut bytes = encode(&[&samples[..]], 44100).unwrap();
        bytes.truncate(bytes.len() - 10);

        let (out, outcome) = decode_all(bytes, 8192);
        assert!(outcome.truncated);
        assert!(outcome.samples >= COMPRESSION_BLOCK_SIZE);
        assert!(outcome.samples < 8192);
        assert_eq!(out[0][..outcome.samples], samples[..outcome.samples]);
    }

    #[test]
    fn test_corrupt_cycle_header() {
        let samples = signal(4096, 7);
        let mut bytes = encode(&[&samples[..]], 44100).unwrap();
        let data_start = FIXED_HEADER_SIZE + 4;
        bytes[data_start] = 0x2F;

        let (_, outcome) = decode_all(bytes.clone(), 4096);
        assert_eq!(outcome, DecodeOutcome {
            samples: 0,
            truncated: true
        });

        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();
        reader.set_fail_level(log::Level::Warn);
        let mut out = vec![0i16; 4096];
        let err = reader.decode(0, 4096, &mut [&mut out[..]]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::UnsupportedBitDepth(15))
        );
    }

    #[test]
    fn test_lenient_retry_after_strict_error() {
        let left = signal(8192, 8);
        let right = signal(8192, 9);
        let mut bytes = encode(&[&left[..], &right[..]], 44100).unwrap();

        let mut reader = open_for_decode(Cursor::new(bytes.clone())).unwrap();
        let header = reader.header().unwrap();
        let corrupt = reader.data_start() as usize + header.block_offset(1, 1).unwrap() as usize;
        bytes[corrupt] = 0x2F;

        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();
        let mut out = vec![vec![0i16; 5000]; 2];

        reader.set_fail_level(log::Level::Warn);
        {
            let mut dest: Vec<&mut [i16]> = out.iter_mut().map(|c| c.as_mut_slice()).collect();
            assert!(reader.decode(0, 5000, &mut dest).is_err());
        }
        assert_eq!(reader.position(), None);

        reader.set_fail_level(log::Level::Error);
        out.iter_mut().for_each(|c| c.fill(0));
        let outcome = {
            let mut dest: Vec<&mut [i16]> = out.iter_mut().map(|c| c.as_mut_slice()).collect();
            reader.decode(0, 5000, &mut dest).unwrap()
        };
        assert!(outcome.truncated);
        assert_eq!(outcome.samples, COMPRESSION_BLOCK_SIZE);
        assert_eq!(out[0], &left[..5000]);
        assert_eq!(out[1][..COMPRESSION_BLOCK_SIZE], right[..COMPRESSION_BLOCK_SIZE]);
    }

    #[test]
    fn test_decode_f32() {
        let mut samples = signal(6000, 10);
        samples[0] = i16::MIN;
        samples[1] = i16::MAX;
        samples[2] = 0;
        samples[3] = 16384;
        let bytes = encode(&[&samples[..]], 48000).unwrap();
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();

        let mut out = vec![0f32; 6000];
        let outcome = reader.decode_f32(0, 6000, &mut [&mut out[..]]).unwrap();
        assert_eq!(outcome, DecodeOutcome {
            samples: 6000,
            truncated: false
        });
        assert_eq!(out[0], -1.0);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[3], 0.5);
        assert!(out[1] < 1.0);
        for (f, &v) in out.iter().zip(&samples) {
            assert_eq!(*f, v as f32 / 32768.0);
        }

        let mut short = vec![0f32; 10];
        let err = reader.decode_f32(0, 11, &mut [&mut short[..]]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::DestinationTooShort { needed: 11, .. })
        ));
    }

    #[test]
    fn test_decode_f32_applies_bit_shift() {
        let samples: Vec<i16> = (0..100).map(|i| i - 50).collect();
        let mut bytes = encode(&[&samples[..]], 44100).unwrap();
        bytes[5] = 2;

        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();
        let mut out = vec![0f32; 100];
        reader.decode_f32(0, 100, &mut [&mut out[..]]).unwrap();
        assert_eq!(out[0], -200.0 / 32768.0);
        assert_eq!(out[99], 196.0 / 32768.0);
    }

    #[test]
    fn test_global_bit_shift() {
        let samples: Vec<i16> = (0..100).map(|i| i - 50).collect();
        let mut bytes = encode(&[&samples[..]], 44100).unwrap();
        bytes[5] = 2;

        let (out, _) = decode_all(bytes, 100);
        let expected: Vec<i16> = samples.iter().map(|v| v * 4).collect();
        assert_eq!(out[0], expected);
    }

    #[test]
    fn test_request_validation() {
        let bytes = encode(&[&[1i16, 2, 3][..]], 44100).unwrap();
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.total_samples(), 4096);

        let mut out = vec![0i16; 8];
        let err = reader.decode(4090, 8, &mut [&mut out[..]]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::OutOfRange { .. })
        ));

        let err = reader.decode(u64::MAX - 1, 4, &mut [&mut out[..]]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::OutOfRange {
                start: u64::MAX - 1,
                end: u64::MAX,
                total: 4096
            })
        );
        assert!(reader.read_max_levels(u64::MAX, 1).is_err());

        let err = reader.decode(0, 8, &mut []).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::ChannelMismatch {
                expected: 1,
                found: 0
            })
        );

        let err = reader.decode(0, 9, &mut [&mut out[..]]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::DestinationTooShort { needed: 9, .. })
        ));
    }

    #[test]
    fn test_read_max_levels() {
        let mut left = vec![0i16; 6000];
        let mut right = vec![0i16; 6000];
        left[10] = -1200;
        left[5000] = 300;
        right[4500] = i16::MIN;

        let bytes = encode(&[&left[..], &right[..]], 44100).unwrap();
        let mut reader = open_for_decode(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.read_max_levels(0, 6000).unwrap(), vec![1200, 32768]);
        assert_eq!(reader.read_max_levels(20, 4400).unwrap(), vec![0, 0]);
        assert_eq!(reader.read_max_levels(4096, 4096).unwrap(), vec![300, 32768]);
    }
}
