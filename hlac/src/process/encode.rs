use std::io::Write;
use std::ops::Range;

use anyhow::{Result, anyhow, bail};
use log::{debug, error, trace};

use crate::process::analyze;
use crate::process::cycle::{CycleKind, CycleWriter};
use crate::process::packing::BitPacker;
use crate::process::{COMPRESSION_BLOCK_SIZE, padded_sample_size};
use crate::structs::header::{HlacHeader, SampleRate};
use crate::structs::options::CompressorOptions;
use crate::utils::errors::EncodeError;
use crate::utils::vector_ops;

/// Template lengths tried by the period search.
pub const CYCLE_SEARCH_RANGE: Range<usize> = 100..1024;

/// Remainders this short are written as a delta when a template covers them.
const TAIL_LENGTH: usize = 4;

/// Cycle counts gathered while encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub blocks: usize,
    pub templates: usize,
    pub deltas: usize,
    pub diffs: usize,
}

impl EncodeStats {
    fn count(&mut self, kind: CycleKind) {
        match kind {
            CycleKind::Template => self.templates += 1,
            CycleKind::Delta => self.deltas += 1,
            CycleKind::Diff => self.diffs += 1,
        }
    }
}

/// Encodes single channel blocks into cycle streams.
///
/// The template is reset at the start of every block so each block decodes
/// on its own.
#[derive(Debug, Clone)]
pub struct BlockEncoder {
    options: CompressorOptions,
    cycles: CycleWriter,
    template: Vec<i16>,
    work: Vec<i16>,
    stats: EncodeStats,
}

impl BlockEncoder {
    pub fn new(options: CompressorOptions) -> Self {
        Self {
            options,
            cycles: CycleWriter::new(options.use_odd_compressors),
            template: Vec::with_capacity(COMPRESSION_BLOCK_SIZE),
            work: vec![0; COMPRESSION_BLOCK_SIZE],
            stats: EncodeStats::default(),
        }
    }

    pub fn options(&self) -> &CompressorOptions {
        &self.options
    }

    pub fn stats(&self) -> EncodeStats {
        self.stats
    }

    /// Appends the encoded form of `block` to `out`.
    pub fn encode_block(&mut self, block: &[i16], out: &mut Vec<u8>) -> Result<()> {
        debug_assert!(block.len() <= COMPRESSION_BLOCK_SIZE);
        self.stats.blocks += 1;

        if !self.options.enable_compression {
            BitPacker::Sixteen.pack(block, out)?;
            return Ok(());
        }

        self.template.clear();
        let mut first_length = None;
        let mut pos = 0;

        while pos < block.len() {
            let rest = &block[pos..];

            if rest.len() <= TAIL_LENGTH && self.template.len() >= rest.len() {
                let kind = self
                    .cycles
                    .write_delta(rest, &self.template[..rest.len()], out)?;
                self.stats.count(kind);
                break;
            }

            let len = self.template_length(rest, &mut first_length);
            let cycle = &rest[..len];
            let kind = self.cycles.write_template(
                cycle,
                self.options.use_diff_encoding_with_fixed_blocks,
                out,
            )?;
            self.stats.count(kind);

            self.template.clear();
            self.template.extend_from_slice(cycle);
            pos += len;

            while self.options.use_delta_encoding && block.len() - pos > TAIL_LENGTH {
                let rest = &block[pos..];
                let len = self.template.len().min(rest.len());
                let Some(delta_len) = self.delta_length(rest, len) else {
                    break;
                };

                let kind =
                    self.cycles
                        .write_delta(&rest[..delta_len], &self.template[..delta_len], out)?;
                self.stats.count(kind);
                pos += delta_len;
            }
        }

        Ok(())
    }

    /// Length of the next template starting at `rest[0]`.
    fn template_length(&mut self, rest: &[i16], first_length: &mut Option<usize>) -> usize {
        let remaining = rest.len();
        let rest_depth = analyze::min_bit_depth(rest);

        if rest_depth <= self.options.bit_rate_for_whole_block {
            return remaining;
        }

        if self.options.fixed_block_width > 0 {
            return (self.options.fixed_block_width as usize).min(remaining);
        }

        if self.options.reuse_first_cycle_length_for_block {
            if let Some(len) = *first_length {
                return len.min(remaining);
            }
        }

        let len = match analyze::cycle_length_with_lowest_bit_rate(
            rest,
            CYCLE_SEARCH_RANGE,
            &mut self.work,
        ) {
            Some((len, rate)) if rate < rest_depth => {
                trace!("period search: {len} samples at {rate} bits (remainder {rest_depth} bits)");
                len
            }
            _ => remaining,
        };

        if self.options.reuse_first_cycle_length_for_block && first_length.is_none() {
            *first_length = Some(len);
        }

        len
    }

    /// Length of a delta cycle against the template, or `None` when the
    /// template no longer predicts the signal well enough.
    fn delta_length(&mut self, rest: &[i16], len: usize) -> Option<usize> {
        let template = &self.template[..len];
        let template_depth = analyze::min_bit_depth(template);
        if template_depth == 0 {
            return None;
        }

        let reduction = analyze::bit_reduction_with_template(
            template,
            &rest[..len],
            self.options.remove_dc_offset,
            &mut self.work,
        );

        let ratio = reduction as f32 / template_depth as f32;
        if ratio <= self.options.delta_cycle_threshold {
            return None;
        }

        let mut best = (len, u8::MAX);
        for candidate in (len.saturating_sub(2).max(1)..=len).rev() {
            let delta = &mut self.work[..candidate];
            vector_ops::sub(delta, &rest[..candidate], &self.template[..candidate]);
            let depth = analyze::min_bit_depth(delta);
            if depth < best.1 {
                best = (candidate, depth);
            }
        }

        Some(best.0)
    }
}

/// Buffers encoded blocks and writes the stream on [`flush`](Writer::flush).
///
/// Each [`write`](Writer::write) is zero-padded to the block boundary, so
/// consecutive writes start on fresh blocks. The header needs every block
/// offset, so nothing reaches the inner writer before `flush`.
///
/// Dropping a writer that holds unflushed data is a programming error: debug
/// builds assert, release builds log and discard the data.
pub struct Writer<W: Write> {
    inner: Option<W>,
    header: HlacHeader,
    encoder: BlockEncoder,
    data: Vec<u8>,
    block: Vec<i16>,
    flushed: bool,
}

impl<W: Write> Writer<W> {
    pub fn new(
        inner: W,
        sample_rate: u32,
        channels: usize,
        options: CompressorOptions,
    ) -> Result<Self> {
        let rate =
            SampleRate::from_hz(sample_rate).ok_or(EncodeError::UnsupportedSampleRate(sample_rate))?;
        if !(1..=2).contains(&channels) {
            bail!(EncodeError::UnsupportedChannelCount(channels));
        }

        Ok(Self {
            inner: Some(inner),
            header: HlacHeader::new(rate, channels as u8, options.enable_compression),
            encoder: BlockEncoder::new(options),
            data: Vec::new(),
            block: vec![0; COMPRESSION_BLOCK_SIZE],
            flushed: false,
        })
    }

    /// Encodes one buffer per channel. All buffers must have the same length.
    pub fn write(&mut self, channels: &[&[i16]]) -> Result<()> {
        if self.flushed {
            bail!(EncodeError::AlreadyFlushed);
        }

        let expected_channels = self.header.channels as usize;
        if channels.len() != expected_channels {
            bail!(EncodeError::UnsupportedChannelCount(channels.len()));
        }

        let num_samples = channels.first().map_or(0, |c| c.len());
        for (channel, samples) in channels.iter().enumerate() {
            if samples.len() != num_samples {
                bail!(EncodeError::ChannelLengthMismatch {
                    channel,
                    expected: num_samples,
                    found: samples.len(),
                });
            }
        }

        let frame_blocks = padded_sample_size(num_samples) / COMPRESSION_BLOCK_SIZE;
        for b in 0..frame_blocks {
            let start = b * COMPRESSION_BLOCK_SIZE;
            let end = (start + COMPRESSION_BLOCK_SIZE).min(num_samples);

            for samples in channels {
                let offset = u32::try_from(self.data.len())
                    .map_err(|_| anyhow!("Encoded data exceeds the 32-bit offset range"))?;
                self.header.block_offsets.push(offset);

                self.block[..end - start].copy_from_slice(&samples[start..end]);
                self.block[end - start..].fill(0);
                self.encoder.encode_block(&self.block, &mut self.data)?;
            }
        }

        debug!(
            "Encoded {} samples x {} channel(s) into {} block(s), {} bytes buffered",
            num_samples,
            expected_channels,
            frame_blocks,
            self.data.len()
        );

        Ok(())
    }

    /// Writes header and data to the inner writer. Later calls do nothing.
    pub fn flush(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }

        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| anyhow!("Writer has no inner stream"))?;

        let header = self.header.to_bytes();
        inner.write_all(&header)?;
        inner.write_all(&self.data)?;
        inner.flush()?;

        let stats = self.encoder.stats();
        debug!(
            "Flushed {} header bytes and {} data bytes ({} templates, {} deltas, {} diffs)",
            header.len(),
            self.data.len(),
            stats.templates,
            stats.deltas,
            stats.diffs
        );

        self.flushed = true;
        self.data = Vec::new();
        Ok(())
    }

    pub fn stats(&self) -> EncodeStats {
        self.encoder.stats()
    }

    pub fn header(&self) -> &HlacHeader {
        &self.header
    }

    /// Returns the inner writer. Fails with
    /// [`EncodeError::UnflushedWriter`] before [`flush`](Writer::flush).
    pub fn into_inner(mut self) -> Result<W> {
        if !self.flushed {
            self.discard();
            bail!(EncodeError::UnflushedWriter);
        }

        self.inner
            .take()
            .ok_or_else(|| anyhow!("Writer has no inner stream"))
    }

    fn has_pending_data(&self) -> bool {
        !self.flushed && !self.header.block_offsets.is_empty()
    }

    fn discard(&mut self) {
        self.header.block_offsets.clear();
        self.data = Vec::new();
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        debug_assert!(
            !self.has_pending_data(),
            "{}: {} blocks discarded",
            EncodeError::UnflushedWriter,
            self.header.block_offsets.len()
        );

        if self.has_pending_data() {
            error!(
                "{}: {} blocks discarded",
                EncodeError::UnflushedWriter,
                self.header.block_offsets.len()
            );
        }
    }
}

/// Encodes one buffer per channel with the default options.
pub fn encode(channels: &[&[i16]], sample_rate: u32) -> Result<Vec<u8>> {
    encode_with_options(channels, sample_rate, CompressorOptions::default())
}

pub fn encode_with_options(
    channels: &[&[i16]],
    sample_rate: u32,
    options: CompressorOptions,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new(), sample_rate, channels.len(), options)?;
    writer.write(channels)?;
    writer.flush()?;
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::cycle_header::{CYCLE_HEADER_SIZE, CycleHeader};
    use crate::structs::header::{FIXED_HEADER_SIZE, StreamLayout, read_stream_header};
    use crate::structs::options::Preset;

    fn noise(len: usize, seed: u32) -> Vec<i16> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 16) as i16
            })
            .collect()
    }

    fn periodic(len: usize, period: usize) -> Vec<i16> {
        (0..len)
            .map(|i| ((i % period) as i32 * 180 - 9000) as i16)
            .collect()
    }

    fn cycle_headers(mut data: &[u8]) -> Vec<CycleHeader> {
        let mut headers = Vec::new();
        while !data.is_empty() {
            let header = CycleHeader::from_bytes([data[0], data[1], data[2]]).unwrap();
            data = &data[CYCLE_HEADER_SIZE + header.payload_size()..];
            headers.push(header);
        }
        headers
    }

    fn encode_one_block(block: &[i16], options: CompressorOptions) -> Vec<u8> {
        let mut encoder = BlockEncoder::new(options);
        let mut out = Vec::new();
        encoder.encode_block(block, &mut out).unwrap();
        out
    }

    #[test]
    fn test_silence_is_one_cycle() {
        let out = encode_one_block(&[0; COMPRESSION_BLOCK_SIZE], CompressorOptions::default());
        assert_eq!(
            cycle_headers(&out),
            vec![CycleHeader::Template {
                packer: BitPacker::Zero,
                num_samples: COMPRESSION_BLOCK_SIZE as u16
            }]
        );
    }

    #[test]
    fn test_cycle_lengths_cover_block() {
        let block = periodic(COMPRESSION_BLOCK_SIZE, 200);
        for preset in Preset::ALL.into_iter().skip(1) {
            let out = encode_one_block(&block, CompressorOptions::preset(preset));
            let total: usize = cycle_headers(&out).iter().map(|h| h.num_samples()).sum();
            assert_eq!(total, COMPRESSION_BLOCK_SIZE, "{preset}");
        }
    }

    #[test]
    fn test_periodic_signal_uses_deltas() {
        let block = periodic(COMPRESSION_BLOCK_SIZE, 200);
        let out = encode_one_block(&block, CompressorOptions::default());
        let headers = cycle_headers(&out);

        assert!(matches!(
            headers[0],
            CycleHeader::Template {
                num_samples: 200,
                ..
            }
        ));
        assert!(
            headers[1..]
                .iter()
                .all(|h| matches!(h, CycleHeader::Delta { .. }))
        );
        assert!(out.len() < COMPRESSION_BLOCK_SIZE);
    }

    #[test]
    fn test_fixed_width_with_diff() {
        let block: Vec<i16> = (0..COMPRESSION_BLOCK_SIZE)
            .map(|i| ((i as f64 * 0.01).sin() * 10000.0) as i16)
            .collect();
        let out = encode_one_block(&block, CompressorOptions::preset(Preset::Diff));
        let headers = cycle_headers(&out);

        assert_eq!(headers.len(), 8);
        assert!(
            headers
                .iter()
                .all(|h| matches!(h, CycleHeader::Diff { log2_len: 9, .. }))
        );
    }

    #[test]
    fn test_short_tail_becomes_delta() {
        let block = periodic(COMPRESSION_BLOCK_SIZE, 200);
        let options = CompressorOptions {
            fixed_block_width: 4092,
            use_delta_encoding: false,
            ..CompressorOptions::default()
        };
        let headers = cycle_headers(&encode_one_block(&block, options));
        assert_eq!(headers.len(), 2);
        assert!(matches!(
            headers[0],
            CycleHeader::Template {
                num_samples: 4092,
                ..
            }
        ));
        assert!(matches!(
            headers[1],
            CycleHeader::Delta { num_samples: 4, .. }
        ));

        let options = CompressorOptions {
            fixed_block_width: 4091,
            ..options
        };
        let headers = cycle_headers(&encode_one_block(&block, options));
        assert!(matches!(
            headers.last(),
            Some(CycleHeader::Template { num_samples: 5, .. })
        ));
    }

    #[test]
    fn test_delta_length_prefers_longest_on_tie() {
        let mut encoder = BlockEncoder::new(CompressorOptions::default());
        encoder.template = vec![10000, -10000, 8000, -8000, 12000, -12000, 9000, -9000];

        let mut rest: Vec<i16> = encoder.template.iter().map(|v| v + 1).collect();
        assert_eq!(encoder.delta_length(&rest, 8), Some(8));

        rest[7] += 63;
        assert_eq!(encoder.delta_length(&rest, 8), Some(7));
    }

    #[test]
    fn test_noise_stays_within_escape_bound() {
        let block = noise(COMPRESSION_BLOCK_SIZE, 7);
        let out = encode_one_block(&block, CompressorOptions::default());
        assert!(out.len() <= 2 * COMPRESSION_BLOCK_SIZE + CYCLE_HEADER_SIZE);
    }

    #[test]
    fn test_uncompressed_block() {
        let block = noise(COMPRESSION_BLOCK_SIZE, 3);
        let out = encode_one_block(&block, CompressorOptions::preset(Preset::Uncompressed));
        assert_eq!(out.len(), 2 * COMPRESSION_BLOCK_SIZE);
        assert_eq!(&out[..2], &block[0].to_le_bytes());
    }

    #[test]
    fn test_writer_pads_each_write() -> Result<()> {
        let mut writer = Writer::new(Vec::new(), 48000, 2, CompressorOptions::default())?;
        let left = periodic(5000, 150);
        let right = noise(5000, 11);
        writer.write(&[&left[..], &right[..]])?;
        writer.write(&[&left[..10], &right[..10]])?;
        assert_eq!(writer.header().block_offsets.len(), 6);

        writer.flush()?;
        writer.flush()?;
        let bytes = writer.into_inner()?;

        let StreamLayout::Blocks(header) = read_stream_header(&mut &bytes[..])? else {
            panic!("expected a block stream");
        };
        assert_eq!(header.channels, 2);
        assert_eq!(header.frame_blocks(), 3);
        assert_eq!(header.sample_rate, SampleRate::Hz48000);
        assert!(
            header
                .block_offsets
                .windows(2)
                .all(|pair| pair[0] < pair[1])
        );
        assert!(bytes.len() > FIXED_HEADER_SIZE + 24);
        Ok(())
    }

    #[test]
    fn test_writer_rejects_bad_input() {
        let err = Writer::new(Vec::new(), 22050, 1, CompressorOptions::default()).err();
        assert_eq!(
            err.and_then(|e| e.downcast::<EncodeError>().ok()),
            Some(EncodeError::UnsupportedSampleRate(22050))
        );

        let err = Writer::new(Vec::new(), 44100, 3, CompressorOptions::default()).err();
        assert_eq!(
            err.and_then(|e| e.downcast::<EncodeError>().ok()),
            Some(EncodeError::UnsupportedChannelCount(3))
        );

        let mut writer = Writer::new(Vec::new(), 44100, 2, CompressorOptions::default()).unwrap();
        let err = writer.write(&[&[0i16; 10][..], &[0i16; 9][..]]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EncodeError>(),
            Some(&EncodeError::ChannelLengthMismatch {
                channel: 1,
                expected: 10,
                found: 9
            })
        );
    }

    #[test]
    fn test_into_inner_requires_flush() {
        let mut writer = Writer::new(Vec::new(), 44100, 1, CompressorOptions::default()).unwrap();
        writer.write(&[&[1i16, 2, 3][..]]).unwrap();
        let err = writer.into_inner().unwrap_err();
        assert_eq!(
            err.downcast_ref::<EncodeError>(),
            Some(&EncodeError::UnflushedWriter)
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Writer dropped or consumed before flush")]
    fn test_drop_unflushed_writer_asserts() {
        let mut writer = Writer::new(Vec::new(), 44100, 1, CompressorOptions::default()).unwrap();
        writer.write(&[&[1i16, 2, 3][..]]).unwrap();
        drop(writer);
    }

    #[test]
    fn test_write_after_flush() {
        let mut writer = Writer::new(Vec::new(), 44100, 1, CompressorOptions::default()).unwrap();
        writer.flush().unwrap();
        let err = writer.write(&[&[1i16, 2, 3][..]]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EncodeError>(),
            Some(&EncodeError::AlreadyFlushed)
        );
    }
}
