//! Cycle serialization.
//!
//! A cycle is written as a [`CycleHeader`] followed by its payload. The
//! [`CycleWriter`] owns the scratch buffers needed to size and pack the three
//! cycle kinds, and [`reconstruct`] is its inverse on the decode side.

use std::io;

use log::trace;

use crate::process::packing::BitPacker;
use crate::process::{COMPRESSION_BLOCK_SIZE, analyze, diff};
use crate::structs::cycle_header::{CYCLE_HEADER_SIZE, CycleHeader};
use crate::utils::vector_ops;

/// Largest payload accepted before a cycle falls back to raw 16-bit samples.
pub const MAX_PAYLOAD_SIZE: usize = 2 * COMPRESSION_BLOCK_SIZE;

/// Kind of cycle the writer emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Template,
    Delta,
    Diff,
}

/// Buffers for splitting a cycle into full and error values.
#[derive(Debug, Clone)]
pub struct DiffBuffers {
    pub full: Vec<i16>,
    pub errors: Vec<i16>,
}

impl Default for DiffBuffers {
    fn default() -> Self {
        Self {
            full: vec![0; diff::num_full_values(COMPRESSION_BLOCK_SIZE)],
            errors: vec![0; diff::num_error_values(COMPRESSION_BLOCK_SIZE)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleWriter {
    use_odd_compressors: bool,
    work: Vec<i16>,
    diff: DiffBuffers,
    payload: Vec<u8>,
}

impl CycleWriter {
    pub fn new(use_odd_compressors: bool) -> Self {
        Self {
            use_odd_compressors,
            work: vec![0; COMPRESSION_BLOCK_SIZE],
            diff: DiffBuffers::default(),
            payload: Vec::with_capacity(MAX_PAYLOAD_SIZE),
        }
    }

    fn packer_for(&self, data: &[i16]) -> BitPacker {
        analyze::packer_for_depth(analyze::min_bit_depth(data), self.use_odd_compressors)
    }

    /// Writes `cycle` as a template. When `try_diff` is set and the length
    /// allows it, a diff cycle is written instead if it is strictly smaller.
    pub fn write_template(
        &mut self,
        cycle: &[i16],
        try_diff: bool,
        out: &mut Vec<u8>,
    ) -> io::Result<CycleKind> {
        let packer = self.packer_for(cycle);
        let template_size = packer.byte_count(cycle.len());

        if try_diff && diff::supports_length(cycle.len()) {
            let (header, diff_size) = self.prepare_diff(cycle)?;
            if diff_size < template_size && diff_size <= MAX_PAYLOAD_SIZE {
                trace!(
                    "diff cycle: {} samples, {} bytes (template {} bytes)",
                    cycle.len(),
                    diff_size,
                    template_size
                );
                out.extend_from_slice(&header.to_bytes());
                out.extend_from_slice(&self.payload);
                return Ok(CycleKind::Diff);
            }
        }

        let packer = if template_size > MAX_PAYLOAD_SIZE {
            BitPacker::Sixteen
        } else {
            packer
        };

        trace!(
            "template cycle: {} samples at {} bits",
            cycle.len(),
            packer.width()
        );
        emit(
            CycleHeader::Template {
                packer,
                num_samples: cycle.len() as u16,
            },
            packer,
            cycle,
            out,
        )?;
        Ok(CycleKind::Template)
    }

    /// Packs the diff form of `cycle` into the payload buffer and returns its
    /// header and payload size.
    fn prepare_diff(&mut self, cycle: &[i16]) -> io::Result<(CycleHeader, usize)> {
        let len = cycle.len();
        let full = &mut self.diff.full[..diff::num_full_values(len)];
        let errors = &mut self.diff.errors[..diff::num_error_values(len)];

        diff::extract_full_values(cycle, full);
        diff::extract_error_values(cycle, full, errors, &mut self.work);

        let full_packer = analyze::packer_for_depth(
            analyze::min_bit_depth(full),
            self.use_odd_compressors,
        );
        let error_packer = analyze::packer_for_depth(
            analyze::min_bit_depth(errors),
            self.use_odd_compressors,
        );

        self.payload.clear();
        full_packer.pack(full, &mut self.payload)?;
        error_packer.pack(errors, &mut self.payload)?;

        let header = CycleHeader::Diff {
            full: full_packer,
            error: error_packer,
            log2_len: len.trailing_zeros() as u8,
        };
        Ok((header, self.payload.len()))
    }

    /// Writes `cycle - template` as a delta cycle. Both slices must have the
    /// same length.
    pub fn write_delta(
        &mut self,
        cycle: &[i16],
        template: &[i16],
        out: &mut Vec<u8>,
    ) -> io::Result<CycleKind> {
        debug_assert_eq!(cycle.len(), template.len());

        let delta = &mut self.work[..cycle.len()];
        vector_ops::sub(delta, cycle, template);

        let packer =
            analyze::packer_for_depth(analyze::min_bit_depth(delta), self.use_odd_compressors);

        trace!(
            "delta cycle: {} samples at {} bits",
            cycle.len(),
            packer.width()
        );
        emit(
            CycleHeader::Delta {
                packer,
                num_samples: cycle.len() as u16,
            },
            packer,
            delta,
            out,
        )?;
        Ok(CycleKind::Delta)
    }
}

fn emit(header: CycleHeader, packer: BitPacker, data: &[i16], out: &mut Vec<u8>) -> io::Result<()> {
    out.extend_from_slice(&header.to_bytes());
    packer.pack(data, out)
}

/// Total encoded size of a cycle with this header.
#[inline]
pub fn encoded_size(header: &CycleHeader) -> usize {
    CYCLE_HEADER_SIZE + header.payload_size()
}

/// Rebuilds the samples of one cycle into `dst`.
///
/// `payload` must hold [`CycleHeader::payload_size`] bytes, `dst` the cycle's
/// sample count and, for delta cycles, `template` at least as many samples.
pub fn reconstruct(
    header: &CycleHeader,
    payload: &[u8],
    template: &[i16],
    dst: &mut [i16],
    buffers: &mut DiffBuffers,
) -> io::Result<()> {
    match *header {
        CycleHeader::Template { packer, .. } => packer.unpack(payload, dst),
        CycleHeader::Delta { packer, .. } => {
            packer.unpack(payload, dst)?;
            vector_ops::add(dst, &template[..dst.len()]);
            Ok(())
        }
        CycleHeader::Diff { full, error, .. } => {
            let len = dst.len();
            let full_values = &mut buffers.full[..diff::num_full_values(len)];
            let error_values = &mut buffers.errors[..diff::num_error_values(len)];

            let split = full.byte_count(full_values.len());
            if payload.len() < split {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }

            full.unpack(&payload[..split], full_values)?;
            error.unpack(&payload[split..], error_values)?;

            diff::interpolate(full_values, dst);
            diff::apply_error_values(dst, error_values);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8], template: &[i16]) -> (CycleHeader, Vec<i16>) {
        let header =
            CycleHeader::from_bytes([bytes[0], bytes[1], bytes[2]]).expect("valid cycle header");
        assert_eq!(bytes.len(), encoded_size(&header));

        let mut dst = vec![0i16; header.num_samples()];
        let mut buffers = DiffBuffers::default();
        reconstruct(
            &header,
            &bytes[CYCLE_HEADER_SIZE..],
            template,
            &mut dst,
            &mut buffers,
        )
        .expect("payload decodes");
        (header, dst)
    }

    fn smooth(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| ((i as f64 * 0.02).sin() * 12000.0) as i16)
            .collect()
    }

    #[test]
    fn test_template_cycle() -> io::Result<()> {
        let cycle: Vec<i16> = (0..200).map(|i| (i % 50) as i16 - 25).collect();
        let mut writer = CycleWriter::new(true);
        let mut out = Vec::new();

        assert_eq!(writer.write_template(&cycle, false, &mut out)?, CycleKind::Template);
        let (header, decoded) = decode_one(&out, &[]);
        assert_eq!(
            header,
            CycleHeader::Template {
                packer: BitPacker::Six,
                num_samples: 200
            }
        );
        assert_eq!(decoded, cycle);
        Ok(())
    }

    #[test]
    fn test_delta_cycle() -> io::Result<()> {
        let template = smooth(300);
        let cycle: Vec<i16> = template.iter().map(|v| v + 3).collect();
        let mut writer = CycleWriter::new(true);
        let mut out = Vec::new();

        assert_eq!(writer.write_delta(&cycle, &template, &mut out)?, CycleKind::Delta);
        let (header, decoded) = decode_one(&out, &template);
        assert_eq!(
            header,
            CycleHeader::Delta {
                packer: BitPacker::Four,
                num_samples: 300
            }
        );
        assert_eq!(decoded, cycle);
        Ok(())
    }

    #[test]
    fn test_diff_chosen_when_smaller() -> io::Result<()> {
        let cycle = smooth(512);
        let mut writer = CycleWriter::new(true);
        let mut out = Vec::new();

        assert_eq!(writer.write_template(&cycle, true, &mut out)?, CycleKind::Diff);
        assert!(out.len() < CYCLE_HEADER_SIZE + BitPacker::Sixteen.byte_count(512));

        let (header, decoded) = decode_one(&out, &[]);
        assert!(matches!(header, CycleHeader::Diff { log2_len: 9, .. }));
        assert_eq!(decoded, cycle);
        Ok(())
    }

    #[test]
    fn test_diff_skipped_for_unsupported_length() -> io::Result<()> {
        let cycle = smooth(500);
        let mut writer = CycleWriter::new(true);
        let mut out = Vec::new();

        assert_eq!(writer.write_template(&cycle, true, &mut out)?, CycleKind::Template);
        Ok(())
    }

    #[test]
    fn test_restricted_compressor_set() -> io::Result<()> {
        let cycle: Vec<i16> = (0..64).map(|i| i as i16 * 100).collect();
        let mut writer = CycleWriter::new(false);
        let mut out = Vec::new();

        writer.write_template(&cycle, false, &mut out)?;
        let (header, decoded) = decode_one(&out, &[]);
        assert_eq!(
            header,
            CycleHeader::Template {
                packer: BitPacker::Sixteen,
                num_samples: 64
            }
        );
        assert_eq!(decoded, cycle);
        Ok(())
    }
}
