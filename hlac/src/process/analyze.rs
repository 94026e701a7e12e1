//! Bit-depth analysis for sample runs.
//!
//! The analyzer picks the narrowest packer that stores a run losslessly; the
//! cycle codec uses it both for the final packing and to score candidate
//! transforms (template periods, deltas) before committing to one.

use crate::process::packing::BitPacker;
use crate::utils::vector_ops;

/// Narrowest supported width that stores every value in `data` losslessly.
///
/// Returns 0 for silence, 1 when all values are 0 or 1, otherwise the first
/// even width in 2..=14 whose biased range covers the peak magnitude, else 16.
pub fn min_bit_depth(data: &[i16]) -> u8 {
    if data.iter().all(|&v| v == 0) {
        return 0;
    }

    if data.iter().all(|&v| v == 0 || v == 1) {
        return 1;
    }

    let peak = vector_ops::max_abs(data) as i32;

    (2..16u8)
        .step_by(2)
        .find(|&width| peak <= (1 << (width - 1)) - 1)
        .unwrap_or(16)
}

/// Maps an analyzer result onto the packer set in use.
///
/// With odd compressors disabled, results 2..=9 widen to 8 and 10..=15 to 16.
#[inline]
pub fn effective_width(depth: u8, use_odd_compressors: bool) -> u8 {
    match depth {
        0 | 1 => depth,
        _ if use_odd_compressors => depth,
        2..=9 => 8,
        _ => 16,
    }
}

/// Packer for an analyzer result under the given compressor set.
#[inline]
pub fn packer_for_depth(depth: u8, use_odd_compressors: bool) -> BitPacker {
    BitPacker::for_width(effective_width(depth, use_odd_compressors)).unwrap_or(BitPacker::Sixteen)
}

/// Depth of `run[..len] - run[len..2 * len]`.
///
/// `work` must hold at least `len` values and `run` at least `2 * len`.
pub fn bit_rate_for_cycle_length(run: &[i16], len: usize, work: &mut [i16]) -> u8 {
    let work = &mut work[..len];
    vector_ops::sub(work, &run[..len], &run[len..2 * len]);
    min_bit_depth(work)
}

/// Searches template lengths in `range` for the one whose repetition leaves
/// the smallest residual. The first length reaching the minimum wins.
///
/// Returns `None` when no length in the range fits twice into `run` or when
/// no candidate beats 16 bits.
pub fn cycle_length_with_lowest_bit_rate(
    run: &[i16],
    range: std::ops::Range<usize>,
    work: &mut [i16],
) -> Option<(usize, u8)> {
    let mut best: Option<(usize, u8)> = None;
    let mut best_rate = 16u8;

    for len in range.take_while(|&len| 2 * len <= run.len()) {
        let rate = bit_rate_for_cycle_length(run, len, work);
        if rate < best_rate {
            best_rate = rate;
            best = Some((len, rate));
            if rate == 0 {
                break;
            }
        }
    }

    best
}

/// Bits saved by storing `next` as a difference from `template`.
///
/// With `remove_dc` set the residual is scored after removing its mean. A
/// residual wider than the template scores 0.
pub fn bit_reduction_with_template(
    template: &[i16],
    next: &[i16],
    remove_dc: bool,
    work: &mut [i16],
) -> u8 {
    debug_assert_eq!(template.len(), next.len());

    let template_depth = min_bit_depth(template);

    let work = &mut work[..template.len()];
    vector_ops::sub(work, template, next);

    if remove_dc {
        vector_ops::remove_dc_offset(work);
    }

    let delta_depth = min_bit_depth(work);

    template_depth.saturating_sub(delta_depth)
}
