//! Quarter-rate split of a cycle into full values and interpolation errors.
//!
//! For a cycle of length `L` (a power of two, at least 8) the full values are
//! the samples at `0, 4, .., L - 8` followed by the samples at `L - 4` and
//! `L - 1`, giving `L / 4 + 1` values. Every group of four is rebuilt by
//! interpolating between its full value `a` and the next one `b`:
//! `a, (3a + b) / 4, (a + b) / 2, (a + 3b) / 4`. The last group spans
//! `L - 4 ..= L - 1` and uses `a, (2a + b) / 3, (a + 2b) / 3, b`.
//!
//! The error values are `interpolated - original` for the skipped positions,
//! three per group and two in the last group.

/// Smallest cycle length the split supports.
pub const MIN_DIFF_LENGTH: usize = 8;

/// Whether a cycle of `len` samples can use the split.
#[inline]
pub fn supports_length(len: usize) -> bool {
    len >= MIN_DIFF_LENGTH && len.is_power_of_two()
}

#[inline]
pub const fn num_full_values(len: usize) -> usize {
    len / 4 + 1
}

#[inline]
pub const fn num_error_values(len: usize) -> usize {
    len - num_full_values(len)
}

/// Copies the full values of `cycle` into `full`.
pub fn extract_full_values(cycle: &[i16], full: &mut [i16]) {
    let len = cycle.len();
    debug_assert!(supports_length(len));
    debug_assert_eq!(full.len(), num_full_values(len));

    for (f, &v) in full.iter_mut().zip(cycle[..len - 4].iter().step_by(4)) {
        *f = v;
    }

    let n = full.len();
    full[n - 2] = cycle[len - 4];
    full[n - 1] = cycle[len - 1];
}

/// Writes the interpolated signal for `full` into `dst`.
pub fn interpolate(full: &[i16], dst: &mut [i16]) {
    let len = dst.len();
    debug_assert!(supports_length(len));
    debug_assert_eq!(full.len(), num_full_values(len));

    for (group, pair) in dst.chunks_exact_mut(4).zip(full.windows(2)) {
        let a = pair[0] as i32;
        let b = pair[1] as i32;

        group[0] = a as i16;
        group[1] = ((3 * a + b) / 4) as i16;
        group[2] = ((a + b) / 2) as i16;
        group[3] = ((a + 3 * b) / 4) as i16;
    }

    let n = full.len();
    let a = full[n - 2] as i32;
    let b = full[n - 1] as i32;
    let last = &mut dst[len - 4..];

    last[0] = a as i16;
    last[1] = ((2 * a + b) / 3) as i16;
    last[2] = ((a + 2 * b) / 3) as i16;
    last[3] = b as i16;
}

/// Computes the error values of `cycle` against the interpolation of `full`.
///
/// `work` must hold `cycle.len()` values.
pub fn extract_error_values(cycle: &[i16], full: &[i16], errors: &mut [i16], work: &mut [i16]) {
    let len = cycle.len();
    debug_assert_eq!(errors.len(), num_error_values(len));

    let work = &mut work[..len];
    interpolate(full, work);

    let positions = (0..len).filter(|&i| is_error_position(i, len));
    for (slot, i) in errors.iter_mut().zip(positions) {
        *slot = work[i].wrapping_sub(cycle[i]);
    }
}

/// Subtracts the error values from an interpolated cycle in `dst`.
pub fn apply_error_values(dst: &mut [i16], errors: &[i16]) {
    let len = dst.len();
    debug_assert_eq!(errors.len(), num_error_values(len));

    let positions = (0..len).filter(|&i| is_error_position(i, len));
    for (&err, i) in errors.iter().zip(positions) {
        dst[i] = dst[i].wrapping_sub(err);
    }
}

#[inline]
fn is_error_position(i: usize, len: usize) -> bool {
    i % 4 != 0 && i != len - 1
}
