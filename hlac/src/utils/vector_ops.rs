//! Integer vector helpers for 16-bit sample runs.
//!
//! All arithmetic wraps on overflow so that `add(sub(a, b), b) == a` holds for
//! every input, which the delta and diff paths rely on.

/// `dst[i] = a[i] - b[i]`
#[inline]
pub fn sub(dst: &mut [i16], a: &[i16], b: &[i16]) {
    for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
        *d = x.wrapping_sub(y);
    }
}

/// `dst[i] -= src[i]`
#[inline]
pub fn sub_in_place(dst: &mut [i16], src: &[i16]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = d.wrapping_sub(s);
    }
}

/// `dst[i] += src[i]`
#[inline]
pub fn add(dst: &mut [i16], src: &[i16]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = d.wrapping_add(s);
    }
}

/// Subtracts the truncated mean from every value and returns it.
pub fn remove_dc_offset(data: &mut [i16]) -> i16 {
    if data.is_empty() {
        return 0;
    }

    let sum: i64 = data.iter().map(|&v| v as i64).sum();
    let offset = (sum / data.len() as i64) as i16;

    for v in data.iter_mut() {
        *v = v.wrapping_sub(offset);
    }

    offset
}

/// Largest magnitude in `data`. `i16::MIN` reports as 32768.
pub fn max_abs(data: &[i16]) -> u16 {
    data.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0)
}
