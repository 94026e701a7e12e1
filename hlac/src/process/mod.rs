/// Fixed-width sample packers.
///
/// Provides the [`BitPacker`](packing::BitPacker) enum with one variant per
/// supported width and a width-indexed lookup table.
pub mod packing;

/// Minimal bit-depth analysis and template scoring.
pub mod analyze;

/// Quarter-rate full/error split used by diff cycles.
pub mod diff;

/// Cycle serialization and reconstruction.
pub mod cycle;

/// Block encoding and the stream [`Writer`](encode::Writer).
///
/// Splits each channel block into template, delta and diff cycles and
/// prepends the container header once all block offsets are known.
pub mod encode;

/// Block decoding and the seekable stream [`Reader`](decode::Reader).
pub mod decode;

/// Scoped byte-range views and subsection readers.
pub mod section;

/// Samples per channel in one independently decodable block.
pub const COMPRESSION_BLOCK_SIZE: usize = 4096;

/// Smallest multiple of [`COMPRESSION_BLOCK_SIZE`] holding `num_samples`.
#[inline]
pub const fn padded_sample_size(num_samples: usize) -> usize {
    num_samples.div_ceil(COMPRESSION_BLOCK_SIZE) * COMPRESSION_BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_sample_size() {
        assert_eq!(padded_sample_size(0), 0);
        assert_eq!(padded_sample_size(1), 4096);
        assert_eq!(padded_sample_size(4096), 4096);
        assert_eq!(padded_sample_size(10_000), 12_288);
    }
}
