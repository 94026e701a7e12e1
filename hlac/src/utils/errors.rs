#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Header checksum {0:#010X} does not validate")]
    CorruptHeader(u32),

    #[error("Unsupported stream version {0}")]
    UnsupportedVersion(u8),

    #[error("Encrypted streams are not supported")]
    Encrypted,

    #[error("Unsupported sample format: {0} bits per sample")]
    UnsupportedSampleFormat(u8),

    #[error("Invalid channel count {0}")]
    InvalidChannelCount(u8),

    #[error("Block table invalid at entry {index}: {reason}")]
    InvalidBlockTable { index: usize, reason: &'static str },

    #[error("Header truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Stream truncated at byte {position}: {needed} more bytes required")]
    TruncatedStream { position: u64, needed: usize },

    #[error("Unsupported bit depth {0}")]
    UnsupportedBitDepth(u8),

    #[error("Delta cycle of {length} samples without a matching template ({template} samples)")]
    DeltaWithoutTemplate { length: usize, template: usize },

    #[error("Cycle of {length} samples overruns the block ({remaining} samples left)")]
    CycleOverrun { length: usize, remaining: usize },

    #[error("Cycle header declares no samples")]
    EmptyCycle,

    #[error("Invalid diff cycle length exponent {0}")]
    InvalidDiffLength(u8),

    #[error("Sample range {start}..{end} outside stream of {total} samples")]
    OutOfRange { start: u64, end: u64, total: u64 },

    #[error("Destination provides {found} channels, stream has {expected}")]
    ChannelMismatch { expected: usize, found: usize },

    #[error("Destination for channel {channel} holds {found} samples, {needed} requested")]
    DestinationTooShort {
        channel: usize,
        needed: usize,
        found: usize,
    },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Writer dropped or consumed before flush")]
    UnflushedWriter,

    #[error("Writer already flushed")]
    AlreadyFlushed,

    #[error("Unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported channel count {0}")]
    UnsupportedChannelCount(usize),

    #[error("Channel {channel} has {found} samples, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SectionError {
    #[error("Samples {start}..{end} lie outside the mapped range {mapped_start}..{mapped_end}")]
    OutsideMappedRange {
        start: u64,
        end: u64,
        mapped_start: u64,
        mapped_end: u64,
    },

    #[error("Subsection {start}+{length} exceeds stream of {total} samples")]
    InvalidSubsection { start: u64, length: u64, total: u64 },

    #[error("Seek to byte {0} outside the mapped view")]
    SeekOutsideView(i64),
}
