//! Encoder configuration.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};

/// Knobs controlling cycle selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorOptions {
    /// Template length used for every new template; 0 searches instead.
    pub fixed_block_width: u16,

    /// Reuse the first searched template length for the rest of the block.
    pub reuse_first_cycle_length_for_block: bool,

    pub use_delta_encoding: bool,

    /// Minimum `reduction / template_depth` ratio for a delta cycle.
    pub delta_cycle_threshold: f32,

    /// A remainder this narrow is stored as a single template.
    pub bit_rate_for_whole_block: u8,

    /// Score delta candidates after removing their mean.
    pub remove_dc_offset: bool,

    pub use_diff_encoding_with_fixed_blocks: bool,

    /// Use every supported width. When off, only 0, 1, 8 and 16 are used.
    ///
    /// Silent and 0/1 cycles keep their 0 and 1 bit packers either way
    /// instead of widening to 8 bits; decoders accept both forms.
    pub use_odd_compressors: bool,

    pub enable_compression: bool,
}

/// Named option sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Raw 16-bit blocks.
    Uncompressed,
    /// Each block remainder as one template when it fits 16 bits.
    WholeBlock,
    /// Searched templates followed by delta cycles.
    #[default]
    Delta,
    /// Fixed 512-sample diff cycles.
    Diff,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Uncompressed,
        Preset::WholeBlock,
        Preset::Delta,
        Preset::Diff,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Uncompressed => "uncompressed",
            Preset::WholeBlock => "whole-block",
            Preset::Delta => "delta",
            Preset::Diff => "diff",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("Unknown preset '{s}'"))
    }
}

impl CompressorOptions {
    pub fn preset(preset: Preset) -> Self {
        let base = Self {
            fixed_block_width: 0,
            reuse_first_cycle_length_for_block: false,
            use_delta_encoding: true,
            delta_cycle_threshold: 0.15,
            bit_rate_for_whole_block: 2,
            remove_dc_offset: true,
            use_diff_encoding_with_fixed_blocks: false,
            use_odd_compressors: true,
            enable_compression: true,
        };

        match preset {
            Preset::Delta => base,
            Preset::Uncompressed => Self {
                enable_compression: false,
                ..base
            },
            Preset::WholeBlock => Self {
                use_delta_encoding: false,
                bit_rate_for_whole_block: 16,
                ..base
            },
            Preset::Diff => Self {
                fixed_block_width: 512,
                use_delta_encoding: false,
                use_diff_encoding_with_fixed_blocks: true,
                bit_rate_for_whole_block: 0,
                ..base
            },
        }
    }
}

impl Default for CompressorOptions {
    fn default() -> Self {
        Self::preset(Preset::default())
    }
}
