use std::path::Path;

use anyhow::{Context, Result};
use hlac::structs::options::{CompressorOptions, Preset};
use serde::Deserialize;

/// Encoder settings read from YAML.
///
/// ```yaml
/// preset: delta
/// delta_cycle_threshold: 0.2
/// use_odd_compressors: false
/// ```
///
/// Fields left out keep the preset's value.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    pub preset: Option<String>,
    pub fixed_block_width: Option<u16>,
    pub reuse_first_cycle_length_for_block: Option<bool>,
    pub use_delta_encoding: Option<bool>,
    pub delta_cycle_threshold: Option<f32>,
    pub bit_rate_for_whole_block: Option<u8>,
    pub remove_dc_offset: Option<bool>,
    pub use_diff_encoding_with_fixed_blocks: Option<bool>,
    pub use_odd_compressors: Option<bool>,
    pub enable_compression: Option<bool>,
}

impl EncoderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Builds options from `preset` (or the config's preset, or the default)
    /// with the config's overrides applied.
    pub fn to_options(&self, preset: Option<Preset>) -> Result<CompressorOptions> {
        let preset = match (preset, &self.preset) {
            (Some(preset), _) => preset,
            (None, Some(name)) => name.parse()?,
            (None, None) => Preset::default(),
        };

        let mut options = CompressorOptions::preset(preset);
        macro_rules! apply {
            ($($field:ident),+) => { $(
                if let Some(value) = self.$field {
                    options.$field = value;
                }
            )+ };
        }
        apply!(
            fixed_block_width,
            reuse_first_cycle_length_for_block,
            use_delta_encoding,
            delta_cycle_threshold,
            bit_rate_for_whole_block,
            remove_dc_offset,
            use_diff_encoding_with_fixed_blocks,
            use_odd_compressors,
            enable_compression
        );

        if !(0.0..=1.0).contains(&options.delta_cycle_threshold) {
            anyhow::bail!(
                "delta_cycle_threshold must be within 0..=1, got {}",
                options.delta_cycle_threshold
            );
        }
        if options.bit_rate_for_whole_block > 16 {
            anyhow::bail!(
                "bit_rate_for_whole_block must be at most 16, got {}",
                options.bit_rate_for_whole_block
            );
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_to_preset() -> Result<()> {
        let config = EncoderConfig::from_yaml(
            "preset: diff\nuse_odd_compressors: false\nfixed_block_width: 256\n",
        )?;

        let options = config.to_options(None)?;
        let expected = CompressorOptions {
            use_odd_compressors: false,
            fixed_block_width: 256,
            ..CompressorOptions::preset(Preset::Diff)
        };
        assert_eq!(options, expected);
        Ok(())
    }

    #[test]
    fn test_command_line_preset_wins() -> Result<()> {
        let config = EncoderConfig::from_yaml("preset: diff\n")?;
        assert_eq!(
            config.to_options(Some(Preset::WholeBlock))?,
            CompressorOptions::preset(Preset::WholeBlock)
        );
        Ok(())
    }

    #[test]
    fn test_empty_config_is_default() -> Result<()> {
        let config = EncoderConfig::default();
        assert_eq!(config.to_options(None)?, CompressorOptions::default());
        Ok(())
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EncoderConfig::from_yaml("compression_level: 3\n").is_err());
        assert!(
            EncoderConfig::from_yaml("preset: lossy\n")
                .and_then(|c| c.to_options(None))
                .is_err()
        );
        assert!(
            EncoderConfig::from_yaml("delta_cycle_threshold: 1.5\n")
                .and_then(|c| c.to_options(None))
                .is_err()
        );
    }
}
