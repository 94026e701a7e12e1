use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use hlac::process::COMPRESSION_BLOCK_SIZE;
use hlac::process::encode::Writer;
use indicatif::MultiProgress;

use super::command::{Cli, EncodeArgs};
use super::config::EncoderConfig;
use super::output_path;
use super::progress::{create_progress_bar, finish_progress_bar};
use crate::input::InputReader;
use crate::wav::read_wav;

/// Samples per channel handed to the writer per call. Whole blocks, so the
/// chunking does not change the encoded stream.
const ENCODE_CHUNK: usize = 64 * COMPRESSION_BLOCK_SIZE;

pub fn cmd_encode(args: &EncodeArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = match &args.config {
        Some(path) => EncoderConfig::load(path)?,
        None => EncoderConfig::default(),
    };
    let options = config.to_options(args.preset.map(Into::into))?;
    log::debug!("Compressor options: {options:?}");

    log::info!("Reading WAV input: {}", args.input.display());
    let mut input = InputReader::new(&args.input)?;
    let audio = read_wav(input.reader())
        .with_context(|| format!("Failed to read WAV input {}", args.input.display()))?;

    let sample_rate = audio.format.sample_rate;
    let num_samples = audio.sample_count();
    log::info!(
        "Input: {} Hz, {} channel(s), {} samples ({})",
        sample_rate,
        audio.channels.len(),
        num_samples,
        crate::timestamp::time_str(num_samples as f64 / sample_rate as f64)
    );

    let out_path = output_path(&args.input, "hlac", args.output.as_deref());
    let file = File::create(&out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let mut writer = Writer::new(BufWriter::new(file), sample_rate, audio.channels.len(), options)?;

    let total_blocks = num_samples.div_ceil(COMPRESSION_BLOCK_SIZE) as u64;
    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, Some(total_blocks), "encoding")?),
        None => None,
    };
    let start_time = std::time::Instant::now();

    let mut position = 0;
    while position < num_samples {
        let end = (position + ENCODE_CHUNK).min(num_samples);
        let chunk: Vec<&[i16]> = audio.channels.iter().map(|c| &c[position..end]).collect();
        writer.write(&chunk)?;

        if let Some(pb) = &pb {
            pb.set_position(end.div_ceil(COMPRESSION_BLOCK_SIZE) as u64);
        }
        position = end;
    }

    writer.flush()?;
    let stats = writer.stats();
    let file = writer.into_inner()?.into_inner().map_err(|e| e.into_error())?;
    let stream_bytes = file.metadata()?.len();

    finish_progress_bar(pb.as_ref(), num_samples as u64, sample_rate, start_time);

    let raw_bytes = (num_samples * audio.channels.len() * 2) as u64;
    log::info!(
        "Wrote {} ({} blocks: {} templates, {} deltas, {} diffs)",
        out_path.display(),
        stats.blocks,
        stats.templates,
        stats.deltas,
        stats.diffs
    );
    if raw_bytes > 0 {
        log::info!(
            "Compressed {} bytes to {} bytes ({:.1}%)",
            raw_bytes,
            stream_bytes,
            100.0 * stream_bytes as f64 / raw_bytes as f64
        );
    }

    Ok(())
}
