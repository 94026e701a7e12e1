use std::fs::File;
use std::io::{Cursor, Read, Seek};

use anyhow::{Context, Result, bail};
use hlac::process::COMPRESSION_BLOCK_SIZE;
use hlac::process::decode::{Reader, open_for_decode};
use hlac::utils::errors::DecodeError;
use indicatif::MultiProgress;

use super::command::{Cli, DecodeArgs};
use super::output_path;
use super::progress::{create_progress_bar, finish_progress_bar};
use crate::input::InputReader;
use crate::wav::WavWriter;

/// Samples per channel decoded per call.
const DECODE_CHUNK: usize = 16 * COMPRESSION_BLOCK_SIZE;

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Decoding HLAC stream: {}", args.input.display());

    let mut input = InputReader::new(&args.input)?;
    if input.is_pipe() {
        let bytes = input.read_all()?;
        decode_stream(open_for_decode(Cursor::new(bytes))?, args, cli, multi)
    } else {
        drop(input);
        let file = File::open(&args.input)
            .with_context(|| format!("Failed to open {}", args.input.display()))?;
        decode_stream(open_for_decode(file)?, args, cli, multi)
    }
}

fn decode_stream<R: Read + Seek>(
    mut reader: Reader<R>,
    args: &DecodeArgs,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<()> {
    reader.set_fail_level(cli.fail_level());

    let total = reader.total_samples();
    let sample_rate = reader.sample_rate();
    let channels = reader.channel_count();
    log::info!(
        "Stream: {} Hz, {} channel(s), {} samples",
        sample_rate,
        channels,
        total
    );

    let start = args.start;
    let length = args.length.unwrap_or_else(|| total.saturating_sub(start));
    let end = start
        .checked_add(length)
        .filter(|&end| end <= total)
        .ok_or(DecodeError::OutOfRange {
            start,
            end: start.saturating_add(length),
            total,
        })?;

    let out_path = output_path(&args.input, "wav", args.output.as_deref());
    let file = File::create(&out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let mut wav = WavWriter::new(file, sample_rate, channels as u16)?;

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(
            multi,
            Some(length.div_ceil(COMPRESSION_BLOCK_SIZE as u64)),
            "decoding",
        )?),
        None => None,
    };
    let start_time = std::time::Instant::now();

    let mut buffers = vec![vec![0i16; DECODE_CHUNK]; channels];
    let mut position = start;
    while position < end {
        let n = (end - position).min(DECODE_CHUNK as u64) as usize;
        let outcome = {
            let mut dest: Vec<&mut [i16]> = buffers.iter_mut().map(|b| &mut b[..n]).collect();
            reader.decode(position, n, &mut dest)?
        };

        let decoded: Vec<&[i16]> = buffers.iter().map(|b| &b[..outcome.samples]).collect();
        wav.write_channels(&decoded)?;
        position += outcome.samples as u64;

        if let Some(pb) = &pb {
            pb.set_position((position - start).div_ceil(COMPRESSION_BLOCK_SIZE as u64));
        }

        if outcome.truncated {
            log::warn!(
                "Stream ended early: decoded {} of {} samples",
                position - start,
                length
            );
            break;
        }
    }

    wav.finish()?;
    finish_progress_bar(pb.as_ref(), position - start, sample_rate, start_time);

    if position < end && cli.strict {
        bail!(
            "Stream truncated: decoded {} of {} samples",
            position - start,
            length
        );
    }

    log::info!(
        "Wrote {} samples ({} bytes of PCM) to {}",
        position - start,
        wav.data_written(),
        out_path.display()
    );
    Ok(())
}
