use std::fs::File;
use std::io::{Cursor, Read, Seek};

use anyhow::{Context, Result};
use hlac::process::COMPRESSION_BLOCK_SIZE;
use hlac::process::decode::{Reader, open_for_decode};
use hlac::structs::header::StreamLayout;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::time_str;

/// Samples per channel scanned per call when measuring levels.
const LEVEL_CHUNK: usize = 16 * COMPRESSION_BLOCK_SIZE;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing HLAC stream: {}", args.input.display());

    let mut input = InputReader::new(&args.input)?;
    let info = if input.is_pipe() {
        let bytes = input.read_all()?;
        let size = bytes.len() as u64;
        analyze_stream(open_for_decode(Cursor::new(bytes))?, size, args, cli, multi)?
    } else {
        drop(input);
        let file = File::open(&args.input)
            .with_context(|| format!("Failed to open {}", args.input.display()))?;
        let size = file.metadata()?.len();
        analyze_stream(open_for_decode(file)?, size, args, cli, multi)?
    };

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&info)?);
    } else {
        display_stream_info(&info);
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StreamInfo {
    format: &'static str,
    version: Option<u8>,
    sample_rate: u32,
    channels: usize,
    compressed: bool,
    global_bit_shift: u8,
    blocks_per_channel: u64,
    total_samples: u64,
    duration: String,
    file_size: u64,
    header_size: u64,
    average_block_size: Option<f64>,
    compression_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    peak_levels: Option<Vec<PeakLevel>>,
}

#[derive(Debug, Serialize)]
struct PeakLevel {
    channel: usize,
    peak: u16,
    dbfs: f64,
}

impl PeakLevel {
    fn new(channel: usize, peak: u16) -> Self {
        let dbfs = if peak == 0 {
            f64::NEG_INFINITY
        } else {
            20.0 * (peak as f64 / 32768.0).log10()
        };
        Self {
            channel,
            peak,
            dbfs,
        }
    }
}

fn analyze_stream<R: Read + Seek>(
    mut reader: Reader<R>,
    file_size: u64,
    args: &InfoArgs,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<StreamInfo> {
    reader.set_fail_level(cli.fail_level());

    let sample_rate = reader.sample_rate();
    let channels = reader.channel_count();
    let total_samples = reader.total_samples();

    let (format, version, compressed, global_bit_shift, header_size) = match reader.layout() {
        StreamLayout::Blocks(header) => (
            "HLAC",
            Some(header.version),
            header.compressed,
            header.global_bit_shift,
            header.header_size() as u64,
        ),
        StreamLayout::Monolith { .. } => ("HLAC legacy (monolithic PCM)", None, false, 0, 1),
    };

    let blocks_per_channel = total_samples.div_ceil(COMPRESSION_BLOCK_SIZE as u64);
    let data_size = file_size.saturating_sub(header_size);
    let channel_blocks = blocks_per_channel * channels as u64;
    let raw_size = total_samples * channels as u64 * 2;

    let peak_levels = if args.levels {
        Some(scan_levels(&mut reader, multi)?)
    } else {
        None
    };

    Ok(StreamInfo {
        format,
        version,
        sample_rate,
        channels,
        compressed,
        global_bit_shift,
        blocks_per_channel,
        total_samples,
        duration: time_str(total_samples as f64 / sample_rate as f64),
        file_size,
        header_size,
        average_block_size: (reader.header().is_some() && channel_blocks > 0)
            .then(|| data_size as f64 / channel_blocks as f64),
        compression_ratio: (raw_size > 0).then(|| file_size as f64 / raw_size as f64),
        peak_levels,
    })
}

fn scan_levels<R: Read + Seek>(
    reader: &mut Reader<R>,
    multi: Option<&MultiProgress>,
) -> Result<Vec<PeakLevel>> {
    let total = reader.total_samples();
    let mut peaks = vec![0u16; reader.channel_count()];

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new(total));
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} samples ({percent}%)\n{msg}",
            )?);
            pb.set_message("scanning levels");
            Some(pb)
        }
        None => None,
    };

    let mut position = 0;
    while position < total {
        let n = (total - position).min(LEVEL_CHUNK as u64) as usize;
        let chunk = reader.read_max_levels(position, n)?;
        for (peak, level) in peaks.iter_mut().zip(chunk) {
            *peak = (*peak).max(level);
        }

        position += n as u64;
        if let Some(pb) = &pb {
            pb.set_position(position);
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(peaks
        .into_iter()
        .enumerate()
        .map(|(channel, peak)| PeakLevel::new(channel, peak))
        .collect())
}

fn display_stream_info(info: &StreamInfo) {
    println!();
    println!("HLAC Stream Information");
    println!("=======================");
    println!();
    println!("  Format                    {}", info.format);
    if let Some(version) = info.version {
        println!("  Version                   {version}");
    }
    println!("  Sampling rate             {} Hz", info.sample_rate);
    println!("  Channels                  {}", info.channels);
    println!("  Compressed                {}", info.compressed);
    if info.global_bit_shift != 0 {
        println!("  Global bit shift          {}", info.global_bit_shift);
    }
    println!();

    println!("Layout");
    println!("  Blocks per channel        {}", info.blocks_per_channel);
    println!("  Samples per channel       {}", info.total_samples);
    println!("  Duration                  {}", info.duration);
    println!(
        "  Size                      {:.2} MB ({} bytes)",
        info.file_size as f64 / 1_000_000.0,
        info.file_size
    );
    println!("  Header                    {} bytes", info.header_size);
    if let Some(avg) = info.average_block_size {
        println!("  Average block size        {avg:.1} bytes");
    }
    if let Some(ratio) = info.compression_ratio {
        println!("  Size vs. raw PCM          {:.1}%", ratio * 100.0);
    }

    if let Some(levels) = &info.peak_levels {
        println!();
        println!("Peak Levels");
        for level in levels {
            println!(
                "  Channel {:<2}                {:>5} ({:.1} dBFS)",
                level.channel, level.peak, level.dbfs
            );
        }
    }
    println!();
}
