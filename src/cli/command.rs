use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use hlac::structs::options::Preset;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (hlac ", env!("HLAC_VERSION"), ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for encoding, decoding and inspecting HLAC lossless audio streams",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat corrupt cycle data as a fatal error instead of stopping early.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Encode a 16-bit PCM WAV file into an HLAC stream.
    Encode(EncodeArgs),

    /// Decode an HLAC stream into a 16-bit PCM WAV file.
    Decode(DecodeArgs),

    /// Print stream information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Input WAV file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output HLAC file. Defaults to the input path with an .hlac extension.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Compressor preset. Overrides the preset named in the config file.
    #[arg(long, value_enum)]
    pub preset: Option<PresetArg>,

    /// YAML file with a preset name and compressor option overrides.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input HLAC stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output WAV file. Defaults to the input path with a .wav extension.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// First sample to decode.
    #[arg(long, value_name = "SAMPLE", default_value_t = 0)]
    pub start: u64,

    /// Number of samples to decode. Defaults to the rest of the stream.
    #[arg(long, value_name = "SAMPLES")]
    pub length: Option<u64>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input HLAC stream.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Scan the stream and report per-channel peak levels.
    #[arg(long)]
    pub levels: bool,

    /// Print the summary as YAML.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum PresetArg {
    /// Raw 16-bit blocks.
    Uncompressed,
    /// One template per block when it fits.
    WholeBlock,
    /// Searched templates with delta cycles (default).
    Delta,
    /// Fixed 512-sample diff cycles.
    Diff,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Uncompressed => Preset::Uncompressed,
            PresetArg::WholeBlock => Preset::WholeBlock,
            PresetArg::Delta => Preset::Delta,
            PresetArg::Diff => Preset::Diff,
        }
    }
}

impl Cli {
    /// Level at which the decoder fails instead of stopping early.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}
