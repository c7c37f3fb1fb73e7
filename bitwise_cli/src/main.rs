use bitwise_core::config::{BitwiseConfig, OutputFormat};
use bitwise_core::{BitwiseStream, LeafStream, Stream, share};

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print lengths and the MD5 digest of a file.
    Info {
        #[clap(value_parser)]
        input: PathBuf,
    },
    /// Cut a bit range out of a file.
    Slice {
        #[clap(value_parser)]
        input: PathBuf,
        #[clap(long, default_value_t = 0)]
        offset_bits: u64,
        #[clap(long)]
        length_bits: u64,
        /// Zero-extend the slice to a whole number of bytes.
        #[clap(long)]
        pad: bool,
    },
    /// Repeat a file's content until it reaches a target length.
    Grow {
        #[clap(value_parser)]
        input: PathBuf,
        #[clap(
            long,
            conflicts_with = "bits",
            required_unless_present = "bits",
            allow_hyphen_values = true
        )]
        bytes: Option<i64>,
        #[clap(long, allow_hyphen_values = true)]
        bits: Option<i64>,
    },
    /// Copy a byte range of a file through a bounded buffer.
    Copy {
        #[clap(value_parser)]
        input: PathBuf,
        #[clap(long, default_value_t = 0)]
        offset: u64,
        #[clap(long)]
        count: Option<u64>,
        #[clap(long)]
        buffer_size: Option<usize>,
    },
    /// Search a file for a byte sequence given in hex.
    Find {
        #[clap(value_parser)]
        input: PathBuf,
        #[clap(long)]
        needle: String,
        #[clap(long, default_value_t = 0)]
        offset_bits: u64,
    },
}

#[derive(Serialize, Debug)]
struct Report {
    command: &'static str,
    length: u64,
    length_bits: u64,
    md5: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    found_at_bits: Option<u64>,
    #[serde(skip)]
    data: Vec<u8>,
}

impl Report {
    fn from_stream(command: &'static str, stream: &mut dyn BitwiseStream) -> anyhow::Result<Self> {
        let data = stream.to_vec()?;
        Ok(Self {
            command,
            length: stream.length(),
            length_bits: stream.length_bits(),
            md5: format!("{:x}", md5::compute(&data)),
            hex: Some(hex_string(&data)),
            found_at_bits: None,
            data,
        })
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

/// Accepts `dead`, `de ad`, `de-ad` and `0xdead`.
fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let digits: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != ':')
        .collect();
    if digits.len() % 2 != 0 {
        anyhow::bail!("hex needle {text:?} has an odd number of digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16)
                .map_err(|e| anyhow::anyhow!("invalid hex byte {byte:?}: {e}"))
        })
        .collect()
}

fn open_leaf(path: &PathBuf) -> anyhow::Result<LeafStream> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open input file {:?}: {}", path, e))?;
    let leaf = LeafStream::from_resource(share(file))?
        .with_name(path.display().to_string());
    log::debug!("opened {:?}: {} bits", path, leaf.length_bits());
    Ok(leaf)
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<BitwiseConfig> {
    match path {
        Some(config_path) => {
            log::info!("Loading configuration from specified path: {config_path:?}");
            BitwiseConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("bitwise.toml");
            if default_config_path.exists() {
                log::info!("Loading default configuration: {default_config_path:?}");
                BitwiseConfig::load_from_file(&default_config_path)
            } else {
                log::debug!("No config file found, using built-in defaults");
                Ok(BitwiseConfig::default())
            }
        }
    }
}

fn run(command: Command, config: &BitwiseConfig) -> anyhow::Result<Report> {
    match command {
        Command::Info { input } => {
            let mut leaf = open_leaf(&input)?;
            let mut report = Report::from_stream("info", &mut leaf)?;
            report.hex = None;
            Ok(report)
        }
        Command::Slice {
            input,
            offset_bits,
            length_bits,
            pad,
        } => {
            let mut leaf = open_leaf(&input)?;
            leaf.set_position_bits(i64::try_from(offset_bits)?)?;
            let slice = leaf.slice_bits(length_bits)?;
            let mut out: Stream = if pad { slice.pad_bits()? } else { slice };
            Report::from_stream("slice", &mut out)
        }
        Command::Grow { input, bytes, bits } => {
            let leaf = open_leaf(&input)?;
            let mut grown = match (bytes, bits) {
                (Some(bytes), _) => leaf.grow_to(bytes)?,
                (None, Some(bits)) => leaf.grow_to_bits(bits)?,
                (None, None) => anyhow::bail!("either --bytes or --bits is required"),
            };
            Report::from_stream("grow", &mut grown)
        }
        Command::Copy {
            input,
            offset,
            count,
            buffer_size,
        } => {
            let mut leaf = open_leaf(&input)?;
            let buffer_size = buffer_size.unwrap_or(config.copy.buffer_size);
            let mut dest = LeafStream::new();
            leaf.copy_range_to(&mut dest, buffer_size, offset, count.unwrap_or(u64::MAX))?;
            log::debug!("copied {} bits with a {buffer_size} byte buffer", dest.length_bits());
            Report::from_stream("copy", &mut dest)
        }
        Command::Find {
            input,
            needle,
            offset_bits,
        } => {
            let mut leaf = open_leaf(&input)?;
            let mut needle = LeafStream::from_bytes(parse_hex(&needle)?);
            let found = leaf.index_of(&mut needle, offset_bits)?;
            log::debug!("searched from bit {offset_bits} for {} bits: {found:?}", needle.length_bits());
            let mut report = Report::from_stream("find", &mut leaf)?;
            report.hex = None;
            report.found_at_bits = found;
            Ok(report)
        }
    }
}

fn emit(report: &Report, format: OutputFormat) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(report)?)?,
        OutputFormat::Raw => out.write_all(&report.data)?,
        OutputFormat::Hex => match report.command {
            "info" => writeln!(
                out,
                "{} bytes ({} bits), md5 {}",
                report.length, report.length_bits, report.md5
            )?,
            "find" => match report.found_at_bits {
                Some(bit) => writeln!(out, "found at bit {bit}")?,
                None => writeln!(out, "not found")?,
            },
            _ => writeln!(out, "{}", report.hex.as_deref().unwrap_or_default())?,
        },
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let cli = Cli::parse();

    let config = load_config(cli.config)?;
    log::debug!("Effective configuration: {config:?}");

    let report = run(cli.command, &config)?;
    emit(&report, config.output.format)
}
