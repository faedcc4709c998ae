use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use tablepb_wire::DEFAULT_MAX_FRAME;

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod inspect;
pub mod split;
pub mod varint;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump the fields of an encoded message without a schema.
    Inspect(InspectArgs),
    /// Encode or decode a single varint.
    #[command(subcommand)]
    Varint(VarintCommand),
    /// List the messages of a length-prefixed stream.
    Split(SplitArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Inspect(args) => inspect::run(args, format),
        Command::Varint(VarintCommand::Encode(args)) => varint::encode(args, format),
        Command::Varint(VarintCommand::Decode(args)) => varint::decode(args, format),
        Command::Split(args) => split::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Input file, or `-` for stdin.
    pub input: PathBuf,
    /// Treat the input as a stream of length-prefixed messages.
    #[arg(long)]
    pub delimited: bool,
    /// Largest message accepted from a delimited stream, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_FRAME)]
    pub max_len: usize,
}

#[derive(Subcommand, Debug)]
pub enum VarintCommand {
    /// Encode a decimal value as varint bytes.
    Encode(VarintEncodeArgs),
    /// Decode varint bytes given as hex.
    Decode(VarintDecodeArgs),
}

#[derive(Args, Debug)]
pub struct VarintEncodeArgs {
    /// Decimal value; negative values take ten bytes unless --zigzag is set.
    #[arg(allow_negative_numbers = true)]
    pub value: String,
    /// Zig-zag map the value first, as sint32/sint64 fields do.
    #[arg(long)]
    pub zigzag: bool,
}

#[derive(Args, Debug)]
pub struct VarintDecodeArgs {
    /// Hex bytes, optionally prefixed with 0x and separated by spaces.
    pub hex: String,
    /// Undo the zig-zag mapping after decoding.
    #[arg(long)]
    pub zigzag: bool,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Input file, or `-` for stdin.
    pub input: PathBuf,
    /// Largest message accepted, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_FRAME)]
    pub max_len: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Open a file argument for streaming reads.
pub(crate) fn open_input(path: &Path) -> CliResult<Box<dyn Read>> {
    if is_stdin(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path)
        .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
    Ok(Box::new(file))
}

/// Read a whole file argument into memory.
pub(crate) fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    let mut reader = open_input(path)?;
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    Ok(data)
}
