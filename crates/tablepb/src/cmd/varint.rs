use std::fmt;

use serde::Serialize;
use tablepb_wire::{read_varint, write_varint, zigzag_decode64, zigzag_encode64, MAX_VARINT_LEN};
use tracing::warn;

use crate::cmd::{VarintDecodeArgs, VarintEncodeArgs};
use crate::exit::{wire_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{hex, new_table, print_json, print_raw, OutputFormat};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(untagged)]
enum Value {
    Unsigned(u64),
    Signed(i64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Serialize)]
struct VarintOutput {
    value: Value,
    zigzag: bool,
    hex: String,
    len: usize,
}

pub fn encode(args: VarintEncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let (value, raw) = parse_value(&args.value, args.zigzag)?;
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = write_varint(raw, &mut buf);

    let out = VarintOutput {
        value,
        zigzag: args.zigzag,
        hex: hex(&buf[..len]),
        len,
    };
    match format {
        OutputFormat::Raw => print_raw(&buf[..len]),
        _ => print_varint(&out, format),
    }
    Ok(SUCCESS)
}

pub fn decode(args: VarintDecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;
    let (raw, len) = read_varint(&bytes)
        .map_err(|err| wire_error("decode failed", err))?
        .ok_or_else(|| CliError::new(DATA_INVALID, "decode failed: varint is truncated"))?;
    if len < bytes.len() {
        warn!(trailing = bytes.len() - len, "ignoring bytes after the varint");
    }

    let value = if args.zigzag {
        Value::Signed(zigzag_decode64(raw))
    } else {
        Value::Unsigned(raw)
    };
    let out = VarintOutput {
        value,
        zigzag: args.zigzag,
        hex: hex(&bytes[..len]),
        len,
    };
    match format {
        OutputFormat::Raw => println!("{value}"),
        _ => print_varint(&out, format),
    }
    Ok(SUCCESS)
}

fn print_varint(out: &VarintOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(["VALUE", "ZIGZAG", "HEX", "LEN"]);
            table.add_row(vec![
                out.value.to_string(),
                out.zigzag.to_string(),
                out.hex.clone(),
                out.len.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{} <-> {} ({} bytes)", out.value, out.hex, out.len);
        }
    }
}

/// Parse a decimal argument into the value shown and the raw varint payload.
///
/// Without zig-zag, negative numbers are sign-extended to 64 bits the way
/// int32/int64 fields are sent.
fn parse_value(input: &str, zigzag: bool) -> CliResult<(Value, u64)> {
    let input = input.trim();
    let invalid = || CliError::new(USAGE, format!("invalid varint value: {input}"));

    if zigzag {
        let value: i64 = input.parse().map_err(|_| invalid())?;
        return Ok((Value::Signed(value), zigzag_encode64(value)));
    }
    if input.starts_with('-') {
        let value: i64 = input.parse().map_err(|_| invalid())?;
        return Ok((Value::Signed(value), value as u64));
    }
    let value: u64 = input.parse().map_err(|_| invalid())?;
    Ok((Value::Unsigned(value), value))
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();

    if digits.is_empty() {
        return Err(CliError::new(USAGE, "hex input must not be empty"));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex input has an odd number of digits"));
    }

    digits
        .chunks_exact(2)
        .map(|pair| match (hex_digit(pair[0]), hex_digit(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(CliError::new(
                USAGE,
                format!("invalid hex digit in {:?}", String::from_utf8_lossy(pair)),
            )),
        })
        .collect()
}

fn hex_digit(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|d| d as u8)
}
