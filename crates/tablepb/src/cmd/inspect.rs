use serde::Serialize;
use tablepb_wire::{DelimitedReader, FieldScanner, FrameConfig, RawField, RawValue};
use tracing::debug;

use crate::cmd::{open_input, read_input, InspectArgs};
use crate::exit::{wire_error, CliResult, SUCCESS};
use crate::output::{new_table, preview, print_json, print_raw, OutputFormat};

#[derive(Serialize)]
struct FieldRow {
    offset: usize,
    number: u32,
    wire_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    len: Option<usize>,
    value: String,
}

#[derive(Serialize)]
struct MessageOutput {
    message: usize,
    size: usize,
    fields: Vec<FieldRow>,
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let mut messages = Vec::new();
    if args.delimited {
        let config = FrameConfig {
            max_payload_size: args.max_len,
        };
        let reader = DelimitedReader::with_config(open_input(&args.input)?, config);
        for (index, frame) in reader.enumerate() {
            let payload = frame.map_err(|err| wire_error("read failed", err))?;
            messages.push(scan_message(index, &payload)?);
        }
    } else {
        let data = read_input(&args.input)?;
        messages.push(scan_message(0, &data)?);
    }

    print_messages(&messages, args.delimited, format);
    Ok(SUCCESS)
}

fn scan_message(index: usize, data: &[u8]) -> CliResult<MessageOutput> {
    debug!(message = index, size = data.len(), "scanning message");
    let fields = FieldScanner::new(data)
        .map(|field| field.map(field_row))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| wire_error(&format!("message {index} is malformed"), err))?;
    Ok(MessageOutput {
        message: index,
        size: data.len(),
        fields,
    })
}

fn field_row(field: RawField<'_>) -> FieldRow {
    let (len, value) = match field.value {
        RawValue::Varint(v) => (None, v.to_string()),
        RawValue::Fixed32(v) => (None, format!("{v} (float {})", f32::from_bits(v))),
        RawValue::Fixed64(v) => (None, format!("{v} (double {})", f64::from_bits(v))),
        RawValue::Delimited(bytes) => (Some(bytes.len()), preview(bytes)),
    };
    FieldRow {
        offset: field.offset,
        number: field.number,
        wire_type: field.wire_type.name(),
        len,
        value,
    }
}

fn print_messages(messages: &[MessageOutput], delimited: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => messages.iter().for_each(print_json),
        OutputFormat::Table => {
            let mut table = new_table(["MSG", "OFFSET", "FIELD", "TYPE", "LEN", "VALUE"]);
            for message in messages {
                for row in &message.fields {
                    table.add_row(vec![
                        message.message.to_string(),
                        row.offset.to_string(),
                        row.number.to_string(),
                        row.wire_type.to_string(),
                        row.len.map(|n| n.to_string()).unwrap_or_default(),
                        row.value.clone(),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for message in messages {
                if delimited {
                    println!("message {} ({} bytes)", message.message, message.size);
                }
                for row in &message.fields {
                    println!(
                        "  @{:<5} {:>5}: {:<6} {}",
                        row.offset, row.number, row.wire_type, row.value
                    );
                }
            }
        }
        OutputFormat::Raw => {
            let mut out = String::new();
            for row in messages.iter().flat_map(|m| &m.fields) {
                out.push_str(&format!("{} {}\n", row.number, row.value));
            }
            print_raw(out.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_describe_each_wire_type() {
        let data = [
            0x08, 0x96, 0x01, // 1: 150
            0x12, 0x02, b'h', b'i', // 2: "hi"
            0x1D, 0x00, 0x00, 0x80, 0x3F, // 3: 1.0f32
        ];
        let message = scan_message(0, &data).unwrap();

        assert_eq!(message.size, data.len());
        assert_eq!(message.fields.len(), 3);
        assert_eq!(message.fields[0].value, "150");
        assert_eq!(message.fields[0].wire_type, "VARINT");
        assert_eq!(message.fields[1].len, Some(2));
        assert_eq!(message.fields[1].value, "\"hi\"");
        assert_eq!(message.fields[1].offset, 3);
        assert_eq!(message.fields[2].value, "1065353216 (float 1)");
    }

    #[test]
    fn malformed_message_is_data_invalid() {
        let err = scan_message(4, &[0x12, 0x05, 0x00]).err().unwrap();
        assert_eq!(err.code, crate::exit::DATA_INVALID);
        assert!(err.message.contains("message 4"));
    }

    #[test]
    fn nested_payload_renders_as_hex() {
        let row = field_row(RawField {
            number: 7,
            wire_type: tablepb_wire::WireType::LengthDelimited,
            offset: 0,
            value: RawValue::Delimited(&[0x08, 0x01]),
        });
        assert_eq!(row.value, "0x0801");
    }
}
