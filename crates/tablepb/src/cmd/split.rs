use serde::Serialize;
use tablepb_wire::{varint_len, DelimitedReader, FrameConfig};
use tracing::{debug, info};

use crate::cmd::{open_input, SplitArgs};
use crate::exit::{wire_error, CliResult, SUCCESS};
use crate::output::{hex, new_table, preview, print_json, OutputFormat};

#[derive(Serialize)]
struct FrameRow {
    index: usize,
    offset: usize,
    prefix_len: usize,
    size: usize,
    preview: String,
}

pub fn run(args: SplitArgs, format: OutputFormat) -> CliResult<i32> {
    let config = FrameConfig {
        max_payload_size: args.max_len,
    };
    let mut reader = DelimitedReader::with_config(open_input(&args.input)?, config);

    let mut rows = Vec::new();
    let mut offset = 0usize;
    let outcome = loop {
        let payload = match reader.next_frame() {
            Ok(Some(payload)) => payload,
            Ok(None) => break Ok(()),
            Err(err) => break Err(wire_error(&format!("frame {} is unreadable", rows.len()), err)),
        };

        let prefix_len = varint_len(payload.len() as u64);
        let row = FrameRow {
            index: rows.len(),
            offset,
            prefix_len,
            size: payload.len(),
            preview: preview(&payload),
        };
        debug!(index = row.index, size = row.size, "frame");
        offset += prefix_len + payload.len();

        match format {
            OutputFormat::Json => print_json(&row),
            OutputFormat::Pretty => println!(
                "#{:<4} @{:<8} {} + {} bytes  {}",
                row.index, row.offset, row.prefix_len, row.size, row.preview
            ),
            OutputFormat::Raw => println!("{}", hex(&payload)),
            OutputFormat::Table => {}
        }
        rows.push(row);
    };

    if matches!(format, OutputFormat::Table) {
        let mut table = new_table(["#", "OFFSET", "PREFIX", "SIZE", "PAYLOAD"]);
        for row in &rows {
            table.add_row(vec![
                row.index.to_string(),
                row.offset.to_string(),
                row.prefix_len.to_string(),
                row.size.to_string(),
                row.preview.clone(),
            ]);
        }
        println!("{table}");
    }

    outcome?;
    info!(frames = rows.len(), bytes = offset, "stream split");
    Ok(SUCCESS)
}
