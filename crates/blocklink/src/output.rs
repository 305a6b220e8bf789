use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use blocklink_frame::{DeviceRecord, Payload};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RecordOutput<'a> {
    kind: &'a str,
    group: &'a str,
    variable: i64,
    device: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Payload>,
    timestamp: String,
}

/// Print records that arrived under `kind` ("device" or "ack").
pub fn print_records(records: &[DeviceRecord], kind: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for record in records {
                let out = RecordOutput {
                    kind,
                    group: &record.group,
                    variable: record.variable,
                    device: record.device,
                    data: record.data.as_ref(),
                    timestamp: now_unix_seconds(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "GROUP", "VAR", "DEVICE", "DATA"]);
            for record in records {
                table.add_row(vec![
                    kind.to_string(),
                    record.group.clone(),
                    record.variable.to_string(),
                    record.device.to_string(),
                    payload_text(record.data.as_ref()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                println!(
                    "{} G={} V={} D={} DA={}",
                    kind,
                    record.group,
                    record.variable,
                    record.device,
                    payload_text(record.data.as_ref())
                );
            }
        }
    }
}

/// Print a single named value, such as the firmware version.
pub fn print_value(name: &str, value: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let mut out = serde_json::Map::new();
            out.insert(name.to_string(), serde_json::Value::from(value));
            println!("{}", serde_json::Value::Object(out));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec![name.to_uppercase()])
                .add_row(vec![value.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{value}"),
    }
}

fn payload_text(payload: Option<&Payload>) -> String {
    payload.map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
