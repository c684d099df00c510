use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use wirerpc_fury::ProtocolMethod;
use wirerpc_transport::Endpoint;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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
struct ListeningOutput {
    event: &'static str,
    endpoint: String,
}

pub fn print_listening(endpoint: &Endpoint, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            endpoint: endpoint.to_string(),
        }),
        OutputFormat::Raw => println!("{endpoint}"),
        OutputFormat::Table | OutputFormat::Pretty => println!("listening on {endpoint}"),
    }
}

#[derive(Serialize)]
pub struct CallOutput<'a> {
    pub method: &'a str,
    pub codec: &'static str,
    pub elapsed_ms: f64,
    pub result: Value,
}

pub fn print_call(out: &CallOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "CODEC", "ELAPSED", "RESULT"])
                .add_row(vec![
                    out.method.to_string(),
                    out.codec.to_string(),
                    format!("{:.2}ms", out.elapsed_ms),
                    out.result.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "method={} codec={} elapsed={:.2}ms",
                out.method, out.codec, out.elapsed_ms
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&out.result).unwrap_or_else(|_| "null".to_string())
            );
        }
        OutputFormat::Raw => match &out.result {
            Value::String(text) => println!("{text}"),
            other => println!("{other}"),
        },
    }
}

#[derive(Serialize)]
struct ProtocolRow<'a> {
    method: &'a str,
    request: Vec<String>,
    response: String,
}

impl<'a> From<&'a ProtocolMethod> for ProtocolRow<'a> {
    fn from(protocol: &'a ProtocolMethod) -> Self {
        Self {
            method: &protocol.method,
            request: protocol
                .request
                .iter()
                .map(|field| format!("{}: {}", field.name, field.ty))
                .collect(),
            response: protocol.response.ty.to_string(),
        }
    }
}

pub fn print_protocols<'a>(
    protocols: impl IntoIterator<Item = &'a ProtocolMethod>,
    format: OutputFormat,
) {
    let rows: Vec<ProtocolRow<'_>> = protocols.into_iter().map(ProtocolRow::from).collect();
    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "REQUEST", "RESPONSE"]);
            for row in &rows {
                table.add_row(vec![
                    row.method.to_string(),
                    row.request.join(", "),
                    row.response.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!("{}({}) -> {}", row.method, row.request.join(", "), row.response);
            }
        }
        OutputFormat::Raw => {
            for row in &rows {
                println!("{}", row.method);
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
