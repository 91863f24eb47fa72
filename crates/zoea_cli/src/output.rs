//! Terminal output helpers — styled text for humans, JSON lines for machines.
//!
//! Uses `console` for colors (respects NO_COLOR, auto-disables when piped)
//! and `comfy-table` for structured data.

use std::sync::atomic::{AtomicBool, Ordering};

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use console::style;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::cli::OutputFormat;

static JSON_MODE: AtomicBool = AtomicBool::new(false);

pub fn init(format: OutputFormat) {
    if matches!(format, OutputFormat::Json) {
        JSON_MODE.store(true, Ordering::Relaxed);
    }
}

pub fn is_json() -> bool {
    JSON_MODE.load(Ordering::Relaxed)
}

#[derive(Serialize)]
struct Msg<'a> {
    level: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a JsonValue>,
}

fn emit_json(level: &str, message: &str, data: Option<&JsonValue>) {
    let msg = Msg {
        level,
        message,
        data,
    };
    let json = serde_json::to_string(&msg)
        .unwrap_or_else(|_| format!("{{\"level\":\"{level}\",\"message\":\"{message}\"}}"));
    println!("{json}");
}

pub fn success(text: &str) {
    if is_json() {
        emit_json("success", text, None);
    } else {
        println!("{} {}", style("✓").green(), text);
    }
}

pub fn info(text: &str) {
    if is_json() {
        emit_json("info", text, None);
    } else {
        println!("{text}");
    }
}

pub fn warning(text: &str) {
    if is_json() {
        emit_json("warning", text, None);
    } else {
        eprintln!("{} {}", style("!").yellow(), text);
    }
}

pub fn error(text: &str) {
    if is_json() {
        emit_json("error", text, None);
    } else {
        eprintln!("{} {}", style("✗").red(), text);
    }
}

/// Print rows as a table (text) or an array of objects (json).
pub fn table(headers: &[&str], rows: Vec<Vec<String>>) {
    if is_json() {
        let items: Vec<JsonValue> = rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, JsonValue> = headers
                    .iter()
                    .zip(row)
                    .map(|(h, v)| (h.to_string(), JsonValue::String(v.clone())))
                    .collect();
                JsonValue::Object(obj)
            })
            .collect();
        println!("{}", serde_json::to_string(&items).unwrap_or_default());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}
