use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(data: &Value, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let text = match format {
        OutputFormat::Json if pretty => serde_json::to_string_pretty(data)?,
        OutputFormat::Json => serde_json::to_string(data)?,
        OutputFormat::Table => render_table(data),
    };
    println!("{text}");
    Ok(())
}

/// Objects become `key : value` blocks, arrays of objects become one block
/// per element separated by blank lines.
pub fn render_table(data: &Value) -> String {
    let mut lines = Vec::new();
    match data {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    lines.push(String::new());
                }
                push_value(&mut lines, item, 0);
            }
        }
        other => push_value(&mut lines, other, 0),
    }
    lines.join("\n")
}

fn push_value(lines: &mut Vec<String>, value: &Value, indent: usize) {
    match value {
        Value::Object(map) => push_object(lines, map, indent),
        other => lines.push(format!("{}{}", pad(indent), scalar(other))),
    }
}

fn push_object(lines: &mut Vec<String>, map: &Map<String, Value>, indent: usize) {
    let width = map.keys().map(String::len).max().unwrap_or(0);
    for (key, value) in map {
        match value {
            Value::Array(items) if items.is_empty() => {
                lines.push(format!("{}{key:<width$} : -", pad(indent)));
            }
            Value::Array(items) => {
                lines.push(format!("{}{key}:", pad(indent)));
                for item in items {
                    match item {
                        Value::Object(nested) => {
                            push_object(lines, nested, indent + 4);
                            lines.push(String::new());
                        }
                        other => lines.push(format!("{}- {}", pad(indent + 2), scalar(other))),
                    }
                }
            }
            Value::Object(nested) => {
                lines.push(format!("{}{key}:", pad(indent)));
                push_object(lines, nested, indent + 2);
            }
            other => lines.push(format!("{}{key:<width$} : {}", pad(indent), scalar(other))),
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::from("-"),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn pad(indent: usize) -> String {
    " ".repeat(indent)
}
