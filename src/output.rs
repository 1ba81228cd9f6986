//! Record writers: the output boundary.
//!
//! Consumes the post-pipeline record stream and serializes it in the
//! chosen format. This is where the hidden-field mask takes effect:
//! fields marked by `hide(...)` are present in the value all the way
//! through the pipeline and omitted only here.

use std::io::{self, Write};
use std::str::FromStr;

use crate::evaluator::EvalError;
use crate::record::Record;
use crate::value::{to_json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Yaml,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::Jsonl),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub format: OutputFormat,
    /// Minified one-line JSON instead of pretty-printed.
    pub compact: bool,
    /// Print string results without quotes.
    pub raw: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            format: OutputFormat::Json,
            compact: false,
            raw: false,
        }
    }
}

/// Errors surfaced while draining a pipeline into a writer.
#[derive(Debug)]
pub enum OutputError {
    Io(io::Error),
    Eval(EvalError),
    Serialize(String),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io(e) => write!(f, "IO error: {}", e),
            OutputError::Eval(e) => write!(f, "{}", e),
            OutputError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for OutputError {}

impl From<io::Error> for OutputError {
    fn from(e: io::Error) -> Self {
        OutputError::Io(e)
    }
}

impl From<EvalError> for OutputError {
    fn from(e: EvalError) -> Self {
        OutputError::Eval(e)
    }
}

/// Drain a record stream into a writer. The first in-stream evaluation
/// error aborts and is returned; earlier records stay written.
pub fn write_stream<W: Write>(
    out: &mut W,
    stream: impl Iterator<Item = Result<Record, EvalError>>,
    opts: WriteOptions,
) -> Result<(), OutputError> {
    if opts.format == OutputFormat::Csv {
        return write_csv_stream(out, stream);
    }

    for item in stream {
        let record = item?;
        let value = record.visible_value();
        match opts.format {
            OutputFormat::Json => {
                let json = to_json(&value);
                let rendered = if opts.compact {
                    serde_json::to_string(&json)
                } else {
                    serde_json::to_string_pretty(&json)
                }
                .map_err(|e| OutputError::Serialize(e.to_string()))?;
                write_rendered(out, &value, rendered, opts.raw)?;
            }
            OutputFormat::Jsonl => {
                let rendered = serde_json::to_string(&to_json(&value))
                    .map_err(|e| OutputError::Serialize(e.to_string()))?;
                write_rendered(out, &value, rendered, opts.raw)?;
            }
            OutputFormat::Yaml => {
                let rendered = serde_yaml::to_string(&to_json(&value))
                    .map_err(|e| OutputError::Serialize(e.to_string()))?;
                writeln!(out, "---")?;
                write!(out, "{}", rendered)?;
            }
            OutputFormat::Csv => unreachable!("handled above"),
        }
    }
    Ok(())
}

/// CSV takes its header from the first record's keys.
fn write_csv_stream<W: Write>(
    out: &mut W,
    stream: impl Iterator<Item = Result<Record, EvalError>>,
) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_writer(out);
    let mut wrote_header = false;

    for item in stream {
        let record = item?;
        let value = record.visible_value();
        if !wrote_header {
            if let Value::Object(obj) = &value {
                writer
                    .write_record(obj.keys())
                    .map_err(|e| OutputError::Serialize(e.to_string()))?;
            }
            wrote_header = true;
        }
        write_csv_row(&mut writer, &value)?;
    }
    writer
        .flush()
        .map_err(|e| OutputError::Serialize(e.to_string()))?;
    Ok(())
}

/// Raw mode prints bare strings without JSON quoting, like the
/// original's `-r`.
fn write_rendered<W: Write>(
    out: &mut W,
    value: &Value,
    rendered: String,
    raw: bool,
) -> Result<(), OutputError> {
    if raw {
        if let Value::String(s) = value {
            writeln!(out, "{}", s)?;
            return Ok(());
        }
    }
    writeln!(out, "{}", rendered)?;
    Ok(())
}

fn write_csv_row<W: Write>(
    writer: &mut csv::Writer<W>,
    value: &Value,
) -> Result<(), OutputError> {
    let cells: Vec<String> = match value {
        Value::Object(obj) => obj.values().map(csv_cell).collect(),
        Value::Array(arr) => arr.iter().map(csv_cell).collect(),
        other => vec![csv_cell(other)],
    };
    writer
        .write_record(&cells)
        .map_err(|e| OutputError::Serialize(e.to_string()))
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.repr(),
    }
}
