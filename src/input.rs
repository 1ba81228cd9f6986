//! Record readers: the input boundary.
//!
//! Produces the lazy record stream the pipeline consumes, regardless of
//! the source format (JSON document or array, JSON-lines, YAML, CSV).
//! A malformed individual record is logged at warn level with the
//! offending text and skipped; one bad line never aborts the stream.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::str::FromStr;

use log::warn;

use crate::record::Record;
use crate::value::{from_json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Jsonl,
    Yaml,
    Csv,
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(InputFormat::Json),
            "jsonl" | "ndjson" => Ok(InputFormat::Jsonl),
            "yaml" | "yml" => Ok(InputFormat::Yaml),
            "csv" => Ok(InputFormat::Csv),
            other => Err(format!("unknown input format '{}'", other)),
        }
    }
}

impl InputFormat {
    /// Guess the format from a file extension; JSON when in doubt.
    pub fn from_path(path: &str) -> InputFormat {
        path.rsplit('.')
            .next()
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(InputFormat::Json)
    }
}

pub type RecordSource<'a> = Box<dyn Iterator<Item = Record> + 'a>;

/// Read records from a file, sniffing the format from the extension
/// unless one is forced.
pub fn read_path(path: &str, format: Option<InputFormat>) -> io::Result<RecordSource<'static>> {
    let format = format.unwrap_or_else(|| InputFormat::from_path(path));
    match format {
        InputFormat::Jsonl => {
            let reader = BufReader::new(File::open(path)?);
            Ok(jsonl_records(reader))
        }
        InputFormat::Json => {
            let mut data = String::new();
            File::open(path)?.read_to_string(&mut data)?;
            Ok(json_records(data))
        }
        InputFormat::Yaml => {
            let mut data = String::new();
            File::open(path)?.read_to_string(&mut data)?;
            Ok(yaml_records(&data))
        }
        InputFormat::Csv => {
            let reader = BufReader::new(File::open(path)?);
            Ok(csv_records(reader))
        }
    }
}

/// Read records from stdin (JSON or JSON-lines, sniffed per line).
pub fn read_stdin(format: Option<InputFormat>) -> RecordSource<'static> {
    match format {
        None | Some(InputFormat::Json) | Some(InputFormat::Jsonl) => {
            jsonl_records(BufReader::new(io::stdin()))
        }
        Some(InputFormat::Yaml) => {
            let mut data = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut data) {
                warn!("failed reading stdin: {}", e);
                return Box::new(std::iter::empty());
            }
            yaml_records(&data)
        }
        Some(InputFormat::Csv) => csv_records(BufReader::new(io::stdin())),
    }
}

/// A whole JSON document: an array yields its elements, anything else
/// is a single record. Unparseable documents fall back to JSON-lines,
/// so `.jsonl` content in a `.json` file still reads.
fn json_records(data: String) -> RecordSource<'static> {
    match serde_json::from_str::<serde_json::Value>(&data) {
        Ok(serde_json::Value::Array(items)) => {
            Box::new(items.into_iter().map(|v| Record::new(from_json(v))))
        }
        Ok(doc) => Box::new(std::iter::once(Record::new(from_json(doc)))),
        Err(_) => jsonl_records(BufReader::new(io::Cursor::new(data))),
    }
}

/// Lazy JSON-lines reader: one record per non-empty line, bad lines
/// logged and skipped.
fn jsonl_records<R: BufRead + 'static>(reader: R) -> RecordSource<'static> {
    Box::new(reader.lines().filter_map(|line| {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("failed reading input line: {}", e);
                return None;
            }
        };
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(v) => Some(Record::new(from_json(v))),
            Err(e) => {
                warn!("skipping malformed record ({}): {}", e, line);
                None
            }
        }
    }))
}

/// A YAML document; a top-level sequence yields one record per element.
fn yaml_records(data: &str) -> RecordSource<'static> {
    match serde_yaml::from_str::<serde_json::Value>(data) {
        Ok(serde_json::Value::Array(items)) => {
            Box::new(items.into_iter().map(|v| Record::new(from_json(v))))
        }
        Ok(doc) => Box::new(std::iter::once(Record::new(from_json(doc)))),
        Err(e) => {
            warn!("skipping malformed yaml document: {}", e);
            Box::new(std::iter::empty())
        }
    }
}

/// CSV rows become objects keyed by the header row; cell values are
/// parsed as integers, floats, and booleans where they look like one.
fn csv_records<R: Read + 'static>(reader: R) -> RecordSource<'static> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.to_string()).collect(),
        Err(e) => {
            warn!("failed reading csv headers: {}", e);
            return Box::new(std::iter::empty());
        }
    };
    Box::new(
        reader
            .into_records()
            .filter_map(move |row| match row {
                Ok(row) => {
                    let obj = headers
                        .iter()
                        .zip(row.iter())
                        .map(|(key, cell)| (key.clone(), parse_scalar(cell)))
                        .collect();
                    Some(Record::new(Value::Object(obj)))
                }
                Err(e) => {
                    warn!("skipping malformed csv row: {}", e);
                    None
                }
            }),
    )
}

fn parse_scalar(cell: &str) -> Value {
    if let Ok(n) = cell.parse::<i64>() {
        return Value::Integer(n);
    }
    if let Ok(n) = cell.parse::<f64>() {
        return Value::Float(n);
    }
    match cell {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "" => Value::Null,
        _ => Value::String(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_yields_elements() {
        let records: Vec<Record> = json_records(r#"[{"a":1},{"a":2}]"#.to_string()).collect();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn bad_jsonl_lines_are_skipped() {
        let data = "{\"a\":1}\nnot json\n{\"a\":2}\n";
        let records: Vec<Record> =
            jsonl_records(BufReader::new(io::Cursor::new(data.to_string()))).collect();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn csv_rows_become_typed_objects() {
        let data = "name,count,ratio\nalpha,3,0.5\nbeta,4,1.5\n";
        let records: Vec<Record> = csv_records(io::Cursor::new(data.to_string())).collect();
        assert_eq!(records.len(), 2);
        match &records[0].value {
            Value::Object(obj) => {
                assert_eq!(obj["name"], Value::String("alpha".to_string()));
                assert_eq!(obj["count"], Value::Integer(3));
                assert_eq!(obj["ratio"], Value::Float(0.5));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn format_sniffing() {
        assert_eq!(InputFormat::from_path("data.jsonl"), InputFormat::Jsonl);
        assert_eq!(InputFormat::from_path("data.yml"), InputFormat::Yaml);
        assert_eq!(InputFormat::from_path("data"), InputFormat::Json);
    }
}
