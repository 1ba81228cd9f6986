//! CLI support for sift-lang
//!
//! Provides the run orchestration behind the `sift` binary so it can
//! also be embedded programmatically: build the environment, compile
//! the query, wire the record source to the pipeline, and drain it
//! into a writer.

use std::fs;
use std::io::{self, Write};

use log::debug;

use crate::env::Environment;
use crate::error::SyntaxError;
use crate::input::{self, InputFormat, RecordSource};
use crate::output::{self, OutputError, OutputFormat, WriteOptions};
use crate::pipeline::{Concurrency, Pipeline};
use crate::query::{self, parse_query_file};
use crate::value::from_json;

/// Errors that can occur during CLI operations
#[derive(Debug)]
pub enum CliError {
    /// Query syntax error
    Syntax(SyntaxError),
    /// Evaluation or serialization failure while writing results
    Output(OutputError),
    /// IO error
    Io(io::Error),
    /// Bad flag value (format name, import spec, init literal)
    Usage(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Syntax(e) => write!(f, "{}", e),
            CliError::Output(e) => write!(f, "{}", e),
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Usage(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Syntax(e) => Some(e),
            CliError::Output(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::Usage(_) => None,
        }
    }
}

impl From<SyntaxError> for CliError {
    fn from(e: SyntaxError) -> Self {
        CliError::Syntax(e)
    }
}

impl From<OutputError> for CliError {
    fn from(e: OutputError) -> Self {
        CliError::Output(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

/// Options for one run of the query engine.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// The query text; empty means the identity query.
    pub query: String,
    /// Input files; empty means stdin.
    pub files: Vec<String>,
    /// Read the query (and directives) from this file instead.
    pub query_file: Option<String>,
    /// `name=file.json` data imports bound into the environment.
    pub imports: Vec<String>,
    /// Forced input format.
    pub input_format: Option<String>,
    /// Output format (default json).
    pub output_format: Option<String>,
    /// Worker count; 0 or 1 runs sequentially.
    pub processes: usize,
    pub compact: bool,
    pub raw: bool,
}

/// Execute a full query run against the given options, writing results
/// to `out`.
pub fn run<W: Write>(opts: &RunOptions, out: &mut W) -> Result<(), CliError> {
    let mut env = Environment::with_defaults();
    let mut query_text = opts.query.clone();
    let mut input_format = opts.input_format.clone();
    let mut imports = opts.imports.clone();

    if let Some(path) = &opts.query_file {
        let content = fs::read_to_string(path)?;
        let qf = parse_query_file(&content);
        query_text = qf.query;
        if qf.input_format.is_some() {
            input_format = qf.input_format;
        }
        imports.extend(
            qf.imports
                .into_iter()
                .map(|(name, path)| format!("{}={}", name, path)),
        );
        for (name, literal) in qf.inits {
            let value = serde_json::from_str::<serde_json::Value>(&literal)
                .map_err(|e| CliError::Usage(format!("bad #init value for '{}': {}", name, e)))?;
            env.bind(name, from_json(value));
        }
    }

    for spec in &imports {
        let (name, path) = spec
            .split_once('=')
            .ok_or_else(|| CliError::Usage(format!("import '{}' is not name=file.json", spec)))?;
        let content = fs::read_to_string(path)?;
        let value = serde_json::from_str::<serde_json::Value>(&content)
            .map_err(|e| CliError::Usage(format!("import '{}' is not valid JSON: {}", path, e)))?;
        debug!("imported '{}' from {}", name, path);
        env.bind(name, from_json(value));
    }

    let input_format = match &input_format {
        Some(name) => Some(name.parse::<InputFormat>().map_err(CliError::Usage)?),
        None => None,
    };
    let output_format = match &opts.output_format {
        Some(name) => name.parse::<OutputFormat>().map_err(CliError::Usage)?,
        None => OutputFormat::Json,
    };

    let compiled = query::compile(&query_text)?;
    let pipeline = Pipeline::new(compiled.stages, env);

    let mut source: RecordSource<'static> = Box::new(std::iter::empty());
    if opts.files.is_empty() {
        source = input::read_stdin(input_format);
    } else {
        for file in &opts.files {
            source = Box::new(source.chain(input::read_path(file, input_format)?));
        }
    }

    let concurrency = if opts.processes > 1 {
        Concurrency::Workers(opts.processes)
    } else {
        Concurrency::Sequential
    };

    let write_opts = WriteOptions {
        format: output_format,
        compact: opts.compact,
        raw: opts.raw,
    };
    output::write_stream(out, pipeline.run(source, concurrency), write_opts)?;
    Ok(())
}
