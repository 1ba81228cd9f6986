use clap::Parser as ClapParser;
use sift_lang::cli::{run, RunOptions};
use std::io::{self, Write};

#[derive(ClapParser)]
#[command(name = "sift")]
#[command(about = "Sift - a jq-like query language for record streams")]
#[command(version)]
struct Cli {
    /// Query string for extracting wanted information
    #[arg(default_value = "")]
    query: String,

    /// Files to read; if empty, stdin is used
    files: Vec<String>,

    /// Read the query from a file (honors #import/#init/#input lines)
    #[arg(short = 'f', long)]
    query_file: Option<String>,

    /// Bind a JSON data file into the environment (name=file.json)
    #[arg(long = "import")]
    imports: Vec<String>,

    /// Force the input format (json, jsonl, yaml, csv)
    #[arg(long)]
    input_format: Option<String>,

    /// Output format (json, jsonl, yaml, csv)
    #[arg(short, long)]
    output: Option<String>,

    /// Number of worker processes for the per-record stage prefix
    #[arg(short = 'n', long, default_value_t = 1)]
    processes: usize,

    /// Compact one-line JSON output
    #[arg(short, long)]
    compact: bool,

    /// Raw output: print string results without quotes
    #[arg(short, long)]
    raw: bool,

    /// Print debug messages
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.debug { "debug" } else { "warn" },
    ))
    .init();

    if cli.files.is_empty() && cli.query_file.is_none() && atty::is(atty::Stream::Stdin) {
        eprintln!("sift: no input; pipe records to stdin or name input files");
        std::process::exit(2);
    }

    let opts = RunOptions {
        query: cli.query,
        files: cli.files,
        query_file: cli.query_file,
        imports: cli.imports,
        input_format: cli.input_format,
        output_format: cli.output,
        processes: cli.processes,
        compact: cli.compact,
        raw: cli.raw,
    };

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    if let Err(e) = run(&opts, &mut out) {
        // Flush what was already produced before reporting the failure.
        let _ = out.flush();
        eprintln!("{}", e);
        std::process::exit(1);
    }
    if let Err(e) = out.flush() {
        eprintln!("IO error: {}", e);
        std::process::exit(1);
    }
}
