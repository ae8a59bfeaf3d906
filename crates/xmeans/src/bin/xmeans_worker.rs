//! Line-oriented clustering worker.
//!
//! Reads one JSON request per line and writes one JSON reply per line, in
//! order. Logs go to stderr.

use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{Level, debug, warn};
use tracing_subscriber::FmtSubscriber;
use xmeans::worker::{self, ErrorResponse, Request};

#[derive(Parser, Debug)]
#[command(name = "xmeans-worker", version, about = "Runs X-means jobs from NDJSON")]
struct Args {
    /// Read requests from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Log verbosity
    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn write_line<W: Write>(out: &mut W, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    out.flush()
}

fn run<R: BufRead, W: Write>(input: R, out: &mut W) -> io::Result<()> {
    for (number, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(line = number + 1, %err, "malformed request");
                write_line(out, &ErrorResponse::malformed(err.to_string()))?;
                continue;
            }
        };

        debug!(line = number + 1, points = request.data.len(), "job received");
        match worker::handle(&request) {
            Ok(response) => write_line(out, &response)?,
            Err(err) => {
                warn!(line = number + 1, %err, "job failed");
                write_line(out, &ErrorResponse::from(&err))?;
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match args.input {
        Some(path) => run(BufReader::new(File::open(path)?), &mut out)?,
        None => run(io::stdin().lock(), &mut out)?,
    }

    Ok(())
}
