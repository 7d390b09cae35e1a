use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use recruiter_monitor::parser::{parse_log, ParseResult};
use recruiter_monitor::report::{format_report, Report, DEFAULT_TOP};

#[derive(Parser)]
#[command(
    name = "recruiter-monitor",
    about = "Usage, error and drift report over the recruiter service's JSON log"
)]
struct Cli {
    /// JSON-lines log written by the service
    #[arg(default_value = "app_logs.log")]
    path: PathBuf,

    /// Emit the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Also show the last N events (as `recent_events` with --json)
    #[arg(long, value_name = "N")]
    tail: Option<usize>,

    /// Rows in the ranked tables
    #[arg(long, default_value_t = DEFAULT_TOP)]
    top: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let parsed = match parse_log(&cli.path) {
        Ok(parsed) => parsed,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("Log file not found: {}", cli.path.display());
            ParseResult {
                events: Vec::new(),
                errors: Vec::new(),
            }
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading {}", cli.path.display()));
        }
    };

    let mut report = Report::build(&parsed.events, parsed.errors.len(), cli.top);
    if let Some(n) = cli.tail {
        report = report.with_recent_events(&parsed.events, n);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print!("{}", format_report(&report, &cli.path.display().to_string()));
    if cli.tail.is_some() {
        println!("─── Last {} events ───", report.recent_events.len());
        for event in &report.recent_events {
            println!("{}", serde_json::to_string(event)?);
        }
    }

    Ok(())
}
