// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RKV REPLAY - run saved corpus inputs through a fuzz target without libFuzzer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use rkv_harness::oracle::panic_message;
use rkv_harness::{
    logging, EntryApplyTarget, HarnessConfig, HarnessError, InternalRequestApplyTarget, Status,
    DECODER_FORMAT_VERSION,
};
use serde::Serialize;

/// Bytes of each input echoed in hex.
const PREFIX_LEN: usize = 16;

#[derive(Parser)]
#[command(name = "rkv-replay")]
#[command(about = "Replay corpus inputs through an rkv apply-path fuzz target", long_about = None)]
#[command(version)]
struct Cli {
    /// Target to drive
    #[arg(value_enum)]
    target: TargetName,

    /// Input files, or directories of input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Harness config file (overrides RKV_FUZZ_CONFIG)
    #[arg(short, long, env = "RKV_FUZZ_CONFIG")]
    config: Option<PathBuf>,

    /// Print one JSON object per input
    #[arg(long)]
    json: bool,

    /// Report defects and continue instead of re-raising the first one
    #[arg(long)]
    keep_going: bool,
}

#[derive(Clone, Copy, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
enum TargetName {
    /// Log entries through Server::apply
    Apply,
    /// One internal request through Applier::apply
    ApplierBackendApply,
}

enum Target {
    Entries(EntryApplyTarget),
    Request(InternalRequestApplyTarget),
}

impl Target {
    fn run(&self, data: &[u8]) -> Result<Status, HarnessError> {
        match self {
            Target::Entries(t) => t.run(data),
            Target::Request(t) => t.run(data),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Rejected,
    Executed,
    Defect,
}

#[derive(Serialize)]
struct Report<'a> {
    decoder_format_version: u32,
    target: TargetName,
    input: &'a Path,
    len: usize,
    prefix: String,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn collect_inputs(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)?
                .map(|e| e.map(|e| e.path()))
                .collect::<Result<_, _>>()?;
            entries.retain(|p| p.is_file());
            entries.sort();
            out.extend(entries);
        } else {
            out.push(path.clone());
        }
    }
    Ok(out)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HarnessConfig::load_from_file(path)?,
        None => HarnessConfig::load_from_env()?,
    };
    config.validate()?;
    logging::init(&config);

    let target = match cli.target {
        TargetName::Apply => Target::Entries(EntryApplyTarget::new(config)),
        TargetName::ApplierBackendApply => Target::Request(InternalRequestApplyTarget::new(config)),
    };

    let (mut executed, mut rejected, mut defects) = (0usize, 0usize, 0usize);
    for path in collect_inputs(&cli.inputs)? {
        let data = fs::read(&path)?;

        let (outcome, message) = if cli.keep_going {
            match panic::catch_unwind(AssertUnwindSafe(|| target.run(&data))) {
                Ok(result) => (status_outcome(result?), None),
                Err(payload) => (Outcome::Defect, Some(panic_message(&*payload))),
            }
        } else {
            (status_outcome(target.run(&data)?), None)
        };

        match outcome {
            Outcome::Rejected => rejected += 1,
            Outcome::Executed => executed += 1,
            Outcome::Defect => defects += 1,
        }

        let report = Report {
            decoder_format_version: DECODER_FORMAT_VERSION,
            target: cli.target,
            input: &path,
            len: data.len(),
            prefix: hex::encode(&data[..data.len().min(PREFIX_LEN)]),
            outcome,
            message,
        };
        if cli.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print_report(&report);
        }
    }

    if !cli.json {
        println!(
            "\n{} executed, {} rejected, {} defects (decoder format v{})",
            executed, rejected, defects, DECODER_FORMAT_VERSION
        );
    }
    if defects > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn status_outcome(status: Status) -> Outcome {
    match status {
        Status::Rejected => Outcome::Rejected,
        Status::Executed => Outcome::Executed,
    }
}

fn print_report(report: &Report<'_>) {
    let outcome = match report.outcome {
        Outcome::Rejected => "rejected",
        Outcome::Executed => "executed",
        Outcome::Defect => "DEFECT",
    };
    println!(
        "{:<8} {:>6}B  {}  {}",
        outcome,
        report.len,
        report.prefix,
        report.input.display()
    );
    if let Some(message) = &report.message {
        println!("         {}", message);
    }
}
