// src/main.rs

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use bpm_adjuster::batch::{BatchJob, BatchReport, FileOutcome, run_batch};
use bpm_adjuster::config::PipelineConfig;

const USAGE: &str = "usage:
  bpm_adjust analyze <folder> [--config <json>] [--workers N] [--report <json>]
  bpm_adjust adjust <folder> <target_bpm> [--config <json>] [--workers N] [--report <json>]";

struct CliArgs {
    job: BatchJob,
    config: Option<PathBuf>,
    report: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut rest = args.iter().skip(1);
    let command = rest.next().ok_or_else(|| anyhow!("missing command\n{USAGE}"))?;
    let folder = rest.next().ok_or_else(|| anyhow!("missing folder\n{USAGE}"))?;

    let mut job = match command.as_str() {
        "analyze" => BatchJob::analyze(folder),
        "adjust" => {
            let raw = rest.next().ok_or_else(|| anyhow!("missing target BPM\n{USAGE}"))?;
            let target: f64 = raw.parse().with_context(|| format!("target BPM '{raw}' is not a number"))?;
            BatchJob::adjust(folder, target)?
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    };

    let mut config = None;
    let mut report = None;
    while let Some(flag) = rest.next() {
        let value = rest.next().ok_or_else(|| anyhow!("{flag} needs a value"))?;
        match flag.as_str() {
            "--config" => config = Some(PathBuf::from(value)),
            "--report" => report = Some(PathBuf::from(value)),
            "--workers" => {
                let n: usize = value.parse().with_context(|| format!("--workers '{value}' is not a count"))?;
                job = job.with_workers(n);
            }
            other => bail!("unknown flag '{other}'\n{USAGE}"),
        }
    }

    Ok(CliArgs { job, config, report })
}

fn print_table(report: &BatchReport) {
    println!("{:<40} {:>12} {:>10}  {}", "File", "Current BPM", "New BPM", "Result");
    println!("{}", "-".repeat(80));
    for row in &report.files {
        let current = row.current_bpm.map(|b| format!("{b:.2}")).unwrap_or_else(|| "-".into());
        let target = row.target_bpm.map(|b| format!("{b:.2}")).unwrap_or_else(|| "-".into());
        let result = match &row.outcome {
            FileOutcome::Analyzed => "analyzed".to_string(),
            FileOutcome::Rendered { output } => format!("✅ {}", output.display()),
            FileOutcome::SkippedUndetectable => "⚠️ skipped (BPM undetectable)".to_string(),
            FileOutcome::Failed { error } => format!("❌ {error}"),
            FileOutcome::Cancelled => "cancelled".to_string(),
        };
        println!("{:<40} {:>12} {:>10}  {}", row.file, current, target, result);
    }

    let s = report.summary();
    println!(
        "\n📊 {} analyzed, {} rendered, {} skipped, {} failed, {} cancelled",
        s.analyzed, s.rendered, s.skipped, s.failed, s.cancelled
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;

    let config = match &cli.config {
        Some(path) => PipelineConfig::load_from_disk(path)?,
        None => PipelineConfig::default(),
    };

    let cancel = AtomicBool::new(false);
    let report = run_batch(&cli.job, &config, &cancel, |p| {
        log::info!("[{}/{}] {}", p.completed, p.total, p.file);
    })?;

    print_table(&report);

    if let Some(path) = &cli.report {
        report
            .save_to_disk(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        println!("💾 Report saved to {}", path.display());
    }

    Ok(())
}
