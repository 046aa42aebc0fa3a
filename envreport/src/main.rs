use anyhow::{Context, Result};
use clap::Parser;
use envreport_core::{AnalysisConfig, ReportGenerator, RunConfig};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "envreport", about = "Environment report for QA run artifacts")]
struct Args {
    /// Корень дерева артефактов (каталоги agents и managers)
    #[arg(short, long)]
    artifacts: PathBuf,

    /// Конфиг анализа (YAML); без него используются значения по умолчанию
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Конфигурация фаз прогона (YAML)
    #[arg(short, long)]
    phases: Option<PathBuf>,

    /// Куда записать отчёт; по умолчанию stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Компактный JSON вместо форматированного
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load analysis config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let run = args
        .phases
        .as_ref()
        .map(|path| {
            RunConfig::load(path)
                .with_context(|| format!("failed to load phase config {}", path.display()))
        })
        .transpose()?;

    tracing::info!("Generating report for {}", args.artifacts.display());

    let generator = ReportGenerator::new(&args.artifacts, config, run.as_ref())
        .with_context(|| format!("failed to open artifacts at {}", args.artifacts.display()))?;
    let report = generator.make_report().context("failed to build report")?;

    let mut json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    json.push('\n');

    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => std::io::stdout()
            .lock()
            .write_all(json.as_bytes())
            .context("failed to write report to stdout")?,
    }

    Ok(())
}
