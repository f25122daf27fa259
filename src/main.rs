//! SignalMesh - Agent Coordination over Shared PRP Documents
//!
//! One-shot CLI over the library: detect signals in a document, parse its
//! sections, dump its signal history, or show the effective configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use signalmesh::{
    config::SignalMeshConfig,
    events::EventBus,
    prp::{PrpDocument, SectionExtractor, SectionType},
    signal::{PatternRegistry, SignalDetector},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "signalmesh")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Agent coordination over shared PRP documents")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SIGNALMESH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect signals in a document
    Detect {
        /// Document file to scan
        file: PathBuf,

        /// Source tag attached to detected signals
        #[arg(short, long)]
        source: Option<String>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a document's sections
    Sections {
        /// Document file to parse
        file: PathBuf,

        /// Extract a single section type (e.g. goal, progress, dod)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Show a document's signal history from its Progress section
    History {
        /// Document file to parse
        file: PathBuf,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("signalmesh={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &cli.config {
        Some(path) => SignalMeshConfig::load(path)?,
        None => SignalMeshConfig::default(),
    };

    match cli.command {
        Commands::Detect { file, source, json } => {
            run_detect(config, &file, source.as_deref(), json).await?;
        }
        Commands::Sections { file, section } => {
            run_sections(&file, section.as_deref())?;
        }
        Commands::History { file } => {
            run_history(&file)?;
        }
        Commands::Config { default } => {
            let shown = if default {
                SignalMeshConfig::default()
            } else {
                config
            };
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}

async fn run_detect(
    config: SignalMeshConfig,
    file: &PathBuf,
    source: Option<&str>,
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)?;
    let source = source
        .map(str::to_string)
        .or_else(|| {
            file.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "document".to_string());

    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(PatternRegistry::new(bus.clone()));
    let detector = SignalDetector::new(registry, config.detector, bus);
    let report = detector.detect(&content, &source).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} signal(s), {} duplicate(s), {} line(s), avg confidence {:.2}",
        report.signals.len(),
        report.duplicate_count,
        report.line_count,
        report.average_confidence
    );
    for signal in &report.signals {
        println!(
            "  {:>8}  L{:<4} {:<24} {}",
            signal.priority.to_string(),
            signal.line,
            signal.signal_type,
            signal.matched_text
        );
    }
    Ok(())
}

fn run_sections(file: &PathBuf, section: Option<&str>) -> Result<()> {
    let content = std::fs::read_to_string(file)?;
    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let document = PrpDocument::new(&name, &content);
    let extractor = SectionExtractor::new();

    match section {
        Some(raw) => {
            let section_type: SectionType = raw.parse()?;
            let section = extractor.extract_section(&document, section_type)?;
            println!("{}", serde_json::to_string_pretty(&section)?);
        }
        None => {
            let parsed = extractor.parse_structure(&document);
            println!(
                "{} section(s), ~{} tokens",
                parsed.sections.len(),
                parsed.total_tokens
            );
            for section in &parsed.sections {
                println!(
                    "  {:<22} ~{:>5} tokens  priority {}{}",
                    section.name,
                    section.token_count,
                    section.priority,
                    if section.required { "  (required)" } else { "" }
                );
            }
        }
    }
    Ok(())
}

fn run_history(file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)?;
    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let document = PrpDocument::new(&name, &content);

    let history = SectionExtractor::new().extract_signal_history(&document);
    if history.is_empty() {
        println!("no signal history");
        return Ok(());
    }
    for entry in &history {
        println!(
            "[{}] {} {}{}",
            entry.signal_type,
            entry.timestamp,
            entry.context,
            entry
                .agent
                .as_deref()
                .map(|a| format!(" | {a}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
