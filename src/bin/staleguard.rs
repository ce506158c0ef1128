use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use staleguard_lib::models::{AnalysisRun, DomainContext, PageResult};
use staleguard_lib::services::{
    cancel_pair, export_csv, AnalysisPipeline, AppConfig, ConfigStore, CsvLayout, DetectorOptions,
    FirecrawlExtractor, ModelBinding, StaleContentDetector,
};

#[derive(Parser)]
#[command(name = "staleguard")]
#[command(about = "Flag time-sensitive web content that has gone stale", version)]
struct Cli {
    /// Config directory (defaults to the platform config dir)
    #[arg(long, global = true, env = "STALEGUARD_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and analyze a batch of URLs
    Analyze {
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        context: ContextArgs,
        /// Write the run as JSON
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the run as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// One CSV cell per issue instead of three columns
        #[arg(long, default_value_t = false)]
        combined: bool,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Run detection over a local text or markdown file
    Check {
        file: PathBuf,
        /// Label used in logs and output
        #[arg(long, default_value = "local")]
        url: String,
        #[command(flatten)]
        context: ContextArgs,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    SetKey { provider: String, key: String },
    DeleteKey { provider: String },
}

#[derive(Args)]
struct ContextArgs {
    /// JSON file with description, entityTypes and stalenessRules
    #[arg(long)]
    context: Option<PathBuf>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    entity_types: Option<String>,
    #[arg(long)]
    staleness_rules: Option<String>,
}

impl ContextArgs {
    fn resolve(&self) -> Result<DomainContext> {
        let mut ctx = match &self.context {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read context file {}", path.display()))?;
                serde_json::from_str::<DomainContext>(&raw)
                    .with_context(|| format!("invalid context file {}", path.display()))?
            }
            None => DomainContext::default(),
        };
        if let Some(v) = &self.description {
            ctx.description = v.clone();
        }
        if let Some(v) = &self.entity_types {
            ctx.entity_types = v.clone();
        }
        if let Some(v) = &self.staleness_rules {
            ctx.staleness_rules = v.clone();
        }
        if ctx.staleness_rules.trim().is_empty() {
            bail!("staleness rules are required (--staleness-rules or --context)");
        }
        Ok(ctx)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    staleguard_lib::init_logging();

    let config_dir = match cli.config_dir.clone() {
        Some(dir) => dir,
        None => ConfigStore::default_config_dir().context("no config directory available")?,
    };
    let store = ConfigStore::new(config_dir);

    match cli.command {
        Commands::Analyze {
            urls,
            context,
            out,
            csv,
            combined,
            concurrency,
        } => {
            let ctx = context.resolve()?;
            let config = store.load()?;
            let run = analyze(&store, &config, &urls, ctx, concurrency).await?;
            write_outputs(&run, out, csv, combined)?;
        }
        Commands::Check { file, url, context } => {
            let ctx = context.resolve()?;
            let config = store.load()?;
            let content = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let detector = build_detector(&store, &config)?;
            let result = detector.detect(&url, &content, &ctx).await;
            if let Some(error) = &result.error {
                warn!("[PIPELINE] detection failed: {}", error);
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Config { command } => run_config(&store, command)?,
    }

    Ok(())
}

fn build_detector(store: &ConfigStore, config: &AppConfig) -> Result<Arc<StaleContentDetector>> {
    let model = ModelBinding::from_config(&config.model, Some(store))?;
    let options = DetectorOptions::from_config(&config.model, &config.detection);
    Ok(Arc::new(StaleContentDetector::new(Arc::new(model), options)))
}

async fn analyze(
    store: &ConfigStore,
    config: &AppConfig,
    urls: &[String],
    ctx: DomainContext,
    concurrency: Option<usize>,
) -> Result<AnalysisRun> {
    let detector = build_detector(store, config)?;
    let extractor = FirecrawlExtractor::from_config(&config.extractor, Some(store))?;
    let concurrency = concurrency.unwrap_or(config.detection.max_concurrency);
    let pipeline = AnalysisPipeline::new(Arc::new(extractor), detector, concurrency);

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[PIPELINE] interrupt received, cancelling run");
            handle.cancel();
        }
    });

    let run = pipeline.run(urls, ctx, signal).await?;
    for page in &run.results {
        print_page(page);
    }
    info!(
        "[PIPELINE] run {} finished status={:?} pages={} issues={}",
        run.id, run.status, run.url_count, run.total_issues
    );
    Ok(run)
}

fn print_page(page: &PageResult) {
    match &page.error {
        Some(error) => println!("{}  FAILED  {}", page.url, error),
        None => println!("{}  {} issue(s)  {}", page.url, page.issue_count, page.title),
    }
    for issue in &page.issues {
        println!(
            "    [{}] {:.2} {} :: \"{}\"",
            issue.status.as_str(),
            issue.confidence,
            issue.description,
            issue.flagged_text
        );
    }
}

fn write_outputs(run: &AnalysisRun, out: Option<PathBuf>, csv: Option<PathBuf>, combined: bool) -> Result<()> {
    if let Some(path) = out {
        fs::write(&path, serde_json::to_string_pretty(run)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Run written to {}", path.display());
    }
    if let Some(path) = csv {
        let layout = if combined { CsvLayout::Combined } else { CsvLayout::Columns };
        fs::write(&path, export_csv(run, layout)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("CSV written to {}", path.display());
    }
    Ok(())
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn run_config(store: &ConfigStore, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let mut config = store.load()?;
            for key in config.api_keys.values_mut() {
                *key = mask_key(key);
            }
            println!("# {}", store.config_file().display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::SetKey { provider, key } => {
            let key = key.trim();
            if key.is_empty() {
                bail!("API key must not be empty");
            }
            store.set_api_key(&provider.to_lowercase(), key)?;
            println!("Stored API key for {}", provider);
        }
        ConfigCommand::DeleteKey { provider } => {
            if store.delete_api_key(&provider.to_lowercase())? {
                println!("Deleted API key for {}", provider);
            } else {
                println!("No API key stored for {}", provider);
            }
        }
    }
    Ok(())
}
