mod cli;
mod output;
mod terminal;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use arbor_core::config::{load_dotenv, GraphConfig};
use arbor_core::{Config, FolderNode, ProgressSink, Provenance};
use arbor_drive::{AccessToken, CrawlOptions, CrawlSummary, GraphClient, TreeCrawler};
use arbor_ingest::{DocumentInput, ExtractError, FormatDispatcher, Pipeline};

use crate::cli::{CliArgs, Command, ExtractArgs, OutputFormat};
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Before parsing, so `.env` can supply ARBOR_PROFILE.
    load_dotenv();
    let args = CliArgs::parse();
    let terminal = Terminal::new(args.quiet);

    let mut config = Config::for_profile(args.profile.as_deref().unwrap_or(""));
    if let Command::Extract(extract) = &args.command {
        extract.apply(&mut config);
    }
    if let Command::Crawl { crawl, .. } = &args.command {
        crawl.apply(&mut config.crawl);
    }
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let result = match &args.command {
        Command::Check => check(&config, &terminal).await,
        Command::Drives { site_url, site_id } => {
            drives(&config, site_url.as_deref(), site_id.as_deref(), &terminal).await
        }
        Command::Crawl { tree, .. } => crawl(&config, *tree, &terminal).await,
        Command::Extract(extract) => run_extract(&config, extract, &terminal).await,
        Command::File { paths, format } => extract_files(&config, paths, *format, &terminal).await,
    };
    if let Err(e) = result {
        terminal.print_error(&format!("{:#}", e))?;
        std::process::exit(1);
    }
    Ok(())
}

/// Report what is installed and reachable, failing if OCR is missing.
async fn check(config: &Config, terminal: &Terminal) -> Result<()> {
    let dispatcher = FormatDispatcher::from_config(config).context("OCR engine unavailable")?;
    let engine = dispatcher.probe()?;
    terminal.print_ok(&format!(
        "OCR: {} {} (languages: {})",
        engine.name,
        engine.version,
        engine.languages.join(", ")
    ))?;
    terminal.print_ok(&format!("PDF backends: {}", dispatcher.pdf_backends().join(", ")))?;
    if !dispatcher.pdf_raster_ready() {
        terminal.print_warning(&format!(
            "'{}' not found: PDF pages without a text layer cannot be OCR'd",
            config.pdf.pdftoppm_cmd
        ))?;
    }
    terminal.print_info(&format!("Preprocessing: {}", config.preprocess.describe()))?;

    if !config.graph.is_configured() {
        terminal.print_warning("remote library not configured (GRAPH_TOKEN, GRAPH_DRIVE_ID)")?;
        return Ok(());
    }
    let client = GraphClient::from_config(&config.graph)?;
    let drive = client.verify_access().await.context("remote library not reachable")?;
    terminal.print_ok(&format!("Drive: {} ({})", drive.name, drive.id))?;
    Ok(())
}

async fn drives(
    config: &Config,
    site_url: Option<&str>,
    site_id: Option<&str>,
    terminal: &Terminal,
) -> Result<()> {
    let client = site_client(&config.graph)?;
    let site_id = match (site_url, site_id.or(config.graph.site_id.as_deref())) {
        (Some(url), _) => client.resolve_site(url).await?,
        (None, Some(id)) => id.to_string(),
        (None, None) => bail!("pass --site-url or --site-id, or set GRAPH_SITE_ID"),
    };
    let drives = client.list_drives(&site_id).await?;
    terminal.print_header(&format!("Site {} has {} libraries", site_id, drives.len()))?;
    for drive in drives {
        println!(
            "{}\t{}\t{}",
            drive.id,
            drive.name,
            drive.web_url.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Listing drives only needs a token; the drive id may not be known yet.
fn site_client(graph: &GraphConfig) -> Result<GraphClient> {
    let token = graph.token.clone().context("GRAPH_TOKEN is not set")?;
    let client = GraphClient::new(
        graph.base_url.clone(),
        graph.drive_id.clone().unwrap_or_default(),
        AccessToken::new(token, graph.token_expires_at),
    )?;
    Ok(client.with_max_concurrent_requests(graph.max_concurrent_requests))
}

async fn crawl(config: &Config, tree: bool, terminal: &Terminal) -> Result<()> {
    let client = GraphClient::from_config(&config.graph)?;
    let progress = terminal.progress();
    let outcome = TreeCrawler::new(&client, CrawlOptions::from(&config.crawl))
        .crawl_path(&config.crawl.root_path, progress.as_ref().map(|p| p as &dyn ProgressSink))
        .await;
    if let Some(progress) = &progress {
        progress.finish();
    }

    let summary = CrawlSummary::from_files(&outcome.files);
    if tree {
        print!("{}", summary.render_tree());
    } else {
        print!("{}", summary.render());
    }
    for diagnostic in &outcome.diagnostics {
        terminal.print_warning(&format!("{}: {}", diagnostic.folder, diagnostic.message))?;
    }
    if outcome.truncated {
        terminal.print_info("Stopped at the file limit")?;
    }
    Ok(())
}

async fn run_extract(config: &Config, args: &ExtractArgs, terminal: &Terminal) -> Result<()> {
    // Probe before crawling so a missing engine fails fast.
    let dispatcher = Arc::new(FormatDispatcher::from_config(config).context("OCR engine unavailable")?);
    let client = GraphClient::from_config(&config.graph)?;
    let pipeline = Pipeline::from_config(&client, dispatcher, config);

    let progress = terminal.progress();
    let root = FolderNode::at_path(&config.crawl.root_path);
    let result = pipeline
        .run(&root, progress.as_ref().map(|p| p as &dyn ProgressSink))
        .await;
    if let Some(progress) = &progress {
        progress.finish();
    }
    let output = result?;

    let written = output::emit(args.output.as_deref(), &output.texts, args.format)?;
    info!(
        written,
        failed = output.failures.len(),
        skipped_folders = output.crawl_diagnostics.len(),
        "extract finished"
    );
    if !output.failures.is_empty() {
        terminal.print_warning(&format!("{} files could not be downloaded or read", output.failures.len()))?;
    }
    if output.truncated {
        terminal.print_info("Stopped at the file limit")?;
    }
    if let Some(path) = &args.output {
        terminal.print_ok(&format!("Wrote {} documents to {}", written, path.display()))?;
    }
    Ok(())
}

async fn extract_files(
    config: &Config,
    paths: &[std::path::PathBuf],
    format: OutputFormat,
    terminal: &Terminal,
) -> Result<()> {
    let dispatcher = Arc::new(FormatDispatcher::from_config(config).context("OCR engine unavailable")?);
    let mut texts = Vec::with_capacity(paths.len());
    for path in paths {
        let dispatcher = Arc::clone(&dispatcher);
        let input = DocumentInput::Path(path.clone());
        let extracted = tokio::task::spawn_blocking(move || dispatcher.extract(input, Provenance::default()))
            .await
            .context("extraction task failed")?;
        match extracted {
            Ok(text) => texts.push(text),
            Err(e @ ExtractError::BackendUnavailable(_)) => return Err(e.into()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                terminal.print_warning(&format!("{}: {}", path.display(), e))?;
            }
        }
    }
    output::emit(None, &texts, format)?;
    Ok(())
}
