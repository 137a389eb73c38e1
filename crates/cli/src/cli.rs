use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use arbor_core::config::{CrawlConfig, FetchConfig};
use arbor_core::Config;

/// Crawl a remote document library and extract searchable text from it.
///
/// Settings come from the environment (and `.env`); flags override them.
#[derive(Parser, Debug)]
#[command(name = "arbor", about = "Document discovery and text extraction")]
pub struct CliArgs {
    /// Config profile; keys are looked up as `{PROFILE}_{KEY}` first
    #[arg(long, env = "ARBOR_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hide the progress line
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe the OCR engine, PDF backends and remote access
    Check,
    /// List the document libraries of a site
    Drives {
        /// Site URL such as https://contoso.sharepoint.com/sites/Ops
        #[arg(long, conflicts_with = "site_id")]
        site_url: Option<String>,
        /// Site id (defaults to GRAPH_SITE_ID)
        #[arg(long)]
        site_id: Option<String>,
    },
    /// Enumerate files and print a summary
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
        /// Print the folder tree instead of the counts
        #[arg(long)]
        tree: bool,
    },
    /// Crawl, download and extract every file
    Extract(ExtractArgs),
    /// Extract local files
    File {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Args, Debug, Default)]
pub struct CrawlArgs {
    /// Folder to start from, e.g. `/Manuais/Guia Rapido`
    #[arg(long)]
    pub root: Option<String>,

    /// Stop after this many files
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Only keep these extensions (comma separated, no dots)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,
}

impl CrawlArgs {
    pub fn apply(&self, crawl: &mut CrawlConfig) {
        if let Some(root) = &self.root {
            crawl.root_path = root.clone();
        }
        if self.max_files.is_some() {
            crawl.max_files = self.max_files;
        }
        if let Some(extensions) = &self.extensions {
            crawl.extensions = Some(
                extensions
                    .iter()
                    .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect(),
            );
        }
    }
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub crawl: CrawlArgs,

    /// Concurrent download and extraction workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Keep a copy of every download in this directory
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Download attempts per file
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Write here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl ExtractArgs {
    pub fn apply(&self, config: &mut Config) {
        self.crawl.apply(&mut config.crawl);
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        apply_fetch(&mut config.fetch, self.store_dir.as_ref(), self.max_attempts);
    }
}

fn apply_fetch(fetch: &mut FetchConfig, store_dir: Option<&PathBuf>, max_attempts: Option<u32>) {
    if let Some(dir) = store_dir {
        fetch.store_dir = Some(dir.clone());
    }
    if let Some(attempts) = max_attempts {
        fetch.max_attempts = attempts;
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Annotated blocks separated by blank lines
    Text,
    /// One JSON object per line, context keywords included
    Jsonl,
}
