use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize_opt(profile: &str, key: &str) -> Option<usize> {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok())
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        None => default,
    }
}

fn profiled_env_list(profile: &str, key: &str) -> Option<Vec<String>> {
    profiled_env_opt(profile, key).map(|v| {
        v.split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub graph: GraphConfig,
    pub crawl: CrawlConfig,
    pub fetch: FetchConfig,
    pub ocr: OcrConfig,
    pub preprocess: PreprocessingConfig,
    pub pdf: PdfConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ARBOR_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ARBOR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            graph: GraphConfig::from_env_profiled(p),
            crawl: CrawlConfig::from_env_profiled(p),
            fetch: FetchConfig::from_env_profiled(p),
            ocr: OcrConfig::from_env_profiled(p),
            preprocess: PreprocessingConfig::from_env_profiled(p),
            pdf: PdfConfig::from_env_profiled(p),
            pipeline: PipelineConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.fetch.max_attempts == 0 {
            return Err(CoreError::Config("FETCH_MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.pipeline.workers == 0 {
            return Err(CoreError::Config("PIPELINE_WORKERS must be at least 1".into()));
        }
        if self.graph.max_concurrent_requests == 0 {
            return Err(CoreError::Config(
                "GRAPH_MAX_CONCURRENT_REQUESTS must be at least 1".into(),
            ));
        }
        if self.ocr.languages.trim().is_empty() {
            return Err(CoreError::Config("OCR_LANGUAGES must name at least one language".into()));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  graph:       base={}, drive={}, token={}",
            self.graph.base_url,
            self.graph.drive_id.as_deref().unwrap_or("(none)"),
            if self.graph.token.is_some() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  crawl:       root={}, max_files={}",
            self.crawl.root_path,
            self.crawl
                .max_files
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unlimited".into())
        );
        tracing::info!(
            "  fetch:       attempts={}, delay={}ms, store={}",
            self.fetch.max_attempts,
            self.fetch.retry_delay_ms,
            self.fetch
                .store_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "(off)".into())
        );
        tracing::info!("  ocr:         languages={}, cmd={}", self.ocr.languages, self.ocr.tesseract_cmd);
        tracing::info!("  preprocess:  {}", self.preprocess.describe());
        tracing::info!("  pdf:         backend={}, dpi={}", self.pdf.backend, RASTER_DPI);
        tracing::info!("  pipeline:    workers={}", self.pipeline.workers);
    }
}

// ── Graph (remote document library) ───────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub base_url: String,
    pub site_id: Option<String>,
    pub drive_id: Option<String>,
    /// Bearer token obtained by the external credential collaborator.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub page_size: u32,
    pub timeout_secs: u64,
    /// Admission gate shared by every request to the API.
    pub max_concurrent_requests: usize,
}

impl GraphConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "GRAPH_BASE_URL", "https://graph.microsoft.com/v1.0"),
            site_id: profiled_env_opt(p, "GRAPH_SITE_ID"),
            drive_id: profiled_env_opt(p, "GRAPH_DRIVE_ID"),
            token: profiled_env_opt(p, "GRAPH_TOKEN"),
            token_expires_at: profiled_env_opt(p, "GRAPH_TOKEN_EXPIRES_AT")
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|d| d.with_timezone(&Utc)),
            page_size: profiled_env_u32(p, "GRAPH_PAGE_SIZE", 200),
            timeout_secs: profiled_env_u64(p, "GRAPH_TIMEOUT_SECS", 30),
            max_concurrent_requests: profiled_env_u32(p, "GRAPH_MAX_CONCURRENT_REQUESTS", 4)
                as usize,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.drive_id.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Crawl ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub root_path: String,
    /// Stop enumerating once this many files were collected.
    pub max_files: Option<usize>,
    /// Lowercased extensions without the dot; `None` accepts every file.
    pub extensions: Option<Vec<String>>,
}

impl CrawlConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            root_path: profiled_env_or(p, "CRAWL_ROOT", "/"),
            max_files: profiled_env_usize_opt(p, "CRAWL_MAX_FILES"),
            extensions: profiled_env_list(p, "CRAWL_EXTENSIONS"),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            root_path: "/".into(),
            max_files: None,
            extensions: None,
        }
    }
}

// ── Fetch ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    /// Where downloaded bytes are kept; `None` disables the content store.
    pub store_dir: Option<PathBuf>,
}

impl FetchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_attempts: profiled_env_u32(p, "FETCH_MAX_ATTEMPTS", 3),
            retry_delay_ms: profiled_env_u64(p, "FETCH_RETRY_DELAY_MS", 2000),
            timeout_secs: profiled_env_u64(p, "FETCH_TIMEOUT_SECS", 60),
            store_dir: profiled_env_opt(p, "CONTENT_STORE_DIR").map(PathBuf::from),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2000,
            timeout_secs: 60,
            store_dir: None,
        }
    }
}

// ── OCR ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// `+`/`-` joined language codes, e.g. `por+eng`.
    pub languages: String,
    pub tesseract_cmd: String,
    /// Tesseract page segmentation mode.
    pub page_seg_mode: u32,
    /// OCR highlighted buttons in images separately and list them.
    pub detect_elements: bool,
}

impl OcrConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            languages: profiled_env_or(p, "OCR_LANGUAGES", "por+eng"),
            tesseract_cmd: profiled_env_or(p, "TESSERACT_CMD", "tesseract"),
            page_seg_mode: profiled_env_u32(p, "OCR_PAGE_SEG_MODE", 3),
            detect_elements: profiled_env_bool(p, "OCR_DETECT_ELEMENTS", true),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: "por+eng".into(),
            tesseract_cmd: "tesseract".into(),
            page_seg_mode: 3,
            detect_elements: true,
        }
    }
}

// ── Image preprocessing ───────────────────────────────────────

/// Independent toggles for the transforms that run before OCR.
///
/// The order is fixed whatever subset is enabled:
/// alpha-strip, grayscale, contrast, denoise, sharpen, binarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub grayscale: bool,
    pub contrast_boost: bool,
    pub sharpen: bool,
    pub denoise: bool,
    pub binarize: bool,
}

impl PreprocessingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            grayscale: profiled_env_bool(p, "PREPROCESS_GRAYSCALE", d.grayscale),
            contrast_boost: profiled_env_bool(p, "PREPROCESS_CONTRAST", d.contrast_boost),
            sharpen: profiled_env_bool(p, "PREPROCESS_SHARPEN", d.sharpen),
            denoise: profiled_env_bool(p, "PREPROCESS_DENOISE", d.denoise),
            binarize: profiled_env_bool(p, "PREPROCESS_BINARIZE", d.binarize),
        }
    }

    /// Every transform off; the image only loses its alpha channel.
    pub fn none() -> Self {
        Self {
            grayscale: false,
            contrast_boost: false,
            sharpen: false,
            denoise: false,
            binarize: false,
        }
    }

    pub fn describe(&self) -> String {
        let enabled: Vec<&str> = [
            (self.grayscale, "grayscale"),
            (self.contrast_boost, "contrast"),
            (self.denoise, "denoise"),
            (self.sharpen, "sharpen"),
            (self.binarize, "binarize"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if enabled.is_empty() {
            "none".into()
        } else {
            enabled.join(",")
        }
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            grayscale: true,
            contrast_boost: true,
            sharpen: true,
            denoise: true,
            binarize: false,
        }
    }
}

// ── PDF ───────────────────────────────────────────────────────

/// Resolution used when a PDF page has to be rasterized for OCR.
pub const RASTER_DPI: u32 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// `auto`, `pdfium` or `poppler`: which backend is tried first.
    pub backend: String,
    pub max_pages: Option<usize>,
    pub pdftoppm_cmd: String,
    /// Counts pages when the text layer cannot be parsed.
    pub pdfinfo_cmd: String,
}

impl PdfConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "PDF_BACKEND", "auto").to_lowercase(),
            max_pages: profiled_env_usize_opt(p, "PDF_MAX_PAGES"),
            pdftoppm_cmd: profiled_env_or(p, "PDFTOPPM_CMD", "pdftoppm"),
            pdfinfo_cmd: profiled_env_or(p, "PDFINFO_CMD", "pdfinfo"),
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            backend: "auto".into(),
            max_pages: None,
            pdftoppm_cmd: "pdftoppm".into(),
            pdfinfo_cmd: "pdfinfo".into(),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Files fetched and extracted concurrently.
    pub workers: usize,
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            workers: profiled_env_u32(p, "PIPELINE_WORKERS", 4) as usize,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}
