//! Depth-first traversal of a remote folder tree into file descriptors.
//!
//! The walk uses an explicit stack of folder frames instead of recursion.
//! Each frame holds the children of one folder that still need visiting,
//! files first and subfolders after them, so the output follows folder
//! pre-order with a folder's own files emitted before anything below it.

use std::collections::VecDeque;

use arbor_core::config::CrawlConfig;
use arbor_core::{extension_of, join_path, report, report_diagnostic, FileDescriptor, FolderNode, ProgressSink};
use tracing::{debug, info, warn};

use crate::category::{notice_date, CategoryRules};
use crate::client::{RemoteEntry, RemoteTree};
use crate::error::DriveError;

/// Extensions accepted when no explicit allow-list is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp", "txt", "csv", "md", "html", "xml",
];

#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Stop once this many files were collected.
    pub max_files: Option<usize>,
    /// Lowercased extensions without the dot; `None` accepts every file.
    pub extensions: Option<Vec<String>>,
}

impl CrawlOptions {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }

    /// Restrict to the built-in document extensions.
    pub fn with_default_extensions(mut self) -> Self {
        self.extensions = Some(DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());
        self
    }

    fn accepts(&self, name: &str) -> bool {
        match &self.extensions {
            None => true,
            Some(allowed) => extension_of(name).is_some_and(|ext| allowed.iter().any(|a| *a == ext)),
        }
    }

    fn reached(&self, count: usize) -> bool {
        self.max_files.is_some_and(|max| count >= max)
    }
}

impl From<&CrawlConfig> for CrawlOptions {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            max_files: config.max_files,
            extensions: config.extensions.as_ref().map(|list| {
                list.iter()
                    .map(|e| e.trim_start_matches('.').to_lowercase())
                    .collect()
            }),
        }
    }
}

/// A non-fatal problem met during the walk.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlDiagnostic {
    /// `A/B` path of the folder whose listing failed.
    pub folder: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Discovery order: folder pre-order, files before subfolders.
    pub files: Vec<FileDescriptor>,
    pub diagnostics: Vec<CrawlDiagnostic>,
    /// Whether `max_files` ended the walk early.
    pub truncated: bool,
}

enum Child {
    File(RemoteEntry),
    Folder(FolderNode),
}

struct Frame {
    folder: FolderNode,
    pending: VecDeque<Child>,
}

pub struct TreeCrawler<'a> {
    tree: &'a dyn RemoteTree,
    options: CrawlOptions,
    rules: CategoryRules,
}

impl<'a> TreeCrawler<'a> {
    pub fn new(tree: &'a dyn RemoteTree, options: CrawlOptions) -> Self {
        Self {
            tree,
            options,
            rules: CategoryRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: CategoryRules) -> Self {
        self.rules = rules;
        self
    }

    /// Crawl the folder at a slash-separated path from the tree root.
    pub async fn crawl_path(
        &self,
        root_path: &str,
        progress: Option<&dyn ProgressSink>,
    ) -> CrawlOutcome {
        self.crawl(&FolderNode::at_path(root_path), progress).await
    }

    /// Enumerate every file below `root`.
    ///
    /// Listing failures never abort the walk: they skip the rest of that
    /// folder and are recorded as diagnostics (404 is skipped silently).
    pub async fn crawl(&self, root: &FolderNode, progress: Option<&dyn ProgressSink>) -> CrawlOutcome {
        let mut out = CrawlOutcome::default();
        let root_path = join_path(&root.path());
        info!(root = %root_path, max_files = ?self.options.max_files, "crawl started");

        let Some(top) = self.expand(root, &mut out, progress).await else {
            report(progress, 1.0, "Found 0 files");
            return out;
        };
        let total_top = top.pending.len().max(1);
        let mut done_top = 0usize;
        let mut stack = vec![top];

        loop {
            if self.options.reached(out.files.len()) {
                out.truncated = true;
                debug!(count = out.files.len(), "max_files reached, stopping");
                break;
            }
            let at_top = stack.len() == 1;
            let Some(frame) = stack.last_mut() else {
                break;
            };

            match frame.pending.pop_front() {
                Some(Child::File(entry)) => {
                    let descriptor = self.describe(&frame.folder, entry);
                    debug!(path = %descriptor.display_path(), "file");
                    out.files.push(descriptor);
                    if at_top {
                        done_top += 1;
                        report_top(progress, done_top, total_top, out.files.len());
                    }
                }
                Some(Child::Folder(folder)) => {
                    match self.expand(&folder, &mut out, progress).await {
                        Some(child) => stack.push(child),
                        None if at_top => {
                            done_top += 1;
                            report_top(progress, done_top, total_top, out.files.len());
                        }
                        None => {}
                    }
                }
                None => {
                    stack.pop();
                    // A finished top-level folder counts as one processed child.
                    if stack.len() == 1 {
                        done_top += 1;
                        report_top(progress, done_top, total_top, out.files.len());
                    }
                }
            }
        }

        info!(
            files = out.files.len(),
            diagnostics = out.diagnostics.len(),
            truncated = out.truncated,
            "crawl finished"
        );
        report(progress, 1.0, &format!("Found {} files", out.files.len()));
        out
    }

    /// List every page of a folder and queue its children, files first.
    ///
    /// Returns `None` when the first page could not be listed.
    async fn expand(
        &self,
        folder: &FolderNode,
        out: &mut CrawlOutcome,
        progress: Option<&dyn ProgressSink>,
    ) -> Option<Frame> {
        let mut files = VecDeque::new();
        let mut folders = VecDeque::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = match self.tree.list_children(folder, continuation.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    self.listing_failed(folder, &e, out, progress);
                    if pages == 0 {
                        return None;
                    }
                    // Keep what the earlier pages gave us.
                    break;
                }
            };
            pages += 1;

            for entry in page.entries {
                if entry.is_folder {
                    folders.push_back(Child::Folder(folder.child(Some(entry.id), &entry.name)));
                } else if self.options.accepts(&entry.name) {
                    files.push_back(Child::File(entry));
                }
            }

            // More pages cannot change the outcome once the cap is covered.
            if self.options.reached(out.files.len() + files.len()) {
                break;
            }
            match page.next {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!(
            folder = %join_path(&folder.path()),
            pages,
            files = files.len(),
            folders = folders.len(),
            "folder listed"
        );
        files.extend(folders);
        Some(Frame {
            folder: folder.clone(),
            pending: files,
        })
    }

    fn listing_failed(
        &self,
        folder: &FolderNode,
        error: &DriveError,
        out: &mut CrawlOutcome,
        progress: Option<&dyn ProgressSink>,
    ) {
        let path = join_path(&folder.path());
        if error.is_not_found() {
            debug!(folder = %path, "folder vanished, skipping");
            return;
        }
        warn!(folder = %path, error = %error, "could not list folder, skipping");
        let diagnostic = CrawlDiagnostic {
            folder: path,
            message: error.to_string(),
        };
        report_diagnostic(
            progress,
            &format!("skipped folder '{}': {}", diagnostic.folder, diagnostic.message),
        );
        out.diagnostics.push(diagnostic);
    }

    fn describe(&self, folder: &FolderNode, entry: RemoteEntry) -> FileDescriptor {
        let folder_path = folder.path();
        let category = self.rules.classify(&folder_path, &entry.name);
        let date = match category {
            arbor_core::Category::Announcement => notice_date(&entry.name),
            _ => None,
        };
        FileDescriptor::new(entry.id, entry.name, folder_path)
            .with_download_url(entry.download_url)
            .with_size(entry.size)
            .with_mime_type(entry.mime_type)
            .with_category(category)
            .with_notice_date(date)
    }
}

fn report_top(progress: Option<&dyn ProgressSink>, done: usize, total: usize, found: usize) {
    let fraction = done as f32 / total as f32;
    report(progress, fraction, &format!("Scanning... {} files found", found));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_config_normalize_extensions() {
        let config = CrawlConfig {
            root_path: "/".into(),
            max_files: Some(10),
            extensions: Some(vec![".PDF".into(), "png".into()]),
        };
        let options = CrawlOptions::from(&config);
        assert_eq!(options.max_files, Some(10));
        assert!(options.accepts("a.pdf"));
        assert!(options.accepts("b.PNG"));
        assert!(!options.accepts("c.docx"));
        assert!(!options.accepts("no_extension"));
    }

    #[test]
    fn default_extension_list() {
        let options = CrawlOptions::unlimited().with_default_extensions();
        assert!(options.accepts("scan.tiff"));
        assert!(options.accepts("notes.md"));
        assert!(!options.accepts("setup.exe"));
        assert!(CrawlOptions::unlimited().accepts("setup.exe"));
    }

    #[test]
    fn cap() {
        let options = CrawlOptions::unlimited().with_max_files(2);
        assert!(!options.reached(1));
        assert!(options.reached(2));
        assert!(!CrawlOptions::unlimited().reached(usize::MAX));
    }
}
