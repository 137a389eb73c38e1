//! Crawl scenarios against an in-memory folder tree.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use arbor_core::{Category, DownloadRef, FolderNode};
use arbor_drive::{ChildPage, CrawlOptions, DriveError, RemoteEntry, RemoteTree, TreeCrawler};

/// Folder tree keyed by `A/B` path, listed `page_size` entries at a time.
#[derive(Default)]
struct MemoryTree {
    folders: HashMap<String, Vec<RemoteEntry>>,
    failures: HashMap<String, fn() -> DriveError>,
    page_size: usize,
    listed: Mutex<Vec<String>>,
}

impl MemoryTree {
    fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Add a file at `A/B/name`, creating the folders along the way.
    fn file(mut self, path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').collect();
        let (name, folders) = segments.split_last().unwrap();
        let mut parent = String::new();
        for folder in folders {
            let child = if parent.is_empty() {
                folder.to_string()
            } else {
                format!("{parent}/{folder}")
            };
            let entries = self.folders.entry(parent.clone()).or_default();
            if !entries.iter().any(|e| e.is_folder && e.name == *folder) {
                entries.push(RemoteEntry::folder(format!("id:{child}"), *folder));
            }
            self.folders.entry(child.clone()).or_default();
            parent = child;
        }
        let mut entry = RemoteEntry::file(format!("id:{path}"), *name);
        entry.download_url = Some(format!("https://dl.example.com/{path}?sig=x"));
        self.folders.entry(parent).or_default().push(entry);
        self
    }

    fn failing(mut self, path: &str, error: fn() -> DriveError) -> Self {
        self.failures.insert(path.to_string(), error);
        self
    }

    fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTree for MemoryTree {
    async fn list_children(
        &self,
        folder: &FolderNode,
        continuation: Option<&str>,
    ) -> Result<ChildPage, DriveError> {
        let key = folder.path().join("/");
        self.listed.lock().unwrap().push(key.clone());
        if let Some(error) = self.failures.get(&key) {
            return Err(error());
        }
        let entries = self
            .folders
            .get(&key)
            .ok_or_else(|| DriveError::NotFound(key.clone()))?;
        let start: usize = continuation.map_or(0, |c| c.parse().unwrap());
        let end = (start + self.page_size).min(entries.len());
        Ok(ChildPage {
            entries: entries[start..end].to_vec(),
            next: (end < entries.len()).then(|| end.to_string()),
        })
    }

    async fn download(&self, reference: &DownloadRef) -> Result<Vec<u8>, DriveError> {
        Err(DriveError::NotFound(reference.to_string()))
    }
}

fn forbidden() -> DriveError {
    DriveError::Auth {
        status: 403,
        message: "access denied".into(),
    }
}

fn vanished() -> DriveError {
    DriveError::NotFound("gone".into())
}

fn sample_tree(page_size: usize) -> MemoryTree {
    MemoryTree::new(page_size)
        .file("raiz.txt")
        .file("Manuais/Guia Rápido/fluxo.pdf")
        .file("Manuais/Guia Rápido/Detalhe/tela.png")
        .file("Manuais/indice.md")
        .file("Comunicados/Comunicado 15-03-2024.pdf")
        .file("Comunicados/Antigos/comunicado 01.02.png")
}

#[tokio::test]
async fn finds_every_leaf_with_its_depth_and_path() {
    let tree = sample_tree(100);
    let outcome = TreeCrawler::new(&tree, CrawlOptions::unlimited())
        .crawl(&FolderNode::root(), None)
        .await;

    let found: Vec<(String, usize, Vec<String>)> = outcome
        .files
        .iter()
        .map(|f| (f.name.clone(), f.depth, f.folder_path.clone()))
        .collect();
    let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
    assert_eq!(
        found,
        vec![
            ("raiz.txt".into(), 0, s(&[])),
            ("indice.md".into(), 1, s(&["Manuais"])),
            ("fluxo.pdf".into(), 2, s(&["Manuais", "Guia Rápido"])),
            ("tela.png".into(), 3, s(&["Manuais", "Guia Rápido", "Detalhe"])),
            ("Comunicado 15-03-2024.pdf".into(), 1, s(&["Comunicados"])),
            ("comunicado 01.02.png".into(), 2, s(&["Comunicados", "Antigos"])),
        ]
    );
    assert!(outcome.diagnostics.is_empty());
    assert!(!outcome.truncated);
    for file in &outcome.files {
        assert_eq!(file.depth, file.folder_path.len());
        assert!(file.download_url.is_some());
    }
}

#[tokio::test]
async fn categories_and_notice_dates() {
    let tree = sample_tree(100);
    let outcome = TreeCrawler::new(&tree, CrawlOptions::unlimited())
        .crawl(&FolderNode::root(), None)
        .await;
    let by_name = |name: &str| outcome.files.iter().find(|f| f.name == name).unwrap();

    assert_eq!(by_name("tela.png").category, Category::QuickGuide);
    assert_eq!(by_name("indice.md").category, Category::Uncategorized);
    let notice = by_name("Comunicado 15-03-2024.pdf");
    assert_eq!(notice.category, Category::Announcement);
    assert_eq!(notice.notice_date.as_deref(), Some("15-03-2024"));
    assert_eq!(by_name("comunicado 01.02.png").notice_date.as_deref(), Some("01.02"));
}

#[tokio::test]
async fn max_files_stops_before_descending() {
    let tree = MemoryTree::new(100)
        .file("A/file1.png")
        .file("A/B/file2.pdf");
    let outcome = TreeCrawler::new(&tree, CrawlOptions::unlimited().with_max_files(1))
        .crawl(&FolderNode::root(), None)
        .await;

    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].name, "file1.png");
    assert_eq!(outcome.files[0].depth, 1);
    assert!(outcome.truncated);
    assert!(!tree.listed().contains(&"A/B".to_string()));
}

#[tokio::test]
async fn pages_are_merged_per_folder() {
    let tree = sample_tree(1);
    let paged = TreeCrawler::new(&tree, CrawlOptions::unlimited())
        .crawl(&FolderNode::root(), None)
        .await;
    let whole = TreeCrawler::new(&sample_tree(100), CrawlOptions::unlimited())
        .crawl(&FolderNode::root(), None)
        .await;

    assert_eq!(paged.files, whole.files);
    // The root has three children, listed one per page.
    assert_eq!(tree.listed().iter().filter(|p| p.is_empty()).count(), 3);
}

#[tokio::test]
async fn crawl_path_starts_below_the_root() {
    let tree = sample_tree(100);
    let outcome = TreeCrawler::new(&tree, CrawlOptions::unlimited())
        .crawl_path("/Manuais//Guia Rápido/", None)
        .await;
    let names: Vec<&str> = outcome.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["fluxo.pdf", "tela.png"]);
    assert_eq!(outcome.files[1].folder_path, vec!["Manuais", "Guia Rápido", "Detalhe"]);
}

#[tokio::test]
async fn extension_filter_does_not_count_toward_cap() {
    let tree = MemoryTree::new(100)
        .file("a.exe")
        .file("b.exe")
        .file("c.pdf");
    let options = CrawlOptions::unlimited()
        .with_default_extensions()
        .with_max_files(1);
    let outcome = TreeCrawler::new(&tree, options)
        .crawl(&FolderNode::root(), None)
        .await;
    let names: Vec<&str> = outcome.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["c.pdf"]);
}

#[tokio::test]
async fn vanished_folders_are_silent_other_failures_are_reported() {
    let tree = sample_tree(100)
        .failing("Manuais/Guia Rápido", vanished)
        .failing("Comunicados", forbidden);
    let diagnostics = Mutex::new(Vec::new());
    struct Sink<'a>(&'a Mutex<Vec<String>>);
    impl arbor_core::ProgressSink for Sink<'_> {
        fn progress(&self, _fraction: f32, _status: &str) {}
        fn diagnostic(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }
    let sink = Sink(&diagnostics);

    let outcome = TreeCrawler::new(&tree, CrawlOptions::unlimited())
        .crawl(&FolderNode::root(), Some(&sink))
        .await;

    let names: Vec<&str> = outcome.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["raiz.txt", "indice.md"]);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].folder, "Comunicados");
    let seen = diagnostics.into_inner().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("Comunicados"));
}

#[tokio::test]
async fn missing_root_yields_nothing() {
    let tree = MemoryTree::new(10);
    let outcome = TreeCrawler::new(&tree, CrawlOptions::unlimited())
        .crawl_path("/Nowhere", None)
        .await;
    assert!(outcome.files.is_empty());
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn progress_is_monotonic_and_top_level_only() {
    let tree = sample_tree(100);
    let seen = Mutex::new(Vec::new());
    let sink = |fraction: f32, status: &str| seen.lock().unwrap().push((fraction, status.to_string()));

    TreeCrawler::new(&tree, CrawlOptions::unlimited())
        .crawl(&FolderNode::root(), Some(&sink))
        .await;

    let seen = seen.into_inner().unwrap();
    // Three top-level children plus the final report.
    assert_eq!(seen.len(), 4);
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(seen.last().unwrap(), &(1.0, "Found 6 files".to_string()));
}
