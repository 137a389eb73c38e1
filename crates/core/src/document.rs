use std::fmt;

use serde::{Deserialize, Serialize};

/// Extensions routed to the image/OCR path.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp"];

/// Extensions routed to the PDF path.
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Extensions decoded directly as text.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "csv", "md", "html", "xml"];

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

// ── Category ──────────────────────────────────────────────────

/// Closed set of document categories inferred from folder and file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    QuickGuide,
    PracticalGuide,
    Announcement,
    FrontLine,
    Assistance,
    Insurance,
    #[default]
    Uncategorized,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::QuickGuide,
        Category::PracticalGuide,
        Category::Announcement,
        Category::FrontLine,
        Category::Assistance,
        Category::Insurance,
        Category::Uncategorized,
    ];

    /// Human-facing label, as it appears in annotation tags.
    pub fn label(&self) -> &'static str {
        match self {
            Category::QuickGuide => "Guia Rápido",
            Category::PracticalGuide => "Guia Prático",
            Category::Announcement => "Comunicado",
            Category::FrontLine => "Linha de Frente",
            Category::Assistance => "Assistência",
            Category::Insurance => "Seguro",
            Category::Uncategorized => "uncategorized",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label.trim())
    }

    pub fn is_uncategorized(&self) -> bool {
        matches!(self, Category::Uncategorized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Document kind ─────────────────────────────────────────────

/// Broad format family of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Image,
    Pdf,
    Text,
    #[default]
    Unknown,
}

impl DocumentKind {
    /// Classify by file name extension only.
    pub fn from_name(name: &str) -> Self {
        match extension_of(name) {
            Some(ext) => Self::from_extension(&ext),
            None => DocumentKind::Unknown,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            DocumentKind::Image
        } else if PDF_EXTENSIONS.contains(&ext.as_str()) {
            DocumentKind::Pdf
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            DocumentKind::Text
        } else {
            DocumentKind::Unknown
        }
    }

    /// Classify by MIME type family (`image/*`, `application/pdf`, `text/*`).
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_lowercase();
        if mime.starts_with("image/") {
            DocumentKind::Image
        } else if mime == "application/pdf" || mime.ends_with("/pdf") {
            DocumentKind::Pdf
        } else if mime.starts_with("text/") {
            DocumentKind::Text
        } else {
            DocumentKind::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Image => "image",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Text => "text",
            DocumentKind::Unknown => "unknown",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "image" => Some(DocumentKind::Image),
            "pdf" => Some(DocumentKind::Pdf),
            "text" => Some(DocumentKind::Text),
            "unknown" => Some(DocumentKind::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Tree items ────────────────────────────────────────────────

/// How a file's bytes can be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DownloadRef {
    /// Pre-authenticated, time-limited URL handed out by the listing.
    Direct(String),
    /// Stable item id; content is fetched through the authenticated API.
    Item(String),
}

impl fmt::Display for DownloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadRef::Direct(url) => {
                // Direct URLs embed a short-lived credential; only show the host part.
                let cut = url.find('?').unwrap_or(url.len());
                write!(f, "{}", &url[..cut])
            }
            DownloadRef::Item(id) => write!(f, "item:{}", id),
        }
    }
}

/// A folder seen during traversal. Never outlives the crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    /// Remote id; `None` for a folder addressed by path only (e.g. the crawl root).
    pub id: Option<String>,
    pub name: String,
    pub parent_path: Vec<String>,
}

impl FolderNode {
    /// The tree root of a library.
    pub fn root() -> Self {
        Self {
            id: None,
            name: String::new(),
            parent_path: Vec::new(),
        }
    }

    /// A folder addressed by its path from the tree root (`/A/B`, `A//B/`).
    pub fn at_path(path: &str) -> Self {
        let mut segments = split_path(path);
        match segments.pop() {
            Some(name) => Self {
                id: None,
                name,
                parent_path: segments,
            },
            None => Self::root(),
        }
    }

    pub fn child(&self, id: Option<String>, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            parent_path: self.path(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.name.is_empty() && self.parent_path.is_empty()
    }

    /// Ordered folder names from the tree root down to and including this folder.
    pub fn path(&self) -> Vec<String> {
        let mut path = self.parent_path.clone();
        if !self.name.is_empty() {
            path.push(self.name.clone());
        }
        path
    }

    pub fn depth(&self) -> usize {
        self.path().len()
    }
}

/// Split a slash-separated path into non-empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join folder names with single separators; the root is the empty string.
pub fn join_path(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// A leaf file discovered by the crawler, tagged with its place in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    /// Time-limited direct download URL, when the listing provided one.
    pub download_url: Option<String>,
    /// Folder names from the tree root down to the containing folder.
    pub folder_path: Vec<String>,
    /// Always `folder_path.len()`.
    pub depth: usize,
    pub category: Category,
    pub size: u64,
    pub mime_type: Option<String>,
    /// Date token found in announcement file names (`15-03-2024`).
    pub notice_date: Option<String>,
}

impl FileDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, folder_path: Vec<String>) -> Self {
        let depth = folder_path.len();
        Self {
            id: id.into(),
            name: name.into(),
            download_url: None,
            folder_path,
            depth,
            category: Category::Uncategorized,
            size: 0,
            mime_type: None,
            notice_date: None,
        }
    }

    pub fn with_download_url(mut self, url: Option<String>) -> Self {
        self.download_url = url;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_mime_type(mut self, mime: Option<String>) -> Self {
        self.mime_type = mime;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_notice_date(mut self, date: Option<String>) -> Self {
        self.notice_date = date;
        self
    }

    pub fn download_ref(&self) -> DownloadRef {
        match &self.download_url {
            Some(url) => DownloadRef::Direct(url.clone()),
            None => DownloadRef::Item(self.id.clone()),
        }
    }

    /// `A/B/name.pdf`
    pub fn display_path(&self) -> String {
        let folder = join_path(&self.folder_path);
        if folder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", folder, self.name)
        }
    }

    /// Kind from the MIME hint when present, else from the extension.
    pub fn kind(&self) -> DocumentKind {
        let from_mime = self
            .mime_type
            .as_deref()
            .map(DocumentKind::from_mime)
            .unwrap_or_default();
        match from_mime {
            DocumentKind::Unknown => DocumentKind::from_name(&self.name),
            kind => kind,
        }
    }
}

/// Bytes of one file together with the descriptor they came from.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub descriptor: FileDescriptor,
    pub bytes: Vec<u8>,
}

// ── Extraction output ─────────────────────────────────────────

/// Hierarchy and category metadata attached to extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub depth: usize,
    pub folder_path: Vec<String>,
    pub category: Category,
    pub source_name: String,
    pub kind: DocumentKind,
}

impl Provenance {
    pub fn from_descriptor(descriptor: &FileDescriptor) -> Self {
        Self {
            depth: descriptor.depth,
            folder_path: descriptor.folder_path.clone(),
            category: descriptor.category,
            source_name: descriptor.name.clone(),
            kind: descriptor.kind(),
        }
    }

    /// Provenance for a file that did not come from the remote tree.
    pub fn local(name: &str) -> Self {
        Self {
            source_name: name.to_string(),
            kind: DocumentKind::from_name(name),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn path_display(&self) -> String {
        join_path(&self.folder_path)
    }
}

/// Text produced for one file, ready for a downstream consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub provenance: Provenance,
}

impl ExtractedText {
    pub fn new(text: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            text: text.into(),
            provenance,
        }
    }

    /// Tag header, blank line, then the text.
    pub fn annotated(&self) -> String {
        crate::annotate::annotate(&self.text, &self.provenance)
    }

    /// Context keywords present in the text.
    pub fn keywords(&self) -> Vec<&'static str> {
        crate::annotate::keywords(&self.text)
    }

    /// Whether the text is one of the fixed "no result" sentinels.
    pub fn is_sentinel(&self) -> bool {
        sentinel::is_sentinel(&self.text)
    }
}

/// Fixed strings returned instead of errors so batch processing continues.
pub mod sentinel {
    pub const IMAGE_NO_TEXT: &str = "[image without legible text]";
    pub const PDF_NO_TEXT: &str = "[PDF without legible text]";

    pub fn unsupported_format(name: &str) -> String {
        format!("[unsupported format: {}]", name)
    }

    pub fn extraction_failed(name: &str, reason: &str) -> String {
        format!("[extraction failed: {}: {}]", name, reason)
    }

    pub fn is_sentinel(text: &str) -> bool {
        let text = text.trim();
        text == IMAGE_NO_TEXT
            || text == PDF_NO_TEXT
            || (text.starts_with("[unsupported format: ") && text.ends_with(']'))
            || (text.starts_with("[extraction failed: ") && text.ends_with(']'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_handles_dotfiles_and_case() {
        assert_eq!(extension_of("Scan.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of(".env"), None);
        assert_eq!(extension_of("README"), None);
    }

    #[test]
    fn kind_prefers_mime_hint() {
        let file = FileDescriptor::new("1", "photo.pdf", vec![])
            .with_mime_type(Some("image/png".into()));
        assert_eq!(file.kind(), DocumentKind::Image);

        let file = FileDescriptor::new("2", "notes.txt", vec![])
            .with_mime_type(Some("application/octet-stream".into()));
        assert_eq!(file.kind(), DocumentKind::Text);
    }

    #[test]
    fn descriptor_depth_tracks_folder_path() {
        let file = FileDescriptor::new("1", "a.png", vec!["A".into(), "B".into()]);
        assert_eq!(file.depth, 2);
        assert_eq!(file.display_path(), "A/B/a.png");
    }

    #[test]
    fn path_helpers_drop_duplicate_separators() {
        assert_eq!(split_path("//A///B/"), vec!["A", "B"]);
        assert_eq!(join_path(&["A".into(), "/B/".into(), "".into()]), "A/B");

        let node = FolderNode::at_path("/A//B");
        assert_eq!(node.path(), vec!["A", "B"]);
        assert_eq!(node.depth(), 2);
        assert!(FolderNode::at_path("/").is_root());
    }

    #[test]
    fn download_ref_falls_back_to_item_id() {
        let file = FileDescriptor::new("abc", "a.png", vec![]);
        assert_eq!(file.download_ref(), DownloadRef::Item("abc".into()));

        let file = file.with_download_url(Some("https://x/y?token=secret".into()));
        assert_eq!(file.download_ref().to_string(), "https://x/y");
    }

    #[test]
    fn category_labels_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_label(category.label()), Some(category));
        }
    }

    #[test]
    fn sentinels_are_recognised() {
        assert!(sentinel::is_sentinel(sentinel::IMAGE_NO_TEXT));
        assert!(sentinel::is_sentinel(&sentinel::unsupported_format("x.bin")));
        assert!(!sentinel::is_sentinel("[Level 1] real text"));
    }
}
