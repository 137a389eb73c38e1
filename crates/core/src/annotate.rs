//! Context tags that carry a document's place in the tree inside its text.
//!
//! An annotated block looks like
//!
//! ```text
//! [Level 2] [Path: Manuais/Guia Rapido] [Type: pdf] [Category: Guia Rápido] [Source: fluxo.pdf]
//!
//! --- Page 1 ---
//! ...
//! ```
//!
//! Tags whose value is the default are left out, and [`parse`] reads them back
//! to defaults.

use crate::document::{split_path, Category, DocumentKind, Provenance};

const LEVEL: &str = "Level";
const PATH: &str = "Path";
const TYPE: &str = "Type";
const CATEGORY: &str = "Category";
const SOURCE: &str = "Source";

/// Prefix `text` with the non-default provenance tags and a blank line.
pub fn annotate(text: &str, provenance: &Provenance) -> String {
    let tags = tags_for(provenance);
    if tags.is_empty() {
        return text.to_string();
    }
    format!("{}\n\n{}", tags.join(" "), text)
}

fn tags_for(p: &Provenance) -> Vec<String> {
    let mut tags = Vec::with_capacity(5);
    if p.depth > 0 {
        tags.push(format!("[{} {}]", LEVEL, p.depth));
    }
    let path = p.path_display();
    if !path.is_empty() {
        tags.push(format!("[{}: {}]", PATH, path));
    }
    if p.kind != DocumentKind::Unknown {
        tags.push(format!("[{}: {}]", TYPE, p.kind.label()));
    }
    if !p.category.is_uncategorized() {
        tags.push(format!("[{}: {}]", CATEGORY, p.category.label()));
    }
    if !p.source_name.is_empty() {
        tags.push(format!("[{}: {}]", SOURCE, p.source_name));
    }
    tags
}

/// Recover the provenance written by [`annotate`].
///
/// Text without a leading tag line parses to the default provenance.
pub fn parse(annotated: &str) -> Provenance {
    let mut provenance = Provenance::default();
    let Some(tags) = header_tags(annotated) else {
        return provenance;
    };

    for tag in tags {
        if let Some(level) = tag.strip_prefix(LEVEL).and_then(|r| r.strip_prefix(' ')) {
            if let Ok(depth) = level.trim().parse() {
                provenance.depth = depth;
            }
            continue;
        }
        let Some((key, value)) = tag.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            PATH => provenance.folder_path = split_path(value),
            TYPE => provenance.kind = DocumentKind::from_label(value).unwrap_or_default(),
            CATEGORY => provenance.category = Category::from_label(value).unwrap_or_default(),
            SOURCE => provenance.source_name = value.to_string(),
            // Unknown tags from older annotations are ignored.
            _ => {}
        }
    }
    provenance
}

/// The bracketed tags of the first paragraph, if it consists of tags only and
/// is followed by a blank line.
///
/// Folder and file names may contain brackets, so tags are split only where
/// `] [` is followed by something shaped like a tag key.
fn header_tags(text: &str) -> Option<Vec<&str>> {
    let (header, _) = text.split_once("\n\n")?;
    let inner = header.trim().strip_prefix('[')?.strip_suffix(']')?;

    let mut tags = Vec::new();
    let mut start = 0;
    let mut from = 0;
    while let Some(offset) = inner[from..].find("] [") {
        let at = from + offset;
        let next = at + "] [".len();
        if starts_like_tag(&inner[next..]) {
            tags.push(&inner[start..at]);
            start = next;
        }
        from = next;
    }
    tags.push(&inner[start..]);

    tags.iter().all(|tag| starts_like_tag(tag)).then_some(tags)
}

/// `Key: ...` or `Level N` with a capitalized alphabetic key.
fn starts_like_tag(s: &str) -> bool {
    let key_end = s.find(|c: char| !c.is_alphabetic()).unwrap_or(s.len());
    let key = &s[..key_end];
    let rest = &s[key_end..];
    key.starts_with(char::is_uppercase)
        && (rest.starts_with(':')
            || rest
                .strip_prefix(' ')
                .is_some_and(|r| r.starts_with(|c: char| c.is_ascii_digit())))
}

/// Words that hint at what a document is about, matched case-insensitively
/// against the text.
pub const CONTEXT_KEYWORDS: &[&str] = &[
    "comunicado",
    "guia rápido",
    "assistência",
    "seguros",
    "atendimento",
    "procedimento",
    "telefone",
    "contato",
    "reembolso",
    "fluxo",
    "busca",
    "cliente",
];

/// The [`CONTEXT_KEYWORDS`] found in `text`, in list order.
pub fn keywords(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    CONTEXT_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect()
}
