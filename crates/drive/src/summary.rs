//! Overview of a crawl: counts per level, category and kind, plus a
//! navigation tree of the folders that hold files.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use arbor_core::{join_path, Category, DocumentKind, FileDescriptor};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavNode {
    /// Files directly inside this folder.
    pub files: usize,
    pub children: BTreeMap<String, NavNode>,
}

impl NavNode {
    /// Files in this folder and every folder below it.
    pub fn total(&self) -> usize {
        self.files + self.children.values().map(NavNode::total).sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub total_files: usize,
    pub total_bytes: u64,
    pub by_depth: BTreeMap<usize, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub by_kind: BTreeMap<DocumentKind, usize>,
    /// Distinct `A/B` folder paths that contain at least one file.
    pub folders: BTreeSet<String>,
    pub tree: NavNode,
}

impl CrawlSummary {
    pub fn from_files(files: &[FileDescriptor]) -> Self {
        let mut summary = Self::default();
        for file in files {
            summary.total_files += 1;
            summary.total_bytes += file.size;
            *summary.by_depth.entry(file.depth).or_default() += 1;
            *summary.by_category.entry(file.category).or_default() += 1;
            *summary.by_kind.entry(file.kind()).or_default() += 1;
            summary.folders.insert(join_path(&file.folder_path));

            let mut node = &mut summary.tree;
            for name in &file.folder_path {
                node = node.children.entry(name.clone()).or_default();
            }
            node.files += 1;
        }
        summary
    }

    /// Indented folder tree with file counts, e.g.
    ///
    /// ```text
    /// / (3)
    ///   Manuais (2)
    ///     Guia Rapido (2)
    /// ```
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "/ ({})", self.tree.total());
        render_children(&self.tree, 1, &mut out);
        out
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Files: {} ({} bytes)", self.total_files, self.total_bytes);
        let _ = writeln!(out, "By level:");
        for (depth, count) in &self.by_depth {
            let _ = writeln!(out, "  Level {}: {}", depth, count);
        }
        let _ = writeln!(out, "By category:");
        for (category, count) in &self.by_category {
            let _ = writeln!(out, "  {}: {}", category.label(), count);
        }
        let _ = writeln!(out, "By type:");
        for (kind, count) in &self.by_kind {
            let _ = writeln!(out, "  {}: {}", kind.label(), count);
        }
        let _ = writeln!(out, "Folders:");
        out.push_str(&self.render_tree());
        out
    }
}

fn render_children(node: &NavNode, indent: usize, out: &mut String) {
    for (name, child) in &node.children {
        let _ = writeln!(out, "{}{} ({})", "  ".repeat(indent), name, child.total());
        render_children(child, indent + 1, out);
    }
}
