//! Local copy of downloaded files, named after their place in the tree.

use std::path::PathBuf;

use arbor_core::FileDescriptor;
use tracing::debug;

use crate::error::DriveError;

/// Flat directory of downloads. `Manuais/Guia Rápido/fluxo.pdf` is stored as
/// `Manuais_Guia Rápido_fluxo.pdf` so the file name alone shows where it came from.
#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, descriptor: &FileDescriptor) -> PathBuf {
        self.dir
            .join(safe_name(&descriptor.folder_path, &descriptor.name))
    }

    /// Write `bytes`, creating the directory on first use.
    pub async fn save(&self, descriptor: &FileDescriptor, bytes: &[u8]) -> Result<PathBuf, DriveError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(descriptor);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "stored");
        Ok(path)
    }
}

/// Folder names and file name joined by `_`, each with reserved characters replaced.
pub fn safe_name(folder_path: &[String], name: &str) -> String {
    folder_path
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(name))
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    // `..` would escape the store directory.
    cleaned.trim().trim_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_names_keep_hierarchy() {
        let path = vec!["Manuais".to_string(), "Guia: Rápido?".to_string()];
        assert_eq!(safe_name(&path, "fluxo/v2.pdf"), "Manuais_Guia_ Rápido__fluxo_v2.pdf");
        assert_eq!(safe_name(&[], "raiz.png"), "raiz.png");
        assert_eq!(safe_name(&["..".to_string()], "a.txt"), "a.txt");
    }

    #[tokio::test]
    async fn save_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("nested"));
        let descriptor = FileDescriptor::new("1", "a.txt", vec!["A".into(), "B".into()]);

        assert!(!store.path_for(&descriptor).exists());
        let path = store.save(&descriptor, b"hello").await.unwrap();
        assert!(path.ends_with("A_B_a.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }
}
