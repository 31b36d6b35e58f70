//! A directory of markdown notes, indexed by title.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use marginalia_editor_core::{Entry, EntryStore, TitleMap};
use miette::{IntoDiagnostic, Result};
use smol_str::SmolStr;

/// Every `.md` file under a root, titled by file stem and identified by its
/// path relative to the root.
#[derive(Debug, Default)]
pub struct Vault {
    root: PathBuf,
    titles: TitleMap,
    entries: Vec<Entry>,
}

impl Vault {
    /// Walk `root`, honouring `.gitignore` and skipping hidden files.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(miette::miette!("Vault directory not found: {}", root.display()));
        }

        let mut entries = Vec::new();
        for result in WalkBuilder::new(&root).hidden(true).git_ignore(true).build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable vault entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file())
                || path.extension().and_then(|e| e.to_str()) != Some("md")
            {
                continue;
            }
            let Some(title) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = path
                .strip_prefix(&root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            let body = tokio::fs::read_to_string(path).await.into_diagnostic()?;
            entries.push(Entry {
                id: SmolStr::new(id),
                title: SmolStr::new(title),
                body,
            });
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        let titles = entries
            .iter()
            .map(|e| (e.title.clone(), e.id.clone()))
            .collect();
        tracing::debug!(root = %root.display(), notes = entries.len(), "indexed vault");
        Ok(Self {
            root,
            titles,
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn titles(&self) -> &TitleMap {
        &self.titles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntryStore for Vault {
    fn get_entry_by_id(&self, id: &str) -> Option<Entry> {
        self.entries.get_entry_by_id(id)
    }

    fn find_entry_by_title(&self, title: &str) -> Option<Entry> {
        self.entries.find_entry_by_title(title)
    }
}
