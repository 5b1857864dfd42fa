use std::cmp::Reverse;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use super::{HistoryEntry, HistoryStore};
use crate::aspect::AspectRatio;
use crate::style::{GenerationMode, StyleSettings};

pub const HISTORY_SCHEMA_VERSION: u64 = 1;

const INDEX_FILE: &str = "history.json";
const IMAGES_DIR: &str = "images";

/// History kept in a directory: `history.json` holds the metadata index in
/// append order, `images/` holds one file per result.
///
/// The index is re-read from disk on every call, so several handles on the
/// same directory stay consistent with each other.
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HistoryIndex {
    schema_version: u64,
    #[serde(default)]
    entries: Vec<IndexRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexRecord {
    id: String,
    image_file: String,
    mime_type: String,
    prompt: String,
    aspect_ratio: AspectRatio,
    timestamp: i64,
    mode: GenerationMode,
    #[serde(default)]
    style: Option<StyleSettings>,
}

impl Default for HistoryIndex {
    fn default() -> Self {
        Self {
            schema_version: HISTORY_SCHEMA_VERSION,
            entries: Vec::new(),
        }
    }
}

impl JsonHistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn image_path(&self, file_name: &str) -> PathBuf {
        self.root.join(IMAGES_DIR).join(file_name)
    }

    fn read_index(&self) -> anyhow::Result<HistoryIndex> {
        let path = self.index_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HistoryIndex::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed reading {}", path.display()))
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("corrupt history index {}", path.display()))
    }

    fn write_index(&self, index: &HistoryIndex) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.index_path();
        std::fs::write(&path, serde_json::to_string_pretty(index)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn hydrate(&self, record: IndexRecord) -> HistoryEntry {
        let path = self.image_path(&record.image_file);
        let image_bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!(
                    "history image {} unreadable for entry {}: {err}",
                    path.display(),
                    record.id
                );
                Vec::new()
            }
        };
        HistoryEntry {
            id: record.id,
            image_bytes,
            mime_type: record.mime_type,
            prompt: record.prompt,
            aspect_ratio: record.aspect_ratio,
            timestamp: record.timestamp,
            mode: record.mode,
            style: record.style,
        }
    }
}

impl HistoryStore for JsonHistoryStore {
    fn append(&mut self, entry: &HistoryEntry) -> anyhow::Result<()> {
        if !is_safe_file_stem(&entry.id) {
            bail!("history entry id {:?} is not usable as a file name", entry.id);
        }
        let mut index = self.read_index()?;
        if index.entries.iter().any(|record| record.id == entry.id) {
            bail!("history entry {} already exists", entry.id);
        }

        let image_file = format!("{}.{}", entry.id, extension_for_mime(&entry.mime_type));
        let image_path = self.image_path(&image_file);
        if let Some(parent) = image_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&image_path, &entry.image_bytes)
            .with_context(|| format!("failed to write {}", image_path.display()))?;

        index.entries.push(IndexRecord {
            id: entry.id.clone(),
            image_file,
            mime_type: entry.mime_type.clone(),
            prompt: entry.prompt.clone(),
            aspect_ratio: entry.aspect_ratio,
            timestamp: entry.timestamp,
            mode: entry.mode,
            style: entry.style,
        });
        self.write_index(&index)
    }

    fn list(&mut self, offset: usize, limit: usize) -> anyhow::Result<Vec<HistoryEntry>> {
        let index = self.read_index()?;
        let mut records = index.entries;
        // Reverse first so that equal timestamps keep the newest append on top.
        records.reverse();
        records.sort_by_key(|record| Reverse(record.timestamp));
        Ok(records
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|record| self.hydrate(record))
            .collect())
    }

    fn delete(&mut self, id: &str) -> anyhow::Result<()> {
        let mut index = self.read_index()?;
        let Some(position) = index.entries.iter().position(|record| record.id == id) else {
            return Ok(());
        };
        let removed = index.entries.remove(position);
        self.write_index(&index)?;

        let image_path = self.image_path(&removed.image_file);
        match std::fs::remove_file(&image_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", image_path.display()))
            }
        }
    }

    fn count(&mut self) -> anyhow::Result<usize> {
        Ok(self.read_index()?.entries.len())
    }
}

/// Ids become `images/<id>.<ext>`, so they must stay a single path component.
fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty()
        && !id.contains("..")
        && !id.chars().any(|ch| matches!(ch, '/' | '\\') || ch.is_control())
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("png") {
        return "png";
    }
    "bin"
}

#[cfg(test)]
mod tests {
    use crate::aspect::AspectRatio;
    use crate::history::{HistoryEntry, HistoryStore};
    use crate::style::{GenerationMode, StyleSettings};

    use super::JsonHistoryStore;

    fn entry(id: &str, timestamp: i64) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            image_bytes: format!("png-{id}").into_bytes(),
            mime_type: "image/png".to_string(),
            prompt: format!("prompt {id}"),
            aspect_ratio: AspectRatio::Portrait,
            timestamp,
            mode: GenerationMode::Single,
            style: None,
        }
    }

    #[test]
    fn list_returns_newest_first() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = JsonHistoryStore::new(temp.path());
        store.append(&entry("t1", 100))?;
        store.append(&entry("t3", 300))?;
        store.append(&entry("t2", 200))?;

        let ids: Vec<String> = store
            .list(0, 3)?
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(ids, vec!["t3", "t2", "t1"]);
        Ok(())
    }

    #[test]
    fn equal_timestamps_list_latest_append_first() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = JsonHistoryStore::new(temp.path());
        store.append(&entry("first", 100))?;
        store.append(&entry("second", 100))?;

        let listed = store.list(0, 10)?;
        assert_eq!(listed[0].id, "second");
        assert_eq!(listed[1].id, "first");
        Ok(())
    }

    #[test]
    fn list_pages_through_entries() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = JsonHistoryStore::new(temp.path());
        for idx in 0..5 {
            store.append(&entry(&format!("e{idx}"), idx))?;
        }

        let page_one: Vec<String> = store.list(0, 2)?.into_iter().map(|e| e.id).collect();
        let page_two: Vec<String> = store.list(2, 2)?.into_iter().map(|e| e.id).collect();
        let page_three: Vec<String> = store.list(4, 2)?.into_iter().map(|e| e.id).collect();
        assert_eq!(page_one, vec!["e4", "e3"]);
        assert_eq!(page_two, vec!["e2", "e1"]);
        assert_eq!(page_three, vec!["e0"]);
        assert!(store.list(10, 2)?.is_empty());
        assert_eq!(store.count()?, 5);
        Ok(())
    }

    #[test]
    fn entries_survive_reopen_with_image_and_style() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut original = entry("keep", 42);
        original.mode = GenerationMode::Batch;
        original.style = Some(StyleSettings::default());
        {
            let mut store = JsonHistoryStore::new(temp.path());
            store.append(&original)?;
        }

        let mut reopened = JsonHistoryStore::new(temp.path());
        let listed = reopened.list(0, 1)?;
        assert_eq!(listed, vec![original]);
        assert!(temp.path().join("images").join("keep.png").exists());
        Ok(())
    }

    #[test]
    fn delete_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = JsonHistoryStore::new(temp.path());
        store.append(&entry("a", 1))?;
        store.append(&entry("b", 2))?;

        store.delete("a")?;
        store.delete("a")?;
        store.delete("never-existed")?;

        let ids: Vec<String> = store.list(0, 10)?.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b"]);
        assert!(!temp.path().join("images").join("a.png").exists());
        Ok(())
    }

    #[test]
    fn delete_on_empty_store_is_noop() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = JsonHistoryStore::new(temp.path().join("fresh"));
        store.delete("missing")?;
        assert_eq!(store.count()?, 0);
        assert!(!temp.path().join("fresh").join("history.json").exists());
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = JsonHistoryStore::new(temp.path());
        store.append(&entry("dup", 1))?;
        assert!(store.append(&entry("dup", 2)).is_err());
        assert_eq!(store.count()?, 1);
        Ok(())
    }

    #[test]
    fn ids_that_escape_the_root_are_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("store");
        let mut store = JsonHistoryStore::new(&root);
        for id in ["../../x", "..", "nested/name", "back\\slash", ""] {
            assert!(store.append(&entry(id, 1)).is_err(), "{id:?} was accepted");
        }

        assert_eq!(store.count()?, 0);
        assert!(!temp.path().join("x.png").exists());
        let written: Vec<_> = std::fs::read_dir(temp.path())?.collect::<Result<_, _>>()?;
        assert!(written.is_empty(), "unexpected files: {written:?}");

        store.append(&entry("batch-1a2b3c4d-0", 2))?;
        assert!(root.join("images").join("batch-1a2b3c4d-0.png").exists());
        Ok(())
    }

    #[test]
    fn missing_image_file_yields_empty_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = JsonHistoryStore::new(temp.path());
        store.append(&entry("gone", 1))?;
        std::fs::remove_file(temp.path().join("images").join("gone.png"))?;

        let listed = store.list(0, 1)?;
        assert_eq!(listed.len(), 1);
        assert!(listed[0].image_bytes.is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_index_is_reported() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("history.json"), "{not json")?;
        let mut store = JsonHistoryStore::new(temp.path());
        assert!(store.list(0, 1).is_err());
        Ok(())
    }
}
