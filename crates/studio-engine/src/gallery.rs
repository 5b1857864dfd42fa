use std::collections::HashSet;

use studio_contracts::{HistoryEntry, HistoryStore};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Page-by-page view over a [`HistoryStore`], newest first.
///
/// New results are shown before they are persisted; a failed persist is
/// logged and the entry stays visible for the rest of the session.
pub struct HistoryFeed {
    store: Box<dyn HistoryStore>,
    page_size: usize,
    visible: Vec<HistoryEntry>,
    // Store rows already reflected in `visible`; the next page starts here.
    fetched: usize,
    unsaved: HashSet<String>,
}

impl HistoryFeed {
    pub fn new(store: Box<dyn HistoryStore>) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(store: Box<dyn HistoryStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            visible: Vec::new(),
            fetched: 0,
            unsaved: HashSet::new(),
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.visible
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Appends the next page to the visible list and returns how many rows
    /// were added.
    pub fn load_more(&mut self) -> anyhow::Result<usize> {
        let rows = self.store.list(self.fetched, self.page_size)?;
        self.fetched += rows.len();
        let mut added = 0;
        for row in rows {
            if self.visible.iter().any(|entry| entry.id == row.id) {
                continue;
            }
            self.visible.push(row);
            added += 1;
        }
        log::debug!("history feed loaded {added} entries ({} visible)", self.visible.len());
        Ok(added)
    }

    pub fn has_more(&mut self) -> anyhow::Result<bool> {
        Ok(self.store.count()? > self.fetched)
    }

    pub fn total(&mut self) -> anyhow::Result<usize> {
        self.store.count()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.visible.insert(0, entry.clone());
        match self.store.append(&entry) {
            Ok(()) => self.fetched += 1,
            Err(err) => {
                log::warn!("history entry {} not persisted: {err:#}", entry.id);
                self.unsaved.insert(entry.id);
            }
        }
    }

    pub fn delete(&mut self, id: &str) -> anyhow::Result<()> {
        self.store.delete(id)?;
        let before = self.visible.len();
        self.visible.retain(|entry| entry.id != id);
        let removed = before != self.visible.len();
        if removed && !self.unsaved.remove(id) {
            self.fetched = self.fetched.saturating_sub(1);
        }
        Ok(())
    }

    /// Drops the visible window and reloads the first page from the store.
    pub fn refresh(&mut self) -> anyhow::Result<usize> {
        self.visible.clear();
        self.unsaved.clear();
        self.fetched = 0;
        self.load_more()
    }
}
