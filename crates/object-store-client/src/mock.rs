//! Mock object store for unit testing
//!
//! Serves a scripted sequence of listing pages and records every call. A
//! listed page is consumed once its keys are deleted; a failed delete puts it
//! back at the front, so the next listing returns the same objects. Once the
//! script is exhausted, listings return an empty final page.

use crate::error::StorageError;
use crate::models::ObjectPage;
use crate::store_trait::ObjectStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock object store
#[derive(Debug, Clone, Default)]
pub struct MockObjectStore {
    pages: Arc<Mutex<VecDeque<ObjectPage>>>,
    listed: Arc<Mutex<Option<ObjectPage>>>,
    list_cursors: Arc<Mutex<Vec<Option<String>>>>,
    delete_batches: Arc<Mutex<Vec<Vec<String>>>>,
    fail_list_on: Arc<Mutex<Option<usize>>>,
    fail_delete_on: Arc<Mutex<Option<usize>>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockObjectStore {
    /// Store answering listings with `pages`, in order
    pub fn with_pages(pages: Vec<ObjectPage>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages.into())),
            ..Self::default()
        }
    }

    /// Store whose listings report truncation as given, each page holding one key
    ///
    /// Every truncated page carries a cursor `cursor-<n>`.
    pub fn with_truncation(flags: &[bool]) -> Self {
        let pages = flags
            .iter()
            .enumerate()
            .map(|(i, truncated)| {
                let cursor = truncated.then(|| format!("cursor-{}", i + 1));
                ObjectPage::new(vec![format!("backup/{i}")], *truncated, cursor)
            })
            .collect();
        Self::with_pages(pages)
    }

    /// Share an ordered call journal (`"store.list"`, `"store.delete"`)
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fail the `n`th listing call (1-based)
    pub fn fail_list_on(&self, n: usize) {
        *lock(&self.fail_list_on) = Some(n);
    }

    /// Fail the `n`th delete batch (1-based)
    pub fn fail_delete_on(&self, n: usize) {
        *lock(&self.fail_delete_on) = Some(n);
    }

    /// Cursors passed to each listing call
    pub fn list_cursors(&self) -> Vec<Option<String>> {
        lock(&self.list_cursors).clone()
    }

    pub fn list_calls(&self) -> usize {
        lock(&self.list_cursors).len()
    }

    /// Batches passed to each delete call, including failed ones
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        lock(&self.delete_batches).clone()
    }

    pub fn delete_calls(&self) -> usize {
        lock(&self.delete_batches).len()
    }

    fn note(&self, entry: &str) {
        if let Some(journal) = &self.journal {
            lock(journal).push(entry.to_string());
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn list_objects(&self, cursor: Option<&str>) -> Result<ObjectPage, StorageError> {
        self.note("store.list");
        let call = {
            let mut cursors = lock(&self.list_cursors);
            cursors.push(cursor.map(str::to_string));
            cursors.len()
        };
        if *lock(&self.fail_list_on) == Some(call) {
            return Err(StorageError::List(format!("listing {call} refused")));
        }
        let page = lock(&self.pages)
            .pop_front()
            .unwrap_or_else(|| ObjectPage::last(Vec::new()));
        *lock(&self.listed) = Some(page.clone());
        Ok(page)
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), StorageError> {
        self.note("store.delete");
        let call = {
            let mut batches = lock(&self.delete_batches);
            batches.push(keys.to_vec());
            batches.len()
        };
        let listed = lock(&self.listed).take();
        if *lock(&self.fail_delete_on) == Some(call) {
            if let Some(page) = listed {
                lock(&self.pages).push_front(page);
            }
            return Err(StorageError::Delete {
                key: keys.first().cloned().unwrap_or_default(),
                message: "access denied".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_pages_then_empty() {
        let store = MockObjectStore::with_truncation(&[true, false]);
        let first = store.list_objects(None).await.unwrap();
        assert_eq!(first.next_cursor.as_deref(), Some("cursor-1"));
        let second = store.list_objects(Some("cursor-1")).await.unwrap();
        assert!(!second.is_truncated);
        assert!(store.list_objects(None).await.unwrap().is_empty());
        assert_eq!(store.list_cursors(), vec![None, Some("cursor-1".to_string()), None]);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_page_for_next_listing() {
        let store = MockObjectStore::with_truncation(&[true, false]);
        store.fail_delete_on(1);

        let first = store.list_objects(None).await.unwrap();
        assert!(store.delete_objects(&first.keys).await.is_err());

        let again = store.list_objects(None).await.unwrap();
        assert_eq!(again.keys, vec!["backup/0".to_string()]);
        assert!(store.delete_objects(&again.keys).await.is_ok());

        let next = store.list_objects(Some("cursor-1")).await.unwrap();
        assert_eq!(next.keys, vec!["backup/1".to_string()]);
        assert!(!next.is_truncated);
    }

    #[tokio::test]
    async fn test_delete_failure_on_nth_batch() {
        let store = MockObjectStore::default();
        store.fail_delete_on(2);
        assert!(store.delete_objects(&["a".to_string()]).await.is_ok());
        assert!(store.delete_objects(&["b".to_string()]).await.is_err());
        assert_eq!(store.delete_calls(), 2);
    }
}
