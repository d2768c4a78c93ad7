//! Bucket purge
//!
//! Pages through a bucket and deletes each page's keys before asking for the
//! next page. Pages come from a lazy stream bounded by `max_pages`, so a
//! backend that never stops reporting truncation cannot loop forever.

use futures::{Stream, TryStreamExt, stream};
use object_store_client::{ObjectPage, ObjectStore, StorageError};
use thiserror::Error;
use tracing::{debug, info};

/// Listing calls allowed per purge
pub const DEFAULT_MAX_PAGES: usize = 10_000;

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("listing page {page} failed: {source}")]
    List {
        page: usize,
        #[source]
        source: StorageError,
    },

    #[error("deleting {keys} objects of page {page} failed: {source}")]
    Delete {
        page: usize,
        keys: usize,
        #[source]
        source: StorageError,
    },

    #[error("bucket still truncated after {max_pages} pages")]
    PageLimitExceeded { max_pages: usize },
}

/// Outcome of a complete purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Listing calls made
    pub pages: usize,
    /// Objects deleted
    pub deleted: usize,
}

#[derive(Debug, Default)]
struct PageState {
    listed: usize,
    cursor: Option<String>,
    done: bool,
}

/// Deletes every object in a bucket
#[derive(Debug, Clone, Copy)]
pub struct ObjectPurger {
    max_pages: usize,
}

impl Default for ObjectPurger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGES)
    }
}

impl ObjectPurger {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Listing pages, fetched one at a time as the stream is polled
    ///
    /// A page without a cursor restarts the listing from the beginning. The
    /// stream ends after the first page that is not truncated, and fails once
    /// `max_pages` pages have been listed without reaching one.
    pub fn pages<'a>(
        &self,
        store: &'a dyn ObjectStore,
    ) -> impl Stream<Item = Result<ObjectPage, PurgeError>> + Send + 'a {
        let max_pages = self.max_pages;
        stream::try_unfold(PageState::default(), move |state| async move {
            if state.done {
                return Ok(None);
            }
            if state.listed >= max_pages {
                return Err(PurgeError::PageLimitExceeded { max_pages });
            }
            let page_no = state.listed + 1;
            let page = store
                .list_objects(state.cursor.as_deref())
                .await
                .map_err(|source| PurgeError::List { page: page_no, source })?;
            let next = PageState {
                listed: page_no,
                cursor: if page.is_truncated { page.next_cursor.clone() } else { None },
                done: !page.is_truncated,
            };
            Ok::<_, PurgeError>(Some((page, next)))
        })
    }

    /// Delete every object, one page at a time
    ///
    /// Stops at the first failing list or delete. Objects already deleted stay
    /// deleted; calling again lists whatever remains.
    pub async fn purge(&self, store: &dyn ObjectStore) -> Result<PurgeReport, PurgeError> {
        let mut pages = std::pin::pin!(self.pages(store));
        let mut report = PurgeReport::default();

        while let Some(page) = pages.try_next().await? {
            report.pages += 1;
            if page.keys.is_empty() {
                debug!("Page {} is empty", report.pages);
                continue;
            }
            store
                .delete_objects(&page.keys)
                .await
                .map_err(|source| PurgeError::Delete {
                    page: report.pages,
                    keys: page.keys.len(),
                    source,
                })?;
            report.deleted += page.keys.len();
            debug!("Deleted {} objects from page {}", page.keys.len(), report.pages);
        }

        info!(
            "Purged {} objects in {} pages",
            report.deleted, report.pages
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store_client::MockObjectStore;

    #[tokio::test]
    async fn test_empty_bucket_lists_once_and_deletes_nothing() {
        let store = MockObjectStore::with_pages(vec![ObjectPage::last(Vec::new())]);
        let report = ObjectPurger::default().purge(&store).await.unwrap();

        assert_eq!(report, PurgeReport { pages: 1, deleted: 0 });
        assert_eq!(store.list_calls(), 1);
        assert_eq!(store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_cursor_is_passed_to_next_listing() {
        let store = MockObjectStore::with_truncation(&[true, true, false]);
        ObjectPurger::default().purge(&store).await.unwrap();

        assert_eq!(
            store.list_cursors(),
            vec![None, Some("cursor-1".to_string()), Some("cursor-2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_truncated_page_without_cursor_relists_from_start() {
        let store = MockObjectStore::with_pages(vec![
            ObjectPage::new(vec!["a".to_string()], true, None),
            ObjectPage::last(vec!["b".to_string()]),
        ]);
        let report = ObjectPurger::default().purge(&store).await.unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(store.list_cursors(), vec![None, None]);
    }

    #[tokio::test]
    async fn test_page_limit_stops_endless_truncation() {
        let store = MockObjectStore::with_truncation(&[true; 5]);
        let err = ObjectPurger::new(3).purge(&store).await.unwrap_err();

        assert!(matches!(err, PurgeError::PageLimitExceeded { max_pages: 3 }));
        assert_eq!(store.list_calls(), 3);
        assert_eq!(store.delete_calls(), 3);
    }

    #[tokio::test]
    async fn test_list_failure_stops_purge() {
        let store = MockObjectStore::with_truncation(&[true, false]);
        store.fail_list_on(2);
        let err = ObjectPurger::default().purge(&store).await.unwrap_err();

        assert!(matches!(err, PurgeError::List { page: 2, .. }));
        assert_eq!(store.delete_calls(), 1);
    }
}
