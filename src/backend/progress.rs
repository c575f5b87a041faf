use std::sync::Arc;

use super::library::Item;
use super::storage::Storage;

/// Reads an item's playback progress from storage. Nothing is cached;
/// every call goes to the storage.
#[derive(Clone)]
pub struct ProgressFetcher {
    storage: Arc<dyn Storage>,
}

impl ProgressFetcher {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// `None` when storage could not answer; the caller keeps its old value.
    pub async fn fetch(&self, item: &Item) -> Option<u32> {
        match self.storage.progress(item).await {
            Ok(progress) => Some(progress),
            Err(e) => {
                log::warn!("progress for item {} unavailable: {}", item.id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::SqliteStorage;

    #[tokio::test]
    async fn reads_through_to_storage() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let item = storage.add("Jane Eyre", 4_000).await.unwrap();
        let fetcher = ProgressFetcher::new(storage.clone());

        assert_eq!(fetcher.fetch(&item).await, Some(0));
        storage.set_position(item.id, 1_000).await.unwrap();
        assert_eq!(fetcher.fetch(&item).await, Some(250));
    }

    #[tokio::test]
    async fn storage_failure_is_none() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let fetcher = ProgressFetcher::new(storage);
        assert_eq!(fetcher.fetch(&Item::new(404, "Lost")).await, None);
    }
}
