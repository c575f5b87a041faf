use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;

use super::cache::CoverCache;
use super::covers::{Connectivity, CoverService};
use super::library::Item;
use super::monogram::generate_monogram;
use super::storage::Storage;
use crate::error::Result;

/// Outcome of resolving a cover for one item.
#[derive(Debug, Default)]
pub struct Resolved {
    pub cover: Option<DynamicImage>,
    /// Set when a new cover was downloaded and persisted for the item.
    pub updated: Option<Item>,
}

/// Produces a cover for an item: cached thumbnail first, then the network,
/// then a generated monogram when offline.
pub struct FallbackResolver {
    cache: CoverCache,
    covers: Arc<dyn CoverService>,
    connectivity: Arc<dyn Connectivity>,
    storage: Arc<dyn Storage>,
}

impl FallbackResolver {
    pub fn new(
        cache: CoverCache,
        covers: Arc<dyn CoverService>,
        connectivity: Arc<dyn Connectivity>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            cache,
            covers,
            connectivity,
            storage,
        }
    }

    pub async fn resolve(&self, item: &Item) -> Resolved {
        if CoverCache::is_usable(item.thumb_path.as_deref()) {
            if let Some(thumb) = self.load_cached(item).await {
                return Resolved {
                    cover: Some(thumb),
                    updated: None,
                };
            }
        }

        if !self.connectivity.is_online().await {
            let name = item.name.clone();
            let size = self.cache.thumb_size();
            let cover = tokio::task::spawn_blocking(move || generate_monogram(&name, size))
                .await
                .ok();
            return Resolved {
                cover,
                updated: None,
            };
        }

        match self.download(item).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("cover lookup for {:?} failed: {}", item.name, e);
                Resolved::default()
            }
        }
    }

    async fn load_cached(&self, item: &Item) -> Option<DynamicImage> {
        let path = PathBuf::from(item.thumb_path.as_deref()?);
        let cache = self.cache.clone();
        let loaded = tokio::task::spawn_blocking(move || cache.load(&path)).await;

        match loaded {
            Ok(Ok(image)) => Some(image),
            Ok(Err(e)) => {
                log::debug!("cached thumbnail for item {} unreadable: {}", item.id, e);
                None
            }
            Err(e) => {
                log::warn!("thumbnail decode task for item {} failed: {}", item.id, e);
                None
            }
        }
    }

    async fn download(&self, item: &Item) -> Result<Resolved> {
        let Some(cover) = self.covers.resolve_cover(&item.name).await? else {
            return Ok(Resolved::default());
        };

        let cache = self.cache.clone();
        let id = item.id;
        let (stored, thumb) = tokio::task::spawn_blocking(move || -> Result<_> {
            let stored = cache.store(id, &cover)?;
            let thumb = cache.load(&stored.thumb_path)?;
            Ok((stored, thumb))
        })
        .await??;

        let mut updated = item.clone();
        updated.cover_path = Some(stored.cover_path.to_string_lossy().into_owned());
        updated.thumb_path = Some(stored.thumb_path.to_string_lossy().into_owned());

        if let Err(e) = self.storage.update_item(&updated).await {
            log::warn!("could not persist cover for item {}: {}", item.id, e);
        }
        log::info!("stored cover for {:?} at {}", item.name, stored.thumb_path.display());

        Ok(Resolved {
            cover: Some(thumb),
            updated: Some(updated),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use futures::future::{BoxFuture, FutureExt};
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct StubCovers {
        pub calls: AtomicUsize,
        pub image: Option<DynamicImage>,
        pub fail: bool,
    }

    impl CoverService for StubCovers {
        fn resolve_cover<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<Option<DynamicImage>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self.fail {
                Err(Error::UnknownItem(-1))
            } else {
                Ok(self.image.clone())
            };
            async move { result }.boxed()
        }
    }

    pub struct StubNetwork(pub AtomicBool);

    impl StubNetwork {
        pub fn online(online: bool) -> Self {
            StubNetwork(AtomicBool::new(online))
        }
    }

    impl Connectivity for StubNetwork {
        fn is_online(&self) -> BoxFuture<'_, bool> {
            let online = self.0.load(Ordering::SeqCst);
            async move { online }.boxed()
        }
    }

    #[derive(Default)]
    pub struct StubStorage {
        pub updates: Mutex<Vec<Item>>,
        pub progress: Mutex<std::collections::HashMap<i64, u32>>,
        pub delays_ms: Mutex<std::collections::HashMap<i64, u64>>,
    }

    impl Storage for StubStorage {
        fn progress<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<u32>> {
            let value = self.progress.lock().unwrap().get(&item.id).copied();
            let delay = self.delays_ms.lock().unwrap().get(&item.id).copied();
            async move {
                if let Some(ms) = delay {
                    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                }
                value.ok_or(Error::UnknownItem(item.id))
            }
            .boxed()
        }

        fn update_item<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<()>> {
            self.updates.lock().unwrap().push(item.clone());
            async { Ok(()) }.boxed()
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        cache: CoverCache,
        covers: Arc<StubCovers>,
        storage: Arc<StubStorage>,
    }

    fn fixture(covers: StubCovers) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(dir.path().join("covers"), 24);
        Fixture {
            dir,
            cache,
            covers: Arc::new(covers),
            storage: Arc::new(StubStorage::default()),
        }
    }

    fn resolver(f: &Fixture, online: bool) -> FallbackResolver {
        FallbackResolver::new(
            f.cache.clone(),
            f.covers.clone(),
            Arc::new(StubNetwork::online(online)),
            f.storage.clone(),
        )
    }

    fn red(size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([220, 0, 0])))
    }

    #[tokio::test]
    async fn cached_thumbnail_wins_over_network() {
        let f = fixture(StubCovers {
            image: Some(red(100)),
            ..Default::default()
        });
        let stored = f.cache.store(1, &red(48)).unwrap();
        let expected = f.cache.load(&stored.thumb_path).unwrap();

        let mut item = Item::new(1, "Dracula");
        item.thumb_path = Some(stored.thumb_path.to_string_lossy().into_owned());

        let resolved = resolver(&f, true).resolve(&item).await;
        assert_eq!(resolved.cover, Some(expected));
        assert!(resolved.updated.is_none());
        assert_eq!(f.covers.calls.load(Ordering::SeqCst), 0);
        assert!(f.storage.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_generates_monogram_without_mutation() {
        let f = fixture(StubCovers::default());
        let item = Item::new(2, "Frankenstein");

        let resolved = resolver(&f, false).resolve(&item).await;
        assert_eq!(resolved.cover, Some(generate_monogram("Frankenstein", 24)));
        assert!(resolved.updated.is_none());
        assert_eq!(f.covers.calls.load(Ordering::SeqCst), 0);
        assert!(f.storage.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn online_download_is_persisted() {
        let f = fixture(StubCovers {
            image: Some(red(200)),
            ..Default::default()
        });
        let item = Item::new(3, "Emma");

        let resolved = resolver(&f, true).resolve(&item).await;
        let updated = resolved.updated.expect("item should be updated");
        assert_eq!(updated.id, 3);
        assert!(CoverCache::is_usable(updated.thumb_path.as_deref()));
        assert!(CoverCache::is_usable(updated.cover_path.as_deref()));

        let cover = resolved.cover.unwrap();
        assert_eq!((cover.width(), cover.height()), (24, 24));
        assert_eq!(*f.storage.updates.lock().unwrap(), vec![updated]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_downloads_for_one_item_all_succeed() {
        let f = fixture(StubCovers {
            image: Some(red(300)),
            ..Default::default()
        });
        let resolver = Arc::new(resolver(&f, true));
        let item = Item::new(8, "Middlemarch");

        for _ in 0..10 {
            let tasks: Vec<_> = (0..6)
                .map(|_| {
                    let resolver = resolver.clone();
                    let item = item.clone();
                    tokio::spawn(async move { resolver.resolve(&item).await })
                })
                .collect();

            for task in tasks {
                let resolved = task.await.unwrap();
                assert!(resolved.cover.is_some());
                assert!(resolved.updated.is_some());
            }
        }
        assert_eq!(f.storage.updates.lock().unwrap().len(), 60);
    }

    #[tokio::test]
    async fn missing_thumbnail_falls_through() {
        let f = fixture(StubCovers::default());
        let mut item = Item::new(4, "Walden");
        item.thumb_path = Some("/does/not/exist.jpg".to_string());

        let resolved = resolver(&f, false).resolve(&item).await;
        assert_eq!(resolved.cover, Some(generate_monogram("Walden", 24)));
    }

    #[tokio::test]
    async fn corrupt_thumbnail_falls_through() {
        let f = fixture(StubCovers::default());
        let broken = f.dir.path().join("broken.jpg");
        std::fs::write(&broken, b"garbage").unwrap();

        let mut item = Item::new(5, "Rebecca");
        item.thumb_path = Some(broken.to_string_lossy().into_owned());

        let resolved = resolver(&f, false).resolve(&item).await;
        assert_eq!(resolved.cover, Some(generate_monogram("Rebecca", 24)));
    }

    #[tokio::test]
    async fn network_miss_or_failure_gives_nothing() {
        let f = fixture(StubCovers::default());
        let resolved = resolver(&f, true).resolve(&Item::new(6, "Obscure")).await;
        assert!(resolved.cover.is_none());
        assert!(resolved.updated.is_none());
        assert_eq!(f.covers.calls.load(Ordering::SeqCst), 1);

        let f = fixture(StubCovers {
            fail: true,
            ..Default::default()
        });
        let resolved = resolver(&f, true).resolve(&Item::new(7, "Timeout")).await;
        assert!(resolved.cover.is_none());
        assert!(f.storage.updates.lock().unwrap().is_empty());
    }
}
