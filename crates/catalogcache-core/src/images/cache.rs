use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use lru::LruCache;
use tracing::debug;

use crate::utils::lock::MutexExt;

use super::ImageError;

/// Where image bytes come from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<Bytes, ImageError>;
}

/// A fetched image with its probed format and pixel dimensions.
#[derive(Debug, Clone)]
pub struct Image {
    pub bytes: Bytes,
    pub format: imagesize::ImageType,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Probe the header of `bytes`. Unknown or truncated data is a decode error.
    pub fn decode(bytes: Bytes) -> Result<Self, ImageError> {
        let format = imagesize::image_type(&bytes)?;
        let size = imagesize::blob_size(&bytes)?;
        Ok(Self {
            bytes,
            format,
            width: size.width,
            height: size.height,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCacheConfig {
    /// Keep at most this many images, evicting the least recently used.
    /// `None` keeps everything until `invalidate` or `clear`.
    pub max_entries: Option<NonZeroUsize>,
}

impl ImageCacheConfig {
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            max_entries: NonZeroUsize::new(max_entries),
        }
    }
}

type FetchFuture = BoxFuture<'static, Result<Arc<Image>, ImageError>>;

struct Inner {
    source: Arc<dyn ImageSource>,
    /// Lock order: `in_flight` before `entries`.
    in_flight: Mutex<HashMap<String, WeakShared<FetchFuture>>>,
    entries: Mutex<LruCache<String, Arc<Image>>>,
}

/// URL-keyed image cache with single-flight fetches.
///
/// Clone is cheap and clones share the same entries.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        Self::with_config(source, ImageCacheConfig::default())
    }

    pub fn with_config(source: Arc<dyn ImageSource>, config: ImageCacheConfig) -> Self {
        let entries = match config.max_entries {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            inner: Arc::new(Inner {
                source,
                in_flight: Mutex::new(HashMap::new()),
                entries: Mutex::new(entries),
            }),
        }
    }

    /// Return the image for `url`, fetching it if it is not cached.
    ///
    /// Callers asking for the same URL while a fetch is running wait on that
    /// fetch. Dropping the returned future only cancels the fetch when no
    /// other caller is waiting on it, and a cancelled fetch caches nothing.
    pub async fn fetch(&self, url: &str) -> Result<Arc<Image>, ImageError> {
        let shared = {
            let mut in_flight = self.inner.in_flight.lock_or_recover("fetch");

            if let Some(image) = self.inner.entries.lock_or_recover("fetch").get(url) {
                debug!(url, "Image cache hit");
                return Ok(Arc::clone(image));
            }

            match in_flight.get(url).and_then(WeakShared::upgrade) {
                Some(shared) => {
                    debug!(url, "Joining in-flight image fetch");
                    shared
                }
                None => {
                    in_flight.retain(|_, weak| weak.upgrade().is_some());
                    let shared = self.start_fetch(url);
                    if let Some(weak) = shared.downgrade() {
                        in_flight.insert(url.to_string(), weak);
                    }
                    shared
                }
            }
        };

        shared.await
    }

    fn start_fetch(&self, url: &str) -> Shared<FetchFuture> {
        debug!(url, "Starting image fetch");
        let inner = Arc::clone(&self.inner);
        let url = url.to_string();

        async move {
            let result = match inner.source.fetch_image(&url).await {
                Ok(bytes) => Image::decode(bytes).map(Arc::new),
                Err(e) => Err(e),
            };

            let mut in_flight = inner.in_flight.lock_or_recover("complete");
            in_flight.remove(&url);
            match &result {
                Ok(image) => {
                    debug!(url = %url, width = image.width, height = image.height, "Image cached");
                    inner.entries.lock_or_recover("complete").put(url, Arc::clone(image));
                }
                Err(e) => debug!(url = %url, error = %e, "Image fetch failed"),
            }
            drop(in_flight);

            result
        }
        .boxed()
        .shared()
    }

    /// The cached image for `url`, without fetching.
    pub fn cached(&self, url: &str) -> Option<Arc<Image>> {
        self.inner.entries.lock_or_recover("cached").get(url).cloned()
    }

    /// Forget `url`. A fetch already running for it still caches its result.
    pub fn invalidate(&self, url: &str) -> bool {
        self.inner.entries.lock_or_recover("invalidate").pop(url).is_some()
    }

    pub fn clear(&self) {
        self.inner.entries.lock_or_recover("clear").clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock_or_recover("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Smallest header imagesize accepts as a 2x3 PNG.
    fn png_bytes() -> Bytes {
        let mut data = vec![
            0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
            0, 0, 0, 2, 0, 0, 0, 3,
        ];
        data.resize(33, 0);
        Bytes::from(data)
    }

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: bool,
        garbage: bool,
    }

    impl FakeSource {
        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSource for FakeSource {
        async fn fetch_image(&self, url: &str) -> Result<Bytes, ImageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(ImageError::Fetch(format!("404 for {}", url)));
            }
            if self.garbage {
                return Ok(Bytes::from_static(b"definitely not an image"));
            }
            Ok(png_bytes())
        }
    }

    const URL: &str = "https://img.example.com/1.png";

    #[tokio::test]
    async fn test_fetch_decodes_and_caches() {
        let source = Arc::new(FakeSource::default());
        let cache = ImageCache::new(source.clone());

        let image = cache.fetch(URL).await.unwrap();
        assert_eq!((image.width, image.height), (2, 3));
        assert_eq!(image.format, imagesize::ImageType::Png);

        let again = cache.fetch(URL).await.unwrap();
        assert!(Arc::ptr_eq(&image, &again));
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(FakeSource::gated(gate.clone()));
        let cache = ImageCache::new(source.clone());

        let (a, b, ()) = tokio::join!(cache.fetch(URL), cache.fetch(URL), async {
            tokio::task::yield_now().await;
            gate.notify_one();
        });

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_sole_caller_caches_nothing() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(FakeSource::gated(gate.clone()));
        let cache = ImageCache::new(source.clone());

        let mut pending = Box::pin(cache.fetch(URL));
        assert!(futures::poll!(pending.as_mut()).is_pending());
        drop(pending);
        gate.notify_one();
        tokio::task::yield_now().await;

        assert!(cache.cached(URL).is_none());
        assert!(cache.is_empty());

        // The next caller starts a fresh fetch rather than joining the dead one.
        cache.fetch(URL).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_dropping_one_caller_keeps_fetch_for_others() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(FakeSource::gated(gate.clone()));
        let cache = ImageCache::new(source.clone());

        let mut first = Box::pin(cache.fetch(URL));
        assert!(futures::poll!(first.as_mut()).is_pending());
        let mut second = Box::pin(cache.fetch(URL));
        assert!(futures::poll!(second.as_mut()).is_pending());

        drop(first);
        gate.notify_one();

        let image = second.await.unwrap();
        assert_eq!(image.width, 2);
        assert!(cache.cached(URL).is_some());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let source = Arc::new(FakeSource {
            fail: true,
            ..FakeSource::default()
        });
        let cache = ImageCache::new(source.clone());

        assert!(matches!(cache.fetch(URL).await, Err(ImageError::Fetch(_))));
        assert!(matches!(cache.fetch(URL).await, Err(ImageError::Fetch(_))));
        assert_eq!(source.calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_bytes() {
        let source = Arc::new(FakeSource {
            garbage: true,
            ..FakeSource::default()
        });
        let cache = ImageCache::new(source);

        assert!(matches!(cache.fetch(URL).await, Err(ImageError::Decode(_))));
        assert!(cache.cached(URL).is_none());
    }

    #[tokio::test]
    async fn test_bounded_cache_evicts_least_recently_used() {
        let source = Arc::new(FakeSource::default());
        let cache = ImageCache::with_config(source.clone(), ImageCacheConfig::bounded(2));

        cache.fetch("https://img.example.com/a.png").await.unwrap();
        cache.fetch("https://img.example.com/b.png").await.unwrap();
        assert!(cache.cached("https://img.example.com/a.png").is_some());
        cache.fetch("https://img.example.com/c.png").await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.cached("https://img.example.com/a.png").is_some());
        assert!(cache.cached("https://img.example.com/b.png").is_none());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let source = Arc::new(FakeSource::default());
        let cache = ImageCache::new(source.clone());

        cache.fetch(URL).await.unwrap();
        assert!(cache.invalidate(URL));
        assert!(!cache.invalidate(URL));
        cache.fetch(URL).await.unwrap();
        assert_eq!(source.calls(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
