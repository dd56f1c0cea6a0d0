//! Lazy, memoizing resolution of fulfillment models to local snapshots.
//!
//! [`ModelCache`] maps a menu item to its registered hub repository and asks
//! an [`ArtifactStore`] for a local copy the first time the item is needed.
//! The resulting path is remembered for the lifetime of the cache; a second
//! lookup never touches the store.  Nothing is ever evicted.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hf_hub::api::sync::ApiBuilder;
use hf_hub::Cache;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("hub request failed: {0}")]
    Api(String),

    #[error("repository '{0}' has no files")]
    EmptyRepo(String),

    #[error("download task failed: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no model registered for '{0}'")]
    Unregistered(String),

    #[error("could not fetch model for '{item}': {source}")]
    Fetch {
        item: String,
        #[source]
        source: StoreError,
    },
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Downloads a model repository and returns its local directory.
pub trait ArtifactStore: Send + Sync {
    /// Fetch `repo_id` into `cache_root`, or the store's default cache when
    /// `None`.  Blocking.
    fn fetch(&self, repo_id: &str, cache_root: Option<&Path>) -> Result<PathBuf, StoreError>;
}

/// Snapshot download from the Hugging Face Hub.
#[derive(Debug, Clone, Default)]
pub struct HfHubStore;

impl HfHubStore {
    pub fn new() -> Self {
        Self
    }
}

/// Snapshot directory that an earlier download of `repo_id` left under
/// `cache_dir`, following the hub cache layout
/// (`models--{org}--{name}/refs/main` naming a `snapshots/{commit}` dir).
pub(crate) fn cached_snapshot(cache_dir: &Path, repo_id: &str) -> Option<PathBuf> {
    let repo_dir = cache_dir.join(format!("models--{}", repo_id.replace('/', "--")));
    let commit = std::fs::read_to_string(repo_dir.join("refs").join("main")).ok()?;
    let snapshot = repo_dir.join("snapshots").join(commit.trim());
    snapshot.is_dir().then_some(snapshot)
}

impl ArtifactStore for HfHubStore {
    /// Lists the repository on the hub and downloads any missing files, so
    /// every call needs the network.  When the listing fails, a snapshot
    /// left in the cache by an earlier run is used instead; persistence
    /// across runs lives entirely in that on-disk cache.
    fn fetch(&self, repo_id: &str, cache_root: Option<&Path>) -> Result<PathBuf, StoreError> {
        let cache_dir = match cache_root {
            Some(root) => root.to_path_buf(),
            None => Cache::from_env().path().clone(),
        };
        let builder = match cache_root {
            Some(root) => ApiBuilder::new().with_cache_dir(root.to_path_buf()),
            None => ApiBuilder::from_env(),
        };
        let api = builder
            .with_progress(false)
            .build()
            .map_err(|e| StoreError::Api(format!("client init: {e}")))?;
        let repo = api.model(repo_id.to_string());

        let info = match repo.info() {
            Ok(info) => info,
            Err(e) => {
                return match cached_snapshot(&cache_dir, repo_id) {
                    Some(snapshot) => {
                        log::warn!(
                            "cache: hub unreachable for {repo_id} ({e}); using {}",
                            snapshot.display()
                        );
                        Ok(snapshot)
                    }
                    None => Err(StoreError::Api(format!("{repo_id}: {e}"))),
                };
            }
        };

        let mut snapshot: Option<PathBuf> = None;
        for sibling in &info.siblings {
            let local = repo
                .get(&sibling.rfilename)
                .map_err(|e| StoreError::Api(format!("{repo_id}/{}: {e}", sibling.rfilename)))?;

            if snapshot.is_none() {
                // Walk back up past the file's own path components.
                let depth = Path::new(&sibling.rfilename).components().count();
                snapshot = local.ancestors().nth(depth).map(Path::to_path_buf);
            }
        }

        snapshot.ok_or_else(|| StoreError::EmptyRepo(repo_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ModelCache
// ---------------------------------------------------------------------------

/// Menu item → local model path, resolved on first use.
pub struct ModelCache {
    registry: BTreeMap<String, String>,
    store: Arc<dyn ArtifactStore>,
    cache_root: Option<PathBuf>,
    resolved: HashMap<String, PathBuf>,
}

impl ModelCache {
    pub fn new(
        registry: BTreeMap<String, String>,
        store: Arc<dyn ArtifactStore>,
        cache_root: Option<PathBuf>,
    ) -> Self {
        Self {
            registry,
            store,
            cache_root,
            resolved: HashMap::new(),
        }
    }

    /// Remote repository registered for `item`.
    pub fn repo_id(&self, item: &str) -> Option<&str> {
        self.registry.get(item).map(String::as_str)
    }

    /// Path already resolved for `item`, without fetching.
    pub fn cached(&self, item: &str) -> Option<&Path> {
        self.resolved.get(item).map(PathBuf::as_path)
    }

    /// Local path of `item`'s model, downloading it on first use.
    ///
    /// The download runs on the blocking thread pool.
    pub async fn resolve(&mut self, item: &str) -> Result<PathBuf, ResolveError> {
        if let Some(path) = self.resolved.get(item) {
            log::debug!("cache: hit for '{item}'");
            return Ok(path.clone());
        }

        let repo_id = self
            .registry
            .get(item)
            .cloned()
            .ok_or_else(|| ResolveError::Unregistered(item.to_string()))?;

        log::info!("cache: fetching '{item}' from {repo_id}");
        let store = Arc::clone(&self.store);
        let root = self.cache_root.clone();
        let fetched = tokio::task::spawn_blocking(move || store.fetch(&repo_id, root.as_deref()))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))
            .and_then(|r| r)
            .map_err(|source| ResolveError::Fetch {
                item: item.to_string(),
                source,
            })?;

        log::info!("cache: '{item}' ready at {}", fetched.display());
        self.resolved.insert(item.to_string(), fetched.clone());
        Ok(fetched)
    }

    /// Resolve every item in `items`.  Unregistered names and failed fetches
    /// are logged and skipped; the rest are returned.
    pub async fn resolve_all<S: AsRef<str>>(&mut self, items: &[S]) -> BTreeMap<String, PathBuf> {
        let mut out = BTreeMap::new();
        for item in items {
            let item = item.as_ref();
            match self.resolve(item).await {
                Ok(path) => {
                    out.insert(item.to_string(), path);
                }
                Err(ResolveError::Unregistered(name)) => {
                    log::warn!("cache: '{name}' has no registered model, skipping");
                }
                Err(e) => log::warn!("cache: {e}"),
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Counts fetches per repository; fails for the listed repositories.
#[cfg(test)]
#[derive(Default)]
pub struct CountingStore {
    pub fetches: std::sync::Mutex<Vec<String>>,
    pub failing: Vec<String>,
}

#[cfg(test)]
impl CountingStore {
    pub fn failing_for(repos: &[&str]) -> Self {
        Self {
            fetches: Default::default(),
            failing: repos.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn fetch_count(&self, repo_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == repo_id)
            .count()
    }

    pub fn total(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[cfg(test)]
impl ArtifactStore for CountingStore {
    fn fetch(&self, repo_id: &str, cache_root: Option<&Path>) -> Result<PathBuf, StoreError> {
        self.fetches.lock().unwrap().push(repo_id.to_string());
        if self.failing.iter().any(|r| r == repo_id) {
            return Err(StoreError::Api(format!("{repo_id}: 404")));
        }
        let root = cache_root.unwrap_or_else(|| Path::new("/hf-cache"));
        Ok(root.join(repo_id.replace('/', "--")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BTreeMap<String, String> {
        [
            ("egg", "ns/ServeEggSushi"),
            ("tuna", "ns/ServeTunaSushi"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn cache_with(store: &Arc<CountingStore>, root: Option<PathBuf>) -> ModelCache {
        let dyn_store: Arc<dyn ArtifactStore> = store.clone();
        ModelCache::new(registry(), dyn_store, root)
    }

    #[test]
    fn earlier_snapshot_is_found_in_hub_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("models--ns--ServeTunaSushi");
        std::fs::create_dir_all(repo_dir.join("refs")).unwrap();
        std::fs::create_dir_all(repo_dir.join("snapshots").join("abc123")).unwrap();
        std::fs::write(repo_dir.join("refs").join("main"), "abc123\n").unwrap();

        assert_eq!(
            cached_snapshot(dir.path(), "ns/ServeTunaSushi"),
            Some(repo_dir.join("snapshots").join("abc123"))
        );
    }

    #[test]
    fn missing_or_dangling_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cached_snapshot(dir.path(), "ns/ServeEggSushi"), None);

        let repo_dir = dir.path().join("models--ns--ServeEggSushi");
        std::fs::create_dir_all(repo_dir.join("refs")).unwrap();
        std::fs::write(repo_dir.join("refs").join("main"), "deadbeef").unwrap();
        assert_eq!(cached_snapshot(dir.path(), "ns/ServeEggSushi"), None);
    }

    #[tokio::test]
    async fn repeated_resolution_fetches_once() {
        let store = Arc::new(CountingStore::default());
        let mut cache = cache_with(&store, Some(PathBuf::from("/models")));

        let first = cache.resolve("tuna").await.unwrap();
        let second = cache.resolve("tuna").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("/models/ns--ServeTunaSushi"));
        assert_eq!(store.fetch_count("ns/ServeTunaSushi"), 1);
        assert_eq!(cache.cached("tuna"), Some(first.as_path()));
    }

    #[tokio::test]
    async fn default_cache_root_is_left_to_the_store() {
        let store = Arc::new(CountingStore::default());
        let mut cache = cache_with(&store, None);
        assert_eq!(
            cache.resolve("egg").await.unwrap(),
            PathBuf::from("/hf-cache/ns--ServeEggSushi")
        );
    }

    #[tokio::test]
    async fn unregistered_item_is_an_error_without_fetching() {
        let store = Arc::new(CountingStore::default());
        let mut cache = cache_with(&store, None);

        let err = cache.resolve("salmon").await.unwrap_err();
        assert!(matches!(err, ResolveError::Unregistered(ref n) if n == "salmon"));
        assert_eq!(store.total(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_memoized() {
        let store = Arc::new(CountingStore::failing_for(&["ns/ServeEggSushi"]));
        let mut cache = cache_with(&store, None);

        assert!(matches!(
            cache.resolve("egg").await,
            Err(ResolveError::Fetch { .. })
        ));
        assert!(cache.resolve("egg").await.is_err());
        assert_eq!(store.fetch_count("ns/ServeEggSushi"), 2);
        assert!(cache.cached("egg").is_none());
    }

    #[tokio::test]
    async fn resolve_all_isolates_failures_and_skips_unknown() {
        let store = Arc::new(CountingStore::failing_for(&["ns/ServeEggSushi"]));
        let mut cache = cache_with(&store, None);

        let resolved = cache.resolve_all(&["egg", "salmon", "tuna", "tuna"]).await;

        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("tuna"));
        assert_eq!(store.fetch_count("ns/ServeTunaSushi"), 1);
    }

    #[test]
    fn hub_store_is_object_safe() {
        let store: Arc<dyn ArtifactStore> = Arc::new(HfHubStore::new());
        drop(store);
    }
}
