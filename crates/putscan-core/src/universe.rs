//! Ticker-universe resolution and caching.
//!
//! The universe comes from, in priority order: an inline request list
//! (which bypasses file loading entirely), an explicit override path, or
//! the larger of two well-known files under the data directory. Parsed
//! file contents are held in an explicit cache owned by the provider, with
//! an explicit invalidate operation.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::Ticker;

/// Well-known universe files, probed in order under the data directory.
pub const UNIVERSE_CANDIDATES: [&str; 2] = ["universe_all.txt", "universe.txt"];

/// Parse a symbol list: split on commas and whitespace, uppercase,
/// de-duplicate, drop anything that fails ticker validation. The result is
/// sorted, so identical inputs always produce identical universes.
pub fn parse_universe(input: &str) -> Vec<Ticker> {
    let mut set = BTreeSet::new();
    for raw in input.split(|c: char| c == ',' || c.is_whitespace()) {
        if raw.is_empty() {
            continue;
        }
        if let Ok(ticker) = Ticker::parse(raw) {
            set.insert(ticker);
        }
    }
    set.into_iter().collect()
}

/// Parsed-universe cache keyed by file path.
#[derive(Debug, Clone, Default)]
pub struct UniverseCache {
    inner: Arc<RwLock<HashMap<PathBuf, Vec<Ticker>>>>,
}

impl UniverseCache {
    pub async fn get(&self, path: &Path) -> Option<Vec<Ticker>> {
        self.inner.read().await.get(path).cloned()
    }

    pub async fn put(&self, path: PathBuf, tickers: Vec<Ticker>) {
        self.inner.write().await.insert(path, tickers);
    }

    /// Drop every cached file so the next resolve re-reads from disk.
    pub async fn invalidate(&self) {
        self.inner.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Resolves the ticker universe for a scan request.
#[derive(Debug, Clone)]
pub struct UniverseProvider {
    data_dir: PathBuf,
    override_path: Option<PathBuf>,
    cache: UniverseCache,
}

impl UniverseProvider {
    pub fn new(data_dir: impl Into<PathBuf>, override_path: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            override_path,
            cache: UniverseCache::default(),
        }
    }

    /// Resolve the universe. An inline list bypasses files entirely. A
    /// missing universe is not an error: the scan runs over an empty list
    /// and returns a well-formed empty result.
    pub async fn resolve(&self, inline: Option<&str>) -> Vec<Ticker> {
        if let Some(inline) = inline {
            return parse_universe(inline);
        }

        if let Some(path) = self.override_path.clone() {
            return self.load(path).await;
        }

        let mut best: Vec<Ticker> = Vec::new();
        for name in UNIVERSE_CANDIDATES {
            let path = self.data_dir.join(name);
            if !path.exists() {
                continue;
            }
            let parsed = self.load(path).await;
            if parsed.len() > best.len() {
                best = parsed;
            }
        }

        if best.is_empty() {
            tracing::warn!(dir = %self.data_dir.display(), "no universe file found");
        }
        best
    }

    /// Invalidate the file cache so the next resolve re-reads from disk.
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    async fn load(&self, path: PathBuf) -> Vec<Ticker> {
        if let Some(cached) = self.cache.get(&path).await {
            return cached;
        }

        let parsed = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_universe(&contents),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to read universe file");
                Vec::new()
            }
        };

        self.cache.put(path, parsed.clone()).await;
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn names(tickers: &[Ticker]) -> Vec<&str> {
        tickers.iter().map(Ticker::as_str).collect()
    }

    #[test]
    fn parse_dedupes_uppercases_and_orders() {
        let parsed = parse_universe("msft, aapl\nAAPL\tgoog  msft");
        assert_eq!(names(&parsed), vec!["AAPL", "GOOG", "MSFT"]);
    }

    #[test]
    fn parse_drops_malformed_symbols() {
        let parsed = parse_universe("AAPL, 9LIVES, $SPY, BRK-B");
        assert_eq!(names(&parsed), vec!["AAPL", "BRK-B"]);
    }

    #[tokio::test]
    async fn inline_list_bypasses_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("universe.txt"), "MSFT\nGOOG").expect("write");
        let provider = UniverseProvider::new(dir.path(), None);

        let resolved = provider.resolve(Some("aapl,tsla")).await;
        assert_eq!(names(&resolved), vec!["AAPL", "TSLA"]);
    }

    #[tokio::test]
    async fn larger_candidate_file_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("universe.txt"), "MSFT\nGOOG").expect("write");
        std::fs::write(
            dir.path().join("universe_all.txt"),
            "AAPL\nMSFT\nGOOG\nTSLA\nNVDA",
        )
        .expect("write");
        let provider = UniverseProvider::new(dir.path(), None);

        let resolved = provider.resolve(None).await;
        assert_eq!(resolved.len(), 5);
    }

    #[tokio::test]
    async fn override_path_takes_priority() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("universe_all.txt"), "AAPL\nMSFT\nGOOG").expect("write");
        let override_path = dir.path().join("watchlist.txt");
        std::fs::write(&override_path, "TSLA").expect("write");
        let provider = UniverseProvider::new(dir.path(), Some(override_path));

        let resolved = provider.resolve(None).await;
        assert_eq!(names(&resolved), vec!["TSLA"]);
    }

    #[tokio::test]
    async fn missing_files_resolve_to_empty_universe() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = UniverseProvider::new(dir.path(), None);

        assert!(provider.resolve(None).await.is_empty());
    }

    #[tokio::test]
    async fn cache_serves_stale_reads_until_invalidated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("universe.txt");
        std::fs::write(&path, "AAPL").expect("write");
        let provider = UniverseProvider::new(dir.path(), None);

        assert_eq!(provider.resolve(None).await.len(), 1);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open");
        writeln!(file, "\nMSFT").expect("append");

        // Cached contents still served.
        assert_eq!(provider.resolve(None).await.len(), 1);

        provider.invalidate().await;
        assert_eq!(provider.resolve(None).await.len(), 2);
    }
}
