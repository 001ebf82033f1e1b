//! On-disk cache of player source files, keyed by a stable fingerprint of
//! the player URL. Guarantees at most one concurrent download per target
//! path (single-flight via a shared, cloneable future) and a startup sweep
//! that evicts entries untouched for more than 14 days.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

const ENTRY_MAX_AGE: Duration = Duration::from_secs(14 * 24 * 3600);
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_SANITIZED_ID_LEN: usize = 120;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("invalid player URL: {0}")]
    InvalidPlayerUrl(String),
    #[error("player fetch failed with status {0}")]
    PlayerFetchFailed(String),
    #[error("cache I/O error: {0}")]
    Io(String),
}

static PLAYER_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"/s/player/([^/]+)/").unwrap());

const ALLOWED_HOSTS: [&str; 3] = ["youtube.com", "www.youtube.com", "m.youtube.com"];

/// Validates and normalizes a caller-supplied player URL: must be
/// `https://{youtube.com|www.youtube.com|m.youtube.com}/…`, or a relative
/// path beginning with `/s/player/`, which is rewritten onto the `www`
/// host. Anything else is rejected before it ever reaches the cache.
pub fn normalize_player_url(raw: &str) -> Result<String, CacheError> {
    if let Some(path) = raw.strip_prefix("/s/player/") {
        return Ok(format!("https://www.youtube.com/s/player/{path}"));
    }

    let parsed = url::Url::parse(raw).map_err(|_| CacheError::InvalidPlayerUrl(raw.to_string()))?;
    if parsed.scheme() != "https" {
        return Err(CacheError::InvalidPlayerUrl(raw.to_string()));
    }
    let host = parsed.host_str().unwrap_or_default();
    if !ALLOWED_HOSTS.contains(&host) {
        return Err(CacheError::InvalidPlayerUrl(raw.to_string()));
    }
    Ok(parsed.to_string())
}

fn sha256_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

fn sanitize_player_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Derives the cache key for an already-validated player URL.
pub fn cache_key(validated_url: &str, ignore_region: bool) -> String {
    if ignore_region {
        if let Some(captures) = PLAYER_ID_PATTERN.captures(validated_url) {
            let sanitized = sanitize_player_id(&captures[1]);
            if sanitized.len() <= MAX_SANITIZED_ID_LEN {
                return sanitized;
            }
        }
    }
    sha256_key(validated_url)
}

type FetchFuture = Shared<BoxFuture<'static, Result<PathBuf, CacheError>>>;

pub struct PlayerCache {
    cache_dir: PathBuf,
    ignore_region: bool,
    client: reqwest::Client,
    in_flight: Mutex<HashMap<PathBuf, FetchFuture>>,
}

impl PlayerCache {
    pub fn new(cache_dir: PathBuf, ignore_region: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            cache_dir,
            ignore_region,
            client,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the on-disk path containing the player source for
    /// `player_url`, fetching it first if necessary. At most one fetch runs
    /// per target path at a time; late callers await the in-progress one.
    pub async fn get_player_file_path(&self, player_url: &str) -> Result<PathBuf, CacheError> {
        let validated = normalize_player_url(player_url)?;
        self.get_player_file_path_for_validated_url(&validated).await
    }

    /// Same as `get_player_file_path`, but takes a URL that has already
    /// passed `normalize_player_url` (or is otherwise known-safe), skipping
    /// the host allowlist. Exists as a seam so tests can single-flight
    /// against a local mock HTTP server, which cannot live on an
    /// `*.youtube.com` host; production callers should go through
    /// `get_player_file_path`.
    pub async fn get_player_file_path_for_validated_url(&self, validated: &str) -> Result<PathBuf, CacheError> {
        let key = cache_key(validated, self.ignore_region);
        let filepath = self.cache_dir.join(format!("{key}.js"));

        loop {
            if tokio::fs::metadata(&filepath).await.is_ok() {
                touch_mtime(&filepath).await;
                return Ok(filepath);
            }

            let (future, we_registered) = {
                let mut guard = self.in_flight.lock().expect("in-flight mutex poisoned");
                if let Some(existing) = guard.get(&filepath) {
                    (existing.clone(), false)
                } else {
                    let fresh = fetch_and_write(self.client.clone(), validated.to_string(), filepath.clone())
                        .boxed()
                        .shared();
                    guard.insert(filepath.clone(), fresh.clone());
                    (fresh, true)
                }
            };

            let result = future.await;

            {
                let mut guard = self.in_flight.lock().expect("in-flight mutex poisoned");
                guard.remove(&filepath);
            }

            match result {
                Ok(path) => return Ok(path),
                Err(err) if we_registered => return Err(err),
                Err(_) => continue, // someone else's fetch failed; retry with a fetch of our own
            }
        }
    }

    /// Deletes entries untouched for more than 14 days, then publishes the
    /// `player` size gauge. Errors reading individual entries are logged
    /// and skipped rather than treated as fatal.
    pub async fn sweep_stale_entries(&self) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;

        let mut read_dir = tokio::fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;

        let now = SystemTime::now();
        let mut kept = 0usize;

        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read next cache directory entry");
                    break;
                }
            };

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(err) => {
                    tracing::warn!(path = ?entry.path(), error = %err, "failed to stat cache entry, skipping");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let newest = [metadata.accessed(), metadata.modified(), metadata.created()]
                .into_iter()
                .filter_map(Result::ok)
                .max();

            let stale = match newest {
                Some(newest) => now.duration_since(newest).unwrap_or(Duration::ZERO) > ENTRY_MAX_AGE,
                None => false,
            };

            if stale {
                if let Err(err) = tokio::fs::remove_file(entry.path()).await {
                    tracing::warn!(path = ?entry.path(), error = %err, "failed to evict stale cache entry");
                }
            } else {
                kept += 1;
            }
        }

        crate::metrics::cache_size("player", kept);
        tracing::info!(kept, "player file cache startup sweep complete");
        Ok(())
    }
}

async fn touch_mtime(path: &Path) {
    let path = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        file.set_modified(SystemTime::now())
    })
    .await;
    if let Ok(Err(err)) = result {
        tracing::warn!(error = %err, "failed to touch player cache entry mtime");
    }
}

async fn fetch_and_write(client: reqwest::Client, url: String, filepath: PathBuf) -> Result<PathBuf, CacheError> {
    tracing::info!(url = %url, "fetching player script");

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            crate::metrics::player_script_fetch(url.clone(), "error".to_string());
            return Err(CacheError::Io(err.to_string()));
        }
    };

    let status = response.status();
    crate::metrics::player_script_fetch(url.clone(), status.as_str().to_string());
    if !status.is_success() {
        return Err(CacheError::PlayerFetchFailed(status.as_str().to_string()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| CacheError::Io(e.to_string()))?;

    let cache_dir = filepath
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| CacheError::Io("cache file path has no parent directory".to_string()))?;
    tokio::fs::create_dir_all(&cache_dir)
        .await
        .map_err(|e| CacheError::Io(e.to_string()))?;

    let final_path = filepath.clone();
    tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
        let mut temp = tempfile::NamedTempFile::new_in(&cache_dir).map_err(|e| CacheError::Io(e.to_string()))?;
        std::io::Write::write_all(&mut temp, &body).map_err(|e| CacheError::Io(e.to_string()))?;
        if final_path.exists() {
            let _ = std::fs::remove_file(&final_path);
        }
        temp.persist(&final_path).map_err(|e| CacheError::Io(e.to_string()))?;
        Ok(())
    })
    .await
    .map_err(|e| CacheError::Io(e.to_string()))??;

    let count = count_cache_files(&filepath).await;
    crate::metrics::cache_size("player", count);

    Ok(filepath)
}

async fn count_cache_files(filepath: &Path) -> usize {
    let Some(dir) = filepath.parent() else {
        return 0;
    };
    let Ok(mut read_dir) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut count = 0usize;
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            count += 1;
        }
    }
    count
}
