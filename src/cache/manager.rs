//! Cache storage persisted to disk
//!
//! Provides a `DiskCacheStorage` that keeps each cache generation in its own
//! directory. Each entry is one file holding a length-prefixed JSON header
//! followed by the raw body. The file is written under a temporary name and
//! renamed into place, so that rename is the only commit point: a reader sees
//! either the previous entry or the new one, never a mix.
//!
//! ```text
//! <root>/<generation-id>/generation.json
//! <root>/<generation-id>/entries/<entry-id>.entry
//!
//! entry file: [u32 big-endian header length][JSON header][body bytes]
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;
use url::Url;

use super::{ensure_storable, CacheStorage, StoreError};
use crate::fetch::{RequestKey, Response, ResponseType};

const GENERATION_FILE: &str = "generation.json";
const ENTRIES_DIR: &str = "entries";
const ENTRY_EXT: &str = "entry";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metadata identifying a generation directory
#[derive(Debug, Serialize, Deserialize)]
struct GenerationMeta {
    /// Generation name as given by the caller
    name: String,
    /// When the generation was first opened
    created_at: DateTime<Utc>,
}

/// Header of one stored response; the body follows it in the same file
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    response_type: ResponseType,
    url: Option<String>,
    /// When the entry was written
    stored_at: DateTime<Utc>,
}

/// Manages cache generations stored on disk
///
/// Uses an XDG-compliant cache directory (`~/.cache/nutritrack-offline/` on
/// Linux) unless a directory is given explicitly.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    /// Directory holding one subdirectory per generation
    cache_dir: PathBuf,
}

impl DiskCacheStorage {
    /// Creates a storage rooted in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "nutritrack-offline")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a storage rooted in a custom directory
    ///
    /// Useful for testing or when a specific cache location is needed.
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn generation_dir(&self, name: &str) -> PathBuf {
        self.cache_dir.join(&hex_digest(name)[..16])
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.generation_dir(name)
            .join(ENTRIES_DIR)
            .join(format!("{}.{}", hex_digest(&key.to_string()), ENTRY_EXT))
    }

    /// Reads the metadata of the generation stored under `name`, if it exists
    async fn generation_meta(&self, name: &str) -> Result<Option<GenerationMeta>, StoreError> {
        let path = self.generation_dir(name).join(GENERATION_FILE);
        match read_optional(&path).await? {
            Some(bytes) => {
                let meta: GenerationMeta = serde_json::from_slice(&bytes)?;
                Ok((meta.name == name).then_some(meta))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        let dir = self.generation_dir(name);
        fs::create_dir_all(dir.join(ENTRIES_DIR)).await?;

        if self.generation_meta(name).await?.is_none() {
            let meta = GenerationMeta {
                name: name.to_string(),
                created_at: Utc::now(),
            };
            write_atomic(&dir.join(GENERATION_FILE), &serde_json::to_vec_pretty(&meta)?).await?;
            debug!(generation = name, dir = %dir.display(), "created cache generation");
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(bytes) = read_optional(&entry.path().join(GENERATION_FILE)).await? else {
                continue;
            };
            match serde_json::from_slice::<GenerationMeta>(&bytes) {
                Ok(meta) => found.push(meta),
                Err(e) => debug!(dir = %entry.path().display(), "skipping unreadable generation: {}", e),
            }
        }

        found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(found.into_iter().map(|meta| meta.name).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        if self.generation_meta(name).await?.is_none() {
            return Ok(false);
        }
        fs::remove_dir_all(self.generation_dir(name)).await?;
        Ok(true)
    }

    async fn match_in(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<Response>, StoreError> {
        let path = self.entry_path(name, key);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        let (entry, body) = decode_entry(&path, bytes)?;
        if entry.key != *key {
            return Ok(None);
        }

        Ok(Some(Response {
            status: entry.status,
            headers: entry.headers,
            body,
            response_type: entry.response_type,
            url: entry.url.and_then(|u| Url::parse(&u).ok()),
        }))
    }

    async fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<(), StoreError> {
        ensure_storable(&key)?;
        self.open(name).await?;

        let path = self.entry_path(name, &key);
        let entry = StoredEntry {
            key,
            status: response.status,
            headers: response.headers,
            response_type: response.response_type,
            url: response.url.map(|u| u.to_string()),
            stored_at: Utc::now(),
        };

        write_atomic(&path, &encode_entry(&entry, &response.body)?).await?;
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>, StoreError> {
        if self.generation_meta(name).await?.is_none() {
            return Ok(Vec::new());
        }
        let mut dir = match fs::read_dir(self.generation_dir(name).join(ENTRIES_DIR)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let Some(bytes) = read_optional(&path).await? else {
                continue;
            };
            let (stored, _) = decode_entry(&path, bytes)?;
            keys.push(stored.key);
        }
        keys.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| a.method.cmp(&b.method)));
        Ok(keys)
    }
}

fn hex_digest(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn encode_entry(entry: &StoredEntry, body: &[u8]) -> Result<Vec<u8>, StoreError> {
    let header = serde_json::to_vec(entry)?;
    let len = u32::try_from(header.len())
        .map_err(|_| StoreError::Corrupt(format!("entry header too large: {}", entry.key)))?;

    let mut out = Vec::with_capacity(4 + header.len() + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(body);
    Ok(out)
}

fn decode_entry(path: &Path, mut bytes: Vec<u8>) -> Result<(StoredEntry, Vec<u8>), StoreError> {
    let corrupt = || StoreError::Corrupt(path.display().to_string());

    let prefix: [u8; 4] = bytes
        .get(..4)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(corrupt)?;
    let header_end = 4 + u32::from_be_bytes(prefix) as usize;
    if bytes.len() < header_end {
        return Err(corrupt());
    }

    let entry: StoredEntry = serde_json::from_slice(&bytes[4..header_end])?;
    let body = bytes.split_off(header_end);
    Ok((entry, body))
}

async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(
        ".tmp-{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await
}
