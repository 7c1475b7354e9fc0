//! Object storage for segments, manifests and transcripts.

use crate::error::{Result, VoxcastError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Object key of a chunk's audio segment.
pub fn segment_key(stream_id: &str, chunk_index: u32) -> String {
    format!("streams/{}/segment-{:03}.mp3", stream_id, chunk_index)
}

/// Object key of a stream's playlist.
pub fn manifest_key(stream_id: &str) -> String {
    format!("streams/{}/playlist.m3u8", stream_id)
}

/// Object key of a stream's transcript document.
pub fn transcript_key(stream_id: &str) -> String {
    format!("streams/{}/transcript.json", stream_id)
}

/// What to store and how it should be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHints {
    pub key: String,
    pub content_type: String,
}

impl UploadHints {
    pub fn new(key: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content_type: content_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub url: String,
    pub size_bytes: u64,
}

/// Stores bytes under a key and returns a public URL.
///
/// Uploading to an existing key overwrites it.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, hints: &UploadHints) -> Result<UploadReceipt>;
}

#[async_trait]
impl<T: Uploader + ?Sized> Uploader for Arc<T> {
    async fn upload(&self, bytes: Vec<u8>, hints: &UploadHints) -> Result<UploadReceipt> {
        (**self).upload(bytes, hints).await
    }
}

fn public_url(base_url: &str, key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), key)
}

/// Writes objects under a local directory served at `public_base_url`.
#[derive(Debug, Clone)]
pub struct FsUploader {
    root: PathBuf,
    public_base_url: String,
}

impl FsUploader {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if key.is_empty() || escapes {
            return Err(VoxcastError::Upload {
                key: key.to_string(),
                message: "key must be a relative path without '..'".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Uploader for FsUploader {
    async fn upload(&self, bytes: Vec<u8>, hints: &UploadHints) -> Result<UploadReceipt> {
        let path = self.path_for(&hints.key)?;
        let size_bytes = bytes.len() as u64;

        crate::fs::atomic_write(&path, &bytes)
            .await
            .map_err(|e| VoxcastError::Upload {
                key: hints.key.clone(),
                message: e.to_string(),
            })?;

        tracing::trace!(key = %hints.key, size_bytes, "object written");
        Ok(UploadReceipt {
            url: public_url(&self.public_base_url, &hints.key),
            size_bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct MemoryObjects {
    objects: HashMap<String, StoredObject>,
    uploads: usize,
}

/// In-memory uploader for tests, with failure injection by key.
#[derive(Debug, Clone, Default)]
pub struct MemoryUploader {
    base_url: String,
    state: Arc<Mutex<MemoryObjects>>,
    failing_keys: Arc<Mutex<HashSet<String>>>,
    failing_suffixes: Arc<Mutex<Vec<String>>>,
}

impl MemoryUploader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Fail every upload to exactly `key`.
    pub fn fail_key(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.into());
        }
    }

    /// Fail every upload whose key ends with `suffix` (e.g. `"playlist.m3u8"`).
    pub fn fail_suffix(&self, suffix: impl Into<String>) {
        if let Ok(mut suffixes) = self.failing_suffixes.lock() {
            suffixes.push(suffix.into());
        }
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.clear();
        }
        if let Ok(mut suffixes) = self.failing_suffixes.lock() {
            suffixes.clear();
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.objects.get(key).cloned())
    }

    /// Stored object as UTF-8 text.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|object| String::from_utf8(object.bytes).ok())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state
            .lock()
            .map(|state| state.objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Number of successful uploads, counting overwrites.
    pub fn upload_count(&self) -> usize {
        self.state.lock().map(|state| state.uploads).unwrap_or(0)
    }

    fn should_fail(&self, key: &str) -> bool {
        let by_key = self
            .failing_keys
            .lock()
            .map(|keys| keys.contains(key))
            .unwrap_or(false);
        let by_suffix = self
            .failing_suffixes
            .lock()
            .map(|suffixes| suffixes.iter().any(|s| key.ends_with(s.as_str())))
            .unwrap_or(false);
        by_key || by_suffix
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn upload(&self, bytes: Vec<u8>, hints: &UploadHints) -> Result<UploadReceipt> {
        if self.should_fail(&hints.key) {
            return Err(VoxcastError::Upload {
                key: hints.key.clone(),
                message: "injected upload failure".to_string(),
            });
        }

        let size_bytes = bytes.len() as u64;
        let mut state = self.state.lock().map_err(|_| VoxcastError::Upload {
            key: hints.key.clone(),
            message: "object map poisoned".to_string(),
        })?;
        state.objects.insert(
            hints.key.clone(),
            StoredObject {
                bytes,
                content_type: hints.content_type.clone(),
            },
        );
        state.uploads += 1;

        Ok(UploadReceipt {
            url: public_url(&self.base_url, &hints.key),
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;

    #[test]
    fn test_object_keys() {
        assert_eq!(segment_key("abc", 7), "streams/abc/segment-007.mp3");
        assert_eq!(segment_key("abc", 1234), "streams/abc/segment-1234.mp3");
        assert_eq!(manifest_key("abc"), "streams/abc/playlist.m3u8");
        assert_eq!(transcript_key("abc"), "streams/abc/transcript.json");
    }

    #[tokio::test]
    async fn test_fs_uploader_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = FsUploader::new(dir.path(), "https://cdn.example/");

        let receipt = uploader
            .upload(
                b"audio".to_vec(),
                &UploadHints::new(segment_key("s1", 0), defaults::SEGMENT_CONTENT_TYPE),
            )
            .await
            .unwrap();

        assert_eq!(receipt.url, "https://cdn.example/streams/s1/segment-000.mp3");
        assert_eq!(receipt.size_bytes, 5);
        let written = std::fs::read(dir.path().join("streams/s1/segment-000.mp3")).unwrap();
        assert_eq!(written, b"audio");
    }

    #[tokio::test]
    async fn test_fs_uploader_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = FsUploader::new(dir.path(), "https://cdn.example");

        for key in ["../outside", "/etc/passwd", ""] {
            let result = uploader
                .upload(b"x".to_vec(), &UploadHints::new(key, "text/plain"))
                .await;
            assert!(matches!(result, Err(VoxcastError::Upload { .. })), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_memory_uploader_overwrites_and_counts() {
        let uploader = MemoryUploader::new("mem://bucket");
        let hints = UploadHints::new(manifest_key("s1"), defaults::MANIFEST_CONTENT_TYPE);

        uploader.upload(b"v1".to_vec(), &hints).await.unwrap();
        let receipt = uploader.upload(b"v2".to_vec(), &hints).await.unwrap();

        assert_eq!(receipt.url, "mem://bucket/streams/s1/playlist.m3u8");
        assert_eq!(uploader.get_text(&hints.key).as_deref(), Some("v2"));
        assert_eq!(uploader.upload_count(), 2);
        assert_eq!(uploader.keys(), vec![hints.key.clone()]);
        assert_eq!(
            uploader.get(&hints.key).map(|o| o.content_type),
            Some(defaults::MANIFEST_CONTENT_TYPE.to_string())
        );
    }

    #[tokio::test]
    async fn test_memory_uploader_failure_injection() {
        let uploader = MemoryUploader::new("mem://bucket");
        uploader.fail_suffix("playlist.m3u8");
        uploader.fail_key(segment_key("s1", 1));

        let manifest = UploadHints::new(manifest_key("s1"), "x");
        let segment = UploadHints::new(segment_key("s1", 1), "x");
        let other = UploadHints::new(segment_key("s1", 2), "x");

        assert!(uploader.upload(vec![1], &manifest).await.is_err());
        assert!(uploader.upload(vec![1], &segment).await.is_err());
        assert!(uploader.upload(vec![1], &other).await.is_ok());

        uploader.heal();
        assert!(uploader.upload(vec![1], &manifest).await.is_ok());
    }
}
