//! In-memory collaborators for worker tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::encoder::{EncodeOutput, Encoder};
use super::error::{PipelineError, PipelineResult};
use crate::infrastructure::storage::{ObjectStorage, StorageError, StorageResult};
use crate::modules::media::model::MediaAsset;
use crate::modules::media::repository::{AssetStore, StoreError};
use crate::modules::notification::model::Notification;
use crate::modules::notification::service::{Notifier, NotifyError};

#[derive(Default)]
struct StorageState {
    objects: BTreeMap<String, Vec<u8>>,
    uploads: Vec<String>,
    fail_uploads_containing: Vec<String>,
    skip_download_writes: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<StorageState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, data: &[u8]) {
        self.state.lock().unwrap().objects.insert(key.to_string(), data.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn upload_order(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn fail_uploads_containing(&self, pattern: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_uploads_containing
            .push(pattern.to_string());
    }

    /// Downloads report success without writing anything.
    pub fn skip_download_writes(&self) {
        self.state.lock().unwrap().skip_download_writes = true;
    }

    fn store(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_uploads_containing.iter().any(|p| key.contains(p.as_str())) {
            return Err(StorageError::UploadFailed(format!("injected failure for {}", key)));
        }
        state.uploads.push(key.to_string());
        state.objects.insert(key.to_string(), data);
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()> {
        let (data, skip) = {
            let state = self.state.lock().unwrap();
            let data = state
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
            (data, state.skip_download_writes)
        };
        if skip {
            return Ok(());
        }
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        let data = tokio::fs::read(local_path).await?;
        self.store(key, data)
    }

    async fn upload_bytes(&self, data: Bytes, key: &str) -> StorageResult<()> {
        self.store(key, data.to_vec())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        Ok(format!(
            "https://signed.test/{}?expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}

#[derive(Default)]
struct EncoderState {
    calls: Vec<Vec<String>>,
    fail_patterns: Vec<String>,
}

/// Pretends to encode: writes a small file at the output path (the last
/// argument), plus a segment next to any playlist.
#[derive(Clone, Default)]
pub struct ScriptedEncoder {
    state: Arc<Mutex<EncoderState>>,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_when_args_contain(&self, pattern: &str) {
        self.state.lock().unwrap().fail_patterns.push(pattern.to_string());
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn encode(&self, args: &[String]) -> PipelineResult<EncodeOutput> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(args.to_vec());
            state
                .fail_patterns
                .iter()
                .any(|p| args.iter().any(|a| a.contains(p.as_str())))
        };
        if fail {
            return Err(PipelineError::EncodeFailed {
                code: "1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }

        let output = Path::new(args.last().map(String::as_str).unwrap_or_default());
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        if output.extension().is_some_and(|e| e == "m3u8") {
            let segment = output.with_file_name("segment0.ts");
            tokio::fs::write(&segment, b"ts-data").await.unwrap();
            tokio::fs::write(output, "#EXTM3U\n#EXTINF:6.0,\nsegment0.ts\n#EXT-X-ENDLIST\n")
                .await
                .unwrap();
        } else {
            tokio::fs::write(output, b"frame").await.unwrap();
        }

        Ok(EncodeOutput {
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryAssetStore {
    assets: Arc<Mutex<HashMap<Uuid, MediaAsset>>>,
    saves: Arc<Mutex<Vec<MediaAsset>>>,
    failing_saves: Arc<Mutex<usize>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, asset: MediaAsset) {
        self.assets.lock().unwrap().insert(asset.id, asset);
    }

    pub fn asset(&self, id: Uuid) -> MediaAsset {
        self.assets.lock().unwrap()[&id].clone()
    }

    /// The next `count` saves fail with a database error.
    pub fn fail_next_saves(&self, count: usize) {
        *self.failing_saves.lock().unwrap() = count;
    }

    /// Every successfully saved asset state, oldest first.
    pub fn saves(&self) -> Vec<MediaAsset> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn get(&self, id: Uuid) -> Result<Option<MediaAsset>, StoreError> {
        Ok(self.assets.lock().unwrap().get(&id).cloned())
    }

    async fn save(&self, asset: &MediaAsset) -> Result<(), StoreError> {
        {
            let mut failing = self.failing_saves.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
        }
        let mut assets = self.assets.lock().unwrap();
        if !assets.contains_key(&asset.id) {
            return Err(StoreError::Missing(asset.id));
        }
        assets.insert(asset.id, asset.clone());
        self.saves.lock().unwrap().push(asset.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        *notifier.fail.lock().unwrap() = true;
        notifier
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap() {
            return Err(NotifyError::Store(sqlx::Error::PoolClosed));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
