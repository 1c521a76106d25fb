//! Media processing state machine.
//!
//! One run takes a video asset through
//! `PENDING -> RESOLVING -> TRANSCODING -> PUBLISHING -> READY`, or to
//! `FAILED` from any stage before READY. The asset's storage key is only
//! rewritten after the publisher reports that every output file landed, and
//! the run's outcome is persisted with a single save.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::encoder::Encoder;
use super::error::{PipelineError, PipelineResult};
use super::publisher::{OutputPublisher, is_manifest_key};
use super::source::{SourceResolver, StorageLayout};
use super::transcoder::VariantTranscoder;
use super::workspace::Workspace;
use crate::config::settings::MediaConfig;
use crate::infrastructure::storage::ObjectStorage;
use crate::modules::media::model::{MediaAsset, MediaKind, ProcessingStatus};
use crate::modules::media::repository::AssetStore;
use crate::modules::notification::model::Notification;
use crate::modules::notification::service::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Pending,
    Resolving,
    Transcoding,
    Publishing,
    Ready,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Pending => "PENDING",
            PipelineStage::Resolving => "RESOLVING",
            PipelineStage::Transcoding => "TRANSCODING",
            PipelineStage::Publishing => "PUBLISHING",
            PipelineStage::Ready => "READY",
            PipelineStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    /// Published; the asset now points at `manifest_key`.
    Ready { manifest_key: String },
    /// Persisted as FAILED. `stage` is where the run stopped.
    Failed {
        stage: PipelineStage,
        error: PipelineError,
    },
    /// Nothing to do for this kind of media.
    Skipped,
}

/// Collaborators the pipeline is built from.
pub struct PipelineDeps {
    pub assets: Arc<dyn AssetStore>,
    pub notifier: Arc<dyn Notifier>,
    pub storage: Arc<dyn ObjectStorage>,
    pub encoder: Arc<dyn Encoder>,
}

pub struct MediaPipeline {
    assets: Arc<dyn AssetStore>,
    notifier: Arc<dyn Notifier>,
    layout: StorageLayout,
    resolver: SourceResolver,
    transcoder: VariantTranscoder,
    publisher: OutputPublisher,
    workspace_root: PathBuf,
    notify_on_failure: bool,
}

impl MediaPipeline {
    pub fn new(deps: PipelineDeps, config: &MediaConfig) -> Self {
        Self {
            assets: deps.assets,
            notifier: deps.notifier,
            layout: StorageLayout::new(config.local_prefix.clone(), config.local_root.clone()),
            resolver: SourceResolver::new(Arc::clone(&deps.storage)),
            transcoder: VariantTranscoder::new(deps.encoder),
            publisher: OutputPublisher::new(deps.storage),
            workspace_root: config.transcode_dir.clone(),
            notify_on_failure: config.notify_on_failure,
        }
    }

    /// Runs the pipeline for one asset.
    ///
    /// Stage failures are not errors here: they are persisted and reported
    /// as [`PipelineOutcome::Failed`]. `Err` means the asset could not be
    /// loaded or its outcome could not be saved.
    #[tracing::instrument(name = "media_pipeline", skip_all, fields(media_id = %media_id))]
    pub async fn process(&self, media_id: Uuid) -> PipelineResult<PipelineOutcome> {
        let mut asset = self
            .assets
            .get(media_id)
            .await?
            .ok_or(PipelineError::AssetNotFound(media_id))?;

        if asset.kind != MediaKind::Video {
            warn!("Media is a {}, not a video. Skipping.", asset.kind.as_str());
            return Ok(PipelineOutcome::Skipped);
        }

        if is_manifest_key(&asset.storage_key) {
            warn!(
                "Media already points at published output {}. Skipping.",
                asset.storage_key
            );
            return Ok(PipelineOutcome::Skipped);
        }

        if asset.status != ProcessingStatus::Pending {
            info!("Re-processing media previously marked {}", asset.status);
            asset.status = ProcessingStatus::Pending;
        }

        let mut stage = PipelineStage::Pending;
        let result = match Workspace::create(&self.workspace_root, media_id).await {
            Ok(workspace) => {
                let result = self.run_stages(&asset, &workspace, &mut stage).await;
                workspace.release().await;
                result
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(manifest_key) => self.commit_ready(asset, manifest_key).await,
            Err(e) => self.commit_failed(asset, stage, e).await,
        }
    }

    async fn run_stages(
        &self,
        asset: &MediaAsset,
        workspace: &Workspace,
        stage: &mut PipelineStage,
    ) -> PipelineResult<String> {
        let location = self.layout.classify(&asset.storage_key);

        advance(stage, PipelineStage::Resolving);
        let source = self
            .resolver
            .resolve(&location, &asset.filename, workspace)
            .await?;

        advance(stage, PipelineStage::Transcoding);
        let hls_dir = workspace.hls_dir();
        let poster = workspace.poster_path();
        self.transcoder.transcode(&source, &hls_dir).await?;
        self.transcoder.extract_thumbnail(&source, &poster).await?;

        advance(stage, PipelineStage::Publishing);
        self.publisher.publish(&location, &hls_dir, &poster).await
    }

    async fn commit_ready(
        &self,
        mut asset: MediaAsset,
        manifest_key: String,
    ) -> PipelineResult<PipelineOutcome> {
        let source_key = std::mem::replace(&mut asset.storage_key, manifest_key.clone());
        asset.status = ProcessingStatus::Ready;

        if let Err(e) = self.assets.save(&asset).await {
            error!("Failed to record READY: {}", e);
            // Output is published but unreferenced; leave the asset on its source.
            asset.storage_key = source_key;
            asset.status = ProcessingStatus::Failed;
            if let Err(e) = self.assets.save(&asset).await {
                error!("Failed to record FAILED either: {}", e);
            }
            return Err(e.into());
        }

        info!(stage = %PipelineStage::Ready, "Media ready at {}", manifest_key);
        self.send(Notification::media_ready(asset.creator_id, asset.id, &asset.filename))
            .await;

        Ok(PipelineOutcome::Ready { manifest_key })
    }

    async fn commit_failed(
        &self,
        mut asset: MediaAsset,
        stage: PipelineStage,
        error: PipelineError,
    ) -> PipelineResult<PipelineOutcome> {
        match &error {
            PipelineError::EncodeFailed { code, stderr } => {
                error!(stage = %stage, "Encoder exited with {}. stderr:\n{}", code, stderr)
            }
            other => error!(stage = %stage, "Processing failed: {}", other),
        }

        asset.status = ProcessingStatus::Failed;
        self.assets.save(&asset).await?;
        info!(stage = %PipelineStage::Failed, "Media marked failed");

        if self.notify_on_failure {
            self.send(Notification::media_failed(asset.creator_id, asset.id, &asset.filename))
                .await;
        }

        Ok(PipelineOutcome::Failed { stage, error })
    }

    async fn send(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!("Notification not delivered: {}", e);
        }
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    *stage = next;
    info!(stage = %next, "Entering stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::test_support::{
        MemoryAssetStore, MemoryStorage, RecordingNotifier, ScriptedEncoder,
    };
    use crate::workers::transcoder::{LADDER, render_manifest};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        assets: MemoryAssetStore,
        storage: MemoryStorage,
        encoder: ScriptedEncoder,
        notifier: RecordingNotifier,
        pipeline: MediaPipeline,
    }

    impl Harness {
        fn new() -> Self {
            Self::build(RecordingNotifier::new(), false)
        }

        fn build(notifier: RecordingNotifier, notify_on_failure: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let assets = MemoryAssetStore::new();
            let storage = MemoryStorage::new();
            let encoder = ScriptedEncoder::new();
            let config = MediaConfig {
                local_prefix: "/static".to_string(),
                local_root: dir.path().join("site"),
                transcode_dir: dir.path().join("scratch"),
                notify_on_failure,
                ..MediaConfig::default()
            };
            let pipeline = MediaPipeline::new(
                PipelineDeps {
                    assets: Arc::new(assets.clone()),
                    notifier: Arc::new(notifier.clone()),
                    storage: Arc::new(storage.clone()),
                    encoder: Arc::new(encoder.clone()),
                },
                &config,
            );
            Self {
                dir,
                assets,
                storage,
                encoder,
                notifier,
                pipeline,
            }
        }

        fn site(&self) -> PathBuf {
            self.dir.path().join("site")
        }

        fn scratch_is_empty(&self) -> bool {
            let scratch = self.dir.path().join("scratch");
            !scratch.exists() || fs::read_dir(scratch).unwrap().next().is_none()
        }

        fn write_local_source(&self, key: &str) {
            let path = self.site().join(key.trim_start_matches('/'));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, vec![0u8; 1024]).unwrap();
        }

        fn add_video(&self, key: &str) -> MediaAsset {
            let asset = MediaAsset {
                id: Uuid::new_v4(),
                creator_id: Uuid::new_v4(),
                kind: MediaKind::Video,
                storage_key: key.to_string(),
                filename: "holiday.mp4".to_string(),
                content_type: "video/mp4".to_string(),
                size_bytes: 1024,
                status: ProcessingStatus::Pending,
            };
            self.assets.insert(asset.clone());
            asset
        }
    }

    fn manifest_entries(manifest: &str) -> Vec<&str> {
        manifest.lines().filter(|l| !l.starts_with('#')).collect()
    }

    #[tokio::test]
    async fn local_video_reaches_ready() {
        let h = Harness::new();
        h.write_local_source("/static/uploads/u1/holiday.mp4");
        let asset = h.add_video("/static/uploads/u1/holiday.mp4");

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        let PipelineOutcome::Ready { manifest_key } = outcome else {
            panic!("expected ready, got {:?}", outcome);
        };
        assert_eq!(manifest_key, "/static/uploads/u1/hls/index.m3u8");
        assert!(manifest_key.ends_with("hls/index.m3u8"));

        let stored = h.assets.asset(asset.id);
        assert_eq!(stored.status, ProcessingStatus::Ready);
        assert_eq!(stored.storage_key, manifest_key);
        assert_eq!(h.assets.saves().len(), 1);

        let published = h.site().join("static/uploads/u1/hls");
        let manifest = fs::read_to_string(published.join("index.m3u8")).unwrap();
        assert_eq!(manifest, render_manifest(&LADDER));
        for entry in manifest_entries(&manifest) {
            assert!(published.join(entry).is_file(), "{} is dangling", entry);
        }
        assert!(published.join("v1").is_dir());
        assert!(published.join("v2").is_dir());
        assert!(h.site().join("static/uploads/u1/poster.jpg").is_file());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, asset.creator_id);
        assert_eq!(sent[0].title, "Media Ready");
        assert_eq!(sent[0].message, "Your video 'holiday.mp4' is ready to watch.");
        assert_eq!(sent[0].resource_id, Some(asset.id.to_string()));
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn remote_video_is_uploaded_next_to_its_source() {
        let h = Harness::new();
        h.storage.put("creators/c1/videos/v1/raw.mp4", b"remote video");
        let asset = h.add_video("creators/c1/videos/v1/raw.mp4");

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Ready { .. }));
        let stored = h.assets.asset(asset.id);
        assert_eq!(stored.storage_key, "creators/c1/videos/v1/hls/index.m3u8");

        let manifest = String::from_utf8(h.storage.get(&stored.storage_key).unwrap()).unwrap();
        for entry in manifest_entries(&manifest) {
            let key = format!("creators/c1/videos/v1/hls/{}", entry);
            assert!(h.storage.get(&key).is_some(), "{} is dangling", key);
        }
        assert!(h.storage.get("creators/c1/videos/v1/poster.jpg").is_some());
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn missing_source_fails_without_touching_the_key() {
        let h = Harness::new();
        let asset = h.add_video("creators/c1/videos/v1/gone.mp4");

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        let PipelineOutcome::Failed { stage, error } = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(stage, PipelineStage::Resolving);
        assert!(matches!(error, PipelineError::SourceMissing(_)));

        let stored = h.assets.asset(asset.id);
        assert_eq!(stored.status, ProcessingStatus::Failed);
        assert_eq!(stored.storage_key, asset.storage_key);
        assert!(h.notifier.sent().is_empty());
        assert!(h.encoder.calls().is_empty());
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn short_source_uses_thumbnail_fallback() {
        let h = Harness::new();
        h.write_local_source("/static/uploads/short.mp4");
        h.encoder.fail_when_args_contain("00:00:01.000");
        let asset = h.add_video("/static/uploads/short.mp4");

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Ready { .. }));
        assert!(h.site().join("static/uploads/poster.jpg").is_file());
        assert!(
            h.encoder
                .calls()
                .iter()
                .any(|args| args.contains(&"00:00:00.000".to_string()))
        );
    }

    #[tokio::test]
    async fn failed_rendition_publishes_nothing() {
        let h = Harness::new();
        h.write_local_source("/static/uploads/a.mp4");
        h.encoder.fail_when_args_contain("scale=-2:480");
        let asset = h.add_video("/static/uploads/a.mp4");

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        let PipelineOutcome::Failed { stage, error } = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(stage, PipelineStage::Transcoding);
        assert!(matches!(error, PipelineError::EncodeFailed { .. }));
        assert!(!h.site().join("static/uploads/hls").exists());
        assert_eq!(h.assets.asset(asset.id).storage_key, "/static/uploads/a.mp4");
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn failed_publish_keeps_the_source_key() {
        let h = Harness::new();
        h.storage.put("c/raw.mp4", b"bytes");
        h.storage.fail_uploads_containing("v2/");
        let asset = h.add_video("c/raw.mp4");

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(
            outcome,
            PipelineOutcome::Failed {
                stage: PipelineStage::Publishing,
                error: PipelineError::PublishFailed(_)
            }
        ));
        assert_eq!(h.assets.asset(asset.id).storage_key, "c/raw.mp4");
        assert!(h.storage.get("c/hls/index.m3u8").is_none());
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn rerun_after_failure_can_reach_ready() {
        let h = Harness::new();
        let key = "/static/uploads/late.mp4";
        let asset = h.add_video(key);

        let first = h.pipeline.process(asset.id).await.unwrap();
        assert!(matches!(first, PipelineOutcome::Failed { .. }));
        assert_eq!(h.assets.asset(asset.id).status, ProcessingStatus::Failed);

        h.write_local_source(key);
        let second = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(second, PipelineOutcome::Ready { .. }));
        assert_eq!(h.assets.asset(asset.id).status, ProcessingStatus::Ready);
        // One save per run.
        assert_eq!(h.assets.saves().len(), 2);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn each_run_gets_a_fresh_workspace() {
        let h = Harness::new();
        h.write_local_source("/static/uploads/a.mp4");
        let asset = h.add_video("/static/uploads/a.mp4");

        h.pipeline.process(asset.id).await.unwrap();
        // Point the asset back at its source so the second run transcodes again.
        h.assets.insert(asset.clone());
        h.pipeline.process(asset.id).await.unwrap();

        let outputs: Vec<_> = h
            .encoder
            .calls()
            .iter()
            .filter_map(|args| args.last().cloned())
            .filter(|out| out.ends_with("v1/playlist.m3u8"))
            .collect();
        assert_eq!(outputs.len(), 2);
        assert_ne!(
            Path::new(&outputs[0]).ancestors().nth(3),
            Path::new(&outputs[1]).ancestors().nth(3)
        );
    }

    #[tokio::test]
    async fn published_asset_is_not_transcoded_again() {
        let h = Harness::new();
        h.write_local_source("/static/uploads/a.mp4");
        let asset = h.add_video("/static/uploads/a.mp4");
        h.pipeline.process(asset.id).await.unwrap();
        let encodes = h.encoder.calls().len();
        let saves = h.assets.saves().len();

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Skipped));
        let stored = h.assets.asset(asset.id);
        assert_eq!(stored.status, ProcessingStatus::Ready);
        assert_eq!(stored.storage_key, "/static/uploads/hls/index.m3u8");
        assert_eq!(h.encoder.calls().len(), encodes);
        assert_eq!(h.assets.saves().len(), saves);
        assert!(!h.site().join("static/uploads/hls/hls").exists());
    }

    #[tokio::test]
    async fn remote_manifest_key_is_skipped_without_status_change() {
        let h = Harness::new();
        let mut asset = h.add_video("creators/1/videos/2/hls/index.m3u8");
        asset.status = ProcessingStatus::Ready;
        h.assets.insert(asset.clone());

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Skipped));
        assert_eq!(h.assets.asset(asset.id).status, ProcessingStatus::Ready);
        assert!(h.assets.saves().is_empty());
        assert!(h.storage.upload_order().is_empty());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_run() {
        let h = Harness::build(RecordingNotifier::failing(), false);
        h.write_local_source("/static/uploads/a.mp4");
        let asset = h.add_video("/static/uploads/a.mp4");

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Ready { .. }));
        assert_eq!(h.assets.asset(asset.id).status, ProcessingStatus::Ready);
    }

    #[tokio::test]
    async fn failure_hook_notifies_when_enabled() {
        let h = Harness::build(RecordingNotifier::new(), true);
        let asset = h.add_video("/static/uploads/gone.mp4");

        h.pipeline.process(asset.id).await.unwrap();

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Media Processing Failed");
    }

    #[tokio::test]
    async fn save_failure_on_ready_leaves_asset_on_its_source() {
        let h = Harness::new();
        h.write_local_source("/static/uploads/a.mp4");
        let asset = h.add_video("/static/uploads/a.mp4");
        h.assets.fail_next_saves(1);

        let err = h.pipeline.process(asset.id).await.unwrap_err();

        assert!(matches!(err, PipelineError::Persistence(_)));
        let stored = h.assets.asset(asset.id);
        assert_eq!(stored.status, ProcessingStatus::Failed);
        assert_eq!(stored.storage_key, "/static/uploads/a.mp4");
        assert!(h.notifier.sent().is_empty());
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn non_video_is_skipped() {
        let h = Harness::new();
        let mut asset = h.add_video("/static/uploads/cover.png");
        asset.kind = MediaKind::Image;
        h.assets.insert(asset.clone());

        let outcome = h.pipeline.process(asset.id).await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Skipped));
        assert!(h.assets.saves().is_empty());
        assert!(h.encoder.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_asset_is_an_error() {
        let h = Harness::new();
        let err = h.pipeline.process(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::AssetNotFound(_)));
    }
}
