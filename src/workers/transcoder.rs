use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::encoder::Encoder;
use super::error::{PipelineError, PipelineResult};

pub const MANIFEST_NAME: &str = "index.m3u8";
pub const VARIANT_PLAYLIST: &str = "playlist.m3u8";

const THUMBNAIL_AT: &str = "00:00:01.000";
const THUMBNAIL_FALLBACK_AT: &str = "00:00:00.000";

/// One rung of the bitrate ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendition {
    /// Subdirectory under the HLS output directory.
    pub name: &'static str,
    pub height: u32,
    pub video_bitrate: &'static str,
    pub audio_bitrate: &'static str,
    /// Declared in the manifest.
    pub bandwidth: u64,
    pub resolution: &'static str,
}

impl Rendition {
    pub fn playlist_path(&self) -> String {
        format!("{}/{}", self.name, VARIANT_PLAYLIST)
    }

    fn encoder_args(&self, source: &Path, output_dir: &Path) -> Vec<String> {
        let playlist = output_dir.join(self.name).join(VARIANT_PLAYLIST);
        let mut args: Vec<String> = vec!["-y".into(), "-i".into()];
        args.push(source.to_string_lossy().into_owned());
        args.push("-vf".into());
        args.push(format!("scale=-2:{}", self.height));
        args.extend(["-c:v", "libx264", "-b:v", self.video_bitrate].map(String::from));
        args.extend(["-preset", "veryfast"].map(String::from));
        args.extend(["-c:a", "aac", "-b:a", self.audio_bitrate].map(String::from));
        args.extend(["-hls_time", "6", "-hls_list_size", "0", "-f", "hls"].map(String::from));
        args.push(playlist.to_string_lossy().into_owned());
        args
    }
}

/// Highest quality first.
pub const LADDER: [Rendition; 2] = [
    Rendition {
        name: "v1",
        height: 720,
        video_bitrate: "2500k",
        audio_bitrate: "128k",
        bandwidth: 2_800_000,
        resolution: "1280x720",
    },
    Rendition {
        name: "v2",
        height: 480,
        video_bitrate: "1000k",
        audio_bitrate: "96k",
        bandwidth: 1_200_000,
        resolution: "854x480",
    },
];

/// Master playlist text; players depend on this exact layout.
pub fn render_manifest(ladder: &[Rendition]) -> String {
    let mut manifest = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for rendition in ladder {
        let _ = writeln!(
            manifest,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            rendition.bandwidth, rendition.resolution
        );
        let _ = writeln!(manifest, "{}", rendition.playlist_path());
    }
    manifest
}

fn thumbnail_args(source: &Path, output: &Path, at: &str) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        source.to_string_lossy().into_owned(),
        "-ss".to_string(),
        at.to_string(),
        "-vframes".to_string(),
        "1".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

pub struct VariantTranscoder {
    encoder: Arc<dyn Encoder>,
    ladder: Vec<Rendition>,
}

impl VariantTranscoder {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoder,
            ladder: LADDER.to_vec(),
        }
    }

    /// Encodes every rendition into `output_dir/<name>/` and writes the
    /// manifest. Any failed rendition fails the whole call, and the manifest
    /// is only written once all of them succeeded.
    pub async fn transcode(&self, source: &Path, output_dir: &Path) -> PipelineResult<PathBuf> {
        for rendition in &self.ladder {
            let dir = output_dir.join(rendition.name);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                PipelineError::workspace(format!("cannot create {}: {}", dir.display(), e))
            })?;

            let output = self
                .encoder
                .encode(&rendition.encoder_args(source, output_dir))
                .await?;
            debug!("Encoder output for {}:\n{}", rendition.name, output.stderr);
            info!(
                "Rendition {} ({}) encoded in {} ms",
                rendition.name,
                rendition.resolution,
                output.elapsed.as_millis()
            );
        }

        let manifest = output_dir.join(MANIFEST_NAME);
        tokio::fs::write(&manifest, render_manifest(&self.ladder))
            .await
            .map_err(|e| PipelineError::workspace(format!("cannot write manifest: {}", e)))?;

        Ok(manifest)
    }

    /// Grabs one frame at 1s, retrying at the first frame for short sources.
    pub async fn extract_thumbnail(&self, source: &Path, output: &Path) -> PipelineResult<()> {
        match self
            .encoder
            .encode(&thumbnail_args(source, output, THUMBNAIL_AT))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Thumbnail at {} failed ({}), retrying at first frame", THUMBNAIL_AT, e);
                self.encoder
                    .encode(&thumbnail_args(source, output, THUMBNAIL_FALLBACK_AT))
                    .await
                    .map(|_| ())
            }
        }
    }
}
