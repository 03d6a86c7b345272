use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clients::{SpeechClient, VisionClient};
use crate::error::WorkerResult;
use crate::media::Ffmpeg;
use crate::model::context::{EnrichedContext, GenerationRequest, VideoMetadata};
use crate::pipeline::PhaseProgress;
use crate::pipeline::scenes::download_to_file;
use crate::util::tempdir::ScopedTempDir;

/// 画像説明が得られなかったときに格納する既定の文字列。
pub(crate) const CAPTION_PENDING: &str = "Image description will be generated";

/// フェーズ0: 素材理解。
///
/// 個々の素材の失敗はフェーズを失敗させない。失敗した動画には
/// 既定メタデータを入れ、失敗した画像には既定キャプションを入れる。
#[async_trait]
pub(crate) trait UnderstandStage: Send + Sync {
    async fn enrich(
        &self,
        generation_id: Uuid,
        request: &GenerationRequest,
        progress: &PhaseProgress,
    ) -> WorkerResult<EnrichedContext>;
}

pub(crate) struct ResourceUnderstandStage {
    ffmpeg: Ffmpeg,
    http: reqwest::Client,
    speech: Arc<SpeechClient>,
    vision: Arc<VisionClient>,
    temp_root: PathBuf,
}

/// 参照が保存済みアセット（URLまたは絶対パス）に見えるか。
pub(crate) fn looks_like_stored_asset(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://") || reference.starts_with('/')
}

impl ResourceUnderstandStage {
    pub(crate) fn new(
        ffmpeg: Ffmpeg,
        http: reqwest::Client,
        speech: Arc<SpeechClient>,
        vision: Arc<VisionClient>,
        temp_root: PathBuf,
    ) -> Self {
        Self {
            ffmpeg,
            http,
            speech,
            vision,
            temp_root,
        }
    }

    /// 1本の動画を処理する。probe失敗はエラー、文字起こし失敗は黙認。
    async fn inspect_video(
        &self,
        temp: &ScopedTempDir,
        index: usize,
        url: &str,
    ) -> WorkerResult<(VideoMetadata, Option<String>)> {
        let local = temp.path().join(format!("video-{index}.mp4"));
        download_to_file(&self.http, url, &local).await?;

        let info = self.ffmpeg.probe(&local).await?;
        let metadata = VideoMetadata {
            duration: info.duration,
            fps: info.fps,
            width: info.width,
            height: info.height,
        };

        if !info.has_audio {
            return Ok((metadata, None));
        }

        let audio = temp.path().join(format!("audio-{index}.wav"));
        let transcript = match self.ffmpeg.extract_audio(&local, &audio).await {
            Ok(()) => match self.speech.transcribe(&audio).await {
                Ok(text) => Some(text),
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "transcription failed, continuing without transcript");
                    None
                }
            },
            Err(error) => {
                warn!(error = %error, "audio extraction failed, continuing without transcript");
                None
            }
        };

        Ok((metadata, transcript))
    }
}

#[async_trait]
impl UnderstandStage for ResourceUnderstandStage {
    async fn enrich(
        &self,
        generation_id: Uuid,
        request: &GenerationRequest,
        progress: &PhaseProgress,
    ) -> WorkerResult<EnrichedContext> {
        let mut context = EnrichedContext {
            prompt: request.prompt.clone(),
            ..EnrichedContext::default()
        };

        progress.report(10).await;

        let temp = ScopedTempDir::create(&self.temp_root, &format!("understand-{generation_id}"))
            .await?;

        for (index, video) in request.videos.iter().enumerate() {
            match self.inspect_video(&temp, index, &video.url).await {
                Ok((metadata, transcript)) => {
                    context.video_metadata.insert(video.id.clone(), metadata);
                    if let Some(text) = transcript {
                        context.video_transcripts.insert(video.id.clone(), text);
                    }
                }
                Err(error) => {
                    warn!(video_id = %video.id, error = %error, "video inspection failed, using fallback metadata");
                    context
                        .video_metadata
                        .insert(video.id.clone(), VideoMetadata::fallback());
                }
            }
        }

        progress.report(50).await;

        for image in &request.images {
            let caption = match self
                .vision
                .describe(&image.url, "Describe this image for a video production brief.")
                .await
            {
                Ok(text) => text,
                Err(error) => {
                    warn!(image_id = %image.id, error = %format!("{error:#}"), "image captioning failed, storing placeholder");
                    CAPTION_PENDING.to_string()
                }
            };
            context.image_captions.insert(image.id.clone(), caption);
        }

        let mut notes = Vec::new();
        for reference in &request.references {
            if looks_like_stored_asset(reference) {
                match self
                    .vision
                    .describe(
                        reference,
                        "Summarize the style, colors and composition of this reference.",
                    )
                    .await
                {
                    Ok(text) => notes.push(text),
                    Err(error) => {
                        warn!(reference, error = %format!("{error:#}"), "reference analysis failed, keeping raw identifier");
                        notes.push(reference.clone());
                    }
                }
            } else {
                notes.push(reference.clone());
            }
        }
        context.reference_notes = notes.join("\n");

        progress.report(80).await;

        temp.cleanup().await;

        debug!(
            %generation_id,
            videos = context.video_metadata.len(),
            transcripts = context.video_transcripts.len(),
            captions = context.image_captions.len(),
            "resource understanding finished"
        );
        progress.report(100).await;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_and_absolute_paths_are_stored_assets() {
        assert!(looks_like_stored_asset("https://cdn.example.com/a.png"));
        assert!(looks_like_stored_asset("http://cdn.example.com/a.png"));
        assert!(looks_like_stored_asset("/data/storage/ref.png"));
        assert!(!looks_like_stored_asset("brand-guidelines-v2"));
        assert!(!looks_like_stored_asset("ref:123"));
    }
}
