use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};
use crate::media::Ffmpeg;
use crate::media::ffmpeg::concat_entry;
use crate::pipeline::scenes::download_bytes;
use crate::store::dao::SceneDao;
use crate::storage::{ObjectStorage, final_video_key};
use crate::util::tempdir::ScopedTempDir;

/// フェーズ4: 最終合成。
#[async_trait]
pub(crate) trait ComposeStage: Send + Sync {
    /// 完了済みシーンを orderIndex 順で連結し、(URL, パス) を返す。
    async fn compose(&self, generation_id: Uuid) -> WorkerResult<(String, String)>;
}

pub(crate) struct ConcatComposeStage {
    dao: Arc<dyn SceneDao>,
    storage: Arc<dyn ObjectStorage>,
    ffmpeg: Ffmpeg,
    http: reqwest::Client,
    temp_root: PathBuf,
}

impl ConcatComposeStage {
    pub(crate) fn new(
        dao: Arc<dyn SceneDao>,
        storage: Arc<dyn ObjectStorage>,
        ffmpeg: Ffmpeg,
        http: reqwest::Client,
        temp_root: PathBuf,
    ) -> Self {
        Self {
            dao,
            storage,
            ffmpeg,
            http,
            temp_root,
        }
    }
}

#[async_trait]
impl ComposeStage for ConcatComposeStage {
    async fn compose(&self, generation_id: Uuid) -> WorkerResult<(String, String)> {
        let scenes = self
            .dao
            .list_completed_scenes(generation_id)
            .await
            .map_err(WorkerError::Internal)?;
        if scenes.is_empty() {
            return Err(WorkerError::NothingToCompose);
        }

        let temp =
            ScopedTempDir::create(&self.temp_root, &format!("compose-{generation_id}")).await?;

        let mut list = String::new();
        for (index, scene) in scenes.iter().enumerate() {
            let clip_path = temp.path().join(format!("clip-{index:03}.mp4"));

            // URL first, storage path as the fallback.
            let bytes = match scene.rendered_asset_url.as_deref() {
                Some(url) => match download_bytes(&self.http, url).await {
                    Ok(bytes) => Some(bytes),
                    Err(error) => {
                        warn!(
                            scene_id = %scene.scene_id,
                            error = %error,
                            "asset download by URL failed, falling back to storage"
                        );
                        None
                    }
                },
                None => None,
            };
            let bytes = match bytes {
                Some(bytes) => bytes,
                None => {
                    let path = scene.rendered_asset_path.as_deref().ok_or_else(|| {
                        WorkerError::Media(format!(
                            "scene {} has no rendered asset path",
                            scene.scene_id
                        ))
                    })?;
                    self.storage.get(path).await.map_err(WorkerError::Internal)?
                }
            };

            tokio::fs::write(&clip_path, bytes).await.map_err(|error| {
                WorkerError::Media(format!("failed to stage clip for concat: {error}"))
            })?;
            list.push_str(&concat_entry(&clip_path));
            debug!(scene_id = %scene.scene_id, order_index = scene.order_index, "clip staged");
        }

        let list_file = temp.path().join("concat.txt");
        tokio::fs::write(&list_file, list).await.map_err(|error| {
            WorkerError::Media(format!("failed to write concat list: {error}"))
        })?;

        let output = temp.path().join("final.mp4");
        self.ffmpeg.concat(&list_file, &output).await?;

        let key = final_video_key(&generation_id.to_string());
        let stored = self
            .storage
            .put_file(&key, &output, "video/mp4")
            .await
            .map_err(WorkerError::Internal)?;

        temp.cleanup().await;

        info!(%generation_id, scenes = scenes.len(), "final video composed");
        Ok((stored.url, stored.path))
    }
}
