//! Object-store abstraction.
//!
//! Rendered assets live under a content-addressed key layout that external
//! consumers observe verbatim:
//!
//! - `scene-generation/scenes/{sceneId}/rendered.mp4`
//! - `scene-generation/generations/{generationId}/final.mp4`
//! - `scene-generation/debug-frames/{sceneId}/frame-{NNNNNN}.png`
//!
//! Writes are idempotent per key; the core never deletes assets on failure so
//! retries can overwrite in place.

pub(crate) mod local;
pub(crate) mod s3;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub(crate) use local::LocalStorage;
pub(crate) use s3::S3Storage;

/// アップロード結果。パスはストアのキー、URLは配信用の絶対URL。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredObject {
    pub(crate) path: String,
    pub(crate) url: String,
}

#[async_trait]
pub(crate) trait ObjectStorage: Send + Sync {
    /// ローカルファイルをキーへアップロードする。既存キーは上書き。
    async fn put_file(&self, key: &str, file: &Path, content_type: &str) -> Result<StoredObject>;

    /// バイト列をキーへアップロードする。
    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<StoredObject>;

    /// キーの内容を取得する。
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// キーが配信されるURL。
    fn url_for(&self, key: &str) -> String;
}

/// レンダリング済みシーンのキー。
#[must_use]
pub(crate) fn scene_asset_key(scene_id: &str) -> String {
    format!("scene-generation/scenes/{scene_id}/rendered.mp4")
}

/// 最終動画のキー。
#[must_use]
pub(crate) fn final_video_key(generation_id: &str) -> String {
    format!("scene-generation/generations/{generation_id}/final.mp4")
}

/// デバッグフレームのキー。
#[must_use]
pub(crate) fn debug_frame_key(scene_id: &str, frame_index: usize) -> String {
    format!("scene-generation/debug-frames/{scene_id}/frame-{frame_index:06}.png")
}

/// デバッグフレームのベースパス。
#[must_use]
pub(crate) fn debug_frames_base(scene_id: &str) -> String {
    format!("scene-generation/debug-frames/{scene_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(
            scene_asset_key("s1"),
            "scene-generation/scenes/s1/rendered.mp4"
        );
        assert_eq!(
            final_video_key("11111111-2222-3333-4444-555555555555"),
            "scene-generation/generations/11111111-2222-3333-4444-555555555555/final.mp4"
        );
        assert_eq!(
            debug_frame_key("s1", 42),
            "scene-generation/debug-frames/s1/frame-000042.png"
        );
        assert_eq!(debug_frames_base("s1"), "scene-generation/debug-frames/s1");
    }
}
