use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `POST /generate` で受け取る生成依頼。
///
/// `continue` とフェーズ2が後から素材リストを参照できるよう、
/// 生成レコードにJSONのまま永続化される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
    #[serde(default)]
    pub review_scenario: bool,
    #[serde(default)]
    pub review_scenes: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<VideoSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_id: Option<String>,
}

fn default_aspect_ratio() -> f64 {
    5.83
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSource {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    pub id: String,
    pub url: String,
}

impl GenerationRequest {
    /// リクエスト形状の検証。違反メッセージのリストを返す（空なら有効）。
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut details = Vec::new();
        if self.prompt.trim().is_empty() {
            details.push("prompt must not be empty".to_string());
        }
        if !self.aspect_ratio.is_finite() || self.aspect_ratio <= 0.0 {
            details.push("aspectRatio must be a positive number".to_string());
        }
        for (idx, video) in self.videos.iter().enumerate() {
            if video.id.trim().is_empty() || video.url.trim().is_empty() {
                details.push(format!("videos[{idx}] requires both id and url"));
            }
        }
        for (idx, image) in self.images.iter().enumerate() {
            if image.id.trim().is_empty() || image.url.trim().is_empty() {
                details.push(format!("images[{idx}] requires both id and url"));
            }
        }
        details
    }
}

/// フェーズ0が収集する動画メタデータ。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// プローブ失敗時の代替値。
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            duration: 0.0,
            fps: 30.0,
            width: 1920,
            height: 1080,
        }
    }
}

/// フェーズ0の成果物。以降の全フェーズが参照する素材理解の要約。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedContext {
    pub prompt: String,
    #[serde(default)]
    pub video_transcripts: BTreeMap<String, String>,
    #[serde(default)]
    pub video_metadata: BTreeMap<String, VideoMetadata>,
    #[serde(default)]
    pub image_captions: BTreeMap<String, String>,
    #[serde(default)]
    pub reference_notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_apply() {
        let request: GenerationRequest =
            serde_json::from_value(json!({ "prompt": "hello" })).expect("parses");
        assert!((request.aspect_ratio - 5.83).abs() < f64::EPSILON);
        assert!(!request.review_scenario);
        assert!(!request.review_scenes);
        assert!(request.videos.is_empty());
    }

    #[test]
    fn empty_prompt_is_invalid() {
        let request: GenerationRequest =
            serde_json::from_value(json!({ "prompt": "   " })).expect("parses");
        let details = request.validate();
        assert_eq!(details.len(), 1);
        assert!(details[0].contains("prompt"));
    }

    #[test]
    fn negative_aspect_ratio_is_invalid() {
        let request: GenerationRequest =
            serde_json::from_value(json!({ "prompt": "x", "aspectRatio": -1.0 }))
                .expect("parses");
        assert!(!request.validate().is_empty());
    }

    #[test]
    fn video_without_url_is_invalid() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "prompt": "x",
            "videos": [{ "id": "v1", "url": "" }]
        }))
        .expect("parses");
        assert!(!request.validate().is_empty());
    }
}
