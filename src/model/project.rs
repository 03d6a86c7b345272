use serde::{Deserialize, Serialize};

use super::scenario::{SceneKind, TimelineItem};

/// 生成内の全シーンが共有するレンダリング寸法。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContext {
    pub aspect_ratio: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl RenderContext {
    /// 幅とアスペクト比から高さを導出する。高さは最も近い偶数に丸める。
    #[must_use]
    pub fn for_aspect(aspect_ratio: f64, width: u32, fps: u32) -> Self {
        let raw_height = f64::from(width) / aspect_ratio;
        let height = ((raw_height / 2.0).round() * 2.0).max(2.0) as u32;
        Self {
            aspect_ratio,
            width,
            height,
            fps,
        }
    }
}

/// 切り出し対象のソース動画参照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoClipRef {
    pub id: String,
    pub url: String,
    pub from_seconds: f64,
    pub to_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub id: String,
    pub url: String,
}

/// パイプラインへ渡す素材への参照。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoClipRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

impl PipPosition {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "top-left" => Self::TopLeft,
            "bottom-left" => Self::BottomLeft,
            "bottom-right" => Self::BottomRight,
            _ => Self::TopRight,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipSize {
    #[default]
    Small,
    Medium,
    Large,
}

impl PipSize {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "medium" => Self::Medium,
            "large" => Self::Large,
            _ => Self::Small,
        }
    }

    /// インセット前のオーバーレイ寸法。
    #[must_use]
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Small => (320, 180),
            Self::Medium => (480, 270),
            Self::Large => (640, 360),
        }
    }
}

/// 種別ごとのレンダリングパラメータ。
///
/// 元実装ではシーンごとの自由形式な `extra` バッグだったものを、
/// `kind` をタグに持つ直和型として表現する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SceneExtra {
    Video {
        #[serde(default = "default_audio_strategy")]
        audio_strategy: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        visual_style: Vec<String>,
    },
    Banner {
        #[serde(default = "default_layout_preset")]
        layout_preset: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        animation_hints: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        visual_style: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        image_hints: Vec<String>,
    },
    Overlay {
        #[serde(default = "default_layout_hint")]
        layout_hint: String,
        #[serde(default = "default_audio_strategy")]
        audio_strategy: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_content: Option<String>,
    },
    Pip {
        #[serde(default)]
        position: PipPosition,
        #[serde(default)]
        size: PipSize,
    },
    Transition {},
    Blank {},
}

fn default_audio_strategy() -> String {
    "keep".to_string()
}

fn default_layout_preset() -> String {
    "center".to_string()
}

fn default_layout_hint() -> String {
    "side_panel_right".to_string()
}

impl SceneExtra {
    #[must_use]
    pub fn kind(&self) -> SceneKind {
        match self {
            SceneExtra::Video { .. } => SceneKind::Video,
            SceneExtra::Banner { .. } => SceneKind::Banner,
            SceneExtra::Overlay { .. } => SceneKind::Overlay,
            SceneExtra::Pip { .. } => SceneKind::Pip,
            SceneExtra::Transition {} => SceneKind::Transition,
            SceneExtra::Blank {} => SceneKind::Blank,
        }
    }

    /// タイムライン項目の演出指示から種別デフォルトを適用して構築する。
    #[must_use]
    pub fn from_item(item: &TimelineItem) -> Self {
        let request = &item.detailed_request;
        match item.kind {
            SceneKind::Video => SceneExtra::Video {
                audio_strategy: request
                    .audio_strategy
                    .clone()
                    .unwrap_or_else(default_audio_strategy),
                visual_style: request.visual_style.clone(),
            },
            SceneKind::Banner => SceneExtra::Banner {
                layout_preset: request
                    .layout_hint
                    .clone()
                    .unwrap_or_else(default_layout_preset),
                text_content: request.text_content.clone(),
                animation_hints: request.animation_hints.clone(),
                visual_style: request.visual_style.clone(),
                image_hints: request.image_hints.clone(),
            },
            SceneKind::Overlay => SceneExtra::Overlay {
                layout_hint: request
                    .layout_hint
                    .clone()
                    .unwrap_or_else(default_layout_hint),
                audio_strategy: request
                    .audio_strategy
                    .clone()
                    .unwrap_or_else(default_audio_strategy),
                text_content: request.text_content.clone(),
            },
            SceneKind::Pip => SceneExtra::Pip {
                position: request
                    .layout_hint
                    .as_deref()
                    .map_or_else(PipPosition::default, PipPosition::parse),
                size: PipSize::default(),
            },
            SceneKind::Transition => SceneExtra::Transition {},
            SceneKind::Blank => SceneExtra::Blank {},
        }
    }
}

/// 1シーン分の完全に解決されたレンダリング仕様。
///
/// フェーズ2が組み立て、フェーズ3のパイプラインがそのまま消費する。
/// レンダリング後はデバッグフレームのURLがスナップショットへ追記される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneProject {
    pub scene_id: String,
    pub kind: SceneKind,
    pub scenario_item: TimelineItem,
    pub render_context: RenderContext,
    #[serde(default)]
    pub inputs: SceneInputs,
    pub extra: SceneExtra,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub debug_frames: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scenario::DetailedRequest;

    #[test]
    fn render_context_rounds_height_to_even() {
        let ctx = RenderContext::for_aspect(5.83, 1920, 30);
        assert_eq!(ctx.width, 1920);
        assert_eq!(ctx.height, 330);
        assert_eq!(ctx.height % 2, 0);

        let widescreen = RenderContext::for_aspect(16.0 / 9.0, 1920, 30);
        assert_eq!(widescreen.height, 1080);

        let square = RenderContext::for_aspect(1.0, 1920, 30);
        assert_eq!(square.height, 1920);
    }

    #[test]
    fn banner_extra_picks_defaults() {
        let item = TimelineItem {
            id: "b1".into(),
            kind: SceneKind::Banner,
            duration_seconds: Some(2.0),
            source_video_id: None,
            from_seconds: None,
            to_seconds: None,
            detailed_request: DetailedRequest::default(),
        };
        let extra = SceneExtra::from_item(&item);
        match extra {
            SceneExtra::Banner {
                layout_preset,
                animation_hints,
                ..
            } => {
                assert_eq!(layout_preset, "center");
                assert!(animation_hints.is_empty());
            }
            other => panic!("expected banner extra, got {other:?}"),
        }
    }

    #[test]
    fn overlay_extra_defaults_to_side_panel_and_keep() {
        let item = TimelineItem {
            id: "o1".into(),
            kind: SceneKind::Overlay,
            duration_seconds: None,
            source_video_id: Some("vid-1".into()),
            from_seconds: Some(0.0),
            to_seconds: Some(3.0),
            detailed_request: DetailedRequest::default(),
        };
        match SceneExtra::from_item(&item) {
            SceneExtra::Overlay {
                layout_hint,
                audio_strategy,
                ..
            } => {
                assert_eq!(layout_hint, "side_panel_right");
                assert_eq!(audio_strategy, "keep");
            }
            other => panic!("expected overlay extra, got {other:?}"),
        }
    }

    #[test]
    fn extra_round_trips_through_json_with_kind_tag() {
        let extra = SceneExtra::Pip {
            position: PipPosition::BottomLeft,
            size: PipSize::Medium,
        };
        let value = serde_json::to_value(&extra).expect("serializes");
        assert_eq!(value["kind"], "pip");
        assert_eq!(value["position"], "bottom-left");
        let back: SceneExtra = serde_json::from_value(value).expect("deserializes");
        assert_eq!(back, extra);
    }

    #[test]
    fn pip_sizes_map_to_documented_dimensions() {
        assert_eq!(PipSize::Small.dimensions(), (320, 180));
        assert_eq!(PipSize::Medium.dimensions(), (480, 270));
        assert_eq!(PipSize::Large.dimensions(), (640, 360));
    }
}
