use std::collections::HashSet;
use std::fmt;

use jsonschema::Draft;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{WorkerError, WorkerResult};

/// シーン種別。タイムライン項目とレンダリングパイプラインの選択キー。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    Video,
    Banner,
    Overlay,
    Pip,
    Transition,
    Blank,
}

impl SceneKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SceneKind::Video => "video",
            SceneKind::Banner => "banner",
            SceneKind::Overlay => "overlay",
            SceneKind::Pip => "pip",
            SceneKind::Transition => "transition",
            SceneKind::Blank => "blank",
        }
    }

    /// 切り出し元動画（sourceVideoId / fromSeconds / toSeconds）を要求する種別か。
    #[must_use]
    pub fn requires_source_clip(self) -> bool {
        matches!(
            self,
            SceneKind::Video | SceneKind::Overlay | SceneKind::Pip
        )
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// タイムライン項目に付随する演出指示。
///
/// LLMの出力ゆれに耐えるため、全フィールドを省略可能にしている。
/// 種別ごとの必須性はフェーズ2の検証で判定する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visual_style: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animation_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub id: String,
    pub kind: SceneKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_seconds: Option<f64>,
    pub detailed_request: DetailedRequest,
}

/// LLMが生成するシナリオ本体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub timeline: Vec<TimelineItem>,
}

/// シナリオの構造スキーマ（JSON Schema 2020-12）。
///
/// `PUT /{id}/scenario` とフェーズ1が共有する緩い契約。項目ごとの
/// 時間制約などの厳密な検証はフェーズ2で行う。
static SCENARIO_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["timeline"],
        "properties": {
            "timeline": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["id", "kind", "detailedRequest"],
                    "properties": {
                        "id": { "type": "string", "minLength": 1 },
                        "kind": {
                            "type": "string",
                            "enum": ["video", "banner", "overlay", "pip", "transition", "blank"]
                        },
                        "detailedRequest": { "type": "object" }
                    }
                }
            }
        }
    })
});

/// シナリオJSONを構造スキーマで検証する。
///
/// # Returns
/// 違反メッセージのリスト。空なら有効。
#[must_use]
pub fn validate_scenario_value(instance: &Value) -> Vec<String> {
    match jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&SCENARIO_SCHEMA)
    {
        Ok(schema) => schema
            .iter_errors(instance)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect(),
        Err(e) => vec![format!("schema compilation error: {e}")],
    }
}

/// 検証済みのJSONを型付きシナリオへ変換する。
pub fn parse_scenario(instance: &Value) -> WorkerResult<Scenario> {
    let errors = validate_scenario_value(instance);
    if !errors.is_empty() {
        return Err(WorkerError::ScenarioInvalid(errors.join("; ")));
    }
    serde_json::from_value(instance.clone())
        .map_err(|error| WorkerError::ScenarioInvalid(error.to_string()))
}

/// フェーズ2直前の厳密検証。
///
/// - `id` はタイムライン内で一意
/// - video / overlay / pip は切り出し元とレンジ（`toSeconds > fromSeconds >= 0`）必須
/// - banner は `durationSeconds > 0` 必須
pub fn validate_for_construction(scenario: &Scenario) -> WorkerResult<()> {
    let mut seen = HashSet::new();
    for item in &scenario.timeline {
        if !seen.insert(item.id.as_str()) {
            return Err(WorkerError::ScenarioInvalid(format!(
                "duplicate timeline id: {}",
                item.id
            )));
        }

        if item.kind.requires_source_clip() {
            let Some(source) = item.source_video_id.as_deref().filter(|s| !s.is_empty()) else {
                return Err(WorkerError::ScenarioInvalid(format!(
                    "item {}: {} scenes require sourceVideoId",
                    item.id, item.kind
                )));
            };
            let (Some(from), Some(to)) = (item.from_seconds, item.to_seconds) else {
                return Err(WorkerError::ScenarioInvalid(format!(
                    "item {}: {} scenes require fromSeconds and toSeconds (source {source})",
                    item.id, item.kind
                )));
            };
            if from < 0.0 || to <= from {
                return Err(WorkerError::ScenarioInvalid(format!(
                    "item {}: clip range must satisfy toSeconds > fromSeconds >= 0, got [{from}, {to}]",
                    item.id
                )));
            }
        }

        if item.kind == SceneKind::Banner {
            let duration = item.duration_seconds.unwrap_or(0.0);
            if duration <= 0.0 {
                return Err(WorkerError::ScenarioInvalid(format!(
                    "item {}: banner scenes require durationSeconds > 0",
                    item.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn banner_item(id: &str) -> Value {
        json!({
            "id": id,
            "kind": "banner",
            "durationSeconds": 2.0,
            "detailedRequest": { "description": "hello world" }
        })
    }

    #[test]
    fn empty_timeline_is_rejected() {
        let errors = validate_scenario_value(&json!({ "timeline": [] }));
        assert!(!errors.is_empty());
    }

    #[test]
    fn missing_detailed_request_is_rejected() {
        let errors = validate_scenario_value(&json!({
            "timeline": [{ "id": "s1", "kind": "banner" }]
        }));
        assert!(!errors.is_empty());
    }

    #[test]
    fn minimal_banner_scenario_parses() {
        let value = json!({ "timeline": [banner_item("s1")] });
        let scenario = parse_scenario(&value).expect("parses");
        assert_eq!(scenario.timeline.len(), 1);
        assert_eq!(scenario.timeline[0].kind, SceneKind::Banner);
        assert_eq!(scenario.timeline[0].duration_seconds, Some(2.0));
    }

    #[test]
    fn construction_rejects_duplicate_ids() {
        let value = json!({ "timeline": [banner_item("s1"), banner_item("s1")] });
        let scenario = parse_scenario(&value).expect("parses");
        let error = validate_for_construction(&scenario).expect_err("duplicate ids");
        assert!(error.to_string().contains("duplicate"));
    }

    #[test]
    fn construction_rejects_zero_length_clip() {
        let value = json!({
            "timeline": [{
                "id": "v1",
                "kind": "video",
                "sourceVideoId": "vid-1",
                "fromSeconds": 4.0,
                "toSeconds": 4.0,
                "detailedRequest": {}
            }]
        });
        let scenario = parse_scenario(&value).expect("parses");
        let error = validate_for_construction(&scenario).expect_err("zero-length clip");
        assert!(matches!(error, WorkerError::ScenarioInvalid(_)));
    }

    #[test]
    fn construction_rejects_banner_without_duration() {
        let value = json!({
            "timeline": [{
                "id": "b1",
                "kind": "banner",
                "detailedRequest": { "textContent": "hi" }
            }]
        });
        let scenario = parse_scenario(&value).expect("parses");
        assert!(validate_for_construction(&scenario).is_err());
    }

    #[test]
    fn construction_accepts_valid_mixed_timeline() {
        let value = json!({
            "timeline": [
                {
                    "id": "v1",
                    "kind": "video",
                    "sourceVideoId": "vid-1",
                    "fromSeconds": 1.0,
                    "toSeconds": 4.0,
                    "detailedRequest": {}
                },
                banner_item("b1")
            ]
        });
        let scenario = parse_scenario(&value).expect("parses");
        assert!(validate_for_construction(&scenario).is_ok());
    }
}
