use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::scenario::SceneKind;

/// 生成レコードの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Queued,
    Processing,
    WaitingForReview,
    WaitingForSceneReview,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Queued => "queued",
            GenerationStatus::Processing => "processing",
            GenerationStatus::WaitingForReview => "waiting_for_review",
            GenerationStatus::WaitingForSceneReview => "waiting_for_scene_review",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
            GenerationStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(GenerationStatus::Queued),
            "processing" => Some(GenerationStatus::Processing),
            "waiting_for_review" => Some(GenerationStatus::WaitingForReview),
            "waiting_for_scene_review" => Some(GenerationStatus::WaitingForSceneReview),
            "completed" => Some(GenerationStatus::Completed),
            "failed" => Some(GenerationStatus::Failed),
            "cancelled" => Some(GenerationStatus::Cancelled),
            _ => None,
        }
    }

    /// `continue` が受理される待機状態か。
    #[must_use]
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            GenerationStatus::WaitingForReview | GenerationStatus::WaitingForSceneReview
        )
    }
}

/// パイプラインのフェーズ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPhase {
    Phase0,
    Phase1,
    Phase2,
    Phase3,
    Phase4,
}

impl GenerationPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationPhase::Phase0 => "phase0",
            GenerationPhase::Phase1 => "phase1",
            GenerationPhase::Phase2 => "phase2",
            GenerationPhase::Phase3 => "phase3",
            GenerationPhase::Phase4 => "phase4",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "phase0" => Some(GenerationPhase::Phase0),
            "phase1" => Some(GenerationPhase::Phase1),
            "phase2" => Some(GenerationPhase::Phase2),
            "phase3" => Some(GenerationPhase::Phase3),
            "phase4" => Some(GenerationPhase::Phase4),
            _ => None,
        }
    }

    /// 生成全体の進捗のうち、このフェーズに割り当てられた帯域。
    ///
    /// フェーズ内進捗（0〜100）はこの帯域へ線形に写像される。これにより
    /// 生成の進捗は単一実行内で単調非減少になる。
    #[must_use]
    pub fn progress_band(self) -> (i32, i32) {
        match self {
            GenerationPhase::Phase0 => (0, 20),
            GenerationPhase::Phase1 => (20, 40),
            GenerationPhase::Phase2 => (40, 60),
            GenerationPhase::Phase3 => (60, 80),
            GenerationPhase::Phase4 => (80, 100),
        }
    }

    /// フェーズ内進捗を生成全体の進捗へ換算する。
    #[must_use]
    pub fn scale_progress(self, phase_pct: i32) -> i32 {
        let (base, end) = self.progress_band();
        let clamped = phase_pct.clamp(0, 100);
        base + (end - base) * clamped / 100
    }
}

/// シーン行の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SceneStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SceneStatus::Pending => "pending",
            SceneStatus::Processing => "processing",
            SceneStatus::Completed => "completed",
            SceneStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SceneStatus::Pending),
            "processing" => Some(SceneStatus::Processing),
            "completed" => Some(SceneStatus::Completed),
            "failed" => Some(SceneStatus::Failed),
            _ => None,
        }
    }
}

/// `scene_generations` テーブルの1行。
#[derive(Debug, Clone)]
pub struct SceneGenerationRow {
    pub id: Uuid,
    pub prompt: String,
    pub aspect_ratio: f64,
    pub review_scenario: bool,
    pub review_scenes: bool,
    pub status: GenerationStatus,
    pub phase: GenerationPhase,
    pub progress: i32,
    pub request: Value,
    pub enriched_context: Option<Value>,
    pub scenario: Option<Value>,
    pub scene_projects: Option<Value>,
    pub result_url: Option<String>,
    pub result_path: Option<String>,
    pub error: Option<String>,
    pub task_id: Option<String>,
    pub publication_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 新規生成レコード。
#[derive(Debug, Clone)]
pub struct NewSceneGeneration {
    pub id: Uuid,
    pub prompt: String,
    pub aspect_ratio: f64,
    pub review_scenario: bool,
    pub review_scenes: bool,
    pub request: Value,
    pub task_id: Option<String>,
    pub publication_id: Option<String>,
}

/// `scenes` テーブルの1行。
#[derive(Debug, Clone)]
pub struct SceneRow {
    pub id: Uuid,
    #[allow(dead_code)]
    pub generation_id: Uuid,
    pub scene_id: String,
    pub kind: SceneKind,
    pub order_index: i32,
    pub status: SceneStatus,
    pub progress: i32,
    pub rendered_asset_path: Option<String>,
    pub rendered_asset_url: Option<String>,
    pub error: Option<String>,
    pub scene_project: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// フェーズ2が一括作成するシーン行。
#[derive(Debug, Clone)]
pub struct NewScene {
    pub scene_id: String,
    pub kind: SceneKind,
    pub order_index: i32,
    pub scene_project: Value,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(GenerationStatus::Queued)]
    #[case(GenerationStatus::Processing)]
    #[case(GenerationStatus::WaitingForReview)]
    #[case(GenerationStatus::WaitingForSceneReview)]
    #[case(GenerationStatus::Completed)]
    #[case(GenerationStatus::Failed)]
    #[case(GenerationStatus::Cancelled)]
    fn status_round_trips_through_strings(#[case] status: GenerationStatus) {
        assert_eq!(GenerationStatus::from_str(status.as_str()), Some(status));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_eq!(GenerationStatus::from_str("unknown"), None);
    }

    #[test]
    fn phase_bands_cover_the_whole_range() {
        assert_eq!(GenerationPhase::Phase0.progress_band(), (0, 20));
        assert_eq!(GenerationPhase::Phase4.progress_band(), (80, 100));
        assert_eq!(GenerationPhase::Phase0.scale_progress(50), 10);
        assert_eq!(GenerationPhase::Phase1.scale_progress(100), 40);
        assert_eq!(GenerationPhase::Phase3.scale_progress(0), 60);
        assert_eq!(GenerationPhase::Phase4.scale_progress(100), 100);
    }

    #[test]
    fn scale_progress_clamps_out_of_range_input() {
        assert_eq!(GenerationPhase::Phase2.scale_progress(150), 60);
        assert_eq!(GenerationPhase::Phase2.scale_progress(-10), 40);
    }
}
