//! The five-phase scene generation pipeline.
//!
//! `SceneOrchestrator` drives a generation record through resource
//! understanding, scenario generation, project construction, scene rendering
//! and final composition, pausing at the optional human-review checkpoints.

pub(crate) mod compose;
pub(crate) mod construct;
mod orchestrator;
pub(crate) mod registry;
pub(crate) mod render;
pub(crate) mod scenario_gen;
pub(crate) mod scenes;
pub(crate) mod understand;

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

pub(crate) use orchestrator::SceneOrchestrator;

use crate::events::{EventBus, EventPayload};
use crate::store::dao::SceneDao;
use crate::store::models::GenerationPhase;

/// フェーズ内進捗の書き出し口。
///
/// フェーズ内の0〜100をそのフェーズの帯域へ換算して生成行へ書き、
/// 同じ値を `progress` イベントとして流す。書き込み失敗はフェーズを
/// 止めない（DBが真実であり、進捗は復旧可能なため）。
pub(crate) struct PhaseProgress {
    dao: Arc<dyn SceneDao>,
    events: EventBus,
    generation_id: Uuid,
    phase: GenerationPhase,
}

impl PhaseProgress {
    pub(crate) fn new(
        dao: Arc<dyn SceneDao>,
        events: EventBus,
        generation_id: Uuid,
        phase: GenerationPhase,
    ) -> Self {
        Self {
            dao,
            events,
            generation_id,
            phase,
        }
    }

    pub(crate) async fn report(&self, phase_pct: i32) {
        let overall = self.phase.scale_progress(phase_pct);
        if let Err(error) = self.dao.set_progress(self.generation_id, overall).await {
            warn!(
                generation_id = %self.generation_id,
                error = %error,
                "failed to persist progress update"
            );
        }
        self.events.publish(EventPayload::Progress {
            generation_id: self.generation_id,
            progress: overall,
            phase: self.phase,
        });
    }
}
