use chrono::{DateTime, Utc};
use uuid::Uuid;

/// ジョブ種別。ワーカーのディスパッチキー。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobKind {
    Generate,
    Continue,
    RegenerateScene,
}

impl JobKind {
    #[must_use]
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            JobKind::Generate => "generate",
            JobKind::Continue => "continue",
            JobKind::RegenerateScene => "regenerate-scene",
        }
    }

    pub(crate) fn from_str(s: &str) -> Option<Self> {
        match s {
            "generate" => Some(JobKind::Generate),
            "continue" => Some(JobKind::Continue),
            "regenerate-scene" => Some(JobKind::RegenerateScene),
            _ => None,
        }
    }
}

/// ジョブ行の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub(crate) fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "retrying" => Some(JobStatus::Retrying),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

pub(crate) type JobId = i64;

/// キューから取り出したジョブ。
#[derive(Debug, Clone)]
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) kind: JobKind,
    pub(crate) generation_id: Uuid,
    pub(crate) scene_id: Option<String>,
    #[allow(dead_code)]
    pub(crate) status: JobStatus,
    pub(crate) attempts: i32,
    pub(crate) max_attempts: i32,
    #[allow(dead_code)]
    pub(crate) last_error: Option<String>,
    #[allow(dead_code)]
    pub(crate) run_at: DateTime<Utc>,
    #[allow(dead_code)]
    pub(crate) created_at: DateTime<Utc>,
}

/// 投入するジョブ。
#[derive(Debug, Clone)]
pub(crate) struct NewJob {
    pub(crate) kind: JobKind,
    pub(crate) generation_id: Uuid,
    pub(crate) scene_id: Option<String>,
}

impl NewJob {
    pub(crate) fn generate(generation_id: Uuid) -> Self {
        Self {
            kind: JobKind::Generate,
            generation_id,
            scene_id: None,
        }
    }

    pub(crate) fn continuation(generation_id: Uuid) -> Self {
        Self {
            kind: JobKind::Continue,
            generation_id,
            scene_id: None,
        }
    }

    pub(crate) fn regenerate_scene(generation_id: Uuid, scene_id: impl Into<String>) -> Self {
        Self {
            kind: JobKind::RegenerateScene,
            generation_id,
            scene_id: Some(scene_id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_round_trips() {
        for kind in [JobKind::Generate, JobKind::Continue, JobKind::RegenerateScene] {
            assert_eq!(JobKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::from_str("unknown"), None);
    }
}
