/// Prometheusメトリクス定義。
use anyhow::Result;
use prometheus::{
    Counter, Histogram, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub(crate) struct Metrics {
    generations_started: Counter,
    generations_completed: Counter,
    generations_failed: Counter,
    generations_cancelled: Counter,
    scenes_rendered: Counter,
    scenes_failed: Counter,
    queue_inline_executions: Counter,
    generation_duration: Histogram,
}

impl Metrics {
    pub(crate) fn new(registry: &Registry) -> Result<Self> {
        let generations_started = register_counter_with_registry!(
            "scene_worker_generations_started_total",
            "Generations picked up by the orchestrator",
            registry
        )?;
        let generations_completed = register_counter_with_registry!(
            "scene_worker_generations_completed_total",
            "Generations that reached completed",
            registry
        )?;
        let generations_failed = register_counter_with_registry!(
            "scene_worker_generations_failed_total",
            "Generations that ended in failed",
            registry
        )?;
        let generations_cancelled = register_counter_with_registry!(
            "scene_worker_generations_cancelled_total",
            "Generations observed cancelled at a phase boundary",
            registry
        )?;
        let scenes_rendered = register_counter_with_registry!(
            "scene_worker_scenes_rendered_total",
            "Scene renders that completed",
            registry
        )?;
        let scenes_failed = register_counter_with_registry!(
            "scene_worker_scenes_failed_total",
            "Scene renders that failed",
            registry
        )?;
        let queue_inline_executions = register_counter_with_registry!(
            "scene_worker_queue_inline_executions_total",
            "Jobs executed inline because the queue was unavailable",
            registry
        )?;
        let generation_duration = register_histogram_with_registry!(
            "scene_worker_generation_seconds",
            "Wall-clock duration of a full generation run",
            vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0],
            registry
        )?;

        Ok(Self {
            generations_started,
            generations_completed,
            generations_failed,
            generations_cancelled,
            scenes_rendered,
            scenes_failed,
            queue_inline_executions,
            generation_duration,
        })
    }

    pub(crate) fn record_generation_started(&self) {
        self.generations_started.inc();
    }

    pub(crate) fn record_generation_completed(&self, seconds: f64) {
        self.generations_completed.inc();
        self.generation_duration.observe(seconds);
    }

    pub(crate) fn record_generation_failed(&self) {
        self.generations_failed.inc();
    }

    pub(crate) fn record_generation_cancelled(&self) {
        self.generations_cancelled.inc();
    }

    pub(crate) fn record_scene_rendered(&self) {
        self.scenes_rendered.inc();
    }

    pub(crate) fn record_scene_failed(&self) {
        self.scenes_failed.inc();
    }

    pub(crate) fn record_inline_execution(&self) {
        self.queue_inline_executions.inc();
    }
}
