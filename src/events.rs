//! Fire-and-forget progress channel.
//!
//! The orchestrator and phase 3 publish here; the WebSocket layer fans events
//! out to clients joined to the generation's room. Nothing waits on delivery
//! and nothing is persisted: the database stays the source of truth, and a
//! client that missed events resyncs by polling the status endpoint.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::store::models::GenerationPhase;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub(crate) enum EventPayload {
    #[serde(rename_all = "camelCase")]
    Progress {
        generation_id: Uuid,
        progress: i32,
        phase: GenerationPhase,
    },
    #[serde(rename_all = "camelCase")]
    PhaseChange {
        generation_id: Uuid,
        phase: GenerationPhase,
        progress: i32,
    },
    #[serde(rename_all = "camelCase")]
    SceneComplete {
        generation_id: Uuid,
        scene_id: String,
        scene_url: String,
    },
    #[serde(rename_all = "camelCase")]
    GenerationComplete {
        generation_id: Uuid,
        result_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Error { generation_id: Uuid, error: String },
}

impl EventPayload {
    #[must_use]
    pub(crate) fn generation_id(&self) -> Uuid {
        match self {
            EventPayload::Progress { generation_id, .. }
            | EventPayload::PhaseChange { generation_id, .. }
            | EventPayload::SceneComplete { generation_id, .. }
            | EventPayload::GenerationComplete { generation_id, .. }
            | EventPayload::Error { generation_id, .. } => *generation_id,
        }
    }
}

#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<EventPayload>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<EventPayload> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, event: EventPayload) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.publish(EventPayload::Progress {
            generation_id: id,
            progress: 20,
            phase: GenerationPhase::Phase0,
        });

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.generation_id(), id);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(EventPayload::Error {
            generation_id: Uuid::new_v4(),
            error: "boom".into(),
        });
    }

    #[test]
    fn events_serialize_with_kebab_case_names() {
        let id = Uuid::new_v4();
        let event = EventPayload::SceneComplete {
            generation_id: id,
            scene_id: "s1".into(),
            scene_url: "http://example/s1.mp4".into(),
        };
        let value = serde_json::to_value(&event).expect("serializes");
        assert_eq!(value["event"], "scene-complete");
        assert_eq!(value["data"]["sceneId"], "s1");
    }
}
