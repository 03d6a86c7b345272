use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::clients::LlmClient;
use crate::error::{WorkerError, WorkerResult};
use crate::model::context::{EnrichedContext, GenerationRequest};
use crate::model::scenario::validate_scenario_value;
use crate::util::json::extract_json_payload;

/// フェーズ1: シナリオ生成。
///
/// 成果物は検証済みの生JSON。型付きの解釈はフェーズ2が行う。
#[async_trait]
pub(crate) trait ScenarioStage: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        context: &EnrichedContext,
    ) -> WorkerResult<Value>;
}

pub(crate) struct LlmScenarioStage {
    llm: Arc<LlmClient>,
}

impl LlmScenarioStage {
    pub(crate) fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

/// ユーザープロンプト・素材理解・期待スキーマを1つのプロンプトへまとめる。
pub(crate) fn build_scenario_prompt(
    request: &GenerationRequest,
    context: &EnrichedContext,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are a video scenario planner. Produce a scene timeline for the request below."
    );
    let _ = writeln!(prompt, "\n## User request\n{}", request.prompt);

    if !context.video_metadata.is_empty() {
        let _ = writeln!(prompt, "\n## Available videos");
        for (id, meta) in &context.video_metadata {
            let _ = writeln!(
                prompt,
                "- {id}: {:.1}s, {}x{} @ {:.0}fps",
                meta.duration, meta.width, meta.height, meta.fps
            );
            if let Some(transcript) = context.video_transcripts.get(id) {
                let _ = writeln!(prompt, "  transcript: {transcript}");
            }
        }
    }

    if !context.image_captions.is_empty() {
        let _ = writeln!(prompt, "\n## Available images");
        for (id, caption) in &context.image_captions {
            let _ = writeln!(prompt, "- {id}: {caption}");
        }
    }

    if !context.reference_notes.is_empty() {
        let _ = writeln!(prompt, "\n## Style references\n{}", context.reference_notes);
    }

    let _ = writeln!(
        prompt,
        r#"
## Output format
Respond with JSON only, no prose, matching this schema:
{{
  "timeline": [
    {{
      "id": "unique scene id",
      "kind": "video | banner | overlay | pip | transition | blank",
      "durationSeconds": 2.0,
      "sourceVideoId": "required for video/overlay/pip",
      "fromSeconds": 0.0,
      "toSeconds": 3.0,
      "detailedRequest": {{
        "goal": "...",
        "description": "...",
        "visualStyle": ["..."],
        "layoutHint": "...",
        "textContent": "...",
        "imageHints": ["..."],
        "audioStrategy": "keep | mute",
        "animationHints": ["typewriter", "fade-in"]
      }}
    }}
  ]
}}
Rules: the timeline must not be empty; every id must be unique; video, overlay
and pip scenes need sourceVideoId with toSeconds > fromSeconds >= 0; banner
scenes need durationSeconds > 0."#
    );

    prompt
}

#[async_trait]
impl ScenarioStage for LlmScenarioStage {
    async fn generate(
        &self,
        request: &GenerationRequest,
        context: &EnrichedContext,
    ) -> WorkerResult<Value> {
        let prompt = build_scenario_prompt(request, context);
        debug!(prompt_chars = prompt.len(), "requesting scenario from llm");

        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| WorkerError::upstream("llm", error))?;

        let value = extract_json_payload(&raw)
            .map_err(|error| WorkerError::ScenarioInvalid(error.to_string()))?;

        let violations = validate_scenario_value(&value);
        if !violations.is_empty() {
            return Err(WorkerError::ScenarioInvalid(violations.join("; ")));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::AiEndpoint;
    use crate::model::context::VideoMetadata;
    use crate::util::retry::RetryConfig;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stage_for(server: &MockServer) -> LlmScenarioStage {
        let client = LlmClient::new(AiEndpoint {
            base_url: format!("{}/", server.uri()),
            api_key: None,
            model: "gpt-4o".into(),
            timeout: Duration::from_secs(5),
            retry: RetryConfig::new(1, 1, 10),
        })
        .expect("client builds");
        LlmScenarioStage::new(Arc::new(client))
    }

    fn request() -> GenerationRequest {
        serde_json::from_value(serde_json::json!({ "prompt": "make an intro" }))
            .expect("request parses")
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] })
    }

    #[test]
    fn prompt_enumerates_context_sections() {
        let mut context = EnrichedContext {
            prompt: "make an intro".into(),
            ..EnrichedContext::default()
        };
        context.video_metadata.insert(
            "vid-1".into(),
            VideoMetadata {
                duration: 12.5,
                fps: 30.0,
                width: 1920,
                height: 1080,
            },
        );
        context
            .video_transcripts
            .insert("vid-1".into(), "welcome to the show".into());
        context
            .image_captions
            .insert("img-1".into(), "a product shot".into());
        context.reference_notes = "bold colors".into();

        let prompt = build_scenario_prompt(&request(), &context);
        assert!(prompt.contains("make an intro"));
        assert!(prompt.contains("vid-1"));
        assert!(prompt.contains("welcome to the show"));
        assert!(prompt.contains("a product shot"));
        assert!(prompt.contains("bold colors"));
        assert!(prompt.contains("\"timeline\""));
    }

    #[tokio::test]
    async fn fenced_response_is_accepted() {
        let server = MockServer::start().await;
        let scenario = "```json\n{\"timeline\":[{\"id\":\"s1\",\"kind\":\"banner\",\"durationSeconds\":2,\"detailedRequest\":{}}]}\n```";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(scenario)))
            .mount(&server)
            .await;

        let stage = stage_for(&server);
        let value = stage
            .generate(&request(), &EnrichedContext::default())
            .await
            .expect("generates");
        assert_eq!(value["timeline"][0]["id"], "s1");
    }

    #[tokio::test]
    async fn empty_timeline_fails_with_scenario_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body("{\"timeline\": []}")),
            )
            .mount(&server)
            .await;

        let stage = stage_for(&server);
        let error = stage
            .generate(&request(), &EnrichedContext::default())
            .await
            .expect_err("empty timeline");
        assert!(matches!(error, WorkerError::ScenarioInvalid(_)));
    }

    #[tokio::test]
    async fn non_json_response_fails_with_scenario_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_body("Sure! Here is your scenario.")),
            )
            .mount(&server)
            .await;

        let stage = stage_for(&server);
        let error = stage
            .generate(&request(), &EnrichedContext::default())
            .await
            .expect_err("prose response");
        assert!(matches!(error, WorkerError::ScenarioInvalid(_)));
    }
}
