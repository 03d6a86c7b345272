use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AiEndpoint, authorize, send_with_retry};

/// シナリオ生成用のチャット補完クライアント（OpenAI互換）。
#[derive(Debug, Clone)]
pub(crate) struct LlmClient {
    client: Client,
    base_url: Url,
    endpoint: AiEndpoint,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl LlmClient {
    pub(crate) fn new(endpoint: AiEndpoint) -> Result<Self> {
        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .context("failed to build llm client")?;
        let base_url = Url::parse(&endpoint.base_url).context("invalid llm base URL")?;
        Ok(Self {
            client,
            base_url,
            endpoint,
        })
    }

    /// プロンプトを送信して生のテキスト応答を返す。
    ///
    /// 応答のJSONパース・スキーマ検証は呼び出し側（フェーズ1）の責務。
    pub(crate) async fn complete(&self, prompt: &str) -> Result<String> {
        let url = self
            .base_url
            .join("v1/chat/completions")
            .context("failed to build chat completions URL")?;

        debug!(model = %self.endpoint.model, prompt_chars = prompt.len(), "sending chat completion request");

        let body = ChatRequest {
            model: &self.endpoint.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
        };

        let response = send_with_retry(self.endpoint.retry, || {
            let request = authorize(
                self.client.post(url.clone()),
                self.endpoint.api_key.as_deref(),
            )
            .json(&body);
            async move { request.send().await?.error_for_status() }
        })
        .await
        .context("chat completion request failed")?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to deserialize chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("chat completion response contained no content"))
    }
}
