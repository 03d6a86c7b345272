use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AiEndpoint, authorize, send_with_retry};

/// 画像理解クライアント（OpenAI互換のマルチモーダルチャット）。
#[derive(Debug, Clone)]
pub(crate) struct VisionClient {
    client: Client,
    base_url: Url,
    endpoint: AiEndpoint,
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

impl VisionClient {
    pub(crate) fn new(endpoint: AiEndpoint) -> Result<Self> {
        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .context("failed to build vision client")?;
        let base_url = Url::parse(&endpoint.base_url).context("invalid vision base URL")?;
        Ok(Self {
            client,
            base_url,
            endpoint,
        })
    }

    /// 画像URLに対して指示文つきの説明を生成する。
    pub(crate) async fn describe(&self, image_url: &str, instruction: &str) -> Result<String> {
        let url = self
            .base_url
            .join("v1/chat/completions")
            .context("failed to build vision URL")?;

        debug!(image_url, "sending image description request");

        let body = json!({
            "model": self.endpoint.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }]
        });

        let response = send_with_retry(self.endpoint.retry, || {
            let request = authorize(
                self.client.post(url.clone()),
                self.endpoint.api_key.as_deref(),
            )
            .json(&body);
            async move { request.send().await?.error_for_status() }
        })
        .await
        .context("image description request failed")?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to deserialize vision response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("vision response contained no content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::retry::RetryConfig;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn describe_returns_caption_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "a red bicycle on a beach" } }]
            })))
            .mount(&server)
            .await;

        let client = VisionClient::new(AiEndpoint {
            base_url: format!("{}/", server.uri()),
            api_key: None,
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(5),
            retry: RetryConfig::new(1, 1, 10),
        })
        .expect("client builds");

        let caption = client
            .describe("http://cdn/img-1.png", "Describe this image")
            .await
            .expect("describes");
        assert_eq!(caption, "a red bicycle on a beach");
    }
}
