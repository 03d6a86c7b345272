use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AiEndpoint, authorize, send_with_retry};

/// バナー前景用の画像生成クライアント（OpenAI互換 images API）。
#[derive(Debug, Clone)]
pub(crate) struct ImageGenClient {
    client: Client,
    base_url: Url,
    endpoint: AiEndpoint,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

/// 生成時に使えるプリセットアスペクト比とそのピクセル寸法。
const PRESETS: [(f64, &str); 5] = [
    (1.0, "1024x1024"),
    (16.0 / 9.0, "1280x720"),
    (9.0 / 16.0, "720x1280"),
    (4.0 / 3.0, "1024x768"),
    (3.0 / 4.0, "768x1024"),
];

/// 要求されたアスペクト比に最も近いプリセットのサイズ表記を返す。
#[must_use]
pub(crate) fn preset_size_for_aspect(aspect_ratio: f64) -> &'static str {
    let mut best = PRESETS[0];
    for preset in PRESETS {
        if (preset.0 - aspect_ratio).abs() < (best.0 - aspect_ratio).abs() {
            best = preset;
        }
    }
    best.1
}

impl ImageGenClient {
    pub(crate) fn new(endpoint: AiEndpoint) -> Result<Self> {
        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .context("failed to build image generation client")?;
        let base_url = Url::parse(&endpoint.base_url).context("invalid image gen base URL")?;
        Ok(Self {
            client,
            base_url,
            endpoint,
        })
    }

    /// プロンプトから画像を生成し、PNGバイト列を返す。
    pub(crate) async fn generate(&self, prompt: &str, aspect_ratio: f64) -> Result<Vec<u8>> {
        let url = self
            .base_url
            .join("v1/images/generations")
            .context("failed to build image generation URL")?;
        let size = preset_size_for_aspect(aspect_ratio);

        debug!(size, prompt_chars = prompt.len(), "sending image generation request");

        let body = json!({
            "model": self.endpoint.model,
            "prompt": prompt,
            "size": size,
            "n": 1,
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
        .context("image generation request failed")?;

        let parsed: ImageResponse = response
            .json()
            .await
            .context("failed to deserialize image generation response")?;

        let b64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or_else(|| anyhow!("image generation response contained no image data"))?;

        BASE64
            .decode(b64.as_bytes())
            .context("image payload is not valid base64")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::retry::RetryConfig;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn preset_selection_picks_the_closest_ratio() {
        assert_eq!(preset_size_for_aspect(1.0), "1024x1024");
        assert_eq!(preset_size_for_aspect(1.9), "1280x720");
        assert_eq!(preset_size_for_aspect(0.5), "720x1280");
        assert_eq!(preset_size_for_aspect(1.3), "1024x768");
        assert_eq!(preset_size_for_aspect(0.78), "768x1024");
    }

    #[tokio::test]
    async fn generate_decodes_base64_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "b64_json": BASE64.encode(b"png-bytes") }]
            })))
            .mount(&server)
            .await;

        let client = ImageGenClient::new(AiEndpoint {
            base_url: format!("{}/", server.uri()),
            api_key: None,
            model: "gpt-image-1".into(),
            timeout: Duration::from_secs(5),
            retry: RetryConfig::new(1, 1, 10),
        })
        .expect("client builds");

        let bytes = client.generate("a sunrise", 1.0).await.expect("generates");
        assert_eq!(bytes, b"png-bytes");
    }
}
