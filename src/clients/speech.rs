use std::path::Path;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::{AiEndpoint, authorize};

/// 音声文字起こしクライアント（OpenAI互換 transcriptions API）。
#[derive(Debug, Clone)]
pub(crate) struct SpeechClient {
    client: Client,
    base_url: Url,
    endpoint: AiEndpoint,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl SpeechClient {
    pub(crate) fn new(endpoint: AiEndpoint) -> Result<Self> {
        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .context("failed to build speech client")?;
        let base_url = Url::parse(&endpoint.base_url).context("invalid speech base URL")?;
        Ok(Self {
            client,
            base_url,
            endpoint,
        })
    }

    /// 抽出済みの音声ファイルを文字起こしする。
    ///
    /// マルチパート本文は再送できないため、このクライアントは再試行しない。
    pub(crate) async fn transcribe(&self, audio_file: &Path) -> Result<String> {
        let url = self
            .base_url
            .join("v1/audio/transcriptions")
            .context("failed to build transcription URL")?;

        let bytes = tokio::fs::read(audio_file)
            .await
            .with_context(|| format!("failed to read audio file {}", audio_file.display()))?;
        let file_name = audio_file
            .file_name()
            .map_or_else(|| "audio.wav".to_string(), |n| n.to_string_lossy().into_owned());

        debug!(file = %audio_file.display(), bytes = bytes.len(), "sending transcription request");

        let form = Form::new()
            .text("model", self.endpoint.model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = authorize(self.client.post(url), self.endpoint.api_key.as_deref())
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?
            .error_for_status()
            .context("transcription endpoint returned error status")?;

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("failed to deserialize transcription response")?;
        Ok(parsed.text)
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
    async fn transcribe_posts_audio_and_parses_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "hello from the video" })),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let audio = dir.path().join("audio.wav");
        tokio::fs::write(&audio, b"RIFFxxxx").await.expect("write");

        let client = SpeechClient::new(AiEndpoint {
            base_url: format!("{}/", server.uri()),
            api_key: Some("key".into()),
            model: "whisper-1".into(),
            timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        })
        .expect("client builds");

        let text = client.transcribe(&audio).await.expect("transcribes");
        assert_eq!(text, "hello from the video");
    }
}
