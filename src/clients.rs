pub(crate) mod image_gen;
pub(crate) mod llm;
pub(crate) mod speech;
pub(crate) mod vision;

use std::future::Future;
use std::time::Duration;

pub(crate) use image_gen::ImageGenClient;
pub(crate) use llm::LlmClient;
pub(crate) use speech::SpeechClient;
pub(crate) use vision::VisionClient;

use crate::util::retry::{RetryConfig, is_retryable_error};

/// AIコラボレータ共通の接続設定。
#[derive(Debug, Clone)]
pub(crate) struct AiEndpoint {
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) model: String,
    pub(crate) timeout: Duration,
    pub(crate) retry: RetryConfig,
}

/// 一過性の失敗（接続・タイムアウト・5xx・429）だけを再試行して送信する。
pub(crate) async fn send_with_retry<F, Fut>(
    retry: RetryConfig,
    mut send: F,
) -> reqwest::Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<reqwest::Response>>,
{
    let mut attempt = 0;
    loop {
        match send().await {
            Ok(response) => return Ok(response),
            Err(error) => {
                let next_attempt = attempt + 1;
                if !retry.can_retry(next_attempt) || !is_retryable_error(&error) {
                    return Err(error);
                }
                attempt = next_attempt;
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
            }
        }
    }
}

/// ベアラートークンを条件付きで付与する。
pub(crate) fn authorize(
    request: reqwest::RequestBuilder,
    api_key: Option<&str>,
) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}
