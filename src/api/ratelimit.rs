use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::error::error_response;
use crate::app::AppState;

/// 固定ウィンドウのIP別カウンタ。
///
/// 厳密なスライディングウィンドウは不要（上限は防護目的の粗い値）。
pub(crate) struct RateLimiter {
    limit: u32,
    window: Duration,
    counters: Mutex<HashMap<IpAddr, (Instant, u32)>>,
}

impl RateLimiter {
    pub(crate) fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// このIPのリクエストを許可するか。カウントを1進める。
    pub(crate) fn allow(&self, ip: IpAddr) -> bool {
        let mut counters = self.counters.lock().expect("rate limiter lock");
        let now = Instant::now();
        let entry = counters.entry(ip).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        if entry.1 >= self.limit {
            return false;
        }
        entry.1 += 1;
        true
    }
}

/// 用途別のレートリミッタ一式。
pub(crate) struct RateLimits {
    pub(crate) api: RateLimiter,
    pub(crate) generate: RateLimiter,
}

/// ループバックおよびRFC1918のプライベートアドレスか。
pub(crate) fn is_internal_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// レート制限を免除するリクエストか。
///
/// ローカル・プライベート発、`X-Internal-Request: true` 付き、もしくは
/// 接続情報が取れない場合（テストハーネス経由）は免除する。
pub(crate) fn bypasses_rate_limit(headers: &HeaderMap, source: Option<IpAddr>) -> bool {
    if headers
        .get("x-internal-request")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    {
        return true;
    }
    match source {
        Some(ip) => is_internal_address(ip),
        None => true,
    }
}

fn source_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

/// API全体のレート制限ミドルウェア（既定 500リクエスト / 15分）。
pub(crate) async fn api_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let source = source_ip(&request);
    if !bypasses_rate_limit(request.headers(), source) {
        let ip = source.expect("non-bypassed requests have a source address");
        if !state.rate_limits().api.allow(ip) {
            warn!(%ip, "api rate limit exceeded");
            return error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
        }
    }
    next.run(request).await
}

/// 生成エンドポイント専用のレート制限（既定 20生成 / 時）。
pub(crate) async fn generate_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let source = source_ip(&request);
    if !bypasses_rate_limit(request.headers(), source) {
        let ip = source.expect("non-bypassed requests have a source address");
        if !state.rate_limits().generate.allow(ip) {
            warn!(%ip, "generation rate limit exceeded");
            return error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "generation rate limit exceeded",
            );
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_counts_within_a_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "203.0.113.9".parse().expect("ip");
        assert!(limiter.allow(ip));
        assert!(limiter.allow(ip));
        assert!(!limiter.allow(ip));
    }

    #[test]
    fn limiter_tracks_ips_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a: IpAddr = "203.0.113.9".parse().expect("ip");
        let b: IpAddr = "203.0.113.10".parse().expect("ip");
        assert!(limiter.allow(a));
        assert!(limiter.allow(b));
        assert!(!limiter.allow(a));
    }

    #[test]
    fn internal_addresses_are_recognized() {
        for raw in ["127.0.0.1", "10.1.2.3", "172.16.0.1", "192.168.1.5", "::1"] {
            let ip: IpAddr = raw.parse().expect("ip");
            assert!(is_internal_address(ip), "{raw} should be internal");
        }
        for raw in ["8.8.8.8", "203.0.113.9", "172.32.0.1"] {
            let ip: IpAddr = raw.parse().expect("ip");
            assert!(!is_internal_address(ip), "{raw} should be external");
        }
    }

    #[test]
    fn internal_header_bypasses_the_limit() {
        let mut headers = HeaderMap::new();
        headers.insert("x-internal-request", "true".parse().expect("header"));
        let external: IpAddr = "203.0.113.9".parse().expect("ip");
        assert!(bypasses_rate_limit(&headers, Some(external)));

        let headers = HeaderMap::new();
        assert!(!bypasses_rate_limit(&headers, Some(external)));
        assert!(bypasses_rate_limit(
            &headers,
            Some("127.0.0.1".parse().expect("ip"))
        ));
        assert!(bypasses_rate_limit(&headers, None));
    }
}
