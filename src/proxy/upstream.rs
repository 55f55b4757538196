//! Outbound request construction and the single upstream attempt.
//!
//! Only a handful of inbound headers ever reach the origin. Everything else
//! the player sent (cookies, auth, client hints) stays on this side.

use crate::{
    config::Config,
    error::{ProxyError, Result},
};
use axum::http::{HeaderMap, HeaderValue, header};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Fixed `Accept-Encoding`; reqwest decodes all three before we see the body.
pub const ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Query-parameter replacements for the identity headers.
///
/// Only consulted when [`Config::allow_header_overrides`] is set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HeaderOverrides {
    pub referer: Option<String>,
    pub origin: Option<String>,
    pub ua: Option<String>,
}

impl HeaderOverrides {
    pub fn is_empty(&self) -> bool {
        self.referer.is_none() && self.origin.is_none() && self.ua.is_none()
    }

    /// Present overrides as query pairs, in a stable order, so rewritten
    /// playlist links can carry them to child requests.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("referer", self.referer.as_deref()),
            ("origin", self.origin.as_deref()),
            ("ua", self.ua.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }
}

/// The parts of the player's request that may influence the upstream request.
#[derive(Debug, Clone, Default)]
pub struct InboundContext {
    pub origin: Option<HeaderValue>,
    pub referer: Option<HeaderValue>,
    pub user_agent: Option<HeaderValue>,
    pub range: Option<HeaderValue>,
}

impl InboundContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            origin: headers.get(header::ORIGIN).cloned(),
            referer: headers.get(header::REFERER).cloned(),
            user_agent: headers.get(header::USER_AGENT).cloned(),
            range: headers.get(header::RANGE).cloned(),
        }
    }

    /// Apply query overrides on top of the inbound headers.
    ///
    /// Values that are not valid header values are skipped.
    pub fn with_overrides(mut self, overrides: &HeaderOverrides) -> Self {
        if let Some(v) = overrides.origin.as_deref().and_then(header_value) {
            self.origin = Some(v);
        }
        if let Some(v) = overrides.referer.as_deref().and_then(header_value) {
            self.referer = Some(v);
        }
        if let Some(v) = overrides.ua.as_deref().and_then(header_value) {
            self.user_agent = Some(v);
        }
        self
    }
}

fn header_value(raw: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(raw) {
        Ok(v) => Some(v),
        Err(_) => {
            debug!("Ignoring header override that is not a valid header value");
            None
        }
    }
}

/// `host[:port]` of the target, the only acceptable `Host` upstream.
pub fn authority(target: &Url) -> Option<String> {
    let host = target.host_str()?;
    Some(match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Build the outbound header set for `target`.
///
/// Pure: the same inbound context, target and config always produce the same
/// map. `Range` is forwarded only when the player sent one.
pub fn build_upstream_headers(inbound: &InboundContext, target: &Url, config: &Config) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let with_default = |value: &Option<HeaderValue>, fallback: &str| {
        value
            .clone()
            .or_else(|| HeaderValue::from_str(fallback).ok())
    };

    if let Some(v) = with_default(&inbound.origin, &config.default_origin) {
        headers.insert(header::ORIGIN, v);
    }
    if let Some(v) = with_default(&inbound.referer, &config.default_referer) {
        headers.insert(header::REFERER, v);
    }
    if let Some(v) = with_default(&inbound.user_agent, &config.default_user_agent) {
        headers.insert(header::USER_AGENT, v);
    }

    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static(ACCEPT_ENCODING),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

    if let Some(host) = authority(target).and_then(|a| HeaderValue::from_str(&a).ok()) {
        headers.insert(header::HOST, host);
    }

    if let Some(range) = &inbound.range {
        headers.insert(header::RANGE, range.clone());
    }

    headers
}

/// Issue exactly one GET to `target`. Waiting for the response head is
/// bounded by `timeout`; the body is left to the caller.
pub async fn send_once(
    client: &Client,
    target: &Url,
    headers: HeaderMap,
    timeout: Duration,
) -> Result<Response> {
    let request = client.get(target.clone()).headers(headers);

    match tokio::time::timeout(timeout, request.send()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => {
            warn!("Upstream fetch failed for {}: {}", target, e);
            Err(ProxyError::UpstreamUnavailable(e))
        }
        Err(_) => {
            warn!("Upstream fetch timed out after {:?} for {}", timeout, target);
            Err(ProxyError::UpstreamTimeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            port: 0,
            is_dev: true,
            proxy_base_url: String::new(),
            upstream_timeout: Duration::from_secs(30),
            default_origin: "https://default.example".to_string(),
            default_referer: "https://default.example/".to_string(),
            default_user_agent: "TestAgent/1.0".to_string(),
            allow_header_overrides: false,
            block_private_targets: false,
        }
    }

    fn target() -> Url {
        Url::parse("https://cdn.example.com/live/index.m3u8").unwrap()
    }

    #[test]
    fn defaults_when_player_sends_nothing() {
        let headers =
            build_upstream_headers(&InboundContext::default(), &target(), &test_config());

        assert_eq!(headers[header::ORIGIN], "https://default.example");
        assert_eq!(headers[header::REFERER], "https://default.example/");
        assert_eq!(headers[header::USER_AGENT], "TestAgent/1.0");
        assert_eq!(headers[header::ACCEPT_ENCODING], "gzip, deflate, br");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[header::HOST], "cdn.example.com");
        assert!(headers.get(header::RANGE).is_none());
    }

    #[test]
    fn inbound_identity_headers_win_over_defaults() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::ORIGIN, HeaderValue::from_static("https://player.tv"));
        inbound.insert(header::REFERER, HeaderValue::from_static("https://player.tv/watch"));
        inbound.insert(header::USER_AGENT, HeaderValue::from_static("Player/2"));

        let ctx = InboundContext::from_headers(&inbound);
        let headers = build_upstream_headers(&ctx, &target(), &test_config());

        assert_eq!(headers[header::ORIGIN], "https://player.tv");
        assert_eq!(headers[header::REFERER], "https://player.tv/watch");
        assert_eq!(headers[header::USER_AGENT], "Player/2");
    }

    #[test]
    fn host_comes_from_target_not_inbound() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("localhost:4000"));

        let ctx = InboundContext::from_headers(&inbound);
        let target = Url::parse("http://origin.example:8080/seg.ts").unwrap();
        let headers = build_upstream_headers(&ctx, &target, &test_config());

        assert_eq!(headers[header::HOST], "origin.example:8080");
    }

    #[test]
    fn default_port_is_omitted_from_host() {
        let target = Url::parse("https://origin.example:443/seg.ts").unwrap();
        assert_eq!(authority(&target).as_deref(), Some("origin.example"));
    }

    #[test]
    fn range_forwarded_verbatim() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::RANGE, HeaderValue::from_static("bytes=100-199"));

        let ctx = InboundContext::from_headers(&inbound);
        let headers = build_upstream_headers(&ctx, &target(), &test_config());

        assert_eq!(headers[header::RANGE], "bytes=100-199");
    }

    #[test]
    fn unrelated_inbound_headers_are_not_forwarded() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::COOKIE, HeaderValue::from_static("session=secret"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer x"));

        let ctx = InboundContext::from_headers(&inbound);
        let headers = build_upstream_headers(&ctx, &target(), &test_config());

        assert!(headers.get(header::COOKIE).is_none());
        assert!(headers.get(header::AUTHORIZATION).is_none());
        assert_eq!(headers.len(), 6);
    }

    #[test]
    fn overrides_take_precedence() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::REFERER, HeaderValue::from_static("https://player.tv/"));

        let overrides = HeaderOverrides {
            referer: Some("https://site.example/".to_string()),
            origin: None,
            ua: Some("Override/1".to_string()),
        };
        let ctx = InboundContext::from_headers(&inbound).with_overrides(&overrides);
        let headers = build_upstream_headers(&ctx, &target(), &test_config());

        assert_eq!(headers[header::REFERER], "https://site.example/");
        assert_eq!(headers[header::USER_AGENT], "Override/1");
        assert_eq!(headers[header::ORIGIN], "https://default.example");
    }

    #[test]
    fn invalid_override_is_ignored() {
        let overrides = HeaderOverrides {
            referer: Some("bad\nvalue".to_string()),
            ..Default::default()
        };
        let ctx = InboundContext::default().with_overrides(&overrides);
        assert!(ctx.referer.is_none());
    }

    #[test]
    fn override_query_pairs_in_stable_order() {
        let overrides = HeaderOverrides {
            referer: Some("r".to_string()),
            origin: None,
            ua: Some("u".to_string()),
        };
        assert_eq!(overrides.query_pairs(), vec![("referer", "r"), ("ua", "u")]);
        assert!(HeaderOverrides::default().is_empty());
    }
}
