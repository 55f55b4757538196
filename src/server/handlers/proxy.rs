use crate::{
    error::{ProxyError, Result},
    metrics,
    proxy::{
        ResourceKind, classify,
        playlist::{self, ProxyLinks},
        relay,
        upstream::{HeaderOverrides, InboundContext, build_upstream_headers},
    },
    server::{state::AppState, url_validation::validate_target_url},
};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info};

/// Query string of `GET /proxy`.
#[derive(Debug, Default, Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
    pub referer: Option<String>,
    pub origin: Option<String>,
    pub ua: Option<String>,
}

impl ProxyParams {
    fn overrides(&self) -> HeaderOverrides {
        HeaderOverrides {
            referer: self.referer.clone(),
            origin: self.origin.clone(),
            ua: self.ua.clone(),
        }
    }
}

/// Proxy a playlist or media resource from the `url` parameter.
///
/// Playlists are fetched whole and rewritten; everything else is streamed.
/// Exactly one upstream request is made, and none when the parameters are
/// rejected.
pub async fn proxy(
    Query(params): Query<ProxyParams>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    let start = Instant::now();

    let target = params
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or(ProxyError::MissingParameter("url"))
        .and_then(|raw| validate_target_url(raw, state.config.block_private_targets))
        .inspect_err(|e| metrics::record_request("rejected", e.status_code().as_u16()))?;

    let kind = classify(&target);
    info!("Proxying {} as {}", target, kind.as_str());

    let overrides = params.overrides();
    let overrides = if overrides.is_empty() {
        None
    } else if state.config.allow_header_overrides {
        Some(overrides)
    } else {
        debug!("Header overrides are disabled, ignoring query parameters");
        None
    };

    let mut inbound = InboundContext::from_headers(&headers);
    if let Some(overrides) = &overrides {
        inbound = inbound.with_overrides(overrides);
    }

    let config = &state.config;
    let result = match kind {
        ResourceKind::Playlist => {
            // The manifest is rewritten whole, so never ask for a byte range of it.
            inbound.range = None;
            let upstream_headers = build_upstream_headers(&inbound, &target, config);
            let links = ProxyLinks::new(&config.proxy_base_url, overrides.as_ref());
            playlist::fetch_and_rewrite(
                &state.http_client,
                &target,
                upstream_headers,
                &links,
                config.upstream_timeout,
            )
            .await
            .map(IntoResponse::into_response)
        }
        ResourceKind::Binary => {
            let upstream_headers = build_upstream_headers(&inbound, &target, config);
            relay::relay(
                &state.http_client,
                &target,
                upstream_headers,
                config.upstream_timeout,
            )
            .await
        }
    };

    match &result {
        Ok(response) => metrics::record_request(kind.as_str(), response.status().as_u16()),
        Err(e) => {
            metrics::record_upstream_error(kind.as_str());
            metrics::record_request(kind.as_str(), e.status_code().as_u16());
        }
    }
    metrics::record_duration(kind.as_str(), start);

    result
}
