//! Binary stream relay for segments, keys and anything else that is not a
//! playlist.
//!
//! The upstream body is never buffered. Dropping the response body (player
//! disconnected) drops the upstream stream with it, which closes the origin
//! connection.

use crate::{
    error::{ProxyError, Result},
    proxy::upstream::send_once,
};
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::Client;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Response headers copied from the origin. Everything else is dropped.
pub const FORWARDED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::ACCEPT_RANGES,
    header::CONTENT_RANGE,
];

/// What the player learns about the upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponseMeta {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub content_length: Option<HeaderValue>,
    pub accept_ranges: Option<HeaderValue>,
    pub content_range: Option<HeaderValue>,
}

impl UpstreamResponseMeta {
    pub fn capture(status: StatusCode, headers: &HeaderMap) -> Self {
        Self {
            status,
            content_type: headers.get(header::CONTENT_TYPE).cloned(),
            content_length: headers.get(header::CONTENT_LENGTH).cloned(),
            accept_ranges: headers.get(header::ACCEPT_RANGES).cloned(),
            content_range: headers.get(header::CONTENT_RANGE).cloned(),
        }
    }

    /// The forwarded subset as a header map.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let values = [
            &self.content_type,
            &self.content_length,
            &self.accept_ranges,
            &self.content_range,
        ];
        for (name, value) in FORWARDED_HEADERS.iter().zip(values) {
            if let Some(value) = value {
                headers.insert(name.clone(), value.clone());
            }
        }
        headers
    }
}

/// Fetch `target` in streaming mode and build the player response.
///
/// Errors returned here happen before any byte reaches the player and become
/// a 502. Later failures end the body stream with an error, which aborts the
/// connection; the response head is never written twice.
pub async fn relay(
    client: &Client,
    target: &Url,
    headers: HeaderMap,
    timeout: Duration,
) -> Result<Response> {
    let upstream = send_once(client, target, headers, timeout).await?;
    let meta = UpstreamResponseMeta::capture(upstream.status(), upstream.headers());

    info!(
        "Relaying {} from {} (content-range: {:?})",
        meta.status, target, meta.content_range
    );

    let body = Body::from_stream(body_stream(upstream, timeout, target.to_string()));

    let mut response = Response::new(body);
    *response.status_mut() = meta.status;
    *response.headers_mut() = meta.headers();
    Ok(response)
}

type ChunkStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct BodyState {
    chunks: ChunkStream,
    idle_timeout: Duration,
    target: String,
    failed: bool,
}

/// Upstream chunks with every read bounded by `idle_timeout`.
///
/// Yields one [`ProxyError::MidStreamFailure`] on breakage and then ends.
fn body_stream(
    upstream: reqwest::Response,
    idle_timeout: Duration,
    target: String,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    let state = BodyState {
        chunks: Box::pin(upstream.bytes_stream()),
        idle_timeout,
        target,
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }

        let next = tokio::time::timeout(state.idle_timeout, state.chunks.next()).await;
        let failure = match next {
            Ok(Some(Ok(chunk))) => return Some((Ok(chunk), state)),
            Ok(None) => {
                debug!("Finished relaying {}", state.target);
                return None;
            }
            Ok(Some(Err(e))) => e.to_string(),
            Err(_) => format!("no data for {:?}", state.idle_timeout),
        };

        warn!("Aborting relay of {}: {}", state.target, failure);
        state.failed = true;
        Some((Err(ProxyError::MidStreamFailure(failure)), state))
    })
}
