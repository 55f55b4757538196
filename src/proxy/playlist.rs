//! Playlist fetch and rewrite.
//!
//! Manifests are fetched whole, checked for the `#EXTM3U` marker and rewritten
//! line by line so every segment, key, rendition and sub-playlist reference
//! points back at the proxy. Line order and count never change.

use crate::{
    error::{ProxyError, Result},
    proxy::{
        resolve::resolve,
        upstream::{HeaderOverrides, send_once},
    },
};
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use regex::{Captures, Regex};
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Content type of every rewritten manifest.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl; charset=utf-8";

/// Content type for pass-through bodies when the origin does not name one.
const FALLBACK_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// How far into the body the `#EXTM3U` marker may appear.
const MARKER_WINDOW: usize = 1024;

/// `URI="..."` or unquoted `URI=...` inside a tag line.
static URI_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"URI=(?:"([^"]*)"|([^",\s]+))"#).expect("URI attribute pattern is valid")
});

/// Builds `<base>/proxy?url=<encoded>` links for rewritten lines.
#[derive(Debug, Clone)]
pub struct ProxyLinks {
    base: String,
    passthrough: String,
}

impl ProxyLinks {
    /// `proxy_base_url` may be empty for host-relative links. Overrides, when
    /// given, are appended to every link so child requests keep them.
    pub fn new(proxy_base_url: &str, overrides: Option<&HeaderOverrides>) -> Self {
        let passthrough = overrides
            .map(|o| {
                o.query_pairs()
                    .into_iter()
                    .map(|(k, v)| format!("&{}={}", k, urlencoding::encode(v)))
                    .collect::<String>()
            })
            .unwrap_or_default();

        Self {
            base: proxy_base_url.trim_end_matches('/').to_string(),
            passthrough,
        }
    }

    pub fn link(&self, absolute: &str) -> String {
        format!(
            "{}/proxy?url={}{}",
            self.base,
            urlencoding::encode(absolute),
            self.passthrough
        )
    }
}

/// A manifest ready to send to the player.
#[derive(Debug)]
pub struct PlaylistBody {
    pub body: String,
    pub content_type: HeaderValue,
    /// False when the body lacked the marker and was forwarded untouched
    pub rewritten: bool,
}

impl IntoResponse for PlaylistBody {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// Does the text look like an M3U playlist at all?
///
/// Accepts `#EXTM3U` and the `#!EXTM3U` variant, in any case.
pub fn is_manifest(text: &str) -> bool {
    let text = strip_bom(text);
    let head = &text.as_bytes()[..text.len().min(MARKER_WINDOW)];
    head.iter().enumerate().any(|(i, &b)| {
        if b != b'#' {
            return false;
        }
        let rest = &head[i + 1..];
        let rest = rest.strip_prefix(b"!").unwrap_or(rest);
        rest.len() >= 6 && rest[..6].eq_ignore_ascii_case(b"EXTM3U")
    })
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Rewrite every URI of a manifest against `base`.
///
/// Tag lines get their `URI=` attributes replaced (always quoted on output),
/// blank lines pass through, and any other line is treated as a URI. Lines
/// are joined with `\n`. A leading BOM is dropped so the header line stays a
/// tag.
pub fn rewrite_playlist(text: &str, base: &Url, links: &ProxyLinks) -> String {
    let text = strip_bom(text);
    let mut out = String::with_capacity(text.len() * 2);

    for (idx, raw) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.starts_with('#') {
            out.push_str(&rewrite_tag_line(line, base, links));
        } else if line.trim().is_empty() {
            out.push_str(line);
        } else {
            let absolute = resolve(line.trim(), base);
            out.push_str(&links.link(&absolute));
        }
    }

    out
}

/// Replace each `URI=` attribute value in a tag line.
fn rewrite_tag_line(line: &str, base: &Url, links: &ProxyLinks) -> String {
    if !line.contains("URI=") {
        return line.to_string();
    }

    URI_ATTRIBUTE
        .replace_all(line, |caps: &Captures| {
            let uri = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if uri.is_empty() {
                return caps[0].to_string();
            }
            let absolute = resolve(uri, base);
            debug!("Rewriting tag URI {} -> {}", uri, absolute);
            format!("URI=\"{}\"", links.link(&absolute))
        })
        .into_owned()
}

/// Fetch the manifest at `target` and rewrite it.
///
/// The whole exchange, body included, is bounded by `timeout`. Exactly one
/// upstream attempt is made.
pub async fn fetch_and_rewrite(
    client: &Client,
    target: &Url,
    headers: HeaderMap,
    links: &ProxyLinks,
    timeout: Duration,
) -> Result<PlaylistBody> {
    let fetch = async {
        let response = send_once(client, target, headers, timeout).await?;
        let status = response.status();
        let response = response.error_for_status().inspect_err(|_| {
            warn!("Upstream returned {} for playlist {}", status, target);
        })?;
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let bytes = response.bytes().await?;
        Ok::<_, ProxyError>((content_type, bytes))
    };

    let (content_type, bytes) = tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(timeout))??;

    let text = String::from_utf8(bytes.to_vec())?;

    if !is_manifest(&text) {
        info!(
            "Body of {} has no #EXTM3U marker, forwarding unchanged",
            target
        );
        return Ok(PlaylistBody {
            body: text,
            content_type: content_type
                .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE)),
            rewritten: false,
        });
    }

    let body = rewrite_playlist(&text, target, links);
    info!(
        "Rewrote playlist {} ({} -> {} bytes)",
        target,
        text.len(),
        body.len()
    );

    Ok(PlaylistBody {
        body,
        content_type: HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
        rewritten: true,
    })
}
