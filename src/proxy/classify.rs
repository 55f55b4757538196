use url::Url;

/// How a target is handled: rewritten as a manifest or streamed verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Playlist,
    Binary,
}

impl ResourceKind {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Playlist => "playlist",
            ResourceKind::Binary => "segment",
        }
    }
}

/// Classify a target by its path extension.
///
/// A path ending in `.m3u8` (any case) is a playlist; query string and
/// fragment are ignored. This is only a guess: the playlist engine still
/// checks the fetched body for the manifest marker.
pub fn classify(url: &Url) -> ResourceKind {
    if url.path().to_ascii_lowercase().ends_with(".m3u8") {
        ResourceKind::Playlist
    } else {
        ResourceKind::Binary
    }
}
