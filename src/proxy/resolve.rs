use url::Url;

/// Resolve a possibly-relative playlist URI against `base`.
///
/// Handles absolute, scheme-relative (`//host/x`), path-relative and
/// query-only references. Anything that cannot be resolved is returned
/// unchanged so one malformed line never aborts a whole rewrite.
pub fn resolve(uri: &str, base: &Url) -> String {
    // Whitespace and control characters are never legal in a URI reference.
    if uri.is_empty() || uri.chars().any(|c| c.is_ascii_whitespace() || c.is_control()) {
        return uri.to_string();
    }

    match base.join(uri) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => uri.to_string(),
    }
}
