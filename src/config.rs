use std::env;
use std::time::Duration;

/// Fallback `User-Agent` sent upstream when the player supplies none.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Upstream timeout observed by origins and players alike.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Prefix for rewritten playlist links. Empty keeps them relative
    /// (`/proxy?url=...`), which works behind any host name.
    pub proxy_base_url: String,
    /// Bound on the upstream request and on each streamed body read
    pub upstream_timeout: Duration,
    /// `Origin` sent upstream when the player did not send one
    pub default_origin: String,
    /// `Referer` sent upstream when the player did not send one
    pub default_referer: String,
    /// `User-Agent` sent upstream when the player did not send one
    pub default_user_agent: String,
    /// Honour `referer`, `origin` and `ua` query parameters
    pub allow_header_overrides: bool,
    /// Reject targets on loopback, private and link-local addresses
    pub block_private_targets: bool,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode the port defaults to 4000. In PROD mode PORT is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = flag("DEV_MODE");

        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let proxy_base_url = env::var("PROXY_BASE_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();

        let upstream_timeout_secs: u64 = env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let default_origin =
            env::var("DEFAULT_ORIGIN").unwrap_or_else(|_| "https://example.com".to_string());
        let default_referer =
            env::var("DEFAULT_REFERER").unwrap_or_else(|_| "https://example.com/".to_string());
        let default_user_agent =
            env::var("DEFAULT_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        Ok(Config {
            port,
            is_dev,
            proxy_base_url,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs.max(1)),
            default_origin,
            default_referer,
            default_user_agent,
            allow_header_overrides: flag("ALLOW_HEADER_OVERRIDES"),
            block_private_targets: flag("BLOCK_PRIVATE_TARGETS"),
        })
    }
}

/// Boolean env var; anything other than `true`/`1`/`yes` is false.
fn flag(name: &str) -> bool {
    matches!(
        env::var(name)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "true" | "1" | "yes"
    )
}
