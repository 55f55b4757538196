use crate::error::ProxyError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Parse and check the `url` query parameter.
///
/// Accepts only absolute `http://` and `https://` URLs with a host. With
/// `block_private` set, IP-literal hosts in loopback, private and link-local
/// ranges are refused as well.
///
/// **Hostnames** are accepted without DNS resolution, so DNS rebinding is not
/// covered by the private-range check.
///
/// # Errors
/// [`ProxyError::InvalidTargetUrl`] for unparsable, relative, host-less or
/// non-HTTP(S) URLs; [`ProxyError::TargetForbidden`] for blocked addresses.
pub fn validate_target_url(raw: &str, block_private: bool) -> Result<Url, ProxyError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| ProxyError::InvalidTargetUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ProxyError::InvalidTargetUrl(format!(
                "scheme '{scheme}' not allowed, only http/https"
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| ProxyError::InvalidTargetUrl("no host".to_string()))?;

    if block_private {
        match host {
            Host::Ipv4(ip) if is_blocked_ipv4(ip) => {
                return Err(ProxyError::TargetForbidden(format!(
                    "private or reserved IPv4 address {ip}"
                )));
            }
            Host::Ipv6(ip) if is_blocked_ipv6(ip) => {
                return Err(ProxyError::TargetForbidden(format!(
                    "private or reserved IPv6 address {ip}"
                )));
            }
            Host::Domain(domain) if domain.eq_ignore_ascii_case("localhost") => {
                return Err(ProxyError::TargetForbidden("localhost".to_string()));
            }
            _ => {}
        }
    }

    Ok(parsed)
}

/// Returns `true` for IPv4 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `0.0.0.0/8`      "this" network (RFC 1122)
/// - `10.0.0.0/8`     RFC 1918 private
/// - `127.0.0.0/8`    loopback
/// - `169.254.0.0/16` link-local / cloud metadata
/// - `172.16.0.0/12`  RFC 1918 private
/// - `192.168.0.0/16` RFC 1918 private
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    a == 0
        || a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
}

/// Returns `true` for IPv6 loopback, link-local (`fe80::/10`) and
/// unique-local (`fc00::/7`) addresses, plus IPv4-mapped blocked addresses.
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let s = ip.segments();

    ip.is_loopback()
        || (s[0] & 0xffc0) == 0xfe80
        || (s[0] & 0xfe00) == 0xfc00
        || ip.to_ipv4_mapped().is_some_and(is_blocked_ipv4)
}
