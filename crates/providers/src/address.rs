//! Backend address resolution.
//!
//! Operators tend to write `gpu-box`, `gpu-box:8080`, or a full URL. All
//! three resolve to a base URL once, when the client is built.

use loremaster_config::DEFAULT_BACKEND_PORT;

/// Resolve a configured backend address into a base URL.
///
/// - carries a scheme → used verbatim
/// - schemeless, no port → `http://` plus the default Ollama port
/// - schemeless with a port → `http://` only
/// - absent or blank → local loopback on the default port
pub fn resolve_base_url(address: Option<&str>) -> String {
    let Some(raw) = address.map(str::trim).filter(|a| !a.is_empty()) else {
        return format!("http://localhost:{DEFAULT_BACKEND_PORT}");
    };
    let raw = raw.trim_end_matches('/');

    if raw.contains("://") {
        return raw.to_string();
    }

    let (authority, path) = match raw.find('/') {
        Some(i) => raw.split_at(i),
        None => (raw, ""),
    };
    let authority = strip_empty_port(authority);

    if has_port(authority) {
        format!("http://{authority}{path}")
    } else if is_bare_ipv6(authority) {
        format!("http://[{authority}]:{DEFAULT_BACKEND_PORT}{path}")
    } else {
        format!("http://{authority}:{DEFAULT_BACKEND_PORT}{path}")
    }
}

/// `gpu-box:` and `[::1]:` name no port; bare IPv6 such as `fe80::` is left alone.
fn strip_empty_port(authority: &str) -> &str {
    match authority.strip_suffix(':') {
        Some(host) if authority.starts_with('[') || !host.contains(':') => host,
        _ => authority,
    }
}

fn has_port(authority: &str) -> bool {
    // For bracketed IPv6 only the part after `]` can hold a port.
    let tail = match authority.rfind(']') {
        Some(i) => &authority[i + 1..],
        None if is_bare_ipv6(authority) => return false,
        None => authority,
    };
    tail.rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}

fn is_bare_ipv6(authority: &str) -> bool {
    !authority.starts_with('[') && authority.matches(':').count() > 1
}
