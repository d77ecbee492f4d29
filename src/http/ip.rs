//! Client IP derivation (C8, §6).
//!
//! Priority order: the socket's own peer address, then
//! `X-Original-Forwarded-For`, then the first hop of `X-Forwarded-For`
//! (unless it matches the Envoy-reported external address, in which case it
//! is treated as untrustworthy and discarded). The result is validated as an
//! IP address; loopback normalizes to `127.0.0.1`, anything unparseable to
//! the sentinel `0.0.0.0`.

use std::net::IpAddr;

use axum::http::HeaderMap;

pub fn derive_client_ip(remote_addr: Option<&str>, headers: &HeaderMap) -> String {
    let candidate = remote_addr
        .and_then(split_host)
        .or_else(|| header_str(headers, "x-original-forwarded-for"))
        .or_else(|| forwarded_for_candidate(headers));

    normalize(candidate)
}

fn split_host(addr: &str) -> Option<String> {
    let trimmed = addr.trim();
    let host = trimmed.rsplit_once(':')?.0;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_string)
}

fn forwarded_for_candidate(headers: &HeaderMap) -> Option<String> {
    let xff = header_str(headers, "x-forwarded-for")?;
    let first = xff.split(',').next()?.trim().to_string();
    let envoy = header_str(headers, "x-envoy-external-address");
    if envoy.as_deref() == Some(first.as_str()) {
        None
    } else {
        Some(first)
    }
}

fn normalize(candidate: Option<String>) -> String {
    match candidate.and_then(|c| c.parse::<IpAddr>().ok()) {
        Some(ip) if ip.is_loopback() => "127.0.0.1".to_string(),
        Some(ip) => ip.to_string(),
        None => "0.0.0.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn socket_peer_takes_priority() {
        let h = headers(&[("x-forwarded-for", "198.51.100.9")]);
        assert_eq!(derive_client_ip(Some("203.0.113.5:54321"), &h), "203.0.113.5");
    }

    #[test]
    fn falls_back_to_x_original_forwarded_for() {
        let h = headers(&[("x-original-forwarded-for", "203.0.113.7")]);
        assert_eq!(derive_client_ip(None, &h), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_first_x_forwarded_for_hop() {
        let h = headers(&[("x-forwarded-for", "203.0.113.8, 10.0.0.1")]);
        assert_eq!(derive_client_ip(None, &h), "203.0.113.8");
    }

    #[test]
    fn matching_envoy_address_is_discarded() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.8, 10.0.0.1"),
            ("x-envoy-external-address", "203.0.113.8"),
        ]);
        assert_eq!(derive_client_ip(None, &h), "0.0.0.0");
    }

    #[test]
    fn loopback_normalizes() {
        assert_eq!(derive_client_ip(Some("127.0.0.1:8080"), &HeaderMap::new()), "127.0.0.1");
        assert_eq!(derive_client_ip(Some("[::1]:8080"), &HeaderMap::new()), "127.0.0.1");
    }

    #[test]
    fn unparseable_falls_back_to_sentinel() {
        assert_eq!(derive_client_ip(None, &HeaderMap::new()), "0.0.0.0");
    }
}
