use std::net::IpAddr;

use actix_web::http::header;
use actix_web::HttpRequest;

/// Caller address as seen through `Forwarded`/`X-Forwarded-For`, else the peer.
pub fn client_ip(req: &HttpRequest) -> String {
    let info = req.connection_info();
    let raw = info.realip_remote_addr().unwrap_or("unknown");
    strip_port(raw).to_string()
}

pub fn user_agent(req: &HttpRequest) -> String {
    req.headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// The bearer token of the request, if any.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn strip_port(addr: &str) -> &str {
    if addr.parse::<IpAddr>().is_ok() {
        return addr;
    }
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => addr,
    }
}

/// Coarse location label for a session address. No GeoIP lookup is done.
pub fn describe_location(ip: &str) -> &'static str {
    let ip = ip.strip_prefix("::ffff:").unwrap_or(ip);
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) if v4.is_loopback() || v4.is_private() || v4.is_link_local() => "Local network",
        Ok(IpAddr::V6(v6)) if v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00 => "Local network",
        _ => "Unknown",
    }
}
