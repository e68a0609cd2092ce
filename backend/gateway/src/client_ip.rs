//! Client address resolution for IP-based pairing checks.
//!
//! Order: the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
//! socket peer address. A first hop that is not an address falls through;
//! later hops are never consulted.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, StatusCode, request::Parts},
};
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|entry| entry.trim().parse::<IpAddr>().ok());

    forwarded
        .or_else(|| {
            headers
                .get(REAL_IP)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
        .or_else(|| peer.map(|p| p.ip()))
}

/// Extractor yielding the resolved requester address.
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        match resolve_client_ip(&parts.headers, peer) {
            Some(ip) => Ok(ClientIp(ip)),
            None => {
                warn!("Could not determine client address");
                Err((StatusCode::BAD_REQUEST, "Cannot determine client address"))
            }
        }
    }
}
