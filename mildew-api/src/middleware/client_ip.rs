/// Client address resolution
///
/// The server normally runs behind a reverse proxy, so the socket peer is the
/// proxy. When proxy headers are trusted the address is taken from, in order:
///
/// 1. The first hop of `X-Forwarded-For`
/// 2. `X-Real-IP`
/// 3. The socket peer (requires `into_make_service_with_connect_info`)
///
/// The result is stored as [`ClientIp`] in the request extensions for logging
/// and rate limiting.

use crate::app::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Resolved client address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIp(pub IpAddr);

impl std::fmt::Display for ClientIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Picks the client address from headers and the socket peer
///
/// Unparsable header values are ignored. Without any source the unspecified
/// address is returned, so all such requests share one bucket.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|ip| ip.trim().parse().ok());
        if let Some(ip) = forwarded {
            return ip;
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok());
        if let Some(ip) = real_ip {
            return ip;
        }
    }

    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Inserts [`ClientIp`] into the request extensions
pub async fn client_ip_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let ip = resolve_client_ip(req.headers(), peer, state.config.api.trust_proxy_headers);
    req.extensions_mut().insert(ClientIp(ip));

    next.run(req).await
}
