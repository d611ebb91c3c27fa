//! Client identity used as the rate-limit key.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;

/// Best-effort client address.
///
/// First entry of `X-Forwarded-For`, else `X-Real-IP`, else the socket peer,
/// else `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        if let Some(first) = header("x-forwarded-for").and_then(|v| v.split(',').next()).map(str::trim)
            && !first.is_empty()
        {
            return Self(first.to_string());
        }
        if let Some(real_ip) = header("x-real-ip") {
            return Self(real_ip.to_string());
        }
        Self(peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
        Ok(Self::resolve(&parts.headers, peer))
    }
}
