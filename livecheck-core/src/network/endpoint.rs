//! WebSocket endpoint resolution.
//!
//! The client is normally served next to the service, so the endpoint is
//! derived from the page origin: same host, `/ws` path, `wss` when the
//! page is `https`. The frontend dev server (port 5173) does not proxy
//! `/ws`, so it talks to the service on its own port directly.

use url::Url;

use crate::error::LiveCheckError;

/// Port of the frontend development server.
pub const DEV_SERVER_PORT: u16 = 5173;
/// Service endpoint used when running behind the dev server.
pub const DEV_ENDPOINT: &str = "ws://localhost:8000/ws";
/// Path of the service's WebSocket route.
pub const WS_PATH: &str = "/ws";

/// Resolve the endpoint to connect to.
///
/// An explicit endpoint wins and must already be a `ws`/`wss` URL;
/// otherwise the endpoint is derived from `origin`.
pub fn resolve_endpoint(explicit: Option<&str>, origin: &str) -> Result<Url, LiveCheckError> {
    if let Some(explicit) = explicit.filter(|s| !s.trim().is_empty()) {
        let url = Url::parse(explicit.trim())?;
        return match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(LiveCheckError::InvalidEndpoint(format!(
                "endpoint scheme must be ws or wss, got {other}"
            ))),
        };
    }

    let origin = Url::parse(origin.trim())?;

    if origin.port() == Some(DEV_SERVER_PORT) {
        return Ok(Url::parse(DEV_ENDPOINT)?);
    }

    let scheme = match origin.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(LiveCheckError::InvalidEndpoint(format!(
                "origin scheme must be http or https, got {other}"
            )));
        }
    };
    let host = origin
        .host_str()
        .ok_or_else(|| LiveCheckError::InvalidEndpoint("origin has no host".into()))?;
    let port = origin.port().map(|p| format!(":{p}")).unwrap_or_default();

    Ok(Url::parse(&format!("{scheme}://{host}{port}{WS_PATH}"))?)
}
