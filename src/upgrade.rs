//! HTTP to WebSocket upgrade.
//!
//! Validates the RFC 6455 opening handshake on a hyper request, answers it
//! with `101 Switching Protocols`, and turns the upgraded connection into a
//! `WebSocketStream` once hyper hands it over.

use crate::error::UpgradeError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;

/// WebSocket over an upgraded hyper connection.
pub type ServerWebSocket = WebSocketStream<TokioIo<Upgraded>>;

/// Which `Origin` headers may open a WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OriginPolicy {
    /// Accept every origin. Development only.
    #[default]
    Any,
    /// Accept listed origins (ASCII case-insensitive) and requests without an
    /// `Origin` header.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (OriginPolicy::Any, _) => true,
            (OriginPolicy::AllowList(_), None) => true,
            (OriginPolicy::AllowList(list), Some(origin)) => {
                list.iter().any(|allowed| allowed.eq_ignore_ascii_case(origin))
            }
        }
    }
}

/// Upgrade handshake with a fixed origin policy and stream configuration.
#[derive(Debug, Clone)]
pub struct Upgrader {
    origin_policy: OriginPolicy,
    config: WebSocketConfig,
}

impl Upgrader {
    pub fn new(origin_policy: OriginPolicy, config: WebSocketConfig) -> Self {
        Self {
            origin_policy,
            config,
        }
    }

    /// Stream configuration from buffer and message size limits.
    pub fn stream_config(
        read_buffer_size: usize,
        write_buffer_size: usize,
        max_message_size: usize,
    ) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.read_buffer_size = read_buffer_size;
        config.write_buffer_size = write_buffer_size;
        config.max_message_size = Some(max_message_size);
        config.max_frame_size = Some(max_message_size);
        config
    }

    /// Validate the handshake headers and return the `Sec-WebSocket-Accept`
    /// value for the response.
    pub fn check<B>(&self, req: &Request<B>) -> Result<String, UpgradeError> {
        if req.method() != Method::GET {
            return Err(UpgradeError::Method(req.method().to_string()));
        }

        let headers = req.headers();
        if !is_upgrade_request(headers) {
            return Err(UpgradeError::NotUpgrade);
        }

        let version = header_str(headers, &header::SEC_WEBSOCKET_VERSION).unwrap_or("");
        if version.trim() != "13" {
            return Err(UpgradeError::UnsupportedVersion(version.to_string()));
        }

        let key = headers
            .get(header::SEC_WEBSOCKET_KEY)
            .ok_or(UpgradeError::MissingKey)?;

        let origin = header_str(headers, &header::ORIGIN);
        if !self.origin_policy.allows(origin) {
            return Err(UpgradeError::ForbiddenOrigin(
                origin.unwrap_or_default().to_string(),
            ));
        }

        Ok(derive_accept_key(key.as_bytes()))
    }

    /// Accept the handshake.
    ///
    /// Returns the `101` response that must be sent back to the client, and a
    /// pending upgrade that resolves to the WebSocket once hyper has flushed
    /// that response.
    pub fn upgrade<B>(
        &self,
        mut req: Request<B>,
    ) -> Result<(Response<Full<Bytes>>, PendingUpgrade), UpgradeError> {
        let accept = self.check(&req)?;
        let on_upgrade = hyper::upgrade::on(&mut req);

        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = response.headers_mut();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(
            header::SEC_WEBSOCKET_ACCEPT,
            HeaderValue::try_from(accept).map_err(|_| UpgradeError::AcceptHeader)?,
        );

        Ok((
            response,
            PendingUpgrade {
                on_upgrade,
                config: self.config.clone(),
            },
        ))
    }
}

/// An accepted handshake waiting for hyper to release the connection.
pub struct PendingUpgrade {
    on_upgrade: OnUpgrade,
    config: WebSocketConfig,
}

impl PendingUpgrade {
    pub async fn finish(self) -> Result<ServerWebSocket, UpgradeError> {
        let upgraded = self.on_upgrade.await?;
        Ok(WebSocketStream::from_raw_socket(
            TokioIo::new(upgraded),
            Role::Server,
            Some(self.config),
        )
        .await)
    }
}

/// Whether the headers ask for a WebSocket upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let upgrade_websocket = headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("websocket"));

    connection_upgrade && upgrade_websocket
}

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Plain-text error response for a rejected upgrade.
pub fn rejection(err: &UpgradeError) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(err.to_string())));
    *response.status_mut() = err.status();
    if matches!(err, UpgradeError::UnsupportedVersion(_)) {
        response
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
    }
    response
}
