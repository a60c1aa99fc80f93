//! Protocol upgrade handshakes
//!
//! Recognizes `Upgrade` requests and builds the `101 Switching Protocols`
//! answers for WebSocket (RFC 6455) and the cleartext HTTP/2 stub.

use crate::error::{Error, ProtocolError};
use crate::http::{HttpRequest, HttpResponse};
use crate::protocol::http_header::*;
use crate::protocol::{http_value, utils};
use http::StatusCode;

/// Protocol a client asked to switch to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeTarget {
    /// RFC 6455 WebSocket
    WebSocket,
    /// Cleartext HTTP/2; answered but never switched to
    H2c,
}

impl UpgradeTarget {
    /// Detect the upgrade target of a request
    ///
    /// Returns `None` for plain requests and for upgrade tokens the engine
    /// does not speak, which are then served as ordinary HTTP.
    pub fn from_request(request: &HttpRequest) -> Option<Self> {
        let value = request.header(UPGRADE)?.trim();
        if value.eq_ignore_ascii_case(http_value::WEBSOCKET) {
            Some(UpgradeTarget::WebSocket)
        } else if value.eq_ignore_ascii_case(http_value::H2C) {
            Some(UpgradeTarget::H2c)
        } else {
            None
        }
    }

    /// Token written into the `Upgrade` response header
    pub fn token(&self) -> &'static str {
        match self {
            UpgradeTarget::WebSocket => http_value::WEBSOCKET,
            UpgradeTarget::H2c => http_value::H2C,
        }
    }
}

/// Compute WebSocket accept key from client key
pub fn compute_accept_key(client_key: &str) -> String {
    utils::calculate_accept(client_key.trim())
}

/// Build the `101` answer to a WebSocket upgrade request
pub fn websocket_response(request: &HttpRequest) -> Result<HttpResponse, Error> {
    let client_key = request
        .header(SEC_WEBSOCKET_KEY)
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| Error::Protocol(ProtocolError::MissingHeader(SEC_WEBSOCKET_KEY.to_string())))?;

    let mut response = switching_protocols(UpgradeTarget::WebSocket);
    response.set_header(SEC_WEBSOCKET_ACCEPT, compute_accept_key(client_key));
    Ok(response)
}

/// Build the `101` answer to an h2c upgrade request
pub fn h2c_response() -> HttpResponse {
    switching_protocols(UpgradeTarget::H2c)
}

/// Whether serialized response bytes are a `101 Switching Protocols`
pub fn is_switching_response(raw: &[u8]) -> bool {
    raw.starts_with(b"HTTP/1.1 101 ")
}

fn switching_protocols(target: UpgradeTarget) -> HttpResponse {
    let mut response = HttpResponse::new(StatusCode::SWITCHING_PROTOCOLS);
    response.set_header(CONNECTION, http_value::UPGRADE);
    response.set_header(UPGRADE, target.token());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn upgrade_request(target: &str) -> HttpRequest {
        HttpRequest::new(Method::GET, "/chat")
            .with_header("Connection", "Upgrade")
            .with_header("Upgrade", target)
    }

    #[test]
    fn test_accept_key_calculation() {
        let key = "dGhlIHNhbXBsZSBub25jZQ=="; // "the sample nonce"
        assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_upgrade_detection() {
        assert_eq!(
            UpgradeTarget::from_request(&upgrade_request("WebSocket")),
            Some(UpgradeTarget::WebSocket)
        );
        assert_eq!(
            UpgradeTarget::from_request(&upgrade_request("h2c")),
            Some(UpgradeTarget::H2c)
        );
        assert_eq!(UpgradeTarget::from_request(&upgrade_request("irc/6.9")), None);
        assert_eq!(
            UpgradeTarget::from_request(&HttpRequest::new(Method::GET, "/")),
            None
        );
    }

    #[test]
    fn test_websocket_response_bytes() {
        let request =
            upgrade_request("websocket").with_header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        let bytes = websocket_response(&request).unwrap().to_bytes().unwrap();

        assert_eq!(
            &bytes[..],
            &b"HTTP/1.1 101 Switching Protocols\r\n\
               Connection: Upgrade\r\n\
               Upgrade: websocket\r\n\
               Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"[..]
        );
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = websocket_response(&upgrade_request("websocket")).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::MissingHeader(_))));
    }

    #[test]
    fn test_h2c_response() {
        let response = h2c_response();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.header("Upgrade"), Some("h2c"));
        assert!(response.header("Sec-WebSocket-Accept").is_none());
        assert!(is_switching_response(&response.to_bytes().unwrap()));
        assert!(!is_switching_response(&HttpResponse::text("101 ").to_bytes().unwrap()));
    }
}
