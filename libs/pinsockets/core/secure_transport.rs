//! TLS transport whose only trust check is the public-key pin

use crate::pinning::{trust_error_from_tls, ExpectedKeyHash, PinnedTrustEvaluator};
use crate::traits::{PinSocketError, Result, TrustError, WsTransport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::TlsError;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Check that `endpoint` parses as a WebSocket request URL with the `wss` scheme
///
/// Plain `ws://` would skip TLS, and with it the pin.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let request = endpoint
        .into_client_request()
        .map_err(|e| PinSocketError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    match request.uri().scheme_str() {
        Some("wss") => Ok(()),
        other => Err(PinSocketError::InvalidEndpoint(format!(
            "{}: scheme must be wss, got {:?}",
            endpoint, other
        ))),
    }
}

/// Builds pinned TLS sockets for the WebSocket upgrade
///
/// Holds one rustls client config whose certificate verifier is a
/// [`PinnedTrustEvaluator`]; no root store and no client certificate. A
/// handshake rejected by the evaluator aborts before any HTTP upgrade bytes
/// are written.
#[derive(Clone)]
pub struct SecureTransportFactory {
    tls: Arc<rustls::ClientConfig>,
    evaluator: Arc<PinnedTrustEvaluator>,
}

impl SecureTransportFactory {
    pub fn new(expected: ExpectedKeyHash) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let evaluator = Arc::new(PinnedTrustEvaluator::new(expected, &provider));

        let tls = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| PinSocketError::Configuration(format!("TLS protocol versions: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(evaluator.clone())
            .with_no_client_auth();

        Ok(Self {
            tls: Arc::new(tls),
            evaluator,
        })
    }

    pub fn evaluator(&self) -> &PinnedTrustEvaluator {
        &self.evaluator
    }

    /// Connector handed to tokio-tungstenite for each attempt
    pub fn connector(&self) -> Connector {
        Connector::Rustls(Arc::clone(&self.tls))
    }
}

impl std::fmt::Debug for SecureTransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTransportFactory")
            .field("evaluator", &self.evaluator)
            .finish()
    }
}

#[async_trait]
impl WsTransport for SecureTransportFactory {
    type Stream = MaybeTlsStream<TcpStream>;

    async fn connect(&self, endpoint: &str) -> Result<WebSocketStream<Self::Stream>> {
        validate_endpoint(endpoint)?;

        let (stream, response) =
            connect_async_tls_with_config(endpoint, None, false, Some(self.connector()))
                .await
                .map_err(classify_handshake_error)?;

        debug!("WebSocket upgrade accepted with status {}", response.status());
        Ok(stream)
    }
}

/// Separate pin rejections from every other handshake failure
pub(crate) fn classify_handshake_error(err: WsError) -> PinSocketError {
    match pinning_failure(&err) {
        Some(trust) => PinSocketError::Trust(trust),
        None => PinSocketError::Transport(err.to_string()),
    }
}

fn pinning_failure(err: &WsError) -> Option<TrustError> {
    match err {
        // tokio-rustls reports handshake errors as io::Error wrapping the rustls error
        WsError::Io(io) => {
            let tls = io.get_ref()?.downcast_ref::<rustls::Error>()?;
            trust_error_from_tls(tls)
        }
        WsError::Tls(TlsError::Rustls(tls)) => trust_error_from_tls(tls),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinning::trust_error_to_tls;
    use std::io;

    const ZERO_HASH: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("wss://example.com/socket").is_ok());
        assert!(validate_endpoint("wss://127.0.0.1:9443").is_ok());

        assert!(matches!(
            validate_endpoint("ws://example.com/socket"),
            Err(PinSocketError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            validate_endpoint("https://example.com"),
            Err(PinSocketError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            validate_endpoint("not a url"),
            Err(PinSocketError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_classify_pin_mismatch_through_io_error() {
        let tls = trust_error_to_tls(TrustError::PinMismatch {
            expected: ZERO_HASH.to_string(),
            actual: "other".to_string(),
        });
        let err = WsError::Io(io::Error::new(io::ErrorKind::InvalidData, tls));

        let classified = classify_handshake_error(err);
        assert!(classified.is_trust_failure());
        assert!(classified.to_string().contains("Pinning failed"));
    }

    #[test]
    fn test_classify_plain_io_error_as_transport() {
        let err = WsError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(matches!(
            classify_handshake_error(err),
            PinSocketError::Transport(_)
        ));
    }

    #[test]
    fn test_factory_builds_and_is_reusable() {
        let factory = SecureTransportFactory::new(ExpectedKeyHash::parse(ZERO_HASH).unwrap()).unwrap();
        let clone = factory.clone();

        assert_eq!(clone.evaluator().expected().as_str(), ZERO_HASH);
        assert!(matches!(factory.connector(), Connector::Rustls(_)));
        assert!(matches!(clone.connector(), Connector::Rustls(_)));
    }
}
