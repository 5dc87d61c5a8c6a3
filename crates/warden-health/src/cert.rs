//! TLS certificate expiry inspection.
//!
//! The handshake accepts any chain: the goal is to read `notAfter` from the
//! leaf, including for certificates that have already expired. Handshake
//! signatures are still verified.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Remaining validity below which a warning is logged.
pub const CERT_EXPIRY_WARNING_DAYS: i64 = 30;

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("invalid server name {0}")]
    InvalidName(String),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("tls handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("server presented no certificate")]
    NoCertificate,

    #[error("certificate parse error: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Reads leaf certificate expiry from TLS servers.
#[derive(Clone)]
pub struct CertificateInspector {
    config: Arc<rustls::ClientConfig>,
    timeout: Duration,
}

impl CertificateInspector {
    pub fn new(timeout: Duration) -> Result<Self, rustls::Error> {
        let provider = rustls::crypto::ring::default_provider();
        let verifier = ExpiryOnly {
            algorithms: provider.signature_verification_algorithms,
        };
        let config = rustls::ClientConfig::builder_with_provider(provider.into())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok(Self {
            config: Arc::new(config),
            timeout,
        })
    }

    /// `notAfter` (unix seconds) of the leaf certificate served at `host:port`.
    pub async fn not_after(&self, host: &str, port: u16) -> Result<i64, CertError> {
        tokio::time::timeout(self.timeout, self.fetch(host, port))
            .await
            .map_err(|_| CertError::Timeout(self.timeout))?
    }

    async fn fetch(&self, host: &str, port: u16) -> Result<i64, CertError> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|_| CertError::InvalidName(host.to_string()))?;
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(CertError::Connect)?;
        let stream = TlsConnector::from(self.config.clone())
            .connect(name, tcp)
            .await
            .map_err(CertError::Handshake)?;

        let (_, session) = stream.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or(CertError::NoCertificate)?;
        not_after_from_der(leaf.as_ref())
    }
}

/// `notAfter` (unix seconds) of a DER-encoded X.509 certificate.
pub fn not_after_from_der(der: &[u8]) -> Result<i64, CertError> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| CertError::Parse(e.to_string()))?;
    Ok(cert.validity().not_after.timestamp())
}

/// Whole days of validity left at `now`; negative once expired.
pub fn days_remaining(not_after: i64, now: u64) -> i64 {
    (not_after - now as i64).div_euclid(SECS_PER_DAY)
}

#[derive(Debug)]
struct ExpiryOnly {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for ExpiryOnly {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    // 2030-01-01T00:00:00Z
    const NOT_AFTER_2030: i64 = 1_893_456_000;

    fn self_signed(not_after: (i32, u8, u8)) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
        let cert = params.self_signed(&key_pair).unwrap();
        let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
        (cert.der().clone(), key.into())
    }

    #[test]
    fn parses_not_after() {
        let (der, _) = self_signed((2030, 1, 1));
        assert_eq!(not_after_from_der(der.as_ref()).unwrap(), NOT_AFTER_2030);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(not_after_from_der(b"nope"), Err(CertError::Parse(_))));
    }

    #[test]
    fn days_remaining_floors() {
        let now = (NOT_AFTER_2030 - 29 * SECS_PER_DAY - 3600) as u64;
        assert_eq!(days_remaining(NOT_AFTER_2030, now), 29);
        assert_eq!(days_remaining(NOT_AFTER_2030, NOT_AFTER_2030 as u64), 0);
        assert_eq!(days_remaining(NOT_AFTER_2030, NOT_AFTER_2030 as u64 + 1), -1);
    }

    #[tokio::test]
    async fn inspects_expired_certificate_over_tls() {
        let (cert, key) = self_signed((2021, 6, 1));
        let server_config = rustls::ServerConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            if let Ok(mut tls) = acceptor.accept(tcp).await {
                let mut buf = [0u8; 16];
                let _ = tls.read(&mut buf).await;
            }
        });

        let inspector = CertificateInspector::new(Duration::from_secs(5)).unwrap();
        let not_after = inspector.not_after("localhost", port).await.unwrap();
        // 2021-06-01T00:00:00Z
        assert_eq!(not_after, 1_622_505_600);
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let inspector = CertificateInspector::new(Duration::from_secs(5)).unwrap();
        let err = inspector.not_after("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, CertError::Connect(_)));
    }
}
