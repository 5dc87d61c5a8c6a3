//! Minimal HTTP(S) client over hyper's connection API.
//!
//! One connection per request: the probe wants to know whether a server
//! answers right now, so nothing is pooled or reused.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT as USER_AGENT_HEADER};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

pub const USER_AGENT: &str = concat!("warden/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Build a rustls client config trusting the Mozilla root store.
pub fn webpki_client_config() -> Result<Arc<rustls::ClientConfig>, rustls::Error> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(Arc::new(config))
}

/// HTTP/1.1 client for `http://` and `https://` URLs with a whole-request timeout.
#[derive(Clone)]
pub struct HttpClient {
    tls: Arc<rustls::ClientConfig>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, rustls::Error> {
        Ok(Self::with_tls_config(webpki_client_config()?, timeout))
    }

    pub fn with_tls_config(tls: Arc<rustls::ClientConfig>, timeout: Duration) -> Self {
        Self { tls, timeout }
    }

    pub async fn get(&self, url: &str) -> Result<StatusCode, HttpError> {
        self.send(Method::GET, url, None).await
    }

    pub async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<StatusCode, HttpError> {
        self.send(Method::POST, url, Some(Bytes::from(body))).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        json: Option<Bytes>,
    ) -> Result<StatusCode, HttpError> {
        let target = Target::parse(url)?;
        tokio::time::timeout(self.timeout, self.exchange(method, &target, json))
            .await
            .map_err(|_| HttpError::Timeout(self.timeout))?
    }

    async fn exchange(
        &self,
        method: Method,
        target: &Target,
        json: Option<Bytes>,
    ) -> Result<StatusCode, HttpError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(target.path.as_str())
            .header(HOST, target.authority.as_str())
            .header(USER_AGENT_HEADER, USER_AGENT);
        if json.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder.body(Full::new(json.unwrap_or_default()))?;

        let addr = format!("{}:{}", target.host, target.port);
        let tcp = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(|source| HttpError::Connect { addr, source })?;

        if target.tls {
            let name = ServerName::try_from(target.host.clone()).map_err(|e| HttpError::InvalidUrl {
                url: target.url.clone(),
                reason: e.to_string(),
            })?;
            let stream = TlsConnector::from(self.tls.clone())
                .connect(name, tcp)
                .await
                .map_err(|source| HttpError::Tls {
                    host: target.host.clone(),
                    source,
                })?;
            round_trip(stream, request).await
        } else {
            round_trip(tcp, request).await
        }
    }
}

async fn round_trip<T>(io: T, request: Request<Full<Bytes>>) -> Result<StatusCode, HttpError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    let response = sender.send_request(request).await?;
    Ok(response.status())
}

/// Parsed request target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    url: String,
    tls: bool,
    host: String,
    port: u16,
    authority: String,
    path: String,
}

impl Target {
    fn parse(url: &str) -> Result<Self, HttpError> {
        let invalid = |reason: String| HttpError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        let tls = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            other => return Err(invalid(format!("unsupported scheme {other:?}"))),
        };
        let host = uri
            .host()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .trim_matches(|c| c == '[' || c == ']')
            .to_string();
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| host.clone());
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            url: url.to_string(),
            tls,
            host,
            port,
            authority,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response and return the raw request bytes.
    async fn one_shot_server(response: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (port, handle)
    }

    #[test]
    fn parse_target_defaults() {
        let t = Target::parse("https://example.com").unwrap();
        assert!(t.tls);
        assert_eq!(t.port, 443);
        assert_eq!(t.path, "/");
        assert_eq!(t.authority, "example.com");

        let t = Target::parse("http://127.0.0.1:8080/health?x=1").unwrap();
        assert!(!t.tls);
        assert_eq!(t.host, "127.0.0.1");
        assert_eq!(t.port, 8080);
        assert_eq!(t.path, "/health?x=1");
        assert_eq!(t.authority, "127.0.0.1:8080");
    }

    #[test]
    fn parse_target_rejects_other_schemes() {
        assert!(matches!(
            Target::parse("ftp://example.com/"),
            Err(HttpError::InvalidUrl { .. })
        ));
        assert!(Target::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn get_returns_status_and_sends_user_agent() {
        let (port, server) =
            one_shot_server("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n").await;
        let client = HttpClient::new(Duration::from_secs(5)).unwrap();

        let status = client.get(&format!("http://127.0.0.1:{port}/")).await.unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get / http/1.1"));
        assert!(request.contains("user-agent: warden/"));
    }

    #[tokio::test]
    async fn post_json_sets_content_type() {
        let (port, server) = one_shot_server("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await;
        let client = HttpClient::new(Duration::from_secs(5)).unwrap();

        let status = client
            .post_json(&format!("http://127.0.0.1:{port}/hook"), b"{\"a\":1}".to_vec())
            .await
            .unwrap();
        assert!(status.is_success());

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("post /hook http/1.1"));
        assert!(request.contains("content-type: application/json"));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let err = client.get(&format!("http://127.0.0.1:{port}/")).await.unwrap_err();
        assert!(matches!(err, HttpError::Connect { .. }));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = HttpClient::new(Duration::from_millis(200)).unwrap();
        let err = client.get(&format!("http://127.0.0.1:{port}/")).await.unwrap_err();
        assert!(matches!(err, HttpError::Timeout(_)));
    }
}
