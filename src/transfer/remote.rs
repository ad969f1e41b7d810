//! Remote source download and destination upload.
//!
//! [`RemoteTransfer`] abstracts the HTTP side of the gateway so tests can
//! substitute an in-process fake; [`HttpRemoteTransfer`] implements it with
//! `reqwest`.

use super::session::TransferSession;
use crate::config::TransferSettings;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches payloads from and pushes payloads to remote URLs.
#[async_trait]
pub trait RemoteTransfer: Send + Sync {
    /// Downloads `url` into the session, appending in arrival order.
    ///
    /// Returns the number of bytes staged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadFailed`] if the URL cannot be fetched.
    async fn download(&self, url: &str, session: &mut TransferSession) -> Result<u64>;

    /// Uploads `content` to `url` with PUT semantics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UploadFailed`] with the status and body if the
    /// destination does not answer 2xx.
    async fn upload(&self, url: &str, content: Vec<u8>, content_type: &str) -> Result<()>;
}

/// HTTP remote transfer using reqwest.
pub struct HttpRemoteTransfer {
    /// HTTP client with connection pooling.
    client: reqwest::Client,
}

impl HttpRemoteTransfer {
    /// Creates a client from transfer settings.
    #[must_use]
    pub fn new(settings: &TransferSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client }
    }
}

impl Default for HttpRemoteTransfer {
    fn default() -> Self {
        Self::new(&TransferSettings::default())
    }
}

/// Strips the query string, which often carries signing secrets.
#[must_use]
pub fn redact_url(url: &str) -> String {
    url.split(['?', '#']).next().unwrap_or_default().to_string()
}

#[async_trait]
impl RemoteTransfer for HttpRemoteTransfer {
    async fn download(&self, url: &str, session: &mut TransferSession) -> Result<u64> {
        let failed = |cause: String| Error::DownloadFailed {
            url: redact_url(url),
            cause,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(format!("HTTP request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }

        let before = session.bytes_written();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| failed(format!("HTTP body read failed: {e}")))?
        {
            session.append(&chunk).await?;
        }
        let staged = session.bytes_written() - before;
        debug!(url = %redact_url(url), bytes = staged, "Downloaded remote source");
        Ok(staged)
    }

    async fn upload(&self, url: &str, content: Vec<u8>, content_type: &str) -> Result<()> {
        let size = content.len();
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(content)
            .send()
            .await
            .map_err(|e| Error::UploadFailed {
                status: 0,
                body: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UploadFailed {
                status: status.as_u16(),
                body,
            });
        }
        debug!(url = %redact_url(url), bytes = size, "Uploaded export");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Format;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answers one HTTP request with a fixed response and returns the raw request.
    async fn respond_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let read = socket.read(&mut buf).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).into_owned()
        });
        (base, handle)
    }

    /// Client that ignores proxy settings from the environment.
    fn loopback() -> HttpRemoteTransfer {
        HttpRemoteTransfer {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        }
    }

    fn session(dir: &tempfile::TempDir) -> TransferSession {
        TransferSession::create(dir.path(), "customers", Format::Json).unwrap()
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://bucket.example.com/a.csv?X-Amz-Signature=abc"),
            "https://bucket.example.com/a.csv"
        );
        assert_eq!(redact_url("https://x.test/a#frag"), "https://x.test/a");
        assert_eq!(redact_url("https://x.test/a"), "https://x.test/a");
    }

    #[tokio::test]
    async fn test_download_stages_body() {
        let body = r#"[{"userId":"u-1"}]"#;
        let (base, server) = respond_once("200 OK", body).await;
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&dir);

        let staged = loopback()
            .download(&format!("{base}/payload.json"), &mut session)
            .await
            .unwrap();
        session.seal().await.unwrap();

        assert_eq!(staged, body.len() as u64);
        assert_eq!(session.read_all().await.unwrap(), body.as_bytes());
        assert!(server.await.unwrap().starts_with("GET /payload.json "));
    }

    #[tokio::test]
    async fn test_download_not_found_fails() {
        let (base, server) = respond_once("404 Not Found", "no such object").await;
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&dir);

        let err = loopback()
            .download(&format!("{base}/missing.json?token=secret"), &mut session)
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            Error::DownloadFailed { url, cause } => {
                assert_eq!(url, format!("{base}/missing.json"));
                assert_eq!(cause, "HTTP 404");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.bytes_written(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejection_carries_status_and_body() {
        let (base, server) = respond_once("403 Forbidden", "signature expired").await;

        let err = loopback()
            .upload(&format!("{base}/out.csv?sig=abc"), b"userId\nu-1\n".to_vec(), "text/csv")
            .await
            .unwrap_err();
        let request = server.await.unwrap();

        match err {
            Error::UploadFailed { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "signature expired");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(request.starts_with("PUT /out.csv?sig=abc "));
        assert!(request.to_lowercase().contains("content-type: text/csv"));
        assert!(request.ends_with("userId\nu-1\n"));
    }

    #[tokio::test]
    async fn test_upload_accepted() {
        let (base, server) = respond_once("201 Created", "").await;

        loopback()
            .upload(&format!("{base}/out.json"), b"[]".to_vec(), "application/json")
            .await
            .unwrap();

        assert!(server.await.unwrap().starts_with("PUT /out.json "));
    }

    #[tokio::test]
    async fn test_download_unreachable_host_fails() {
        let remote = HttpRemoteTransfer::default();
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&dir);

        let err = remote
            .download("http://127.0.0.1:9/payload.json?token=secret", &mut session)
            .await
            .unwrap_err();

        match err {
            Error::DownloadFailed { url, .. } => assert_eq!(url, "http://127.0.0.1:9/payload.json"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
