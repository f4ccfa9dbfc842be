use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::retry::{is_pre_send_failure, retry_async, RetryConfig};
use super::{BackendError, VoteBackend, VoteReceipt, VoteRequest};

/// Posts votes to the forum's thread API.
///
/// The endpoints toggle, so a request is only resent when the connection was
/// never established.
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    retry: RetryConfig,
}

impl HttpBackend {
    pub fn new(base: &str, timeout: Duration, retry: RetryConfig) -> anyhow::Result<Self> {
        let base = Url::parse(base)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            retry,
        })
    }

    async fn post_once(
        &self,
        url: &Url,
        request: &VoteRequest,
    ) -> Result<VoteReceipt, BackendError> {
        let resp = self
            .client
            .post(url.clone())
            .json(&request.body())
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                message: e.to_string(),
                retryable: is_pre_send_failure(&e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
            });
        }
        // Body is informational ({"status":"success"}); tolerate anything.
        let body = resp
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok());
        Ok(VoteReceipt {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl VoteBackend for HttpBackend {
    async fn submit(&self, request: &VoteRequest) -> Result<VoteReceipt, BackendError> {
        let url = request.endpoint(&self.base)?;
        retry_async(
            &self.retry,
            request.endpoint_action(),
            BackendError::is_retryable,
            || self.post_once(&url, request),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::item::ItemId;
    use crate::vote::VoteAction;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::sleep;

    /// Minimal HTTP/1.1 responder that records what it was sent.
    struct StubServer {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
        requests: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl StubServer {
        async fn start(status: u16, body: &'static str, delay: Duration) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let requests = Arc::new(Mutex::new(Vec::new()));
            let (h, r) = (hits.clone(), requests.clone());
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let (h, r) = (h.clone(), r.clone());
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        h.fetch_add(1, Ordering::SeqCst);
                        r.lock().unwrap().push(request);
                        sleep(delay).await;
                        let resp = format!(
                            "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(resp.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
            });
            Self {
                addr,
                hits,
                requests,
            }
        }

        fn base(&self) -> String {
            format!("http://{}/", self.addr)
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    /// Returns (request line, body).
    async fn read_request(socket: &mut TcpStream) -> (String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let len = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < end + 4 + len {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let line = head.lines().next().unwrap_or("").to_string();
                let stop = (end + 4 + len).min(buf.len());
                let body = String::from_utf8_lossy(&buf[end + 4..stop]).to_string();
                return (line, body);
            }
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return (String::from_utf8_lossy(&buf).to_string(), String::new());
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn backend(base: &str, timeout_ms: u64, max_retries: u32) -> HttpBackend {
        let retry = RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        };
        HttpBackend::new(base, Duration::from_millis(timeout_ms), retry).unwrap()
    }

    fn upvote_message() -> VoteRequest {
        VoteRequest::new(ItemId::message("rust", 1), VoteAction::Upvote)
    }

    #[test]
    fn test_rejects_unparseable_base() {
        let retry = RetryConfig::default();
        assert!(HttpBackend::new("not a url", Duration::from_secs(1), retry).is_err());
    }

    #[tokio::test]
    async fn test_posts_vote_and_reads_receipt() {
        let server = StubServer::start(200, r#"{"status":"success"}"#, Duration::ZERO).await;
        let receipt = backend(&server.base(), 2000, 2)
            .submit(&upvote_message())
            .await
            .unwrap();

        assert_eq!(receipt.status, 200);
        assert_eq!(receipt.body, Some(json!({"status": "success"})));
        assert_eq!(server.hits(), 1);
        let requests = server.requests.lock().unwrap();
        assert_eq!(requests[0].0, "POST /api/thread/rust/upvoteMessage HTTP/1.1");
        assert_eq!(requests[0].1, r#"{"messageId":"1"}"#);
    }

    #[tokio::test]
    async fn test_comment_vote_body_on_the_wire() {
        let server = StubServer::start(200, "", Duration::ZERO).await;
        let req = VoteRequest::new(ItemId::comment("rust", 4, 9), VoteAction::Downvote);
        backend(&server.base(), 2000, 0).submit(&req).await.unwrap();

        let requests = server.requests.lock().unwrap();
        assert_eq!(requests[0].0, "POST /api/thread/rust/downvoteComment HTTP/1.1");
        let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(body, json!({"messageId": "4", "commentId": "9"}));
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_tolerated() {
        let server = StubServer::start(200, "ok", Duration::ZERO).await;
        let receipt = backend(&server.base(), 2000, 0)
            .submit(&upvote_message())
            .await
            .unwrap();
        assert_eq!(receipt.status, 200);
        assert_eq!(receipt.body, None);
    }

    #[tokio::test]
    async fn test_rejection_is_not_resent() {
        for status in [403, 503] {
            let server = StubServer::start(status, "", Duration::ZERO).await;
            let err = backend(&server.base(), 2000, 3)
                .submit(&upvote_message())
                .await
                .unwrap_err();
            assert_eq!(err, BackendError::Rejected { status });
            assert_eq!(server.hits(), 1);
        }
    }

    #[tokio::test]
    async fn test_timeout_after_send_is_not_resent() {
        let server = StubServer::start(200, "", Duration::from_millis(400)).await;
        let err = backend(&server.base(), 100, 1)
            .submit(&upvote_message())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport { retryable: false, .. }));

        // a second toggle would land here if the request had been resent
        sleep(Duration::from_millis(200)).await;
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = backend(&format!("http://{}/", addr), 500, 2)
            .submit(&upvote_message())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport { retryable: true, .. }));
    }
}
