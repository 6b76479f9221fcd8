use crate::req::{self, Method, Request, RequestUrl};
use crate::resp::{Response, Status};
use async_trait::async_trait;
use std::{collections::HashMap, io, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::{debug, info};

/// Response sink handed to handlers: the client connection.
pub type Sink = dyn AsyncWrite + Unpin + Send;

#[async_trait]
pub trait Handler: Send + Sync {
    /// Writes exactly one complete response to `stream`. Errors are sink
    /// failures only.
    async fn handle(&self, req: &Request, url: &RequestUrl, stream: &mut Sink) -> io::Result<()>;
}

/// Method-keyed route table, fixed once the server starts.
#[derive(Default, Clone)]
pub struct Router {
    routes: HashMap<Method, Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, handler: Arc<dyn Handler>) -> Self {
        self.routes.insert(method, handler);
        self
    }

    pub async fn dispatch(&self, req: &Request, stream: &mut Sink) -> io::Result<()> {
        let mut log_entry = format!("{} {}", req.method, req.target);
        if let Some(ua) = req.user_agent() {
            log_entry.push(' ');
            log_entry.push_str(ua);
        }
        info!("{}", log_entry);

        let url = match RequestUrl::normalize(&req.target) {
            Ok(url) => url,
            Err(e) => {
                info!(?e, "unresolvable request target");
                return Response::from_html(Status::BadRequest, "Bad Request")
                    .write(stream, false)
                    .await;
            }
        };
        debug!(pathname = %url.pathname, params = ?url.params, "normalized url");

        match self.routes.get(&req.method) {
            Some(handler) => handler.handle(req, &url, stream).await,
            None => Response::empty(Status::NotImplemented).write(stream, false).await,
        }
    }
}

/// Reads one request from `stream`, answers it and closes the connection.
pub async fn serve_connection<S>(stream: S, router: &Router)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut stream = BufStream::new(stream);

    let result = match req::parse_request(&mut stream).await {
        Ok(req) => {
            debug!(?req, "incoming request");
            router.dispatch(&req, &mut stream).await
        }
        Err(req::ParseError::ConnectionClosed) => return,
        Err(e) => {
            info!(?e, "failed to parse request");
            Response::from_html(Status::BadRequest, "Bad Request")
                .write(&mut stream, false)
                .await
        }
    };

    if let Err(e) = result {
        debug!(?e, "connection write failed");
        return;
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Handler for Counting {
        async fn handle(
            &self,
            _req: &Request,
            url: &RequestUrl,
            stream: &mut Sink,
        ) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Response::from_bytes(Status::Ok, "text/plain", url.pathname.clone().into_bytes())
                .write(stream, false)
                .await
        }
    }

    async fn exchange(router: &Router, raw: &str) -> String {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client.write_all(raw.as_bytes()).await.unwrap();
        serve_connection(server, router).await;
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn dispatches_by_method_with_normalized_url() {
        let handler = Arc::new(Counting(AtomicUsize::new(0)));
        let router = Router::new().route(Method::Get, handler.clone());

        let out = exchange(&router, "GET /a/../b.txt HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("\r\n\r\n/b.txt"));
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unrouted_method_gets_501_without_body() {
        let handler = Arc::new(Counting(AtomicUsize::new(0)));
        let router = Router::new()
            .route(Method::Get, handler.clone())
            .route(Method::Head, handler.clone());

        let out = exchange(&router, "POST /anything HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
        assert!(out.contains("Content-Length: 0\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
        assert_eq!(handler.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let router = Router::new();
        let out = exchange(&router, "GET / SPDY/3\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn oversized_request_line_gets_400() {
        let router = Router::new();
        let raw = format!(
            "GET /{} HTTP/1.1\r\n\r\n",
            "a".repeat(req::MAX_LINE_BYTES)
        );
        let out = exchange(&router, &raw).await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }
}
