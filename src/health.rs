//! Minimal HTTP endpoint for health checks and Prometheus scraping

use crate::metrics::Metrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Health endpoint state
pub struct HealthServer {
    metrics: Arc<Metrics>,
    ready: AtomicBool,
}

/// Status code, content type and body of a reply
type Reply = (u16, &'static str, String);

impl HealthServer {
    /// Create a new health server, initially not ready
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            ready: AtomicBool::new(false),
        }
    }

    /// Set the ready state
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Serve requests on `listener` until cancelled
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel_token: CancellationToken) {
        match listener.local_addr() {
            Ok(addr) => info!("Health server listening on {}", addr),
            Err(e) => error!("Health server has no local address: {}", e),
        }

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, _)) => {
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream).await {
                                debug!("Health connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Health server accept error: {}", e),
                },
            }
        }

        info!("Health server stopped");
    }

    /// Answer a single HTTP request and close
    async fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let mut request_line = String::new();
        BufReader::new(&mut stream)
            .read_line(&mut request_line)
            .await?;

        let (status, content_type, body) = self.route(&request_line);
        let status_text = match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            503 => "Service Unavailable",
            _ => "Unknown",
        };

        let response = format!(
            "HTTP/1.1 {status} {status_text}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len(),
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await
    }

    /// Route a request line such as "GET /metrics HTTP/1.1"
    fn route(&self, request_line: &str) -> Reply {
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            return (400, "text/plain", "Bad Request".to_string());
        };

        if method != "GET" {
            return (405, "text/plain", "Method Not Allowed".to_string());
        }

        match path {
            "/health" | "/healthz" => (200, "application/json", r#"{"status":"healthy"}"#.to_string()),
            "/ready" | "/readyz" if self.is_ready() => {
                (200, "application/json", r#"{"status":"ready"}"#.to_string())
            }
            "/ready" | "/readyz" => (503, "application/json", r#"{"status":"not ready"}"#.to_string()),
            "/metrics" => (200, "text/plain; version=0.0.4", self.metrics.gather()),
            _ => (404, "text/plain", "Not Found".to_string()),
        }
    }
}
