//! Log Provider Ingress Client
//!
//! Implements IngressConnector / IngressClient / EnvelopeStream against the
//! log provider's HTTP streaming gateway. Each `data:` line of the
//! server-sent event stream carries a `{"batch": [...]}` of envelopes.

use crate::adapters::wire::EnvelopeBatch;
use crate::domain::entities::Envelope;
use crate::domain::ports::{
    EgressRequest, EnvelopeStream, HostResolver, IngressClient, IngressConnector, IngressError,
};
use crate::infrastructure::TlsFiles;
use async_trait::async_trait;
use bytes::BytesMut;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// TCP keep-alive on provider connections.
pub const KEEPALIVE: Duration = Duration::from_secs(15);

/// Dials provider clients, spreading them over the provider's addresses.
pub struct RlpConnector {
    host: String,
    port: u16,
    use_tls: bool,
    tls: TlsFiles,
    dial_timeout: Duration,
    resolver: Arc<dyn HostResolver>,
}

impl RlpConnector {
    /// `addr` is the provider's `host:port`.
    pub fn new(
        addr: &str,
        use_tls: bool,
        tls: TlsFiles,
        dial_timeout: Duration,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, IngressError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| IngressError::Dial(format!("missing port in {}", addr)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| IngressError::Dial(format!("invalid port in {}: {}", addr, e)))?;

        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            use_tls,
            tls,
            dial_timeout,
            resolver,
        })
    }

    /// Resolve the provider host and return its addresses in random order.
    async fn balanced_addrs(&self) -> Result<Vec<SocketAddr>, IngressError> {
        let ips = self
            .resolver
            .resolve(&self.host)
            .await
            .map_err(|e| IngressError::Dial(format!("resolve {}: {}", self.host, e)))?;

        let mut addrs: Vec<SocketAddr> = ips.into_iter().map(|ip| SocketAddr::new(ip, self.port)).collect();
        addrs.shuffle(&mut rand::thread_rng());
        Ok(addrs)
    }
}

#[async_trait]
impl IngressConnector for RlpConnector {
    async fn connect(&self) -> Result<Arc<dyn IngressClient>, IngressError> {
        let addrs = self.balanced_addrs().await?;
        let addr = *addrs
            .first()
            .ok_or_else(|| IngressError::Dial(format!("no addresses for {}", self.host)))?;

        // reachability check; the pinned client opens its own connections
        tokio::time::timeout(self.dial_timeout, tokio::net::TcpStream::connect(addr))
            .await
            .map_err(|_| IngressError::Dial(format!("dial {} timed out", addr)))?
            .map_err(|e| IngressError::Dial(format!("dial {}: {}", addr, e)))?;

        let builder = reqwest::Client::builder()
            .resolve(&self.host, addr)
            .tcp_keepalive(KEEPALIVE)
            .connect_timeout(self.dial_timeout);
        let client = self
            .tls
            .configure_client(builder)
            .and_then(|b| Ok(b.build()?))
            .map_err(|e| IngressError::Dial(e.to_string()))?;

        let scheme = if self.use_tls { "https" } else { "http" };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        tracing::debug!("connected ingress client to {} ({})", self.host, addr);

        Ok(Arc::new(RlpClient::new(
            client,
            format!("{}://{}:{}", scheme, host, self.port),
        )))
    }
}

/// One pinned provider client.
pub struct RlpClient {
    client: reqwest::Client,
    base_url: String,
    valid: AtomicBool,
    // cancelled on close, ends every stream opened through this client
    closed: CancellationToken,
}

impl RlpClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            valid: AtomicBool::new(true),
            closed: CancellationToken::new(),
        }
    }

    fn read_url(&self, req: &EgressRequest) -> Result<url::Url, IngressError> {
        let mut url = url::Url::parse(&format!("{}/v2/read", self.base_url))
            .map_err(|e| IngressError::Dial(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("shard_id", &req.shard_id)
            .append_pair("source_id", &req.source_id)
            .append_key_only("log");
        Ok(url)
    }
}

#[async_trait]
impl IngressClient for RlpClient {
    async fn receiver(&self, req: EgressRequest) -> Result<Box<dyn EnvelopeStream>, IngressError> {
        let response = self
            .client
            .get(self.read_url(&req)?)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| IngressError::Stream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IngressError::Stream(format!(
                "provider returned {}",
                response.status()
            )));
        }

        Ok(Box::new(SseStream::new(response, self.closed.clone())))
    }

    fn valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    async fn close(&self) {
        self.invalidate();
        self.closed.cancel();
    }
}

/// Envelope stream over a server-sent event response.
pub struct SseStream {
    response: reqwest::Response,
    buffer: BytesMut,
    pending: VecDeque<Envelope>,
    closed: CancellationToken,
}

impl SseStream {
    fn new(response: reqwest::Response, closed: CancellationToken) -> Self {
        Self {
            response,
            buffer: BytesMut::new(),
            pending: VecDeque::new(),
            closed,
        }
    }

    /// Decode every complete line in the buffer.
    fn drain_lines(&mut self) -> Result<(), IngressError> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = std::str::from_utf8(&line)
                .map_err(|e| IngressError::Decode(e.to_string()))?
                .trim_end_matches(&['\r', '\n'][..]);

            for env in parse_event_line(line)? {
                self.pending.push_back(env);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EnvelopeStream for SseStream {
    async fn recv(&mut self) -> Result<Envelope, IngressError> {
        loop {
            if let Some(env) = self.pending.pop_front() {
                return Ok(env);
            }

            let chunk = tokio::select! {
                _ = self.closed.cancelled() => return Err(IngressError::Closed),
                chunk = self.response.chunk() => chunk,
            };

            match chunk {
                Ok(Some(chunk)) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.drain_lines()?;
                }
                Ok(None) => return Err(IngressError::Closed),
                Err(e) => return Err(IngressError::Stream(e.to_string())),
            }
        }
    }
}

/// Envelopes carried by one SSE line. Non-data lines carry none.
fn parse_event_line(line: &str) -> Result<Vec<Envelope>, IngressError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let batch: EnvelopeBatch =
        serde_json::from_str(data).map_err(|e| IngressError::Decode(e.to_string()))?;
    batch
        .batch
        .into_iter()
        .map(|json| Envelope::try_from(json).map_err(IngressError::Decode))
        .collect()
}
