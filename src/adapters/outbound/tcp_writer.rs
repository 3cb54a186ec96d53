//! TCP / TLS Syslog Writer
//!
//! Implements EgressWriter for `syslog://` and `syslog-tls://` drains:
//! RFC 5424 messages with octet-counting framing over a lazily dialed
//! stream.

use super::syslog_connector::WriterConfig;
use crate::domain::entities::{Binding, Envelope};
use crate::domain::ports::{Counter, EgressError, EgressWriter};
use crate::domain::services::rfc5424;
use crate::domain::value_objects::DrainScheme;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;

type Conn = Box<dyn AsyncWrite + Send + Unpin>;

/// Port used when a syslog drain URL does not name one.
pub const DEFAULT_SYSLOG_PORT: u16 = 514;
/// Port used when a syslog-tls drain URL does not name one.
pub const DEFAULT_SYSLOG_TLS_PORT: u16 = 6514;

enum Transport {
    Plain,
    Tls {
        connector: TlsConnector,
        server_name: ServerName<'static>,
    },
}

/// Stream writer to one syslog drain.
pub struct TcpWriter {
    binding: Binding,
    host: String,
    port: u16,
    transport: Transport,
    dial_timeout: Duration,
    io_timeout: Duration,
    conn: Mutex<Option<Conn>>,
    egress: Arc<dyn Counter>,
}

impl TcpWriter {
    /// Plain TCP writer.
    pub fn new(
        binding: Binding,
        config: &WriterConfig,
        egress: Arc<dyn Counter>,
    ) -> Result<Self, EgressError> {
        let (host, port) = drain_addr(&binding.drain, DEFAULT_SYSLOG_PORT)?;
        Ok(Self {
            binding,
            host,
            port,
            transport: Transport::Plain,
            dial_timeout: config.dial_timeout,
            io_timeout: config.io_timeout,
            conn: Mutex::new(None),
            egress,
        })
    }

    /// TLS writer using `connector` for the handshake.
    pub fn tls(
        binding: Binding,
        config: &WriterConfig,
        connector: TlsConnector,
        egress: Arc<dyn Counter>,
    ) -> Result<Self, EgressError> {
        let (host, port) = drain_addr(&binding.drain, DEFAULT_SYSLOG_TLS_PORT)?;
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| EgressError::InvalidUrl(format!("{}: {}", binding.drain, e)))?;

        Ok(Self {
            binding,
            host,
            port,
            transport: Transport::Tls {
                connector,
                server_name,
            },
            dial_timeout: config.dial_timeout,
            io_timeout: config.io_timeout,
            conn: Mutex::new(None),
            egress,
        })
    }

    async fn dial(&self) -> Result<Conn, EgressError> {
        let connect = async {
            let stream = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(|e| EgressError::Dial(e.to_string()))?;
            stream.set_nodelay(true).ok();

            match &self.transport {
                Transport::Plain => Ok(Box::new(stream) as Conn),
                Transport::Tls {
                    connector,
                    server_name,
                } => {
                    let tls = connector
                        .connect(server_name.clone(), stream)
                        .await
                        .map_err(|e| EgressError::Tls(e.to_string()))?;
                    Ok(Box::new(tls) as Conn)
                }
            }
        };

        tokio::time::timeout(self.dial_timeout, connect)
            .await
            .map_err(|_| EgressError::DialTimeout)?
    }
}

#[async_trait]
impl EgressWriter for TcpWriter {
    async fn write(&self, env: &Envelope) -> Result<(), EgressError> {
        let Some(msg) = rfc5424::format(&self.binding, env) else {
            return Ok(());
        };
        let framed = rfc5424::octet_frame(&msg);

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(EgressError::Io("no connection".to_string()));
        };

        let send = async {
            conn.write_all(&framed).await?;
            conn.flush().await
        };
        let result = match tokio::time::timeout(self.io_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EgressError::Io(e.to_string())),
            Err(_) => Err(EgressError::IoTimeout),
        };

        if result.is_err() {
            // the next write redials
            *guard = None;
        } else {
            self.egress.inc(1);
        }
        result
    }

    async fn close(&self) -> Result<(), EgressError> {
        let conn = self.conn.lock().await.take();
        if let Some(mut conn) = conn {
            let _ = tokio::time::timeout(self.io_timeout, conn.shutdown()).await;
        }
        Ok(())
    }
}

/// Host and port of a stream drain URL.
pub fn drain_addr(drain: &str, default_port: u16) -> Result<(String, u16), EgressError> {
    let url = url::Url::parse(drain).map_err(|e| EgressError::InvalidUrl(format!("{}: {}", drain, e)))?;

    let scheme = DrainScheme::from_scheme(url.scheme())
        .ok_or_else(|| EgressError::UnsupportedScheme(url.scheme().to_string()))?;
    if scheme == DrainScheme::Https {
        return Err(EgressError::UnsupportedScheme(scheme.to_string()));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| EgressError::InvalidUrl(format!("{}: missing host", drain)))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    Ok((host, url.port().unwrap_or(default_port)))
}
