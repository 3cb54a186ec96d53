//! TLS Material
//!
//! Loads PEM certificates and keys for the adapter RPC server (mTLS), the
//! reqwest clients talking to the provider and adapters, and the rustls
//! client used by `syslog-tls` drains.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{DigitallySignedStruct, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Read every certificate from a PEM file.
pub fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", path.display(), e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file)).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", path.display());
    }
    Ok(certs)
}

/// Read the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", path.display(), e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", path.display()))
}

/// Root store from a CA bundle.
pub fn load_roots(path: &Path) -> anyhow::Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(load_certs(path)?);
    if added == 0 {
        anyhow::bail!("no usable CA certificates in {}", path.display());
    }
    Ok(roots)
}

/// Paths to the mutual TLS material of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsFiles {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl TlsFiles {
    /// Server identity present (cert and key both set).
    pub fn has_identity(&self) -> bool {
        self.cert.is_some() && self.key.is_some()
    }

    /// Add the CA and client identity to a reqwest builder.
    pub fn configure_client(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> anyhow::Result<reqwest::ClientBuilder> {
        if let Some(ca) = &self.ca {
            let pem = std::fs::read(ca)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            let mut pem = std::fs::read(cert)?;
            pem.push(b'\n');
            pem.extend(std::fs::read(key)?);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }

        Ok(builder)
    }
}

/// TLS acceptor for the adapter RPC server.
#[derive(Clone)]
pub struct ServerTls {
    pub acceptor: TlsAcceptor,
}

impl ServerTls {
    /// Load from PEM files. When `files.ca` is set, clients must present a
    /// certificate signed by it.
    pub fn from_files(files: &TlsFiles) -> anyhow::Result<Self> {
        let (cert, key) = match (&files.cert, &files.key) {
            (Some(cert), Some(key)) => (cert, key),
            _ => anyhow::bail!("server TLS requires both a certificate and a key"),
        };

        let client_roots = files.ca.as_deref().map(load_roots).transpose()?;
        Self::from_certs_and_key(load_certs(cert)?, load_private_key(key)?, client_roots)
    }

    /// Build from in-memory material.
    pub fn from_certs_and_key(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        client_roots: Option<RootCertStore>,
    ) -> anyhow::Result<Self> {
        let provider = provider();
        let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = match client_roots {
            Some(roots) => {
                let verifier =
                    WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                        .build()?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let mut config = builder.with_single_cert(certs, key)?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }
}

/// rustls connector for `syslog-tls` drains.
///
/// Trusts the platform roots plus `extra_ca` when given. With
/// `skip_verify` the server certificate is not checked at all.
pub fn drain_connector(skip_verify: bool, extra_ca: Option<&Path>) -> anyhow::Result<TlsConnector> {
    let provider = provider();
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let config = if skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            tracing::debug!("failed to load a native certificate: {}", err);
        }
        roots.add_parsable_certificates(native.certs);

        if let Some(ca) = extra_ca {
            roots.add_parsable_certificates(load_certs(ca)?);
        }

        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts any server certificate. Only used when the operator opts out of
/// verification for drains.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
