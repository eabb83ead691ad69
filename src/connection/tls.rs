//! TLS certificate probe
//!
//! The driver accepts any certificate so that the audit can reach servers
//! with self-signed certificates. Certificate trust is therefore checked
//! separately: a permissive handshake tells whether a certificate is
//! presented at all, and a verifying handshake tells whether it is trusted.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector;
use tracing::debug;

/// What the certificate probe found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    /// The certificate chain verifies against the system roots.
    Trusted,

    /// A certificate is presented but does not verify.
    Untrusted,

    /// The handshake succeeds without a peer certificate.
    NoCertificate,

    /// No TLS handshake was possible at all.
    Unreachable,
}

/// Inspect the certificate presented on `host:port`
///
/// # Arguments
/// * `host` - Host name, also used for SNI and name verification
/// * `port` - TLS port
/// * `limit` - Timeout applied to each connect and handshake
///
/// # Returns
/// * `CertificateStatus` - Probe outcome
pub async fn probe_certificate(host: &str, port: u16, limit: Duration) -> CertificateStatus {
    let permissive = match native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
    {
        Ok(connector) => TlsConnector::from(connector),
        Err(e) => {
            debug!("Failed to build TLS connector: {}", e);
            return CertificateStatus::Unreachable;
        }
    };

    let Some(stream) = connect(host, port, limit).await else {
        return CertificateStatus::Unreachable;
    };

    let has_certificate = match timeout(limit, permissive.connect(host, stream)).await {
        Ok(Ok(tls)) => matches!(tls.get_ref().peer_certificate(), Ok(Some(_))),
        Ok(Err(e)) => {
            debug!("Permissive TLS handshake with {}:{} failed: {}", host, port, e);
            return CertificateStatus::Unreachable;
        }
        Err(_) => {
            debug!("Permissive TLS handshake with {}:{} timed out", host, port);
            return CertificateStatus::Unreachable;
        }
    };

    if !has_certificate {
        return CertificateStatus::NoCertificate;
    }

    let verifying = match native_tls::TlsConnector::new() {
        Ok(connector) => TlsConnector::from(connector),
        Err(e) => {
            debug!("Failed to build verifying TLS connector: {}", e);
            return CertificateStatus::Untrusted;
        }
    };

    let Some(stream) = connect(host, port, limit).await else {
        return CertificateStatus::Unreachable;
    };

    match timeout(limit, verifying.connect(host, stream)).await {
        Ok(Ok(_)) => CertificateStatus::Trusted,
        Ok(Err(e)) => {
            debug!("Certificate of {}:{} rejected: {}", host, port, e);
            CertificateStatus::Untrusted
        }
        Err(_) => CertificateStatus::Untrusted,
    }
}

async fn connect(host: &str, port: u16, limit: Duration) -> Option<TcpStream> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Some(stream),
        Ok(Err(e)) => {
            debug!("TCP connect to {}:{} failed: {}", host, port, e);
            None
        }
        Err(_) => None,
    }
}
