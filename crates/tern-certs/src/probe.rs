//! Live TLS probe: what certificate is a vhost actually serving?

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};

use crate::error::CertError;
use crate::x509::{inspect_der, CertificateInfo};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts any certificate. The probe reports what is presented; judging
/// it is the caller's business.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Connect to `domain:port`, complete a TLS handshake with SNI and report
/// the leaf certificate.
pub fn probe(domain: &str, port: u16) -> Result<CertificateInfo, CertError> {
    probe_with_timeout(domain, port, PROBE_TIMEOUT)
}

pub fn probe_with_timeout(
    domain: &str,
    port: u16,
    timeout: Duration,
) -> Result<CertificateInfo, CertError> {
    let target = format!("{domain}:{port}");
    let fail = |message: String| CertError::Probe {
        target: target.clone(),
        message,
    };

    let mut stream = connect(domain, port, timeout).map_err(|e| fail(e.to_string()))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| fail(e.to_string()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| fail(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();

    let server_name =
        ServerName::try_from(domain.to_string()).map_err(|e| fail(e.to_string()))?;
    let mut conn =
        ClientConnection::new(Arc::new(config), server_name).map_err(|e| fail(e.to_string()))?;
    while conn.is_handshaking() {
        conn.complete_io(&mut stream)
            .map_err(|e| fail(format!("handshake: {e}")))?;
    }

    let leaf = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| fail("server presented no certificate".to_string()))?;
    let info = inspect_der(leaf.as_ref())?;
    tracing::debug!(addr = %target, fingerprint = %info.fingerprint, "TLS probe complete");
    Ok(info)
}

fn connect(domain: &str, port: u16, timeout: Duration) -> std::io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (domain, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use rustls::{ServerConfig, ServerConnection};
    use std::net::TcpListener;

    const CERT: &str = include_str!("../tests/fixtures/example.com.crt");
    const KEY: &str = include_str!("../tests/fixtures/example.com.key");

    fn server_config() -> Arc<ServerConfig> {
        let cert = CertificateDer::from(pem::parse(CERT).unwrap().contents().to_vec());
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            pem::parse(KEY).unwrap().contents().to_vec(),
        ));
        let config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
        Arc::new(config)
    }

    #[test]
    fn reports_presented_certificate_without_verifying() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = server_config();
        let server = std::thread::spawn(move || {
            let (mut tcp, _) = listener.accept().unwrap();
            let mut conn = ServerConnection::new(config).unwrap();
            while conn.is_handshaking() {
                if conn.complete_io(&mut tcp).is_err() {
                    break;
                }
            }
        });

        let info = probe_with_timeout("127.0.0.1", port, Duration::from_secs(5)).unwrap();
        assert_eq!(info.common_name.as_deref(), Some("example.com"));
        assert_eq!(info.dns_names, vec!["example.com", "www.example.com"]);
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_a_probe_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = probe_with_timeout("127.0.0.1", port, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, CertError::Probe { .. }));
    }
}
