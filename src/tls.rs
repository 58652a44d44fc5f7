//! TLS termination
//!
//! Builds the server-side `TlsAcceptor` used when the proxy runs in HTTPS
//! mode. Certificates and the private key are read from a single PEM bundle
//! (the key may live in the same file as the chain); when no bundle is
//! configured, an in-process self-signed certificate is generated and the
//! fallback is logged at warning level.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::OnceLock;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::config::ProxyConfig;
use crate::error::TlsError;

/// Validity window for the self-signed fallback certificate
const SELF_SIGNED_VALIDITY_DAYS: i64 = 365;

/// Common name for the self-signed fallback certificate
const SELF_SIGNED_CN: &str = "localhost";

/// Build a TLS acceptor from the configuration
///
/// # Errors
///
/// Returns `TlsError` if the PEM bundle cannot be read or parsed, or if
/// self-signed generation fails.
pub fn build_acceptor(config: &ProxyConfig) -> Result<TlsAcceptor, TlsError> {
    // Initialize crypto provider (only once)
    static CRYPTO_INIT: OnceLock<()> = OnceLock::new();
    CRYPTO_INIT.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });

    let (certs, key) = match config.cert_path {
        Some(ref path) => {
            let (certs, key) = load_pem_bundle(path)?;
            info!(path = %path, certs = certs.len(), "Loaded TLS certificate bundle");
            (certs, key)
        }
        None => {
            warn!(
                cn = SELF_SIGNED_CN,
                validity_days = SELF_SIGNED_VALIDITY_DAYS,
                "No certificate configured for HTTPS mode, generating self-signed certificate"
            );
            generate_self_signed()?
        }
    };

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::InvalidConfig(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Load certificates and the private key from one PEM bundle
///
/// The original deployment convention keeps the certificate chain and the
/// private key in the same file; split bundles also work because unmatched
/// block types are skipped by the pemfile iterators.
fn load_pem_bundle(
    path: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let contents = std::fs::read(path)
        .map_err(|e| TlsError::certificate_load(path, e.to_string()))?;

    let mut certs: Vec<CertificateDer<'static>> = Vec::new();
    for cert_result in rustls_pemfile::certs(&mut Cursor::new(&contents)) {
        match cert_result {
            Ok(cert) => certs.push(cert),
            Err(e) => {
                return Err(TlsError::certificate_load(
                    path,
                    format!("failed to parse certificate: {e}"),
                ));
            }
        }
    }

    if certs.is_empty() {
        return Err(TlsError::certificate_load(path, "no certificates found"));
    }

    let key = load_private_key(&contents, path)?;

    Ok((certs, key))
}

/// Find the private key in the bundle, trying PKCS#8, then RSA, then EC
fn load_private_key(contents: &[u8], path: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    for key_result in rustls_pemfile::pkcs8_private_keys(&mut Cursor::new(contents)) {
        if let Ok(key) = key_result {
            return Ok(PrivateKeyDer::Pkcs8(key));
        }
    }

    for key_result in rustls_pemfile::rsa_private_keys(&mut Cursor::new(contents)) {
        if let Ok(key) = key_result {
            return Ok(PrivateKeyDer::Pkcs1(key));
        }
    }

    for key_result in rustls_pemfile::ec_private_keys(&mut Cursor::new(contents)) {
        if let Ok(key) = key_result {
            return Ok(PrivateKeyDer::Sec1(key));
        }
    }

    Err(TlsError::private_key_load(path, "no valid private key found"))
}

/// Generate a self-signed certificate for the fallback path
///
/// CN=localhost, one-year validity. This keeps older tunneling clients
/// working out of the box; operators who need a real chain pass `--cert`.
fn generate_self_signed(
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let key_pair =
        rcgen::KeyPair::generate().map_err(|e| TlsError::SelfSigned(e.to_string()))?;

    let mut params = rcgen::CertificateParams::new(vec![SELF_SIGNED_CN.to_string()])
        .map_err(|e| TlsError::SelfSigned(e.to_string()))?;

    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, SELF_SIGNED_CN);

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(SELF_SIGNED_VALIDITY_DAYS);

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| TlsError::SelfSigned(e.to_string()))?;

    let cert_der = cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    Ok((vec![cert_der], key_der))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_self_signed_generation() {
        let (certs, key) = generate_self_signed().unwrap();
        assert_eq!(certs.len(), 1);
        // DER certificates start with a SEQUENCE tag
        assert_eq!(certs[0].as_ref()[0], 0x30);
        assert!(matches!(key, PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn test_build_acceptor_self_signed() {
        let config = ProxyConfig {
            use_https: true,
            cert_path: None,
            ..Default::default()
        };
        assert!(build_acceptor(&config).is_ok());
    }

    #[test]
    fn test_build_acceptor_missing_bundle() {
        let config = ProxyConfig {
            use_https: true,
            cert_path: Some("/nonexistent/bundle.pem".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_acceptor(&config),
            Err(TlsError::CertificateLoad { .. })
        ));
    }

    #[test]
    fn test_load_pem_bundle_combined() {
        // Generate a cert + key pair and write them into one bundle file
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(cert.pem().as_bytes()).unwrap();
        file.write_all(key_pair.serialize_pem().as_bytes()).unwrap();
        file.flush().unwrap();

        let path = file.path().to_str().unwrap();
        let (certs, key) = load_pem_bundle(path).unwrap();
        assert_eq!(certs.len(), 1);
        assert!(matches!(key, PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn test_load_pem_bundle_no_key() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(cert.pem().as_bytes()).unwrap();
        file.flush().unwrap();

        let path = file.path().to_str().unwrap();
        assert!(matches!(
            load_pem_bundle(path),
            Err(TlsError::PrivateKeyLoad { .. })
        ));
    }

    #[test]
    fn test_load_pem_bundle_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert!(matches!(
            load_pem_bundle(path),
            Err(TlsError::CertificateLoad { .. })
        ));
    }
}
