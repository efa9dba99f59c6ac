//! TLS 서버 자료 로드
//!
//! PEM 인증서 체인과 개인키에서 rustls 서버 설정을 만듭니다.
//! 인제스트 TLS 리스너와 익스포트 HTTPS 엔드포인트가 공유합니다.
//! 허용 프로토콜은 TLS 1.2와 1.3입니다.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, version};

use crate::error::ConfigError;

/// PEM 파일에서 rustls 서버 설정을 로드합니다.
pub fn load_server_config(
    cert_file: &str,
    key_file: &str,
) -> Result<Arc<rustls::ServerConfig>, ConfigError> {
    let tls_err = |reason: String| ConfigError::InvalidValue {
        field: "tls".to_owned(),
        reason,
    };

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert_file).map_err(|e| tls_err(format!("open cert file '{cert_file}': {e}")))?,
    ))
    .collect::<Result<_, _>>()
    .map_err(|e| tls_err(format!("parse cert file '{cert_file}': {e}")))?;
    if certs.is_empty() {
        return Err(tls_err(format!("no certificates found in '{cert_file}'")));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_file).map_err(|e| tls_err(format!("open key file '{key_file}': {e}")))?,
    ))
    .map_err(|e| tls_err(format!("parse key file '{key_file}': {e}")))?
    .ok_or_else(|| tls_err(format!("no private key found in '{key_file}'")))?;

    let config =
        rustls::ServerConfig::builder_with_protocol_versions(&[&version::TLS13, &version::TLS12])
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| tls_err(format!("invalid certificate/key pair: {e}")))?;

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cert_file_is_reported() {
        let err = load_server_config("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(err.to_string().contains("cert.pem"));
    }

    #[test]
    fn empty_pem_reports_no_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("empty.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let err = load_server_config(cert.to_str().unwrap(), key.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }
}
