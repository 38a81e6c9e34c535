use crate::endpoint::transport::TransportError;
use once_cell::sync::Lazy;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use thiserror::Error;
use x509_parser::prelude::*;

// 证书由未知颁发机构签署，附带从证书解析出的主体与颁发者
#[derive(Error, Debug, Clone)]
#[error("certificate signed by unknown authority (subject={subject}, issuer={issuer})")]
pub struct UnknownAuthorityError {
    pub subject: String,
    pub issuer: String,
}

// 共享的基础 TLS 客户端配置，各传输克隆后设置自己的 ALPN
// webpki 内置锚点非空，构建不会失败
static BASE_CONFIG: Lazy<Arc<ClientConfig>> = Lazy::new(|| {
    let config = client_config_with_roots(default_root_store(), &[])
        .expect("client config with webpki roots");
    Arc::new(config)
});

// 内置 webpki 信任锚
pub fn default_root_store() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

// 构建带证书诊断校验器的 TLS 客户端配置
pub fn client_config_with_roots(
    roots: RootCertStore,
    alpn: &[&str],
) -> Result<ClientConfig, TransportError> {
    let provider = Arc::new(ring::default_provider());
    let verifier = CertDiagVerifier::new(roots, provider.clone())?;

    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    config.enable_early_data = true;

    Ok(config)
}

// 默认基础配置
pub(crate) fn default_base() -> Arc<ClientConfig> {
    BASE_CONFIG.clone()
}

// 克隆基础配置并替换 ALPN 列表
pub(crate) fn with_alpn(base: &Arc<ClientConfig>, alpn: &[&str]) -> Arc<ClientConfig> {
    let mut config = base.as_ref().clone();
    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    Arc::new(config)
}

// 在错误链中查找未知颁发机构诊断信息
pub(crate) fn find_unknown_authority(
    err: &(dyn std::error::Error + 'static),
) -> Option<UnknownAuthorityError> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(ua) = e.downcast_ref::<UnknownAuthorityError>() {
            return Some(ua.clone());
        }
        // rustls 将自定义校验器错误包装在 Error::Other 中
        if let Some(rustls::Error::Other(other)) = e.downcast_ref::<rustls::Error>() {
            if let Some(ua) = other.0.downcast_ref::<UnknownAuthorityError>() {
                return Some(ua.clone());
            }
        }
        current = e.source();
    }
    None
}

// 包装 WebPKI 校验器，在未知颁发机构失败时改写为诊断错误，其余行为不变
#[derive(Debug)]
struct CertDiagVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl CertDiagVerifier {
    fn new(roots: RootCertStore, provider: Arc<CryptoProvider>) -> Result<Self, TransportError> {
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl ServerCertVerifier for CertDiagVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)) => {
                Err(unknown_authority(end_entity))
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

// 解析终端实体证书，构造带主体与颁发者的错误
fn unknown_authority(end_entity: &CertificateDer<'_>) -> rustls::Error {
    let (subject, issuer) = match X509Certificate::from_der(end_entity.as_ref()) {
        Ok((_, cert)) => (cert.subject().to_string(), cert.issuer().to_string()),
        Err(_) => ("<unparsable>".to_string(), "<unparsable>".to_string()),
    };
    rustls::Error::Other(rustls::OtherError(Arc::new(UnknownAuthorityError {
        subject,
        issuer,
    })))
}
