use super::addrs::{local_bind_addr, ordered_addrs};
use super::tls;
use super::transport::{Transport, TransportError};
use super::transport_h3::TransportH3;
use crate::r#const::{alpn, endpoint_defaults, http_headers::content_types, probe_limits};
use bytes::Bytes;
use quinn::crypto::rustls::QuicClientConfig;
use quinn::VarInt;
use rustls::ClientConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// DoH3 能力探测器。两个策略共享同一个总体截止时间：
/// 先做廉价的 QUIC 握手探测，全部失败后回退到完整的 DoH3 请求探测
pub struct Prober {
    timeout: Duration,
    tls: Arc<ClientConfig>,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(probe_limits::DEFAULT_TIMEOUT),
            tls: tls::with_alpn(&tls::default_base(), &[alpn::H3]),
        }
    }

    // 调整总体探测超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // 注入自定义 TLS 配置（私有CA部署），ALPN 强制为 h3
    pub fn with_tls_config(mut self, tls: Arc<ClientConfig>) -> Self {
        self.tls = tls::with_alpn(&tls, &[alpn::H3]);
        self
    }

    // 判定端点是否可用 DoH3。只返回布尔值，失败细节记录在日志中
    pub async fn supports_doh3(
        &self,
        hostname: &str,
        bootstrap: &[String],
        advertised_alpn: &[String],
    ) -> bool {
        debug!(
            "Probing DoH3 support for endpoint={} (advertised alpn={:?})",
            hostname, advertised_alpn
        );
        let deadline = Instant::now() + self.timeout;

        match timeout_at(deadline, self.handshake_probe(hostname, bootstrap)).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => debug!(
                "QUIC probe failed for endpoint={}: {}, trying real DoH3 request",
                hostname, e
            ),
            Err(_) => debug!(
                "QUIC probe timed out for endpoint={}, trying real DoH3 request",
                hostname
            ),
        }

        matches!(
            timeout_at(deadline, self.request_probe(hostname, bootstrap)).await,
            Ok(Ok(()))
        )
    }

    // 策略A：逐个地址做 QUIC/TLS 握手，SNI 为端点主机名且只提供 h3。
    // 首个握手成功即短路返回，全部失败保留最后一个错误
    pub async fn handshake_probe(
        &self,
        hostname: &str,
        bootstrap: &[String],
    ) -> Result<(), TransportError> {
        let addrs = ordered_addrs(bootstrap, None);
        if addrs.is_empty() {
            debug!(
                "No bootstrap addresses for endpoint={}, skipping QUIC probe",
                hostname
            );
            return Err(TransportError::DeadlineExceeded);
        }

        let mut last_err = TransportError::DeadlineExceeded;
        for addr in addrs {
            debug!("Probing QUIC to {} (sni={})", addr, hostname);
            match self.quic_handshake(addr, hostname).await {
                Ok(()) => {
                    debug!("QUIC probe to {} succeeded", addr);
                    return Ok(());
                }
                Err(e) => {
                    debug!("QUIC probe to {} failed: {}", addr, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    // 单地址 QUIC 握手
    async fn quic_handshake(
        &self,
        addr: SocketAddr,
        server_name: &str,
    ) -> Result<(), TransportError> {
        let endpoint = quinn::Endpoint::client(local_bind_addr(&addr))?;
        let config =
            quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from((*self.tls).clone())?));
        let connection = endpoint.connect_with(config, addr, server_name)?.await?;

        // 探测只关心握手能否完成
        connection.close(VarInt::from_u32(0), b"");
        Ok(())
    }

    // 策略B：逐个地址构造单地址 HTTP/3 传输，向默认查询路径 POST 空请求，
    // 收到 200 即认定支持
    pub async fn request_probe(
        &self,
        hostname: &str,
        bootstrap: &[String],
    ) -> Result<(), TransportError> {
        let addrs = ordered_addrs(bootstrap, None);
        if addrs.is_empty() {
            return Err(TransportError::DeadlineExceeded);
        }

        for addr in addrs {
            let transport = TransportH3::new(hostname, vec![addr], self.tls.clone());
            let request = http::Request::post(format!(
                "https://{}{}",
                hostname,
                endpoint_defaults::DEFAULT_QUERY_PATH
            ))
            .header(http::header::CONTENT_TYPE, content_types::DNS_MESSAGE)
            .body(Bytes::new())?;

            debug!("Probing DoH3 request to {} (endpoint={})", addr, hostname);
            match transport.round_trip(request).await {
                Ok(response) if response.status() == http::StatusCode::OK => return Ok(()),
                Ok(response) => debug!(
                    "DoH3 request probe to {} returned status {}",
                    addr,
                    response.status()
                ),
                Err(e) => debug!("DoH3 request probe to {} failed: {}", addr, e),
            }
            // 响应体随作用域结束释放
        }

        Err(TransportError::DeadlineExceeded)
    }
}

/// 判定端点是否支持 DoH3，使用默认超时与内置信任锚
pub async fn supports_doh3(hostname: &str, bootstrap: &[String], advertised_alpn: &[String]) -> bool {
    Prober::new()
        .supports_doh3(hostname, bootstrap, advertised_alpn)
        .await
}
