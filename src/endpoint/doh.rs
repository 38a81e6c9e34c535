use super::addrs::ordered_addrs;
use super::tls;
use super::transport::{ResponseBody, Transport, TransportError, TransportH2};
use super::transport_h3::TransportH3;
use crate::config::EndpointConfig;
use crate::error::AppError;
use crate::r#const::{alpn, doh3_rewrites, endpoint_defaults, http_headers::content_types};
use bytes::Bytes;
use rustls::ClientConfig;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// 一个 DoH 上游端点：身份、引导地址与惰性构造的传输句柄
pub struct DohEndpoint {
    // 主机名，用于 TLS 身份；无引导地址时也用于地址发现
    pub hostname: String,
    // 查询路径
    pub path: String,
    // 引导 IP 字面量，保持配置顺序
    pub bootstrap: Vec<String>,
    // 端点通告的 ALPN 列表
    pub alpn: Vec<String>,
    // DoH3 能力标志，首次使用时被钉定
    pub doh3_supported: bool,
    // 外部测得的最快地址
    pub fastest: Option<String>,
    // 自定义 TLS 配置
    tls: Option<Arc<ClientConfig>>,
    // 传输句柄，至多构造一次
    transport: OnceCell<Arc<dyn Transport>>,
}

impl DohEndpoint {
    pub fn new(hostname: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            path: path.into(),
            bootstrap: Vec::new(),
            alpn: Vec::new(),
            doh3_supported: false,
            fastest: None,
            tls: None,
            transport: OnceCell::new(),
        }
    }

    // 从配置条目构造端点
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            hostname: config.hostname.clone(),
            path: config.path.clone(),
            bootstrap: config.bootstrap.clone(),
            alpn: config.alpn.clone(),
            doh3_supported: config.doh3.unwrap_or(false),
            fastest: config.fastest.clone(),
            tls: None,
            transport: OnceCell::new(),
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: Vec<String>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_alpn(mut self, alpn: Vec<String>) -> Self {
        self.alpn = alpn;
        self
    }

    pub fn with_fastest(mut self, fastest: impl Into<String>) -> Self {
        self.fastest = Some(fastest.into());
        self
    }

    pub fn with_doh3_supported(mut self, supported: bool) -> Self {
        self.doh3_supported = supported;
        self
    }

    pub fn with_tls_config(mut self, tls: Arc<ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    // 预置传输句柄（内嵌方或测试替身），只在首次使用前生效
    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        let _ = self.transport.set(transport);
        self
    }

    /// 解析传输句柄：至多构造一次，并发的首次调用共享同一句柄。
    /// 能力标志在此被读取并钉定，此后修改不再生效
    pub async fn resolved_transport(&self) -> Arc<dyn Transport> {
        self.transport
            .get_or_init(|| async { self.build_transport() })
            .await
            .clone()
    }

    // 按能力标志构造传输，不做网络IO
    fn build_transport(&self) -> Arc<dyn Transport> {
        let addrs = ordered_addrs(&self.bootstrap, self.fastest.as_deref());
        let base = self.tls.clone().unwrap_or_else(tls::default_base);

        if self.doh3_supported {
            // 已知提供商改用 DoH3 专用主机名，端点自身的主机名不变
            let hostname = doh3_hostname(&self.hostname);
            debug!(
                "Using HTTP/3 transport for endpoint={} (sni={}, addrs={:?})",
                self.hostname, hostname, addrs
            );
            Arc::new(TransportH3::new(
                hostname,
                addrs,
                tls::with_alpn(&base, &[alpn::H3]),
            ))
        } else {
            debug!(
                "Using HTTP/2 transport for endpoint={} (addrs={:?})",
                self.hostname, addrs
            );
            Arc::new(TransportH2::new(
                &self.hostname,
                addrs,
                tls::with_alpn(&base, &[alpn::H2]),
            ))
        }
    }

    // 通过已解析的传输执行一次请求往返
    pub async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, TransportError> {
        self.resolved_transport().await.round_trip(request).await
    }

    /// 单次 DNS 消息交换。响应体在所有退出路径上都被释放；
    /// 读到流结束不是错误，返回已写入调用方缓冲区的字节数
    pub async fn exchange(&self, payload: &[u8], buf: &mut [u8]) -> Result<usize, AppError> {
        // 占位授权机构，真实目标由传输层解析
        let request = http::Request::post(format!(
            "https://{}{}",
            endpoint_defaults::SYNTHETIC_AUTHORITY,
            self.path
        ))
        .header(http::header::CONTENT_TYPE, content_types::DNS_MESSAGE)
        .body(Bytes::copy_from_slice(payload))
        .map_err(TransportError::from)?;

        let mut response = match self.round_trip(request).await {
            Ok(response) => response,
            Err(e) => {
                // 证书校验失败时补充主体与颁发者诊断信息
                return Err(match tls::find_unknown_authority(&e) {
                    Some(ua) => AppError::CertificateAuthority {
                        subject: ua.subject,
                        issuer: ua.issuer,
                        source: e,
                    },
                    None => AppError::RoundTrip(e),
                });
            }
        };

        if response.status() != http::StatusCode::OK {
            return Err(AppError::Status(response.status().as_u16()));
        }

        response.body_mut().read(buf).await.map_err(AppError::Read)
    }
}

// 规范文本形式：https://<hostname><path>，有引导地址时追加 #ip1,ip2,...
impl fmt::Display for DohEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://{}{}", self.hostname, self.path)?;
        if !self.bootstrap.is_empty() {
            write!(f, "#{}", self.bootstrap.join(","))?;
        }
        Ok(())
    }
}

// 结构相等：主机名、路径与引导地址顺序参与比较，其余字段不参与
impl PartialEq for DohEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.hostname == other.hostname
            && self.path == other.path
            && self.bootstrap == other.bootstrap
    }
}

impl Eq for DohEndpoint {}

impl fmt::Debug for DohEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DohEndpoint")
            .field("hostname", &self.hostname)
            .field("path", &self.path)
            .field("bootstrap", &self.bootstrap)
            .field("alpn", &self.alpn)
            .field("doh3_supported", &self.doh3_supported)
            .field("fastest", &self.fastest)
            .finish()
    }
}

/// 查询已知提供商的 DoH3 主机名重写表，未命中时原样返回
pub fn doh3_hostname(hostname: &str) -> &str {
    for (from, to) in doh3_rewrites::RULES {
        if hostname.eq_ignore_ascii_case(from) {
            return to;
        }
    }
    hostname
}
