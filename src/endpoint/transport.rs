use crate::r#const::transport_defaults;
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use rustls::ClientConfig;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

// 传输层错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no candidate addresses")]
    NoAddresses,

    #[error("probe deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("QUIC connect error: {0}")]
    QuicConnect(#[from] quinn::ConnectError),

    #[error("QUIC connection error: {0}")]
    QuicConnection(#[from] quinn::ConnectionError),

    #[error("QUIC TLS error: {0}")]
    QuicCrypto(#[from] quinn::crypto::rustls::NoInitialCipherSuite),

    #[error("HTTP/3 error: {0}")]
    H3(#[from] h3::Error),
}

// 单次请求往返能力，HTTP/2 与 HTTP/3 两种实现按能力标志选用
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, TransportError>;
}

// 响应体，单次读取语义：每次 read 至多消费一个数据块，返回 0 表示流结束
pub struct ResponseBody(Inner);

enum Inner {
    // 内存中的完整响应体
    Full(Bytes),
    // reqwest 流式响应
    H2(reqwest::Response),
    // HTTP/3 请求流的接收侧
    H3(h3::client::RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>),
}

impl ResponseBody {
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(Inner::Full(bytes))
    }

    pub(crate) fn h2(response: reqwest::Response) -> Self {
        Self(Inner::H2(response))
    }

    pub(crate) fn h3(stream: h3::client::RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>) -> Self {
        Self(Inner::H3(stream))
    }

    // 读取一个数据块到调用方缓冲区，超出缓冲区的字节被丢弃
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match &mut self.0 {
            Inner::Full(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                bytes.advance(n);
                Ok(n)
            }
            Inner::H2(response) => match response.chunk().await? {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => Ok(0),
            },
            Inner::H3(stream) => match stream.recv_data().await? {
                Some(mut chunk) => {
                    let n = chunk.remaining().min(buf.len());
                    chunk.copy_to_slice(&mut buf[..n]);
                    Ok(n)
                }
                None => Ok(0),
            },
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Inner::Full(bytes) => f.debug_tuple("ResponseBody").field(&bytes.len()).finish(),
            Inner::H2(_) => f.write_str("ResponseBody(h2)"),
            Inner::H3(_) => f.write_str("ResponseBody(h3)"),
        }
    }
}

// HTTP/2 DoH 传输，主机名仅用于 TLS 身份，实际目标由地址列表钉定
pub struct TransportH2 {
    authority: String,
    client: Result<reqwest::Client, String>,
}

impl TransportH2 {
    // 构造不做网络IO且不失败，客户端构建错误推迟到首次往返时呈现
    pub fn new(hostname: &str, addrs: Vec<SocketAddr>, tls: Arc<ClientConfig>) -> Self {
        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls((*tls).clone())
            .https_only(true)
            .http2_prior_knowledge()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(
                transport_defaults::DEFAULT_CONNECT_TIMEOUT,
            ))
            .pool_idle_timeout(Duration::from_secs(
                transport_defaults::DEFAULT_IDLE_TIMEOUT,
            ));

        // 地址重写只覆盖 IP，目标端口取自 URL，非默认端口须写进授权机构
        let authority = match addrs.first() {
            Some(addr) if addr.port() != transport_defaults::DEFAULT_PORT => {
                format!("{}:{}", hostname, addr.port())
            }
            _ => hostname.to_string(),
        };

        // 地址列表为空时回退到主机名解析
        if !addrs.is_empty() {
            builder = builder.resolve_to_addrs(hostname, &addrs);
        }

        Self {
            authority,
            client: builder.build().map_err(|e| e.to_string()),
        }
    }
}

#[async_trait]
impl Transport for TransportH2 {
    async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, TransportError> {
        let client = self
            .client
            .as_ref()
            .map_err(|e| TransportError::Client(e.clone()))?;

        let (parts, body) = request.into_parts();

        // 重写授权机构为配置的主机名，路径与查询保持不变
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("https://{}{}", self.authority, path_and_query);

        debug!("HTTP/2 round trip: {} {}", parts.method, url);

        let response = client
            .request(parts.method, url)
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();

        let mut out = http::Response::builder()
            .status(status)
            .version(version)
            .body(ResponseBody::h2(response))?;
        *out.headers_mut() = headers;

        Ok(out)
    }
}
