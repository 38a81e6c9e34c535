use super::addrs::local_bind_addr;
use super::transport::{ResponseBody, Transport, TransportError};
use crate::r#const::transport_defaults;
use async_trait::async_trait;
use bytes::Bytes;
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{TransportConfig, VarInt};
use rustls::ClientConfig;
use std::future::poll_fn;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tracing::debug;

type SendRequest = h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>;

// HTTP/3 DoH 传输。构造不做网络IO，拨号推迟到首次往返；
// 已建立的连接被复用，出错即丢弃，下次往返重新拨号
pub struct TransportH3 {
    server_name: String,
    addrs: Vec<SocketAddr>,
    tls: Arc<ClientConfig>,
    conn: Mutex<Option<H3Connection>>,
}

// 连接句柄，QUIC 端点随句柄丢弃而关闭
struct H3Connection {
    send_request: SendRequest,
    _endpoint: quinn::Endpoint,
}

impl TransportH3 {
    pub fn new(server_name: &str, addrs: Vec<SocketAddr>, tls: Arc<ClientConfig>) -> Self {
        Self {
            server_name: server_name.to_string(),
            addrs,
            tls,
            conn: Mutex::new(None),
        }
    }

    // 客户端侧 QUIC 传输参数
    fn transport_config() -> TransportConfig {
        let mut config = TransportConfig::default();
        config.datagram_receive_buffer_size(None);
        config.datagram_send_buffer_size(0);
        // 客户端不接受对端发起的双向流
        config.max_concurrent_bidi_streams(VarInt::from_u32(3));
        // SETTINGS、QPACK 编码器、QPACK 解码器与保留流
        config.max_concurrent_uni_streams(VarInt::from_u32(4));
        config
    }

    // 依次尝试候选地址，首个拨通的连接胜出
    async fn dial(&self) -> Result<H3Connection, TransportError> {
        let addrs: Vec<SocketAddr> = if self.addrs.is_empty() {
            // 没有引导地址时用主机名做系统解析
            lookup_host((self.server_name.as_str(), transport_defaults::DEFAULT_PORT))
                .await?
                .collect()
        } else {
            self.addrs.clone()
        };

        if addrs.is_empty() {
            return Err(TransportError::NoAddresses);
        }

        let mut last_err = TransportError::NoAddresses;
        for addr in addrs {
            debug!(
                "Dialing HTTP/3 connection to {} (sni={})",
                addr, self.server_name
            );
            match self.dial_addr(addr).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    debug!("HTTP/3 dial to {} failed: {}", addr, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn dial_addr(&self, addr: SocketAddr) -> Result<H3Connection, TransportError> {
        let endpoint = quinn::Endpoint::client(local_bind_addr(&addr))?;

        let mut client_config = quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(
            (*self.tls).clone(),
        )?));
        client_config.transport_config(Arc::new(Self::transport_config()));

        let connection = endpoint
            .connect_with(client_config, addr, &self.server_name)?
            .await?;

        let (mut driver, send_request) =
            h3::client::new(h3_quinn::Connection::new(connection)).await?;

        // 后台驱动连接直至关闭
        tokio::spawn(async move {
            let _ = poll_fn(|cx| driver.poll_close(cx)).await;
        });

        Ok(H3Connection {
            send_request,
            _endpoint: endpoint,
        })
    }

    async fn send(
        &self,
        send_request: &mut SendRequest,
        request: http::Request<()>,
        body: Bytes,
    ) -> Result<http::Response<ResponseBody>, TransportError> {
        let mut stream = send_request.send_request(request).await?;
        if !body.is_empty() {
            stream.send_data(body).await?;
        }
        stream.finish().await?;

        let response = stream.recv_response().await?;
        let (parts, _) = response.into_parts();

        Ok(http::Response::from_parts(parts, ResponseBody::h3(stream)))
    }
}

#[async_trait]
impl Transport for TransportH3 {
    async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, TransportError> {
        // 取出或建立连接，锁内拨号避免并发重复建连
        let mut send_request = {
            let mut guard = self.conn.lock().await;
            match guard.as_ref() {
                Some(conn) => conn.send_request.clone(),
                None => {
                    let conn = self.dial().await?;
                    let send_request = conn.send_request.clone();
                    *guard = Some(conn);
                    send_request
                }
            }
        };

        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        // 授权机构重写为传输绑定的主机名
        let uri = http::Uri::builder()
            .scheme("https")
            .authority(self.server_name.as_str())
            .path_and_query(path_and_query)
            .build()?;

        debug!("HTTP/3 round trip: {} {}", parts.method, uri);

        let mut builder = http::Request::builder().method(parts.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(parts.headers);
        }
        let h3_request = builder.body(())?;

        match self.send(&mut send_request, h3_request, body).await {
            Ok(response) => Ok(response),
            Err(e) => {
                // 失败的连接不再复用
                *self.conn.lock().await = None;
                Err(e)
            }
        }
    }
}
