use assert_matches::assert_matches;
use bytes::Bytes;
use dohscout::endpoint::{client_config_with_roots, Prober, TransportError};
use quinn::crypto::rustls::QuicServerConfig;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// 辅助函数：生成 localhost 自签名证书
fn self_signed_cert() -> (CertificateDer<'static>, PrivatePkcs8KeyDer<'static>) {
    let key_pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "dohscout test server");
    params.distinguished_name = dn;
    let cert = params.self_signed(&key_pair).unwrap();
    (
        CertificateDer::from(cert.der().to_vec()),
        PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
    )
}

// 辅助函数：构建指定 ALPN 的服务端 TLS 配置
fn server_tls_config(
    cert: CertificateDer<'static>,
    key: PrivatePkcs8KeyDer<'static>,
    alpn: &[&str],
) -> rustls::ServerConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key.into())
        .unwrap();
    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    config
}

// 辅助函数：启动 QUIC 服务端，返回端点、监听地址与证书
fn quic_server(alpn: &[&str]) -> (quinn::Endpoint, SocketAddr, CertificateDer<'static>) {
    let (cert, key) = self_signed_cert();
    let config = server_tls_config(cert.clone(), key, alpn);
    let server_config =
        quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(config).unwrap()));
    let endpoint =
        quinn::Endpoint::server(server_config, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = endpoint.local_addr().unwrap();
    (endpoint, addr, cert)
}

// 辅助函数：接受连接并保持到对端关闭，计数每次完成的握手
fn spawn_accept_loop(endpoint: quinn::Endpoint) -> Arc<AtomicUsize> {
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Some(incoming) = endpoint.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                if let Ok(connection) = incoming.await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    connection.closed().await;
                }
            });
        }
    });
    accepted
}

// 辅助函数：信任给定证书的客户端 TLS 配置
fn client_tls(cert: &CertificateDer<'static>) -> Arc<rustls::ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(cert.clone()).unwrap();
    Arc::new(client_config_with_roots(roots, &[]).unwrap())
}

#[tokio::test]
async fn test_no_bootstrap_returns_false_immediately() {
    let start = Instant::now();
    let supported = Prober::new()
        .supports_doh3("dns.example.com", &[], &[])
        .await;

    assert!(!supported);
    // 无引导地址时不发起任何网络IO
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_malformed_bootstrap_entries_are_skipped() {
    let start = Instant::now();
    let supported = Prober::new()
        .supports_doh3("dns.example.com", &["not-an-ip".to_string()], &[])
        .await;

    assert!(!supported);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_quic_handshake_probe_detects_support() {
    let (endpoint, addr, cert) = quic_server(&["h3"]);
    let accepted = spawn_accept_loop(endpoint);

    // 通告的 ALPN 只作参考，即使缺少 h3 也照常探测
    let prober = Prober::new().with_tls_config(client_tls(&cert));
    let supported = prober
        .supports_doh3("localhost", &[addr.to_string()], &["h2".to_string()])
        .await;

    assert!(supported);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_first_handshake_success_short_circuits() {
    let (first_endpoint, first_addr, cert) = quic_server(&["h3"]);
    let first_accepted = spawn_accept_loop(first_endpoint);
    let (second_endpoint, second_addr, _) = quic_server(&["h3"]);
    let second_accepted = spawn_accept_loop(second_endpoint);

    let prober = Prober::new().with_tls_config(client_tls(&cert));
    let supported = prober
        .supports_doh3(
            "localhost",
            &[first_addr.to_string(), second_addr.to_string()],
            &[],
        )
        .await;

    assert!(supported);
    assert_eq!(first_accepted.load(Ordering::SeqCst), 1);
    // 首个地址握手成功后不再尝试后续地址
    assert_eq!(second_accepted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handshake_failover_to_next_address() {
    // 第一个地址只通告 h2，握手失败后应继续尝试下一个地址
    let (bad_endpoint, bad_addr, bad_cert) = quic_server(&["h2"]);
    let _bad_accepted = spawn_accept_loop(bad_endpoint);
    let (good_endpoint, good_addr, good_cert) = quic_server(&["h3"]);
    let good_accepted = spawn_accept_loop(good_endpoint);

    let mut roots = RootCertStore::empty();
    roots.add(bad_cert).unwrap();
    roots.add(good_cert).unwrap();
    let prober = Prober::new()
        .with_tls_config(Arc::new(client_config_with_roots(roots, &[]).unwrap()));

    let supported = prober
        .supports_doh3(
            "localhost",
            &[bad_addr.to_string(), good_addr.to_string()],
            &[],
        )
        .await;

    assert!(supported);
    assert_eq!(good_accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handshake_probe_retains_last_error() {
    // 第一个地址证书不被信任（本端校验失败），第二个地址拒绝连接（对端关闭）
    let (untrusted_endpoint, untrusted_addr, _) = quic_server(&["h3"]);
    let _untrusted_accepted = spawn_accept_loop(untrusted_endpoint);
    let (refuse_endpoint, refuse_addr, refuse_cert) = quic_server(&["h3"]);
    let refuse_handle = refuse_endpoint.clone();
    tokio::spawn(async move {
        while let Some(incoming) = refuse_handle.accept().await {
            incoming.refuse();
        }
    });

    let prober = Prober::new().with_tls_config(client_tls(&refuse_cert));

    let err = prober
        .handshake_probe(
            "localhost",
            &[untrusted_addr.to_string(), refuse_addr.to_string()],
        )
        .await
        .unwrap_err();

    // 全部失败时保留最后一个地址的错误，而非第一个的证书错误
    assert_matches!(
        err,
        TransportError::QuicConnection(quinn::ConnectionError::ConnectionClosed(_))
    );
}

#[tokio::test]
async fn test_request_probe_fallback_succeeds() {
    let (endpoint, addr, cert) = quic_server(&["h3"]);
    let seen = Arc::new(Mutex::new(None::<(http::Method, String, Option<String>)>));
    let recorder = seen.clone();
    let server = endpoint.clone();
    tokio::spawn(async move {
        let mut refused_first = false;
        while let Some(incoming) = server.accept().await {
            // 拒绝第一个连接迫使握手探测失败，验证请求探测回退路径
            if !refused_first {
                refused_first = true;
                incoming.refuse();
                continue;
            }
            let recorder = recorder.clone();
            tokio::spawn(async move {
                let connection = match incoming.await {
                    Ok(connection) => connection,
                    Err(_) => return,
                };
                let mut h3_conn: h3::server::Connection<h3_quinn::Connection, Bytes> =
                    h3::server::Connection::new(h3_quinn::Connection::new(connection))
                        .await
                        .unwrap();
                while let Ok(Some((request, mut stream))) = h3_conn.accept().await {
                    *recorder.lock().unwrap() = Some((
                        request.method().clone(),
                        request.uri().path().to_string(),
                        request
                            .headers()
                            .get(http::header::CONTENT_TYPE)
                            .map(|v| v.to_str().unwrap().to_string()),
                    ));
                    while stream.recv_data().await.unwrap().is_some() {}
                    let response = http::Response::builder()
                        .status(http::StatusCode::OK)
                        .body(())
                        .unwrap();
                    stream.send_response(response).await.unwrap();
                    stream.finish().await.unwrap();
                }
            });
        }
    });

    let prober = Prober::new().with_tls_config(client_tls(&cert));
    let supported = prober
        .supports_doh3("localhost", &[addr.to_string()], &[])
        .await;

    assert!(supported);
    let recorded = seen.lock().unwrap().take().unwrap();
    assert_eq!(recorded.0, http::Method::POST);
    // 请求探测固定使用默认查询路径
    assert_eq!(recorded.1, "/dns-query");
    assert_eq!(recorded.2.as_deref(), Some("application/dns-message"));
}

#[tokio::test]
async fn test_probe_returns_false_when_all_attempts_fail() {
    let (endpoint, addr, cert) = quic_server(&["h3"]);
    let server = endpoint.clone();
    tokio::spawn(async move {
        while let Some(incoming) = server.accept().await {
            incoming.refuse();
        }
    });

    let prober = Prober::new().with_tls_config(client_tls(&cert));
    let supported = prober
        .supports_doh3("localhost", &[addr.to_string()], &[])
        .await;

    assert!(!supported);
}

#[tokio::test]
async fn test_shared_deadline_bounds_both_strategies() {
    let (endpoint, addr, cert) = quic_server(&["h3"]);
    let _accepted = spawn_accept_loop(endpoint);

    // 截止时间一到，两个策略都被切断
    let start = Instant::now();
    let prober = Prober::new()
        .with_timeout(Duration::ZERO)
        .with_tls_config(client_tls(&cert));
    let supported = prober
        .supports_doh3("localhost", &[addr.to_string()], &[])
        .await;

    assert!(!supported);
    assert!(start.elapsed() < Duration::from_secs(1));
}
