use crate::r#const::transport_defaults;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tracing::debug;

// 规范化并排序候选地址：
// 1. 最快地址（若设置）恰好出现一次且位于首位
// 2. 其余地址保持原有相对顺序
// 3. 每个地址都带有显式端口，缺省为 443
// 无法解析的条目被跳过，空输入产生空输出
pub fn ordered_addrs(bootstrap: &[String], fastest: Option<&str>) -> Vec<SocketAddr> {
    let mut addrs: Vec<SocketAddr> = bootstrap.iter().filter_map(|s| normalize(s)).collect();

    if let Some(preferred) = fastest.and_then(normalize) {
        // 去重后置于首位
        addrs.retain(|addr| *addr != preferred);
        addrs.insert(0, preferred);
    }

    addrs
}

// 将 IP 字面量规范化为带端口的套接字地址
fn normalize(s: &str) -> Option<SocketAddr> {
    let s = s.trim();

    // 已带端口的形式，例如 "1.2.3.4:8443" 或 "[2001:db8::1]:8443"
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Some(addr);
    }

    // 裸 IP 字面量，补上默认端口
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some(SocketAddr::new(ip, transport_defaults::DEFAULT_PORT));
    }

    debug!("Ignoring unparsable bootstrap address: {:?}", s);
    None
}

// 按对端地址族选择本地 UDP 绑定地址
pub(crate) fn local_bind_addr(peer: &SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}
