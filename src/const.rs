// 应用常量定义

//
// 配置参数限制常量
//

// 探测配置限制
pub mod probe_limits {
    // 默认总体探测超时（秒），两个探测策略共享
    pub const DEFAULT_TIMEOUT: u64 = 2;
    // 最小探测超时（秒）
    pub const MIN_TIMEOUT: u64 = 1;
    // 最大探测超时（秒）
    pub const MAX_TIMEOUT: u64 = 60;
}

// 查询配置限制
pub mod query_limits {
    // 默认查询超时（秒）
    pub const DEFAULT_TIMEOUT: u64 = 5;
    // 最小查询超时（秒）
    pub const MIN_TIMEOUT: u64 = 1;
    // 最大查询超时（秒）
    pub const MAX_TIMEOUT: u64 = 1200;
    // 响应缓冲区大小（字节）
    pub const RESPONSE_BUFFER_SIZE: usize = 4096;
    // EDNS0 通告的最大UDP负载（字节）
    pub const EDNS_MAX_PAYLOAD: u16 = 1232;
}

// 传输层默认值
pub mod transport_defaults {
    // DoH 默认端口
    pub const DEFAULT_PORT: u16 = 443;
    // 默认连接超时（秒）
    pub const DEFAULT_CONNECT_TIMEOUT: u64 = 3;
    // 默认连接池空闲超时（秒）
    pub const DEFAULT_IDLE_TIMEOUT: u64 = 10;
}

// DoH 端点默认值
pub mod endpoint_defaults {
    // 默认查询路径
    pub const DEFAULT_QUERY_PATH: &str = "/dns-query";
    // 请求中使用的占位授权机构，实际目标由传输层解析
    pub const SYNTHETIC_AUTHORITY: &str = "nowhere";
}

// ALPN 协议标识
pub mod alpn {
    // HTTP/3
    pub const H3: &str = "h3";
    // HTTP/2
    pub const H2: &str = "h2";
}

// 已知提供商的 DoH3 主机名重写规则
pub mod doh3_rewrites {
    // (原主机名, DoH3 专用主机名)
    pub const RULES: &[(&str, &str)] = &[("dns.nextdns.io", "doh3.dns.nextdns.io")];
}

// HTTP头常量
pub mod http_headers {
    // 内容类型常量
    pub mod content_types {
        // DNS消息内容类型
        pub const DNS_MESSAGE: &str = "application/dns-message";
    }
}
