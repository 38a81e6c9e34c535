use crate::error::{AppError, ConfigError};
use crate::r#const::query_limits;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use url::Url;

// DoH/DoH3 端点探测与查询工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dohscout",
    author,
    version,
    about = "A lightweight DoH client probing HTTP/3 endpoint support and exchanging DNS queries over the fastest address\n\n\
             Key Features:\n\
             - Capability Probing: QUIC handshake probe with full DoH3 request fallback under one shared deadline\n\
             - Transport Selection: HTTP/3 (QUIC) or HTTP/2 chosen once per endpoint, resolved lazily\n\
             - Bootstrap Addressing: IP literals with port normalization and fastest-address preference\n\
             - Diagnostics: Certificate subject/issuer detail on authority verification failures\n\
             - Usability: Simple YAML configuration, Configuration validation, Command-line interface"
)]
pub struct Args {
    // 要查询的域名
    #[arg(help = "Domain name to query")]
    pub name: String,

    // 端点 URL
    #[arg(
        short = 's',
        long = "server",
        help = "DoH endpoint URL, e.g. https://dns.nextdns.io/dns-query"
    )]
    pub server: Option<String>,

    // 引导地址
    #[arg(
        short = 'b',
        long = "bootstrap",
        value_delimiter = ',',
        help = "Bootstrap IP literals for the endpoint, comma separated"
    )]
    pub bootstrap: Vec<String>,

    // 配置文件路径
    #[arg(short, long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    // 记录类型
    #[arg(
        short = 'r',
        long = "record-type",
        default_value = "A",
        help = "DNS record type to query"
    )]
    pub record_type: String,

    // 查询超时
    #[arg(
        long = "timeout",
        help = "Maximum time in seconds to wait for the exchange",
        default_value_t = query_limits::DEFAULT_TIMEOUT
    )]
    pub timeout: u64,

    // 跳过探测，直接使用 HTTP/2
    #[arg(
        long = "no-probe",
        action = ArgAction::SetTrue,
        help = "Skip DoH3 capability probing and use HTTP/2"
    )]
    pub no_probe: bool,

    // 启用调试日志
    #[arg(
        short = 'd',
        long = "debug",
        action = ArgAction::SetTrue,
        help = "Enable debug level logging for detailed output"
    )]
    pub debug: bool,
}

impl Args {
    // 解析命令行参数
    pub fn parse_args() -> Self {
        Args::parse()
    }

    // 验证参数
    pub fn validation(&self) -> Result<(), AppError> {
        if self.timeout < query_limits::MIN_TIMEOUT || self.timeout > query_limits::MAX_TIMEOUT {
            return Err(AppError::InvalidTimeout);
        }

        match (&self.server, &self.config) {
            // 端点必须来自 --server 或配置文件
            (None, None) => return Err(AppError::Config(ConfigError::NoEndpoint)),
            (Some(server), _) => {
                let url = Url::parse(server)
                    .map_err(|e| ConfigError::InvalidEndpointUrl(e.to_string()))?;
                if url.scheme() != "https" || url.host_str().is_none() {
                    return Err(AppError::Config(ConfigError::InvalidEndpointUrl(
                        server.clone(),
                    )));
                }
            }
            _ => {}
        }

        Ok(())
    }
}
