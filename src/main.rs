use anyhow::Context;
use dohscout::r#const::{endpoint_defaults, query_limits};
use dohscout::{
    AppError, Args, Config, ConfigError, DohEndpoint, EndpointConfig, Prober, QueryConfig,
};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use mimalloc::MiMalloc;
use std::process;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

// 使用 mimalloc 分配器提高内存效率
#[global_allocator]
static GLOBAL: MiMalloc = mimalloc::MiMalloc;

fn init_logging(args: &Args) {
    let builder = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_line_number(false);

    // 如果启用调试模式，输出调试信息，否则只输出 info 及以上级别
    if args.debug {
        builder.with_max_level(tracing::Level::DEBUG)
    } else {
        builder.with_max_level(tracing::Level::INFO)
    }
    .init();
}

// 程序入口
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 解析命令行参数
    let args = Args::parse_args();

    // 初始化日志
    init_logging(&args);

    // 验证参数
    if let Err(e) = args.validation() {
        error!("Invalid command line arguments: {}", e);
        process::exit(1);
    }

    // 组装端点与查询配置
    let (endpoint_config, query_config) = match resolve_config(&args) {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("Failed to resolve endpoint configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&args, endpoint_config, query_config).await {
        error!("Query failed: {:#}", e);
        process::exit(1);
    }

    Ok(())
}

// 合并命令行与配置文件，得到端点与查询配置
fn resolve_config(args: &Args) -> Result<(EndpointConfig, QueryConfig), AppError> {
    let mut config = if let Some(server) = &args.server {
        // 命令行端点优先于配置文件
        let url =
            Url::parse(server).map_err(|e| ConfigError::InvalidEndpointUrl(e.to_string()))?;
        let hostname = match url.host_str() {
            Some(host) => host.to_string(),
            None => return Err(ConfigError::InvalidEndpointUrl(server.clone()).into()),
        };
        let path = match url.path() {
            "" | "/" => endpoint_defaults::DEFAULT_QUERY_PATH.to_string(),
            path => path.to_string(),
        };

        Config {
            endpoints: vec![EndpointConfig {
                hostname,
                path,
                bootstrap: args.bootstrap.clone(),
                alpn: Vec::new(),
                doh3: None,
                fastest: None,
            }],
            query: QueryConfig::default(),
        }
    } else {
        // 参数验证已保证此处存在配置文件路径
        let path = match &args.config {
            Some(path) => path,
            None => return Err(ConfigError::NoEndpoint.into()),
        };
        let loaded = Config::from_file(path)?;
        info!("Successfully loaded configuration: {:?}", path);
        loaded
    };

    // 命令行超时覆盖配置
    config.query.timeout = args.timeout;
    config.validate()?;

    match config.endpoints.first() {
        Some(endpoint) => Ok((endpoint.clone(), config.query)),
        None => Err(ConfigError::NoEndpoint.into()),
    }
}

// 探测能力、构造查询并完成一次交换
async fn run(
    args: &Args,
    endpoint_config: EndpointConfig,
    query: QueryConfig,
) -> anyhow::Result<()> {
    let mut endpoint = DohEndpoint::from_config(&endpoint_config);

    // 能力标志：跳过探测时按 HTTP/2 处理，配置预置时直接采用，否则现场探测
    if args.no_probe {
        endpoint.doh3_supported = false;
        info!("DoH3 probing skipped, using HTTP/2");
    } else if let Some(preset) = endpoint_config.doh3 {
        info!("DoH3 capability preset in configuration: {}", preset);
    } else {
        let prober = Prober::new().with_timeout(Duration::from_secs(query.probe_timeout));
        let supported = prober
            .supports_doh3(&endpoint.hostname, &endpoint.bootstrap, &endpoint.alpn)
            .await;
        endpoint.doh3_supported = supported;
        info!(
            "DoH3 support for endpoint={}: {}",
            endpoint.hostname, supported
        );
    }

    // 构造 DNS 查询
    let record_type = RecordType::from_str(&args.record_type.to_uppercase())
        .with_context(|| format!("unsupported record type: {}", args.record_type))?;
    let name = Name::from_utf8(&args.name)
        .with_context(|| format!("invalid domain name: {}", args.name))?;

    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, record_type));

    // EDNS0 通告更大的接收缓冲
    let mut edns = Edns::new();
    edns.set_max_payload(query_limits::EDNS_MAX_PAYLOAD);
    edns.set_version(0);
    message.set_edns(edns);

    let payload = message.to_vec().context("failed to encode DNS query")?;

    info!("Exchanging query with {}", endpoint);

    // 在查询超时内完成一次交换
    let mut buf = vec![0u8; query_limits::RESPONSE_BUFFER_SIZE];
    let n = tokio::time::timeout(
        Duration::from_secs(query.timeout),
        endpoint.exchange(&payload, &mut buf),
    )
    .await
    .map_err(|_| AppError::Timeout)??;

    let response = Message::from_vec(&buf[..n]).context("failed to decode DNS response")?;
    print_response(&response);

    Ok(())
}

// 输出应答记录
fn print_response(response: &Message) {
    info!(
        "Response: id={}, rcode={}, answers={}",
        response.id(),
        response.response_code(),
        response.answer_count()
    );

    for record in response.answers() {
        println!("{}", record);
    }
    if response.answers().is_empty() {
        println!("; no answers ({})", response.response_code());
    }
}
