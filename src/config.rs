use crate::error::ConfigError;
use crate::r#const::{endpoint_defaults, probe_limits, query_limits};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::{fs, path::Path};
use tracing::debug;
use validator::{Validate, ValidationError, ValidationErrors};

// 配置结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;

// 自定义验证函数 - 引导地址必须是 IP 字面量（可带端口）
pub fn validate_bootstrap_addrs(addrs: &[String]) -> Result<(), ValidationError> {
    for addr in addrs {
        let s = addr.trim();
        if s.parse::<SocketAddr>().is_err() && s.parse::<IpAddr>().is_err() {
            return Err(ValidationError::new("invalid_bootstrap_address"));
        }
    }
    Ok(())
}

// 自定义验证函数 - 查询路径必须以 / 开头
pub fn validate_query_path(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with('/') {
        return Err(ValidationError::new("invalid_query_path"));
    }
    Ok(())
}

// 自定义验证函数 - 最快地址必须是 IP 字面量
pub fn validate_fastest_addr(config: &EndpointConfig) -> Result<(), ValidationError> {
    if let Some(fastest) = &config.fastest {
        let s = fastest.trim();
        if s.parse::<SocketAddr>().is_err() && s.parse::<IpAddr>().is_err() {
            return Err(ValidationError::new("invalid_fastest_address"));
        }
    }
    Ok(())
}

// 自定义验证函数 - 验证超时范围
pub fn validate_query_timeouts(config: &QueryConfig) -> Result<(), ValidationError> {
    if config.timeout < query_limits::MIN_TIMEOUT || config.timeout > query_limits::MAX_TIMEOUT {
        return Err(ValidationError::new("invalid_query_timeout"));
    }
    if config.probe_timeout < probe_limits::MIN_TIMEOUT
        || config.probe_timeout > probe_limits::MAX_TIMEOUT
    {
        return Err(ValidationError::new("invalid_probe_timeout"));
    }
    Ok(())
}

// 应用配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct Config {
    // 端点配置，第一个条目被使用
    #[validate(length(min = 1, message = "At least one endpoint is required"), nested)]
    pub endpoints: Vec<EndpointConfig>,
    // 查询行为配置（可选）
    #[serde(default)]
    #[validate(nested)]
    pub query: QueryConfig,
}

// DoH 端点配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
#[validate(schema(
    function = "validate_fastest_addr",
    message = "Fastest address must be an IP literal"
))]
pub struct EndpointConfig {
    // 端点主机名
    #[validate(length(min = 1, message = "Hostname cannot be empty"))]
    pub hostname: String,
    // 查询路径
    #[serde(default = "default_query_path")]
    #[validate(custom(function = "validate_query_path"))]
    pub path: String,
    // 引导 IP 地址，按配置顺序使用
    #[serde(rename = "ips", default)]
    #[validate(custom(function = "validate_bootstrap_addrs"))]
    pub bootstrap: Vec<String>,
    // 端点通告的 ALPN 列表
    #[serde(default)]
    pub alpn: Vec<String>,
    // 预置的 DoH3 能力，设置后跳过探测
    #[serde(default)]
    pub doh3: Option<bool>,
    // 最快地址提示
    #[serde(default)]
    pub fastest: Option<String>,
}

// 查询行为配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
#[validate(schema(
    function = "validate_query_timeouts",
    message = "Timeout out of range"
))]
pub struct QueryConfig {
    // 单次查询超时（秒）
    #[serde(default = "default_query_timeout")]
    pub timeout: u64,
    // 能力探测超时（秒）
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
}

fn default_query_path() -> String {
    endpoint_defaults::DEFAULT_QUERY_PATH.to_string()
}

fn default_query_timeout() -> u64 {
    query_limits::DEFAULT_TIMEOUT
}

fn default_probe_timeout() -> u64 {
    probe_limits::DEFAULT_TIMEOUT
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout: default_query_timeout(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

impl Config {
    // 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        debug!("Loading configuration file: {:?}", path.as_ref());
        let content = fs::read_to_string(path).map_err(ConfigError::LoadError)?;
        let config: Config = serde_yaml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    // 验证配置有效性
    pub fn validate(&self) -> ConfigResult<()> {
        if let Err(errors) = Validate::validate(self) {
            return Err(ConfigError::ValidationError(format_validation_errors(
                &errors,
            )));
        }
        Ok(())
    }
}

// 将 ValidationErrors 转换为可读的错误信息
fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();
    collect_validation_errors(&mut messages, "", errors);

    if messages.is_empty() {
        "Unknown validation error".to_string()
    } else {
        messages.join("; ")
    }
}

// 深度优先收集字段错误，路径形如 endpoints[0].hostname
fn collect_validation_errors(messages: &mut Vec<String>, prefix: &str, errors: &ValidationErrors) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    messages.push(format!("'{}': {}", path, message));
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => {
                collect_validation_errors(messages, &path, nested);
            }
            validator::ValidationErrorsKind::List(list) => {
                for (index, nested) in list {
                    collect_validation_errors(messages, &format!("{}[{}]", path, index), nested);
                }
            }
        }
    }
}
