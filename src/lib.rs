pub mod args;
pub mod config;
pub mod r#const;
pub mod endpoint;
pub mod error;

// 重导出常用组件
pub use args::Args;
pub use config::{Config, EndpointConfig, QueryConfig};
pub use endpoint::{
    doh3_hostname, ordered_addrs, supports_doh3, DohEndpoint, Prober, ResponseBody, Transport,
    TransportError, TransportH2, TransportH3,
};
pub use error::{AppError, ConfigError};
