// 声明子模块
mod addrs;
mod doh;
mod probe;
mod tls;
mod transport;
mod transport_h3;

// 重导出公共API
pub use addrs::ordered_addrs;
pub use doh::{doh3_hostname, DohEndpoint};
pub use probe::{supports_doh3, Prober};
pub use tls::{client_config_with_roots, default_root_store, UnknownAuthorityError};
pub use transport::{ResponseBody, Transport, TransportError, TransportH2};
pub use transport_h3::TransportH3;
