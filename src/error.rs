use crate::endpoint::TransportError;
use std::io;
use thiserror::Error;

// Unified error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("roundtrip: {0}")]
    RoundTrip(#[from] TransportError),

    #[error("roundtrip: {source} (subject={subject}, issuer={issuer})")]
    CertificateAuthority {
        subject: String,
        issuer: String,
        #[source]
        source: TransportError,
    },

    #[error("status: {0}")]
    Status(u16),

    #[error("read: {0}")]
    Read(#[source] TransportError),

    #[error("Timeout error")]
    Timeout,

    #[error("Invalid timeout value: out of range")]
    InvalidTimeout,
}

// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadError(#[from] io::Error),

    #[error("YAML parsing error: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpointUrl(String),

    #[error("No endpoint configured")]
    NoEndpoint,

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
