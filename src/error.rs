use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshwatchError {
    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddress),

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

/// Failure to register or run a change-feed subscription.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("invalid field selector: {0}")]
    InvalidFilter(String),

    #[error("change feed rejected the subscription: {0}")]
    Rejected(String),

    #[error("watch session is already running")]
    AlreadyStarted,

    #[error("watch session has been shut down")]
    Stopped,
}

/// A string that cannot be used as an IPv4 lookup key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidAddress {
    #[error("invalid IPv4 address: {0:?}")]
    Malformed(String),

    #[error("IPv6 address not supported: {0}")]
    Ipv6(String),
}

pub type Result<T> = std::result::Result<T, MeshwatchError>;
