pub mod cli;
pub mod config;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod node;

pub use error::{InvalidAddress, MeshwatchError, Result, SubscriptionError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
