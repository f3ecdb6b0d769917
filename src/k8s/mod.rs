pub mod client;
pub mod feed;
pub mod informer;
pub mod kube_feed;
pub mod session;
pub mod types;

pub use client::K8sClient;
pub use feed::{ChangeFeed, EventKind, FeedStream, FieldSelector, ResourceEvent};
pub use kube_feed::KubeChangeFeed;
pub use session::{EventHandlers, SessionConfig, SessionState, WatchSession};
pub use types::PodInfo;
