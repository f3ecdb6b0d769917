//! Node-scoped watch session
//!
//! A [`WatchSession`] subscribes to a [`ChangeFeed`] for the resources
//! scheduled on one node (or the whole cluster in sandbox mode) and calls the
//! registered handlers for each change, in feed order, on a background task.
//!
//! Lifecycle: `Created --start--> Running --shutdown--> Stopped`. A session
//! starts at most once; `shutdown` is idempotent and, once it returns, no
//! handler runs again.

use crate::error::SubscriptionError;
use crate::k8s::feed::{ChangeFeed, FeedStream, FieldSelector, ResourceEvent};
use crate::metrics::MetricsCollector;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Field that pins a pod to the node it is scheduled on
pub const NODE_NAME_FIELD: &str = "spec.nodeName";

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub node_name: String,
    /// Observe the whole cluster instead of one node
    pub sandbox: bool,
    pub resync_interval: Duration,
}

impl SessionConfig {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            sandbox: false,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn selector(&self) -> Result<FieldSelector, SubscriptionError> {
        if self.sandbox {
            Ok(FieldSelector::everything())
        } else {
            FieldSelector::one_term_equal(NODE_NAME_FIELD, &self.node_name)
        }
    }
}

type AddFn<K> = Box<dyn Fn(&K) + Send + Sync>;
type UpdateFn<K> = Box<dyn Fn(&K, &K) + Send + Sync>;
type DeleteFn<K> = Box<dyn Fn(&K) + Send + Sync>;

/// Callbacks invoked by a session. Unset callbacks do nothing.
///
/// Handlers run on the session task and must not block.
pub struct EventHandlers<K> {
    on_add: AddFn<K>,
    on_update: UpdateFn<K>,
    on_delete: DeleteFn<K>,
}

impl<K> EventHandlers<K> {
    pub fn new() -> Self {
        Self {
            on_add: Box::new(|_| {}),
            on_update: Box::new(|_, _| {}),
            on_delete: Box::new(|_| {}),
        }
    }

    pub fn on_add(mut self, f: impl Fn(&K) + Send + Sync + 'static) -> Self {
        self.on_add = Box::new(f);
        self
    }

    pub fn on_update(mut self, f: impl Fn(&K, &K) + Send + Sync + 'static) -> Self {
        self.on_update = Box::new(f);
        self
    }

    pub fn on_delete(mut self, f: impl Fn(&K) + Send + Sync + 'static) -> Self {
        self.on_delete = Box::new(f);
        self
    }

    fn dispatch(&self, event: &ResourceEvent<K>) {
        match event {
            ResourceEvent::Added(obj) => (self.on_add)(obj),
            ResourceEvent::Updated { old, new } => (self.on_update)(old, new),
            ResourceEvent::Deleted(obj) => (self.on_delete)(obj),
        }
    }
}

impl<K> Default for EventHandlers<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Stopped,
}

pub struct WatchSession<F: ChangeFeed> {
    feed: F,
    config: SessionConfig,
    handlers: Arc<EventHandlers<F::Resource>>,
    metrics: Option<MetricsCollector>,
    shutdown: CancellationToken,
    state: SessionState,
    task: Option<JoinHandle<()>>,
}

impl<F: ChangeFeed> WatchSession<F> {
    pub fn new(feed: F, config: SessionConfig, handlers: EventHandlers<F::Resource>) -> Self {
        Self {
            feed,
            config,
            handlers: Arc::new(handlers),
            metrics: None,
            shutdown: CancellationToken::new(),
            state: SessionState::Created,
            task: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register the subscription and start dispatching in the background.
    ///
    /// Returns once the feed has accepted the subscription. A failed start
    /// leaves the session stopped.
    pub async fn start(&mut self) -> Result<(), SubscriptionError> {
        match self.state {
            SessionState::Created => {}
            SessionState::Running => return Err(SubscriptionError::AlreadyStarted),
            SessionState::Stopped => return Err(SubscriptionError::Stopped),
        }

        let stream = match self.subscribe().await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Stopped;
                return Err(e);
            }
        };

        info!(
            "Watch session started for node {} (sandbox={})",
            self.config.node_name, self.config.sandbox
        );

        self.task = Some(tokio::spawn(run_dispatch(
            stream,
            self.handlers.clone(),
            self.metrics.clone(),
            self.shutdown.clone(),
        )));
        self.state = SessionState::Running;
        Ok(())
    }

    async fn subscribe(&self) -> Result<FeedStream<F::Resource>, SubscriptionError> {
        let selector = self.config.selector()?;
        debug!("Subscribing with field selector {:?}", selector.to_string());
        self.feed
            .subscribe(&selector, self.config.resync_interval)
            .await
    }

    /// Stop the session. No handler runs after this returns.
    pub async fn shutdown(&mut self) {
        match self.state {
            SessionState::Created => {
                debug!("Watch session shut down before start");
            }
            SessionState::Stopped => {
                debug!("Watch session already stopped");
                return;
            }
            SessionState::Running => {}
        }

        self.state = SessionState::Stopped;
        self.shutdown.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Watch session task ended abnormally: {}", e);
            }
            info!("Watch session for node {} stopped", self.config.node_name);
        }
    }
}

impl<F: ChangeFeed> Drop for WatchSession<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_dispatch<K>(
    mut stream: FeedStream<K>,
    handlers: Arc<EventHandlers<K>>,
    metrics: Option<MetricsCollector>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = stream.next() => match event {
                Some(event) => event,
                None => {
                    warn!("Change feed closed, watch session idle");
                    break;
                }
            },
        };

        if shutdown.is_cancelled() {
            break;
        }

        if let Some(metrics) = &metrics {
            metrics.record_event(event.kind());
        }
        handlers.dispatch(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    /// Feed whose events are pushed by the test
    struct ChannelFeed {
        rx: Mutex<Option<mpsc::UnboundedReceiver<ResourceEvent<String>>>>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    fn channel_feed() -> (
        ChannelFeed,
        mpsc::UnboundedSender<ResourceEvent<String>>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let feed = ChannelFeed {
            rx: Mutex::new(Some(rx)),
            seen: seen.clone(),
        };
        (feed, tx, seen)
    }

    #[async_trait]
    impl ChangeFeed for ChannelFeed {
        type Resource = String;

        async fn subscribe(
            &self,
            selector: &FieldSelector,
            _resync_interval: Duration,
        ) -> Result<FeedStream<String>, SubscriptionError> {
            self.seen.lock().unwrap().push(selector.to_string());
            let rx = self
                .rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| SubscriptionError::Rejected("already subscribed".to_string()))?;
            Ok(UnboundedReceiverStream::new(rx).boxed())
        }
    }

    fn recording_handlers(log: Arc<Mutex<Vec<String>>>) -> EventHandlers<String> {
        let (add, update, delete) = (log.clone(), log.clone(), log);
        EventHandlers::new()
            .on_add(move |obj| add.lock().unwrap().push(format!("add {}", obj)))
            .on_update(move |old, new| update.lock().unwrap().push(format!("update {}->{}", old, new)))
            .on_delete(move |obj| delete.lock().unwrap().push(format!("delete {}", obj)))
    }

    async fn wait_for(log: &Arc<Mutex<Vec<String>>>, len: usize) {
        for _ in 0..200 {
            if log.lock().unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {} events", len);
    }

    #[test]
    fn test_selector_scoped_to_node() {
        let config = SessionConfig::new("worker-1");
        assert_eq!(config.selector().unwrap().to_string(), "spec.nodeName=worker-1");
        assert_eq!(config.resync_interval, DEFAULT_RESYNC_INTERVAL);
    }

    #[test]
    fn test_sandbox_selector_is_empty() {
        let config = SessionConfig::new("").sandbox(true);
        assert!(config.selector().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_dispatched_in_order() {
        let (feed, tx, _) = channel_feed();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = WatchSession::new(
            feed,
            SessionConfig::new("worker-1"),
            recording_handlers(log.clone()),
        );

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);

        tx.send(ResourceEvent::Added("a".to_string())).unwrap();
        tx.send(ResourceEvent::Updated {
            old: "a".to_string(),
            new: "a'".to_string(),
        })
        .unwrap();
        tx.send(ResourceEvent::Deleted("a'".to_string())).unwrap();

        wait_for(&log, 3).await;
        session.shutdown().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["add a", "update a->a'", "delete a'"]
        );
    }

    #[tokio::test]
    async fn test_no_callbacks_after_shutdown() {
        let (feed, tx, _) = channel_feed();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = WatchSession::new(
            feed,
            SessionConfig::new("worker-1"),
            recording_handlers(log.clone()),
        );

        session.start().await.unwrap();
        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Stopped);

        // the receiver is gone once the dispatch task has exited
        let _ = tx.send(ResourceEvent::Added("late".to_string()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (feed, _tx, seen) = channel_feed();
        let mut session =
            WatchSession::new(feed, SessionConfig::new("worker-1"), EventHandlers::new());

        session.start().await.unwrap();
        assert!(matches!(
            session.start().await,
            Err(SubscriptionError::AlreadyStarted)
        ));
        assert_eq!(seen.lock().unwrap().len(), 1);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (feed, _tx, _) = channel_feed();
        let mut session =
            WatchSession::new(feed, SessionConfig::new("worker-1"), EventHandlers::new());

        session.start().await.unwrap();
        session.shutdown().await;
        session.shutdown().await;

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(matches!(
            session.start().await,
            Err(SubscriptionError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (feed, _tx, seen) = channel_feed();
        let mut session =
            WatchSession::new(feed, SessionConfig::new("worker-1"), EventHandlers::new());

        session.shutdown().await;

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(matches!(
            session.start().await,
            Err(SubscriptionError::Stopped)
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_filter_fails_start() {
        let (feed, _tx, seen) = channel_feed();
        let mut session = WatchSession::new(feed, SessionConfig::new(""), EventHandlers::new());

        assert!(matches!(
            session.start().await,
            Err(SubscriptionError::InvalidFilter(_))
        ));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_subscribes_cluster_wide() {
        let (feed, _tx, seen) = channel_feed();
        let mut session = WatchSession::new(
            feed,
            SessionConfig::new("worker-1").sandbox(true),
            EventHandlers::new(),
        );

        session.start().await.unwrap();
        session.shutdown().await;

        assert_eq!(*seen.lock().unwrap(), vec![String::new()]);
    }

    #[tokio::test]
    async fn test_events_counted() {
        let (feed, tx, _) = channel_feed();
        let metrics = MetricsCollector::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = WatchSession::new(
            feed,
            SessionConfig::new("worker-1"),
            recording_handlers(log.clone()),
        )
        .with_metrics(metrics.clone());

        session.start().await.unwrap();
        tx.send(ResourceEvent::Added("a".to_string())).unwrap();
        tx.send(ResourceEvent::Deleted("a".to_string())).unwrap();
        wait_for(&log, 2).await;
        session.shutdown().await;

        let text = metrics.gather().unwrap();
        assert!(text.contains("meshwatch_watch_events_total{kind=\"added\"} 1"));
        assert!(text.contains("meshwatch_watch_events_total{kind=\"deleted\"} 1"));
    }
}
