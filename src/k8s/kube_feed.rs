//! [`ChangeFeed`] backed by the Kubernetes watch API
//!
//! `subscribe` probes the API server with the selector so that malformed or
//! forbidden subscriptions fail synchronously, then spawns a reflector task
//! that owns the watch, the object cache and the resync timer. The task stops
//! as soon as the returned stream is dropped.

use crate::error::SubscriptionError;
use crate::k8s::feed::{ChangeFeed, FeedStream, FieldSelector, ResourceEvent};
use crate::k8s::informer::ResourceStore;
use async_trait::async_trait;
use futures::StreamExt;
use kube::api::ListParams;
use kube::error::ErrorResponse;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct KubeChangeFeed<K> {
    client: Client,
    channel_capacity: usize,
    _resource: PhantomData<fn() -> K>,
}

impl<K> KubeChangeFeed<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            _resource: PhantomData,
        }
    }

    /// Number of events buffered between the reflector and the consumer
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

#[async_trait]
impl<K> ChangeFeed for KubeChangeFeed<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    type Resource = K;

    async fn subscribe(
        &self,
        selector: &FieldSelector,
        resync_interval: Duration,
    ) -> Result<FeedStream<K>, SubscriptionError> {
        if resync_interval.is_zero() {
            return Err(SubscriptionError::Rejected(
                "resync interval must be greater than zero".to_string(),
            ));
        }

        let api: Api<K> = Api::all(self.client.clone());
        let fields = selector.to_string();

        let probe = ListParams::default().fields(&fields).limit(1);
        match api.list_metadata(&probe).await {
            Ok(_) => {}
            Err(kube::Error::Api(response)) if is_rejection(&response) => {
                return Err(SubscriptionError::Rejected(format!(
                    "{} ({})",
                    response.message, response.code
                )));
            }
            Err(kube::Error::Api(response)) => {
                warn!(
                    "API server busy while subscribing: {} ({}), watcher will retry",
                    response.message, response.code
                );
            }
            Err(e) => {
                // connectivity problems are retried by the watcher
                warn!("Could not reach API server while subscribing: {}", e);
            }
        }

        info!(
            "Subscribed to {} with selector {:?}, resync every {:?}",
            K::kind(&Default::default()),
            fields,
            resync_interval
        );

        let config = watcher::Config::default().fields(&fields);
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        tokio::spawn(reflect(api, config, resync_interval, tx));

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Client errors reject a subscription. Throttling (429) and server errors
/// are transient.
fn is_rejection(response: &ErrorResponse) -> bool {
    (400..500).contains(&response.code) && response.code != 429
}

async fn reflect<K>(
    api: Api<K>,
    config: watcher::Config,
    resync_interval: Duration,
    tx: mpsc::Sender<ResourceEvent<K>>,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    let mut store = ResourceStore::new();
    let mut stream = watcher(api, config).default_backoff().boxed();
    let mut resync = time::interval_at(Instant::now() + resync_interval, resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let events = tokio::select! {
            _ = tx.closed() => {
                debug!("Change feed consumer dropped, stopping reflector");
                return;
            }
            _ = resync.tick() => {
                debug!("Periodic resync of {} objects", store.len());
                store.resync()
            }
            item = stream.next() => match item {
                Some(Ok(event)) => apply_watch_event(&mut store, event),
                Some(Err(e)) => {
                    warn!("Watch error: {}, retrying", e);
                    continue;
                }
                None => {
                    warn!("Watch stream ended");
                    return;
                }
            },
        };

        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Feed one raw watcher event into the store.
pub fn apply_watch_event<K>(
    store: &mut ResourceStore<K>,
    event: watcher::Event<K>,
) -> Vec<ResourceEvent<K>>
where
    K: Resource + Clone,
{
    match event {
        watcher::Event::Init => {
            store.begin_relist();
            Vec::new()
        }
        watcher::Event::InitApply(obj) => {
            store.relist_item(obj);
            Vec::new()
        }
        watcher::Event::InitDone => {
            let events = store.finish_relist();
            info!("Initial sync complete. Tracking {} objects", store.len());
            events
        }
        watcher::Event::Apply(obj) => vec![store.apply(obj)],
        watcher::Event::Delete(obj) => vec![store.delete(obj)],
    }
}
