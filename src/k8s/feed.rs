//! Change-feed abstraction over cluster state
//!
//! A [`ChangeFeed`] turns a field selector into an ordered stream of
//! [`ResourceEvent`]s. The Kubernetes implementation lives in
//! [`kube_feed`](super::kube_feed); anything that can list and watch (or poll)
//! resources can implement the trait.

use crate::error::SubscriptionError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::time::Duration;

/// A change to one observed resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

impl<K> ResourceEvent<K> {
    pub fn kind(&self) -> EventKind {
        match self {
            ResourceEvent::Added(_) => EventKind::Added,
            ResourceEvent::Updated { .. } => EventKind::Updated,
            ResourceEvent::Deleted(_) => EventKind::Deleted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality-only field selector, e.g. `spec.nodeName=worker-1`.
///
/// The empty selector matches every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    terms: Vec<(String, String)>,
}

const RESERVED: &[char] = &[',', '=', '!'];

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn one_term_equal(field: &str, value: &str) -> Result<Self, SubscriptionError> {
        Self::everything().and(field, value)
    }

    pub fn and(mut self, field: &str, value: &str) -> Result<Self, SubscriptionError> {
        if field.is_empty() {
            return Err(SubscriptionError::InvalidFilter(
                "field name must not be empty".to_string(),
            ));
        }
        if value.is_empty() {
            return Err(SubscriptionError::InvalidFilter(format!(
                "value for {} must not be empty",
                field
            )));
        }
        if field.contains(RESERVED) || value.contains(RESERVED) {
            return Err(SubscriptionError::InvalidFilter(format!(
                "{}={} contains a reserved character",
                field, value
            )));
        }

        self.terms.push((field.to_string(), value.to_string()));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[(String, String)] {
        &self.terms
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", field, value)?;
        }
        Ok(())
    }
}

pub type FeedStream<K> = BoxStream<'static, ResourceEvent<K>>;

/// Source of ordered resource change events.
///
/// `subscribe` returns once the subscription is registered. Events then
/// arrive in backend order, starting with `Added` for the initial snapshot.
/// Transient failures are retried inside the feed and never reach the
/// stream; a `resync_interval` tick replays every cached object as an
/// `Updated` event with identical old and new snapshots.
#[async_trait]
pub trait ChangeFeed: Send + Sync + 'static {
    type Resource: Send + 'static;

    async fn subscribe(
        &self,
        selector: &FieldSelector,
        resync_interval: Duration,
    ) -> Result<FeedStream<Self::Resource>, SubscriptionError>;
}
