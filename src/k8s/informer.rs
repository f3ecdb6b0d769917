//! Local object cache that turns raw watch events into [`ResourceEvent`]s
//!
//! The watch API only reports "applied" and "deleted". Distinguishing a
//! creation from a modification, handing out the previous snapshot, and
//! noticing objects that vanished while a watch was down all need a copy of
//! the last known state. Relists are buffered and diffed against the store
//! when they complete.

use crate::k8s::feed::ResourceEvent;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Cache key of an object: `namespace/name`, or `name` if cluster scoped.
pub fn object_key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}

#[derive(Debug)]
pub struct ResourceStore<K> {
    objects: BTreeMap<String, K>,
    relist: Option<BTreeMap<String, K>>,
}

impl<K: Resource + Clone> ResourceStore<K> {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            relist: None,
        }
    }

    pub fn apply(&mut self, obj: K) -> ResourceEvent<K> {
        match self.objects.insert(object_key(&obj), obj.clone()) {
            Some(old) => ResourceEvent::Updated { old, new: obj },
            None => ResourceEvent::Added(obj),
        }
    }

    pub fn delete(&mut self, obj: K) -> ResourceEvent<K> {
        ResourceEvent::Deleted(self.objects.remove(&object_key(&obj)).unwrap_or(obj))
    }

    /// Start buffering a full listing. A relist already in progress is discarded.
    pub fn begin_relist(&mut self) {
        self.relist = Some(BTreeMap::new());
    }

    pub fn relist_item(&mut self, obj: K) {
        self.relist
            .get_or_insert_with(BTreeMap::new)
            .insert(object_key(&obj), obj);
    }

    /// Replace the store with the buffered listing and report the difference.
    pub fn finish_relist(&mut self) -> Vec<ResourceEvent<K>> {
        let listed = self.relist.take().unwrap_or_default();
        let mut events = Vec::with_capacity(listed.len());

        let previous = std::mem::take(&mut self.objects);
        for (key, old) in &previous {
            if !listed.contains_key(key) {
                events.push(ResourceEvent::Deleted(old.clone()));
            }
        }

        for (key, obj) in listed {
            match previous.get(&key) {
                Some(old) => events.push(ResourceEvent::Updated {
                    old: old.clone(),
                    new: obj.clone(),
                }),
                None => events.push(ResourceEvent::Added(obj.clone())),
            }
            self.objects.insert(key, obj);
        }

        events
    }

    /// Replay every cached object as an unchanged update.
    pub fn resync(&self) -> Vec<ResourceEvent<K>> {
        self.objects
            .values()
            .map(|obj| ResourceEvent::Updated {
                old: obj.clone(),
                new: obj.clone(),
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&K> {
        self.objects.get(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<K: Resource + Clone> Default for ResourceStore<K> {
    fn default() -> Self {
        Self::new()
    }
}
