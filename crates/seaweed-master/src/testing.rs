//! In-memory store and fixtures for multi-pass reconciliation tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use seaweed_common::crd::{MasterSpec, Seaweed, SeaweedSpec};
use seaweed_common::StoreError;

use crate::store::{ManagedObject, ObjectKey, ObjectKind, StoreGateway};

/// A namespaced Seaweed in `ns` with a UID, as read back from the API server
pub(crate) fn seaweed(name: &str, image: &str, replicas: i32) -> Seaweed {
    let mut sw = Seaweed::new(
        name,
        SeaweedSpec {
            image: image.to_string(),
            master: Some(MasterSpec {
                replicas,
                ..Default::default()
            }),
        },
    );
    sw.metadata.namespace = Some("ns".to_string());
    sw.metadata.uid = Some(format!("uid-{}", name));
    sw.metadata.generation = Some(1);
    sw
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, ManagedObject>,
    mutations: Vec<String>,
    failing_gets: BTreeSet<ObjectKind>,
    next_version: u64,
}

/// Store gateway backed by a map, with optimistic concurrency on update
#[derive(Default)]
pub(crate) struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current stored copy of `key`
    pub(crate) fn object(&self, key: &ObjectKey) -> Option<ManagedObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    /// Every stored object, ordered by key
    pub(crate) fn objects(&self) -> Vec<ManagedObject> {
        self.state.lock().unwrap().objects.values().cloned().collect()
    }

    /// Mutations applied so far, as "create <key>" / "update <key>"
    pub(crate) fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub(crate) fn clear_mutations(&self) {
        self.state.lock().unwrap().mutations.clear();
    }

    /// Make lookups of `kind` fail with a transient error
    pub(crate) fn fail_gets(&self, kind: ObjectKind) {
        self.state.lock().unwrap().failing_gets.insert(kind);
    }

    /// Overwrite `key` out of band, as another writer would
    pub(crate) fn put(&self, object: ManagedObject) {
        let mut state = self.state.lock().unwrap();
        let key = object.key();
        state.objects.insert(key, object);
    }
}

fn bump_version(state: &mut State, object: &mut ManagedObject) {
    state.next_version += 1;
    object.metadata_mut().resource_version = Some(state.next_version.to_string());
}

#[async_trait]
impl StoreGateway for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.failing_gets.contains(&key.kind) {
            return Err(StoreError::transient("get", format!("{}: injected failure", key)));
        }
        Ok(state.objects.get(key).cloned())
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = object.key();
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.kind.to_string(),
                name: key.name,
            });
        }
        let mut stored = object.clone();
        bump_version(&mut state, &mut stored);
        state.mutations.push(format!("create {}", key));
        state.objects.insert(key, stored);
        Ok(())
    }

    async fn update(&self, object: &ManagedObject) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = object.key();
        let current = state
            .objects
            .get(&key)
            .and_then(|o| o.metadata().resource_version.clone());
        if current.is_none() || current != object.metadata().resource_version {
            return Err(StoreError::Conflict {
                kind: key.kind.to_string(),
                name: key.name,
            });
        }
        let mut stored = object.clone();
        bump_version(&mut state, &mut stored);
        state.mutations.push(format!("update {}", key));
        state.objects.insert(key, stored);
        Ok(())
    }
}
