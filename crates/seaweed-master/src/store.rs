//! Store gateway: the only path from the reconciler to the object store
//!
//! `StoreGateway` is injected into the reconciler so tests can swap in a
//! mock or an in-memory store. `KubeStore` is the production implementation
//! on top of kube-rs typed APIs.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use seaweed_common::{StoreError, FIELD_MANAGER};

/// Kind of a managed object
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// core/v1 Service
    Service,
    /// core/v1 ConfigMap
    ConfigMap,
    /// apps/v1 StatefulSet
    StatefulSet,
}

impl ObjectKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::ConfigMap => "ConfigMap",
            Self::StatefulSet => "StatefulSet",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic identity of a managed object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Object kind
    pub kind: ObjectKind,
    /// Namespace (always the owning Seaweed's namespace)
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A fully specified managed object, either freshly built or read back from the store
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManagedObject {
    /// Peer or client Service
    Service(Service),
    /// master.toml ConfigMap
    ConfigMap(ConfigMap),
    /// Master StatefulSet
    StatefulSet(StatefulSet),
}

impl ManagedObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Service(_) => ObjectKind::Service,
            Self::ConfigMap(_) => ObjectKind::ConfigMap,
            Self::StatefulSet(_) => ObjectKind::StatefulSet,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Service(o) => &o.metadata,
            Self::ConfigMap(o) => &o.metadata,
            Self::StatefulSet(o) => &o.metadata,
        }
    }

    /// Mutable object metadata
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Service(o) => &mut o.metadata,
            Self::ConfigMap(o) => &mut o.metadata,
            Self::StatefulSet(o) => &mut o.metadata,
        }
    }

    /// Key derived from the object's own metadata
    pub fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(
            self.kind(),
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }
}

/// Trait abstracting the object store for the master reconciler
///
/// Lookups return `Ok(None)` when the object does not exist. Every other
/// failure is an error; the reconciler never treats a failed lookup as absent.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Fetch an object by key
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, StoreError>;

    /// Create an object; `AlreadyExists` if the key is taken
    async fn create(&self, object: &ManagedObject) -> Result<(), StoreError>;

    /// Replace an object previously read from the store; `Conflict` if it changed since
    async fn update(&self, object: &ManagedObject) -> Result<(), StoreError>;
}

/// Store gateway backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_typed<K>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + fmt::Debug,
    {
        self.api::<K>(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| store_error(StoreOperation::Get, key, e))
    }

    async fn create_typed<K>(&self, key: &ObjectKey, object: &K) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + fmt::Debug,
    {
        match self
            .api::<K>(&key.namespace)
            .create(&post_params(), object)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => Err(store_error(StoreOperation::Create, key, e)),
        }
    }

    async fn update_typed<K>(&self, key: &ObjectKey, object: &K) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + fmt::Debug,
    {
        match self
            .api::<K>(&key.namespace)
            .replace(&key.name, &post_params(), object)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => Err(store_error(StoreOperation::Update, key, e)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StoreOperation {
    Get,
    Create,
    Update,
}

impl StoreOperation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// Map a kube-rs error onto the store taxonomy.
///
/// 409 is `AlreadyExists` on create and `Conflict` on update. Any other 4xx
/// is `Rejected`; 429 and 5xx, like transport failures, stay `Transient`.
fn store_error(operation: StoreOperation, key: &ObjectKey, err: kube::Error) -> StoreError {
    let ae = match err {
        kube::Error::Api(ae) => ae,
        other => {
            return StoreError::transient(operation.as_str(), format!("{}: {}", key, other))
        }
    };

    match (operation, ae.code) {
        (StoreOperation::Create, 409) => StoreError::AlreadyExists {
            kind: key.kind.to_string(),
            name: key.name.clone(),
        },
        (StoreOperation::Update, 409) => StoreError::Conflict {
            kind: key.kind.to_string(),
            name: key.name.clone(),
        },
        (_, 429) => StoreError::transient(
            operation.as_str(),
            format!("{}: {}", key, ae.message),
        ),
        (_, code) if (400..500).contains(&code) => StoreError::Rejected {
            operation: operation.as_str().to_string(),
            code,
            message: format!("{}: {}", key, ae.message),
        },
        _ => StoreError::transient(operation.as_str(), format!("{}: {}", key, ae.message)),
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl StoreGateway for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, StoreError> {
        let found = match key.kind {
            ObjectKind::Service => self
                .get_typed::<Service>(key)
                .await?
                .map(ManagedObject::Service),
            ObjectKind::ConfigMap => self
                .get_typed::<ConfigMap>(key)
                .await?
                .map(ManagedObject::ConfigMap),
            ObjectKind::StatefulSet => self
                .get_typed::<StatefulSet>(key)
                .await?
                .map(ManagedObject::StatefulSet),
        };
        debug!(object = %key, found = found.is_some(), "store lookup");
        Ok(found)
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), StoreError> {
        let key = object.key();
        match object {
            ManagedObject::Service(o) => self.create_typed(&key, o).await,
            ManagedObject::ConfigMap(o) => self.create_typed(&key, o).await,
            ManagedObject::StatefulSet(o) => self.create_typed(&key, o).await,
        }
    }

    async fn update(&self, object: &ManagedObject) -> Result<(), StoreError> {
        let key = object.key();
        match object {
            ManagedObject::Service(o) => self.update_typed(&key, o).await,
            ManagedObject::ConfigMap(o) => self.update_typed(&key, o).await,
            ManagedObject::StatefulSet(o) => self.update_typed(&key, o).await,
        }
    }
}
