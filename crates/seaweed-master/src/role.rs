//! The four master-tier roles and what each one owns

use std::fmt;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;

use seaweed_common::crd::Seaweed;
use seaweed_common::labels::{master_labels, selects};
use seaweed_common::Error;

use crate::resources::{
    build_client_service, build_config_map, build_peer_service, build_statefulset,
    statefulset_image, CLIENT_SERVICE_SUFFIX, CONFIG_SUFFIX, MASTER_CONTAINER,
    PEER_SERVICE_SUFFIX, STATEFULSET_SUFFIX,
};
use crate::owner::is_owned_by;
use crate::store::{ManagedObject, ObjectKey, ObjectKind};

/// One managed object of the master tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Headless Service used for raft peer discovery
    MasterPeerService,
    /// Client-facing Service
    MasterService,
    /// `master.toml` ConfigMap
    MasterConfig,
    /// Master StatefulSet
    MasterStatefulSet,
}

impl Role {
    /// Reconciliation order. Later roles reference earlier ones by name.
    pub const ORDER: [Role; 4] = [
        Role::MasterPeerService,
        Role::MasterService,
        Role::MasterConfig,
        Role::MasterStatefulSet,
    ];

    /// Kind of object this role manages
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::MasterPeerService | Self::MasterService => ObjectKind::Service,
            Self::MasterConfig => ObjectKind::ConfigMap,
            Self::MasterStatefulSet => ObjectKind::StatefulSet,
        }
    }

    /// Name suffix appended to the cluster name
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::MasterPeerService => PEER_SERVICE_SUFFIX,
            Self::MasterService => CLIENT_SERVICE_SUFFIX,
            Self::MasterConfig => CONFIG_SUFFIX,
            Self::MasterStatefulSet => STATEFULSET_SUFFIX,
        }
    }

    /// Short name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MasterPeerService => "master-peer",
            Self::MasterService => "master-service",
            Self::MasterConfig => "master-config",
            Self::MasterStatefulSet => "master-statefulset",
        }
    }

    /// Object name for the cluster `name`
    pub fn object_name(&self, name: &str) -> String {
        format!("{}{}", name, self.suffix())
    }

    /// Key of this role's object for `seaweed`
    pub fn key(&self, seaweed: &Seaweed) -> Result<ObjectKey, Error> {
        let namespace = seaweed.namespace().ok_or_else(|| {
            Error::validation_for(seaweed.name_any(), "Seaweed must be namespaced")
        })?;
        Ok(ObjectKey::new(
            self.kind(),
            namespace,
            self.object_name(&seaweed.name_any()),
        ))
    }

    /// Build the desired object, without owner references
    pub fn build(&self, seaweed: &Seaweed) -> ManagedObject {
        match self {
            Self::MasterPeerService => ManagedObject::Service(build_peer_service(seaweed)),
            Self::MasterService => ManagedObject::Service(build_client_service(seaweed)),
            Self::MasterConfig => ManagedObject::ConfigMap(build_config_map(seaweed)),
            Self::MasterStatefulSet => ManagedObject::StatefulSet(build_statefulset(seaweed)),
        }
    }

    /// Corrective update for `observed`, or `None` when it matches `seaweed`.
    ///
    /// Services and the ConfigMap are left alone once created. For the
    /// StatefulSet only the master container image is compared, and the
    /// returned object is `observed` with just that image replaced, so its
    /// resourceVersion still guards the write. A pod template without any
    /// container counts as drift and gets the built template back.
    pub fn drift(&self, seaweed: &Seaweed, observed: &ManagedObject) -> Option<ManagedObject> {
        let (Self::MasterStatefulSet, ManagedObject::StatefulSet(sts)) = (self, observed) else {
            return None;
        };

        let desired = seaweed.spec.image.as_str();
        if statefulset_image(sts) == Some(desired) {
            return None;
        }

        let mut patched = sts.clone();
        let container = patched
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
            .and_then(|p| {
                let idx = p
                    .containers
                    .iter()
                    .position(|c| c.name == MASTER_CONTAINER)
                    .unwrap_or(0);
                p.containers.get_mut(idx)
            });
        match container {
            Some(container) => container.image = Some(desired.to_string()),
            None => restore_pod_template(&mut patched, build_statefulset(seaweed)),
        }
        Some(ManagedObject::StatefulSet(patched))
    }

    /// Check a freshly built, owner-bound object against the key and label scheme
    pub fn verify(
        &self,
        object: &ManagedObject,
        key: &ObjectKey,
        owner: &Seaweed,
    ) -> Result<(), Error> {
        let violation = |msg: String| Err(Error::builder_invariant(self.as_str(), msg));

        if object.key() != *key {
            return violation(format!("built {} but expected {}", object.key(), key));
        }

        let expected = master_labels(&owner.name_any());
        let labels = object.metadata().labels.clone().unwrap_or_default();
        if !selects(&expected, &labels) {
            return violation(format!("{} is missing the master labels", key));
        }

        if !is_owned_by(object, owner) {
            return violation(format!("{} is not owned by {}", key, owner.name_any()));
        }

        let selector = match object {
            ManagedObject::Service(svc) => svc.spec.as_ref().and_then(|s| s.selector.clone()),
            ManagedObject::StatefulSet(sts) => {
                sts.spec.as_ref().and_then(|s| s.selector.match_labels.clone())
            }
            ManagedObject::ConfigMap(_) => return Ok(()),
        };
        if selector.as_ref() != Some(&expected) {
            return violation(format!("{} selector does not match the master labels", key));
        }

        Ok(())
    }
}

/// Put the built pod template back into an observed StatefulSet that lost its containers
fn restore_pod_template(observed: &mut StatefulSet, built: StatefulSet) {
    let Some(built_spec) = built.spec else {
        return;
    };
    match observed.spec.as_mut() {
        Some(spec) => spec.template.spec = built_spec.template.spec,
        None => observed.spec = Some(built_spec),
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
