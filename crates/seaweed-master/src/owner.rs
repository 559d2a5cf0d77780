//! Ownership binding for managed objects

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use seaweed_common::crd::Seaweed;
use seaweed_common::Error;

use crate::store::ManagedObject;

/// Controller owner reference pointing at `owner`.
///
/// Fails when the Seaweed has no UID, which only happens for objects that
/// were never read back from the API server.
pub fn owner_reference(owner: &Seaweed) -> Result<OwnerReference, Error> {
    let uid = owner.uid().ok_or_else(|| {
        Error::validation_for(owner.name_any(), "metadata.uid is required to own objects")
    })?;

    Ok(OwnerReference {
        api_version: Seaweed::api_version(&()).to_string(),
        kind: Seaweed::kind(&()).to_string(),
        name: owner.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Mark `object` as owned by `owner` so it is garbage collected with it.
///
/// Idempotent: an existing reference with the same UID is replaced, others
/// are kept.
pub fn bind_owner(object: &mut ManagedObject, owner: &Seaweed) -> Result<(), Error> {
    let reference = owner_reference(owner)?;
    let refs = object
        .metadata_mut()
        .owner_references
        .get_or_insert_with(Vec::new);
    refs.retain(|r| r.uid != reference.uid);
    refs.push(reference);
    Ok(())
}

/// Returns true when `object` carries a controller reference to `owner`
pub(crate) fn is_owned_by(object: &ManagedObject, owner: &Seaweed) -> bool {
    let Some(uid) = owner.uid() else {
        return false;
    };
    object
        .metadata()
        .owner_references
        .iter()
        .flatten()
        .any(|r| r.uid == uid && r.controller == Some(true))
}
