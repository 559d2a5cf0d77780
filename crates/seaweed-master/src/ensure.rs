//! Shared ensure-step algorithm, run once per role

use kube::ResourceExt;
use tracing::{debug, info, warn};

use seaweed_common::crd::Seaweed;
use seaweed_common::Error;

use crate::owner::bind_owner;
use crate::reconciler::StepOutcome;
use crate::role::Role;
use crate::store::StoreGateway;

/// Converge the object for `role` one step toward `desired`.
///
/// - absent: build, bind ownership, verify, create, then `InProgress`
/// - present with drift: update the drifted field, then `InProgress`
/// - present and matching: `Complete`
///
/// A lookup failure is reported as `Failed`, never treated as absent.
/// `AlreadyExists` and `Conflict` mean a racing writer got there first, so
/// the step reports `InProgress` and the next pass re-reads the object.
pub async fn ensure(desired: &Seaweed, role: Role, store: &dyn StoreGateway) -> StepOutcome {
    match try_ensure(desired, role, store).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(
                seaweed = %desired.name_any(),
                role = %role,
                error = %e,
                retryable = e.is_retryable(),
                "ensure step failed"
            );
            StepOutcome::Failed(e)
        }
    }
}

async fn try_ensure(
    desired: &Seaweed,
    role: Role,
    store: &dyn StoreGateway,
) -> Result<StepOutcome, Error> {
    let name = desired.name_any();
    let key = role.key(desired)?;

    let Some(observed) = store.get(&key).await? else {
        let mut object = role.build(desired);
        bind_owner(&mut object, desired)?;
        role.verify(&object, &key, desired)?;

        return match store.create(&object).await {
            Ok(()) => {
                info!(seaweed = %name, role = %role, object = %key, "created managed object");
                Ok(StepOutcome::InProgress)
            }
            Err(e) if e.is_write_race() => {
                debug!(seaweed = %name, object = %key, reason = %e, "create raced, will re-read");
                Ok(StepOutcome::InProgress)
            }
            Err(e) => Err(e.into()),
        };
    };

    let Some(patched) = role.drift(desired, &observed) else {
        debug!(seaweed = %name, object = %key, "managed object up to date");
        return Ok(StepOutcome::Complete);
    };

    match store.update(&patched).await {
        Ok(()) => {
            info!(
                seaweed = %name,
                role = %role,
                object = %key,
                image = %desired.spec.image,
                "updated drifted managed object"
            );
            Ok(StepOutcome::InProgress)
        }
        Err(e) if e.is_write_race() => {
            debug!(seaweed = %name, object = %key, reason = %e, "update raced, will re-read");
            Ok(StepOutcome::InProgress)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManagedObject, MockStoreGateway, ObjectKind};
    use crate::testing::{seaweed, InMemoryStore};
    use seaweed_common::StoreError;

    // =========================================================================
    // Create path
    // =========================================================================

    #[tokio::test]
    async fn absent_object_is_created_with_owner() {
        let store = InMemoryStore::new();
        let sw = seaweed("cluster1", "repo/master:1.0", 3);

        let outcome = ensure(&sw, Role::MasterConfig, &store).await;
        assert!(outcome.is_in_progress());

        let key = Role::MasterConfig.key(&sw).unwrap();
        let created = store.object(&key).expect("ConfigMap should be stored");
        let refs = created.metadata().owner_references.clone().unwrap();
        assert_eq!(refs[0].uid, "uid-cluster1");
        assert_eq!(store.mutations(), vec![format!("create {}", key)]);
    }

    #[tokio::test]
    async fn existing_matching_object_is_complete() {
        let store = InMemoryStore::new();
        let sw = seaweed("cluster1", "repo/master:1.0", 1);

        ensure(&sw, Role::MasterStatefulSet, &store).await;
        store.clear_mutations();

        let outcome = ensure(&sw, Role::MasterStatefulSet, &store).await;
        assert!(outcome.is_complete());
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn already_exists_on_create_is_in_progress() {
        let mut store = MockStoreGateway::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_create().returning(|o| {
            Err(StoreError::AlreadyExists {
                kind: o.kind().to_string(),
                name: o.key().name,
            })
        });

        let sw = seaweed("cluster1", "repo/master:1.0", 1);
        let outcome = ensure(&sw, Role::MasterPeerService, &store).await;
        assert!(outcome.is_in_progress());
    }

    #[tokio::test]
    async fn transient_create_failure_is_failed_and_retryable() {
        let mut store = MockStoreGateway::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_create()
            .returning(|_| Err(StoreError::transient("create", "connection reset")));

        let sw = seaweed("cluster1", "repo/master:1.0", 1);
        match ensure(&sw, Role::MasterService, &store).await {
            StepOutcome::Failed(e) => assert!(e.is_retryable()),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejected_create_is_failed_and_not_retried() {
        let mut store = MockStoreGateway::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_create().times(1).returning(|_| {
            Err(StoreError::Rejected {
                operation: "create".to_string(),
                code: 422,
                message: "spec.type: Unsupported value: \"Bogus\"".to_string(),
            })
        });

        let sw = seaweed("cluster1", "repo/master:1.0", 1);
        match ensure(&sw, Role::MasterService, &store).await {
            StepOutcome::Failed(e) => assert!(!e.is_retryable()),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    // =========================================================================
    // Lookup failures
    // =========================================================================

    #[tokio::test]
    async fn lookup_failure_is_not_treated_as_absent() {
        let mut store = MockStoreGateway::new();
        store
            .expect_get()
            .returning(|_| Err(StoreError::transient("get", "apiserver unavailable")));
        store.expect_create().never();

        let sw = seaweed("cluster1", "repo/master:1.0", 1);
        let outcome = ensure(&sw, Role::MasterPeerService, &store).await;
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn missing_namespace_fails_without_store_calls() {
        let mut store = MockStoreGateway::new();
        store.expect_get().never();

        let mut sw = seaweed("cluster1", "repo/master:1.0", 1);
        sw.metadata.namespace = None;
        match ensure(&sw, Role::MasterConfig, &store).await {
            StepOutcome::Failed(e) => assert!(!e.is_retryable()),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_uid_fails_before_create() {
        let mut store = MockStoreGateway::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_create().never();

        let mut sw = seaweed("cluster1", "repo/master:1.0", 1);
        sw.metadata.uid = None;
        assert!(ensure(&sw, Role::MasterConfig, &store).await.is_failed());
    }

    // =========================================================================
    // Drift path
    // =========================================================================

    #[tokio::test]
    async fn image_drift_updates_only_the_image() {
        let store = InMemoryStore::new();
        let v1 = seaweed("cluster1", "repo/master:v1", 3);
        ensure(&v1, Role::MasterStatefulSet, &store).await;
        let key = Role::MasterStatefulSet.key(&v1).unwrap();
        let Some(ManagedObject::StatefulSet(before)) = store.object(&key) else {
            panic!("StatefulSet should be stored");
        };
        store.clear_mutations();

        let v2 = seaweed("cluster1", "repo/master:v2", 3);
        assert!(ensure(&v2, Role::MasterStatefulSet, &store).await.is_in_progress());
        assert_eq!(store.mutations(), vec![format!("update {}", key)]);

        let Some(ManagedObject::StatefulSet(after)) = store.object(&key) else {
            panic!("StatefulSet should be stored");
        };
        let mut expected = before;
        expected.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0].image =
            Some("repo/master:v2".to_string());
        expected.metadata.resource_version = after.metadata.resource_version.clone();
        assert_eq!(after, expected);

        assert!(ensure(&v2, Role::MasterStatefulSet, &store).await.is_complete());
    }

    #[tokio::test]
    async fn conflict_on_update_is_in_progress() {
        let v1 = seaweed("cluster1", "repo/master:v1", 1);
        let mut observed = Role::MasterStatefulSet.build(&v1);
        bind_owner(&mut observed, &v1).unwrap();

        let mut store = MockStoreGateway::new();
        store
            .expect_get()
            .withf(|key| key.kind == ObjectKind::StatefulSet)
            .returning(move |_| Ok(Some(observed.clone())));
        store.expect_update().returning(|o| {
            Err(StoreError::Conflict {
                kind: o.kind().to_string(),
                name: o.key().name,
            })
        });

        let v2 = seaweed("cluster1", "repo/master:v2", 1);
        assert!(ensure(&v2, Role::MasterStatefulSet, &store)
            .await
            .is_in_progress());
    }

    #[tokio::test]
    async fn statefulset_stripped_of_containers_is_repaired() {
        let store = InMemoryStore::new();
        let sw = seaweed("cluster1", "repo/master:v1", 3);
        ensure(&sw, Role::MasterStatefulSet, &store).await;
        let key = Role::MasterStatefulSet.key(&sw).unwrap();
        let Some(ManagedObject::StatefulSet(mut stripped)) = store.object(&key) else {
            panic!("StatefulSet should be stored");
        };
        stripped.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers.clear();
        store.put(ManagedObject::StatefulSet(stripped));
        store.clear_mutations();

        assert!(ensure(&sw, Role::MasterStatefulSet, &store).await.is_in_progress());
        assert_eq!(store.mutations(), vec![format!("update {}", key)]);
        let Some(ManagedObject::StatefulSet(repaired)) = store.object(&key) else {
            panic!("StatefulSet should be stored");
        };
        assert_eq!(
            crate::resources::statefulset_image(&repaired),
            Some("repo/master:v1")
        );
        assert!(ensure(&sw, Role::MasterStatefulSet, &store).await.is_complete());
    }

    #[tokio::test]
    async fn services_and_config_are_not_drift_checked() {
        let mut store = MockStoreGateway::new();
        let v1 = seaweed("cluster1", "repo/master:v1", 1);
        let stale = Role::MasterConfig.build(&v1);
        store.expect_get().returning(move |_| Ok(Some(stale.clone())));
        store.expect_update().never();

        let mut v2 = seaweed("cluster1", "repo/master:v2", 1);
        v2.spec.master.as_mut().unwrap().config = Some("changed".to_string());
        assert!(ensure(&v2, Role::MasterConfig, &store).await.is_complete());
    }
}
