//! Controller runner - wires the Seaweed controller into the kube-rs runtime

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use seaweed_common::crd::Seaweed;
use seaweed_common::labels::{selector_string, K8S_MANAGED_BY};
use seaweed_common::FIELD_MANAGER;

use crate::config::ControllerConfig;
use crate::controller::{error_policy, reconcile, Context};

/// Server-side watch timeout in seconds. Kept below the client's 30s read
/// timeout so idle watches are closed by the API server first.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Label selector matching only objects this operator created
fn managed_selector() -> String {
    selector_string(&BTreeMap::from([(
        K8S_MANAGED_BY.to_string(),
        FIELD_MANAGER.to_string(),
    )]))
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the Seaweed controller until a shutdown signal arrives.
///
/// Watches Seaweed resources plus the Services, ConfigMaps and StatefulSets
/// they own, so deleting or editing a managed object triggers a pass.
pub async fn run_seaweed_controller(client: Client, config: ControllerConfig) {
    let namespace = config.namespace.clone();
    let ns = namespace.as_deref();
    let owned = WatcherConfig::default()
        .labels(&managed_selector())
        .timeout(WATCH_TIMEOUT_SECS);

    tracing::info!(
        namespace = ns.unwrap_or("<all>"),
        requeue_in_progress_secs = config.requeue_in_progress_secs,
        resync_secs = config.resync_secs,
        "starting Seaweed controller"
    );

    let ctx = Arc::new(Context::from_client(client.clone(), config));

    Controller::new(
        scoped_api::<Seaweed>(&client, ns),
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .owns(scoped_api::<Service>(&client, ns), owned.clone())
    .owns(scoped_api::<ConfigMap>(&client, ns), owned.clone())
    .owns(scoped_api::<StatefulSet>(&client, ns), owned)
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(log_reconcile_result("Seaweed"))
    .await;

    tracing::info!("Seaweed controller stopped");
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    kind: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(object) => tracing::debug!(kind, ?object, "reconciliation completed"),
            Err(e) => tracing::warn!(kind, error = ?e, "controller reported an error"),
        }
        std::future::ready(())
    }
}
