//! Seaweed controller implementation
//!
//! Glue between the kube-rs runtime and the master reconciliation engine.
//! Each call runs one engine pass, records the outcome in the Seaweed status
//! and turns it into a requeue decision. Failed passes back off
//! exponentially per object; the counter resets on the next pass that does
//! not fail and is dropped once the Seaweed is gone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use seaweed_common::backoff::BackoffConfig;
use seaweed_common::crd::{Seaweed, SeaweedPhase, SeaweedStatus};
use seaweed_common::{Error, FIELD_MANAGER};
use seaweed_master::{reconcile_master, KubeStore, StepOutcome, StoreGateway};

use crate::config::ControllerConfig;

const READY_MESSAGE: &str = "master tier converged";
const PROGRESSING_MESSAGE: &str = "creating or updating master objects";

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// Trait abstracting status writes for Seaweed resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SeaweedStatusClient: Send + Sync {
    /// Patch the status subresource of a Seaweed
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &SeaweedStatus,
    ) -> Result<(), Error>;
}

/// Status client backed by the Kubernetes API
pub struct KubeStatusClient {
    client: Client,
}

impl KubeStatusClient {
    /// Create a status client wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SeaweedStatusClient for KubeStatusClient {
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &SeaweedStatus,
    ) -> Result<(), Error> {
        let api: Api<Seaweed> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Shared state for every Seaweed reconciliation
pub struct Context {
    /// Store the engine reads and writes managed objects through
    pub store: Arc<dyn StoreGateway>,
    /// Status writer for Seaweed resources
    pub status: Arc<dyn SeaweedStatusClient>,
    /// Requeue and backoff settings
    pub config: ControllerConfig,
    backoff: BackoffConfig,
    jitter: bool,
    /// Consecutive failed passes, keyed by UID so a recreated Seaweed starts fresh
    failures: DashMap<String, u32>,
}

impl Context {
    /// Create a context from explicit dependencies
    pub fn new(
        store: Arc<dyn StoreGateway>,
        status: Arc<dyn SeaweedStatusClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            status,
            backoff: config.backoff(),
            config,
            jitter: true,
            failures: DashMap::new(),
        }
    }

    /// Create a context talking to the cluster through `client`
    pub fn from_client(client: Client, config: ControllerConfig) -> Self {
        Self::new(
            Arc::new(KubeStore::new(client.clone())),
            Arc::new(KubeStatusClient::new(client)),
            config,
        )
    }

    /// Create a context for testing with default settings and no jitter
    #[cfg(test)]
    pub fn for_testing(store: Arc<dyn StoreGateway>, status: Arc<dyn SeaweedStatusClient>) -> Self {
        let mut ctx = Self::new(store, status, ControllerConfig::default());
        ctx.jitter = false;
        ctx
    }

    /// Consecutive failed passes recorded for `seaweed`
    pub fn failure_count(&self, seaweed: &Seaweed) -> u32 {
        self.failures
            .get(&object_id(seaweed))
            .map(|c| *c)
            .unwrap_or(0)
    }

    fn record_failure(&self, seaweed: &Seaweed) -> u32 {
        let mut count = self.failures.entry(object_id(seaweed)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    fn reset_failures(&self, seaweed: &Seaweed) {
        self.failures.remove(&object_id(seaweed));
    }

    fn failure_delay(&self, failures: u32) -> Duration {
        if self.jitter {
            self.backoff.jittered_delay_for(failures)
        } else {
            self.backoff.delay_for(failures)
        }
    }
}

fn object_id(seaweed: &Seaweed) -> String {
    seaweed.uid().unwrap_or_else(|| {
        format!(
            "{}/{}",
            seaweed.namespace().unwrap_or_default(),
            seaweed.name_any()
        )
    })
}

fn is_not_found(error: &Error) -> bool {
    matches!(
        error,
        Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404
    )
}

// =============================================================================
// Seaweed reconciliation
// =============================================================================

/// Reconcile a Seaweed resource
///
/// Runs one master-tier pass and maps its outcome:
/// - `Complete`: status `Ready`, resync later
/// - `InProgress`: status `Progressing`, requeue after a short delay
/// - `Failed`: status `Failed`, error returned to [`error_policy`]
///
/// Invalid specs are marked `Failed` and wait for the next spec change.
/// A Seaweed deleted mid-pass loses its backoff state and is not requeued.
#[instrument(skip(seaweed, ctx), fields(seaweed = %seaweed.name_any()))]
pub async fn reconcile(seaweed: Arc<Seaweed>, ctx: Arc<Context>) -> Result<Action, Error> {
    info!("reconciling seaweed");

    match reconcile_pass(&seaweed, &ctx).await {
        Err(e) if is_not_found(&e) => {
            debug!("seaweed is gone, dropping its backoff state");
            ctx.reset_failures(&seaweed);
            Ok(Action::await_change())
        }
        result => result,
    }
}

async fn reconcile_pass(seaweed: &Seaweed, ctx: &Context) -> Result<Action, Error> {
    let name = seaweed.name_any();
    if let Err(e) = seaweed.spec.validate(&name) {
        warn!(error = %e, "seaweed validation failed");
        ctx.reset_failures(seaweed);
        update_status(seaweed, ctx, SeaweedPhase::Failed, &e.to_string()).await?;
        return Ok(Action::await_change());
    }

    match reconcile_master(seaweed, ctx.store.as_ref()).await {
        StepOutcome::Complete => {
            ctx.reset_failures(seaweed);
            update_status(seaweed, ctx, SeaweedPhase::Ready, READY_MESSAGE).await?;
            debug!("master tier converged");
            Ok(Action::requeue(ctx.config.resync()))
        }
        StepOutcome::InProgress => {
            ctx.reset_failures(seaweed);
            update_status(seaweed, ctx, SeaweedPhase::Progressing, PROGRESSING_MESSAGE).await?;
            Ok(Action::requeue(ctx.config.in_progress_requeue()))
        }
        StepOutcome::Failed(e) => {
            match update_status(seaweed, ctx, SeaweedPhase::Failed, &e.to_string()).await {
                Err(status_err) if is_not_found(&status_err) => return Err(status_err),
                Err(status_err) => warn!(error = %status_err, "failed to record failure in status"),
                Ok(()) => {}
            }
            Err(e)
        }
    }
}

/// Error policy for the Seaweed controller
///
/// Retryable errors requeue with per-object exponential backoff.
/// Non-retryable errors wait for a spec change.
pub fn error_policy(seaweed: Arc<Seaweed>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        seaweed = %seaweed.name_any(),
        reason = error.reason(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        let failures = ctx.record_failure(&seaweed);
        let delay = ctx.failure_delay(failures);
        debug!(failures, delay_secs = delay.as_secs(), "backing off");
        Action::requeue(delay)
    } else {
        ctx.reset_failures(&seaweed);
        Action::await_change()
    }
}

/// Check if the status already matches, so unchanged passes do not write
fn is_status_unchanged(seaweed: &Seaweed, phase: SeaweedPhase, message: &str) -> bool {
    seaweed
        .status
        .as_ref()
        .map(|s| {
            s.phase == phase
                && s.message.as_deref() == Some(message)
                && s.observed_generation == seaweed.metadata.generation
        })
        .unwrap_or(false)
}

async fn update_status(
    seaweed: &Seaweed,
    ctx: &Context,
    phase: SeaweedPhase,
    message: &str,
) -> Result<(), Error> {
    if is_status_unchanged(seaweed, phase, message) {
        debug!("status unchanged, skipping update");
        return Ok(());
    }

    let name = seaweed.name_any();
    let namespace = seaweed.namespace().unwrap_or_default();
    let status = SeaweedStatus {
        observed_generation: seaweed.metadata.generation,
        phase,
        message: Some(message.to_string()),
    };

    ctx.status.patch_status(&name, &namespace, &status).await
}
