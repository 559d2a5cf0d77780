//! Seaweed Custom Resource Definition
//!
//! A `Seaweed` describes one SeaweedFS cluster. The operator currently
//! manages its master tier: a headless peer Service, a client Service, the
//! `master.toml` ConfigMap and the master StatefulSet.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Default number of master replicas
pub const DEFAULT_MASTER_REPLICAS: i32 = 1;

/// Specification for a Seaweed cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "seaweed.seaweedfs.com",
    version = "v1",
    kind = "Seaweed",
    plural = "seaweeds",
    shortname = "sw",
    status = "SeaweedStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SeaweedSpec {
    /// Container image for every SeaweedFS process (e.g. "chrislusf/seaweedfs:3.80")
    pub image: String,

    /// Master tier parameters; defaults apply when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<MasterSpec>,
}

/// Master tier parameters
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterSpec {
    /// Number of master replicas (raft peers)
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Raw `master.toml` content mounted into every replica
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Preallocate disk space for volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_preallocate: Option<bool>,

    /// Stop writing to a volume once it reaches this size
    #[serde(
        default,
        rename = "volumeSizeLimitMB",
        skip_serializing_if = "Option::is_none"
    )]
    pub volume_size_limit_mb: Option<i32>,

    /// Threshold to vacuum and reclaim spaces (e.g. "0.3")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garbage_threshold: Option<String>,

    /// Seconds between heartbeats from volume servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_seconds: Option<i32>,

    /// Default replication type when none is requested (e.g. "001")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_replication: Option<String>,

    /// Start all replicas at once instead of one after another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_start: Option<bool>,

    /// Client Service settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<MasterServiceSpec>,

    /// Compute resources for the master container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ComputeResources>,

    /// Node selector for master pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Extra annotations for master pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Image pull policy for the master container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

fn default_replicas() -> i32 {
    DEFAULT_MASTER_REPLICAS
}

impl Default for MasterSpec {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_MASTER_REPLICAS,
            config: None,
            volume_preallocate: None,
            volume_size_limit_mb: None,
            garbage_threshold: None,
            pulse_seconds: None,
            default_replication: None,
            concurrent_start: None,
            service: None,
            resources: None,
            node_selector: BTreeMap::new(),
            annotations: BTreeMap::new(),
            image_pull_policy: None,
        }
    }
}

/// Client Service settings for the master tier
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterServiceSpec {
    /// Service type (ClusterIP, NodePort, LoadBalancer); ClusterIP when unset
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Extra annotations for the client Service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Requests and limits as Kubernetes quantity strings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResources {
    /// Resource requests (e.g. cpu: "250m")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,

    /// Resource limits (e.g. memory: "1Gi")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl SeaweedSpec {
    /// Master parameters with defaults filled in
    pub fn master_or_default(&self) -> MasterSpec {
        self.master.clone().unwrap_or_default()
    }

    /// Validate the fields the reconciler depends on
    pub fn validate(&self, cluster: &str) -> Result<(), Error> {
        if self.image.trim().is_empty() {
            return Err(Error::validation_for(cluster, "spec.image cannot be empty"));
        }
        let replicas = self.master_or_default().replicas;
        if replicas < 1 {
            return Err(Error::validation_for(
                cluster,
                format!("spec.master.replicas must be at least 1, got {}", replicas),
            ));
        }
        Ok(())
    }
}

/// Lifecycle phase of a Seaweed cluster as seen by the operator
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SeaweedPhase {
    /// Not reconciled yet
    #[default]
    Pending,
    /// Managed objects are being created or updated
    Progressing,
    /// Every managed object matches the spec
    Ready,
    /// The last reconciliation failed
    Failed,
}

impl std::fmt::Display for SeaweedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Progressing => write!(f, "Progressing"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status for a Seaweed cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeaweedStatus {
    /// The generation of the spec that was last processed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Current phase
    #[serde(default)]
    pub phase: SeaweedPhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
