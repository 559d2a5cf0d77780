//! Controller settings, parsed from flags or the environment

use std::time::Duration;

use clap::Args;

use seaweed_common::backoff::BackoffConfig;
use seaweed_common::telemetry::LogFormat;

/// Settings for the Seaweed controller
#[derive(Args, Clone, Debug)]
pub struct ControllerConfig {
    /// Only watch Seaweed resources in this namespace (all namespaces when unset)
    #[arg(long, env = "SEAWEED_WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Requeue delay after a pass that created or updated an object
    #[arg(long, env = "SEAWEED_REQUEUE_IN_PROGRESS_SECS", default_value_t = 5)]
    pub requeue_in_progress_secs: u64,

    /// Resync interval for converged clusters
    #[arg(long, env = "SEAWEED_RESYNC_SECS", default_value_t = 300)]
    pub resync_secs: u64,

    /// Requeue delay after the first failed pass
    #[arg(long, env = "SEAWEED_BACKOFF_BASE_SECS", default_value_t = 30)]
    pub backoff_base_secs: u64,

    /// Upper bound on the failure requeue delay
    #[arg(long, env = "SEAWEED_BACKOFF_MAX_SECS", default_value_t = 300)]
    pub backoff_max_secs: u64,

    /// Log output format: json or pretty
    #[arg(long, env = "SEAWEED_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_in_progress_secs: 5,
            resync_secs: 300,
            backoff_base_secs: 30,
            backoff_max_secs: 300,
            log_format: LogFormat::Json,
        }
    }
}

impl ControllerConfig {
    /// Delay before re-checking a cluster that is still converging
    pub fn in_progress_requeue(&self) -> Duration {
        Duration::from_secs(self.requeue_in_progress_secs)
    }

    /// Delay before re-checking a converged cluster
    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    /// Backoff policy for failed passes
    pub fn backoff(&self) -> BackoffConfig {
        let base = Duration::from_secs(self.backoff_base_secs);
        let max = Duration::from_secs(self.backoff_max_secs).max(base);
        BackoffConfig::new(base, max)
    }
}
