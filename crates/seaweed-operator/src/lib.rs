//! Seaweed operator - runs SeaweedFS master tiers from `Seaweed` resources
//!
//! The binary in `main.rs` parses flags, installs the CRD and hands off to
//! [`runner::run_seaweed_controller`].

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod runner;

pub use config::ControllerConfig;
pub use controller::{error_policy, reconcile, Context, KubeStatusClient, SeaweedStatusClient};
