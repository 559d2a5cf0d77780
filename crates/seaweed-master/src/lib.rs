//! Reconciliation engine for the SeaweedFS master tier
//!
//! Converges four objects per `Seaweed` resource, in this order:
//! 1. headless peer Service (`<name>-master-peer`) for raft peer discovery
//! 2. client Service (`<name>-master`)
//! 3. `master.toml` ConfigMap (`<name>-master-config`)
//! 4. master StatefulSet (`<name>-master`)
//!
//! Each pass stops at the first object that had to be created or updated and
//! reports `InProgress`; the caller requeues. Only a pass that finds all four
//! objects present and matching reports `Complete`.

#![deny(missing_docs)]

mod ensure;
mod owner;
mod reconciler;
pub mod resources;
mod role;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use ensure::ensure;
pub use owner::{bind_owner, owner_reference};
pub use reconciler::{reconcile_master, StepOutcome};
pub use role::Role;
pub use store::{KubeStore, ManagedObject, ObjectKey, ObjectKind, StoreGateway};

#[cfg(test)]
pub use store::MockStoreGateway;
