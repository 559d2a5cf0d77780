//! Master-tier reconciliation engine

use kube::ResourceExt;
use tracing::debug;

use seaweed_common::crd::Seaweed;
use seaweed_common::Error;

use crate::ensure::ensure;
use crate::role::Role;
use crate::store::StoreGateway;

/// Result of one ensure step or of a whole pass
#[derive(Debug)]
pub enum StepOutcome {
    /// Nothing to do; the object matches
    Complete,
    /// A store mutation was attempted; re-check after a short delay
    InProgress,
    /// The step could not run to completion
    Failed(Error),
}

impl StepOutcome {
    /// True for `Complete`
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// True for `InProgress`
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// True for `Failed`
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Run one reconciliation pass for the master tier of `desired`.
///
/// Steps run in [`Role::ORDER`] and the pass returns at the first one that
/// is not `Complete`. Passes hold no state between calls, so an interrupted
/// pass is resumed by simply calling this again.
pub async fn reconcile_master(desired: &Seaweed, store: &dyn StoreGateway) -> StepOutcome {
    for role in Role::ORDER {
        match ensure(desired, role, store).await {
            StepOutcome::Complete => continue,
            outcome => {
                debug!(
                    seaweed = %desired.name_any(),
                    role = %role,
                    complete = false,
                    "master pass stopped"
                );
                return outcome;
            }
        }
    }
    StepOutcome::Complete
}
