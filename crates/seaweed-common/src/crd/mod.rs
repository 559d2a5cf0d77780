//! Custom Resource Definitions for the Seaweed operator

mod seaweed;

pub use seaweed::{
    ComputeResources, MasterServiceSpec, MasterSpec, Seaweed, SeaweedPhase, SeaweedSpec,
    SeaweedStatus, DEFAULT_MASTER_REPLICAS,
};
