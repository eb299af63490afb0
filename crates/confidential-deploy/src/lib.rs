//! Confidential deployment service.
//!
//! Deploys enclave workloads onto container endpoints and keeps each
//! endpoint's trust coordinator in step:
//! - Derives the enclave identity of the workload image
//! - Bootstraps or updates the coordinator manifest
//! - Provisions the workload's secrets and protected-file keys
//! - Starts the workload container on the coordinator network

pub mod api;
pub mod config;
pub mod coordinator;
pub mod deploy;
pub mod error;
pub mod identity;
pub mod keygen;
pub mod manifest;
pub mod runtime;
pub mod secrets;
pub mod store;
pub mod template;
pub mod trust;
pub mod types;

pub use config::Config;
pub use deploy::{EndpointLocks, Orchestrator};
pub use error::{DeployError, StoreError};
pub use store::DataStore;
pub use types::{
    CoordinatorDeployment, DeploymentOutcome, DeploymentRequest, Endpoint, KeyRecord, Template,
};
