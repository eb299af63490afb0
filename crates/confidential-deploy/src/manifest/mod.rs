//! Manifest construction and the per-endpoint manifest lifecycle.

mod builder;
mod lifecycle;

pub use builder::{build_fragment, ManifestFragment, FILE_KEY_BITS};
pub use lifecycle::{
    LifecyclePlan, ManifestLifecycle, TrustMaterial, SECRET_MANAGER_ROLE, UPDATE_PACKAGE_ROLE,
};
