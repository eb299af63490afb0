//! Client for the confidential-computing coordinator's manifest and secret APIs.

mod client;
mod error;
mod types;

pub use client::{CoordinatorClient, CoordinatorClientBuilder};
pub use error::CoordinatorError;
pub use types::*;
