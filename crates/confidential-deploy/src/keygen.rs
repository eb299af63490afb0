//! Protected-file key generation.

use crate::error::DeployError;
use async_trait::async_trait;
use rand::RngCore;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Length of a protected-file key in bytes.
pub const FILE_KEY_LEN: usize = 16;

/// Produces raw protected-file encryption keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileKeyGenerator: Send + Sync {
    async fn generate(&self) -> Result<Vec<u8>, DeployError>;
}

/// Generates keys with the `gramine-sgx-pf-crypt` tool.
#[derive(Debug, Clone)]
pub struct PfCryptKeyGenerator {
    binary: PathBuf,
}

impl PfCryptKeyGenerator {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl FileKeyGenerator for PfCryptKeyGenerator {
    #[instrument(skip(self), fields(binary = %self.binary.display()))]
    async fn generate(&self) -> Result<Vec<u8>, DeployError> {
        let scratch = tempfile::NamedTempFile::new()
            .map_err(|e| DeployError::KeyGeneration(format!("scratch file: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg("gen-key")
            .arg("-w")
            .arg(scratch.path())
            .output()
            .await
            .map_err(|e| DeployError::KeyGeneration(format!("failed to run key tool: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, %stderr, "Key tool failed");
            return Err(DeployError::KeyGeneration(format!(
                "key tool exited with {}",
                output.status
            )));
        }

        let key = tokio::fs::read(scratch.path())
            .await
            .map_err(|e| DeployError::KeyGeneration(format!("failed to read key: {}", e)))?;

        if key.is_empty() {
            return Err(DeployError::KeyGeneration("key tool wrote an empty key".into()));
        }

        debug!(bytes = key.len(), "Generated protected-file key");
        Ok(key)
    }
}

/// Generates keys in-process from the OS random source.
#[derive(Debug, Clone, Default)]
pub struct RandomKeyGenerator;

#[async_trait]
impl FileKeyGenerator for RandomKeyGenerator {
    async fn generate(&self) -> Result<Vec<u8>, DeployError> {
        let mut key = vec![0u8; FILE_KEY_LEN];
        rand::rngs::OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| DeployError::KeyGeneration(e.to_string()))?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_random_keys_differ() {
        let generator = RandomKeyGenerator;
        let a = generator.generate().await.unwrap();
        let b = generator.generate().await.unwrap();

        assert_eq!(a.len(), FILE_KEY_LEN);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_missing_tool_is_key_generation_error() {
        let generator = PfCryptKeyGenerator::new("/nonexistent/gramine-sgx-pf-crypt");
        assert!(matches!(
            generator.generate().await,
            Err(DeployError::KeyGeneration(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_is_key_generation_error() {
        let generator = PfCryptKeyGenerator::new("false");
        assert!(matches!(
            generator.generate().await,
            Err(DeployError::KeyGeneration(_))
        ));
    }
}
