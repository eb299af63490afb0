//! Configuration for the deployment service.

use crate::coordinator::CoordinatorSettings;
use crate::runtime::ContainerSettings;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Workload container configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Coordinator connection configuration
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Record storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Protected-file key generation
    #[serde(default)]
    pub keygen: KeygenConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Network shared by the coordinator and its workloads
    #[serde(default = "default_network")]
    pub network: String,

    /// Value of `EDG_MARBLE_DNS_NAMES` in workloads
    #[serde(default = "default_dns_names")]
    pub dns_names: String,

    #[serde(default = "default_server_name")]
    pub domainname: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// `https` in production; `http` only against test doubles
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Host name the coordinator certificate is issued for
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Client API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Port workloads use to register with the coordinator
    #[serde(default = "default_mesh_port")]
    pub mesh_port: u16,

    /// Request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Manifest admin user the orchestrator's certificate is issued to
    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    /// Validity of self-signed client certificates
    #[serde(default = "default_cert_validity_days")]
    pub cert_validity_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the record documents
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Enable persistence (if false, records are in-memory only)
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Key sealing the documents at rest: 64 hex characters or a passphrase
    #[serde(default)]
    pub sealing_key: Option<SecretString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeygenBackend {
    /// `gramine-sgx-pf-crypt gen-key`
    PfCrypt,
    /// In-process random bytes
    Random,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeygenConfig {
    #[serde(default = "default_keygen_backend")]
    pub backend: KeygenBackend,

    /// Path or name of the pf-crypt tool
    #[serde(default = "default_pf_crypt_binary")]
    pub pf_crypt_binary: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            dns_names: default_dns_names(),
            domainname: default_server_name(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            server_name: default_server_name(),
            api_port: default_api_port(),
            mesh_port: default_mesh_port(),
            timeout: default_timeout(),
            admin_user: default_admin_user(),
            cert_validity_days: default_cert_validity_days(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: true,
            sealing_key: None,
        }
    }
}

impl Default for KeygenConfig {
    fn default() -> Self {
        Self {
            backend: default_keygen_backend(),
            pf_crypt_binary: default_pf_crypt_binary(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_network() -> String {
    "coordinator".into()
}

fn default_dns_names() -> String {
    "localhost,app".into()
}

fn default_scheme() -> String {
    "https".into()
}

fn default_server_name() -> String {
    "coordinator".into()
}

fn default_api_port() -> u16 {
    9001
}

fn default_mesh_port() -> u16 {
    2001
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_admin_user() -> String {
    "portainer".into()
}

fn default_cert_validity_days() -> i64 {
    3650
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_true() -> bool {
    true
}

fn default_keygen_backend() -> KeygenBackend {
    KeygenBackend::PfCrypt
}

fn default_pf_crypt_binary() -> PathBuf {
    PathBuf::from("gramine-sgx-pf-crypt")
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            scheme: self.coordinator.scheme.clone(),
            server_name: self.coordinator.server_name.clone(),
            api_port: self.coordinator.api_port,
            timeout: self.coordinator.timeout,
        }
    }

    pub fn container_settings(&self) -> ContainerSettings {
        ContainerSettings {
            coordinator_addr: format!(
                "{}:{}",
                self.coordinator.server_name, self.coordinator.mesh_port
            ),
            network: self.engine.network.clone(),
            dns_names: self.engine.dns_names.clone(),
            domainname: self.engine.domainname.clone(),
        }
    }
}
