//! Client credentials for talking to a coordinator.
//!
//! Generated once per endpoint, on the first deployment, and reused for every
//! later manifest update and secret submission.

use crate::error::DeployError;
use chrono::{Datelike, Duration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    PKCS_ECDSA_P384_SHA384,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Issues a certificate for a freshly generated key pair.
#[cfg_attr(test, mockall::automock)]
pub trait CertificateIssuer: Send + Sync {
    /// Return the PEM certificate binding `key` to `subject`.
    fn issue(&self, key: &KeyPair, subject: &str) -> Result<String, DeployError>;
}

/// Issues self-signed client certificates.
#[derive(Debug, Clone)]
pub struct SelfSignedIssuer {
    validity: Duration,
}

impl SelfSignedIssuer {
    pub fn new(validity_days: i64) -> Self {
        Self {
            validity: Duration::days(validity_days),
        }
    }
}

impl CertificateIssuer for SelfSignedIssuer {
    fn issue(&self, key: &KeyPair, subject: &str) -> Result<String, DeployError> {
        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| DeployError::TrustBootstrapFailed(e.to_string()))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "Confidential Deploy");
        dn.push(DnType::CommonName, subject);
        params.distinguished_name = dn;
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let now = Utc::now();
        let expiry = now + self.validity;
        params.not_before = rcgen::date_time_ymd(now.year(), now.month() as u8, now.day() as u8);
        params.not_after =
            rcgen::date_time_ymd(expiry.year(), expiry.month() as u8, expiry.day() as u8);

        let cert = params
            .self_signed(key)
            .map_err(|e| DeployError::TrustBootstrapFailed(e.to_string()))?;
        Ok(cert.pem())
    }
}

/// Certificate and private key issued to the orchestrator.
#[derive(Clone)]
pub struct IssuedCredentials {
    pub cert_pem: String,
    pub key_pem: String,
}

impl fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("cert_pem", &self.cert_pem)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Generates the orchestrator's coordinator credentials.
#[derive(Clone)]
pub struct TrustBootstrapper {
    issuer: Arc<dyn CertificateIssuer>,
    subject: String,
}

impl TrustBootstrapper {
    pub fn new(issuer: Arc<dyn CertificateIssuer>, subject: impl Into<String>) -> Self {
        Self {
            issuer,
            subject: subject.into(),
        }
    }

    /// Name the credentials are issued to; also the manifest admin user.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Generate a P-384 key pair and have it certified.
    ///
    /// P-384 gives 192-bit security, above a 4096-bit RSA key.
    pub fn bootstrap(&self) -> Result<IssuedCredentials, DeployError> {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384)
            .map_err(|e| DeployError::TrustBootstrapFailed(format!("key generation: {}", e)))?;

        let cert_pem = self.issuer.issue(&key, &self.subject)?;

        info!(subject = %self.subject, "Issued coordinator client credentials");

        Ok(IssuedCredentials {
            cert_pem,
            key_pem: key.serialize_pem(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_with_self_signed_issuer() {
        let bootstrapper = TrustBootstrapper::new(Arc::new(SelfSignedIssuer::new(365)), "portainer");
        let creds = bootstrapper.bootstrap().unwrap();

        assert!(creds.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(creds.key_pem.contains("BEGIN PRIVATE KEY"));
        assert!(!format!("{:?}", creds).contains(&creds.key_pem));
    }

    #[test]
    fn test_each_bootstrap_generates_new_key() {
        let bootstrapper = TrustBootstrapper::new(Arc::new(SelfSignedIssuer::new(1)), "portainer");
        let first = bootstrapper.bootstrap().unwrap();
        let second = bootstrapper.bootstrap().unwrap();
        assert_ne!(first.key_pem, second.key_pem);
    }

    #[test]
    fn test_issuer_receives_subject() {
        let mut issuer = MockCertificateIssuer::new();
        issuer
            .expect_issue()
            .withf(|_, subject| subject == "admin")
            .times(1)
            .returning(|_, _| Ok("-----BEGIN CERTIFICATE-----\n".into()));

        let bootstrapper = TrustBootstrapper::new(Arc::new(issuer), "admin");
        let creds = bootstrapper.bootstrap().unwrap();
        assert!(creds.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_issuer_failure_is_fatal() {
        let mut issuer = MockCertificateIssuer::new();
        issuer
            .expect_issue()
            .returning(|_, _| Err(DeployError::TrustBootstrapFailed("ca offline".into())));

        let bootstrapper = TrustBootstrapper::new(Arc::new(issuer), "admin");
        assert!(matches!(
            bootstrapper.bootstrap(),
            Err(DeployError::TrustBootstrapFailed(_))
        ));
    }
}
