//! Credential resolution, performed exactly once per request.
//!
//! The engine asks for the credential asynchronously before building the
//! request URL; there is no synchronous accessor that silently kicks off
//! background work. Absence of a credential is not an error; it yields an
//! unauthenticated request and the provider's own failure handling.

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the bearer/key credential for a service, if any.
    async fn credential(
        &self,
        service_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<String>>;
}

/// Fixed credential, mainly for tests and one-off tools.
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(credential: impl Into<String>) -> Self {
        Self(credential.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(
        &self,
        _service_id: &str,
        _session_id: Option<&str>,
    ) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Reads `{SERVICE_ID}_API_KEY` from the environment.
#[derive(Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn new() -> Self {
        Self
    }

    fn lookup(service_id: &str) -> Option<String> {
        let var = format!("{}_API_KEY", service_id.to_uppercase());
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn credential(
        &self,
        service_id: &str,
        _session_id: Option<&str>,
    ) -> Result<Option<String>> {
        Ok(Self::lookup(service_id))
    }
}

/// OS keychain lookup with an environment-variable fallback.
pub struct KeyringCredentials {
    /// Keychain service name the entries live under.
    service: String,
}

impl KeyringCredentials {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for KeyringCredentials {
    async fn credential(
        &self,
        service_id: &str,
        _session_id: Option<&str>,
    ) -> Result<Option<String>> {
        if let Ok(entry) = keyring::Entry::new(&self.service, service_id) {
            if let Ok(key) = entry.get_password() {
                return Ok(Some(key));
            }
        }
        Ok(EnvCredentials::lookup(service_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credential_always_resolves() {
        let provider = StaticCredential::new("k-123");
        let resolved = tokio_test::block_on(provider.credential("gemini", None)).unwrap();
        assert_eq!(resolved.as_deref(), Some("k-123"));
    }

    #[test]
    fn env_credentials_resolve_by_service_id() {
        std::env::set_var("FLATTEST_API_KEY", "from-env");
        let provider = EnvCredentials::new();
        let resolved = tokio_test::block_on(provider.credential("flattest", None)).unwrap();
        assert_eq!(resolved.as_deref(), Some("from-env"));
        let missing = tokio_test::block_on(provider.credential("no_such_service_zz", None));
        assert!(missing.unwrap().is_none());
        std::env::remove_var("FLATTEST_API_KEY");
    }
}
