//! # Object Store Credentials
//!
//! Access/secret key pairs used by the staging `COPY`. Credentials are resolved
//! once per staging execution and never stored on the task.

use crate::constants::{env_vars, REDACTED};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct ObjectStoreCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl ObjectStoreCredentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for ObjectStoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &REDACTED)
            .finish()
    }
}

/// Resolves a credential id to a key pair.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn resolve(&self, credential_id: &str) -> Result<ObjectStoreCredentials>;
}

/// Reads `<ID>_ACCESS_KEY_ID` / `<ID>_SECRET_ACCESS_KEY`, falling back to the
/// standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` pair.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    pub fn new() -> Self {
        Self
    }

    fn env_prefix(credential_id: &str) -> String {
        credential_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn lookup(credential_id: &str, suffix: &str, fallback: &str) -> Option<String> {
        let scoped = format!("{}_{suffix}", Self::env_prefix(credential_id));
        std::env::var(scoped)
            .or_else(|_| std::env::var(fallback))
            .ok()
            .filter(|value| !value.is_empty())
    }
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn resolve(&self, credential_id: &str) -> Result<ObjectStoreCredentials> {
        let access_key =
            Self::lookup(credential_id, "ACCESS_KEY_ID", env_vars::AWS_ACCESS_KEY_ID)
                .ok_or_else(|| {
                    EtlError::Credentials(format!(
                        "No access key found for credential id '{credential_id}'"
                    ))
                })?;
        let secret_key =
            Self::lookup(credential_id, "SECRET_ACCESS_KEY", env_vars::AWS_SECRET_ACCESS_KEY)
                .ok_or_else(|| {
                    EtlError::Credentials(format!(
                        "No secret key found for credential id '{credential_id}'"
                    ))
                })?;

        Ok(ObjectStoreCredentials {
            access_key,
            secret_key,
        })
    }
}

/// Always returns the same key pair, whatever the id.
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    credentials: ObjectStoreCredentials,
}

impl StaticCredentialSource {
    pub fn new(credentials: ObjectStoreCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn resolve(&self, _credential_id: &str) -> Result<ObjectStoreCredentials> {
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = ObjectStoreCredentials::new("AKIAEXAMPLE", "very-secret");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("very-secret"));
    }

    #[test]
    fn test_env_prefix_normalises_id() {
        assert_eq!(EnvCredentialSource::env_prefix("aws_credentials"), "AWS_CREDENTIALS");
        assert_eq!(EnvCredentialSource::env_prefix("prod-s3.reader"), "PROD_S3_READER");
    }

    #[tokio::test]
    async fn test_env_source_reads_scoped_variables() {
        std::env::set_var("SPARKIFY_TEST_CREDS_ACCESS_KEY_ID", "scoped-key");
        std::env::set_var("SPARKIFY_TEST_CREDS_SECRET_ACCESS_KEY", "scoped-secret");

        let credentials = EnvCredentialSource::new()
            .resolve("sparkify_test_creds")
            .await
            .unwrap();
        assert_eq!(credentials.access_key, "scoped-key");
        assert_eq!(credentials.secret_key, "scoped-secret");

        std::env::remove_var("SPARKIFY_TEST_CREDS_ACCESS_KEY_ID");
        std::env::remove_var("SPARKIFY_TEST_CREDS_SECRET_ACCESS_KEY");
    }

    #[tokio::test]
    async fn test_static_source_ignores_id() {
        let source = StaticCredentialSource::new(ObjectStoreCredentials::new("a", "b"));
        let credentials = source.resolve("anything").await.unwrap();
        assert_eq!(credentials, ObjectStoreCredentials::new("a", "b"));
    }
}
