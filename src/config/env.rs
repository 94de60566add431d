//! Process environment read once at startup

use tracing::debug;

use crate::error::{CodebuildError, Result};

pub const ENVIRONMENT_VAR: &str = "OPENCAST_CODEBUILD_ENVIRONMENT";
pub const NAMESPACE_VAR: &str = "OPENCAST_CODEBUILD_NAMESPACE";
pub const BUCKET_NAME_VAR: &str = "BUCKET_NAME";
pub const DEFAULT_NAMESPACE: &str = "opencast-codebuild";

/// Startup settings taken from the process environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapEnv {
    pub environment_name: String,
    pub namespace: String,
    /// Read for compatibility with older deploy scripts; nothing consumes it
    pub bucket_name: Option<String>,
}

impl BootstrapEnv {
    /// Reads the settings from the real process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the settings through `lookup`, so callers can supply their own source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment_name = lookup(ENVIRONMENT_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CodebuildError::ConfigurationMissing(ENVIRONMENT_VAR.to_string()))?;

        let namespace = lookup(NAMESPACE_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let bucket_name = lookup(BUCKET_NAME_VAR).filter(|v| !v.is_empty());
        if let Some(bucket) = &bucket_name {
            debug!("{} is set to {:?} but is not used", BUCKET_NAME_VAR, bucket);
        }

        Ok(Self {
            environment_name,
            namespace,
            bucket_name,
        })
    }

    /// Key of the stack configuration parameter for this environment
    pub fn parameter_key(&self) -> String {
        parameter_key(&self.namespace, &self.environment_name)
    }
}

/// Builds `/{namespace}/cdk-config/{environment}`.
pub fn parameter_key(namespace: &str, environment_name: &str) -> String {
    format!("/{}/cdk-config/{}", namespace, environment_name)
}
