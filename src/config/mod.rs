//! Stack configuration bootstrap
//!
//! The deployment settings for each environment live as a JSON document in
//! the parameter store. They are fetched once, validated against
//! [`StackConfig`] and then handed to stack construction unchanged.

pub mod env;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::error::{CodebuildError, Result};
pub use env::BootstrapEnv;
pub use store::{FetchError, ParameterStore, SsmParameterStore};

/// Validated deployment configuration for one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    /// Slack incoming-webhook URL per environment name
    pub slack_notify_urls: BTreeMap<String, String>,
    pub artifact_bucket_name: String,
    pub cdk_stack_name: String,
}

impl StackConfig {
    /// Slack URL for `environment_name`, if one is configured
    pub fn slack_url_for(&self, environment_name: &str) -> Option<&str> {
        self.slack_notify_urls
            .get(environment_name)
            .map(String::as_str)
    }
}

/// Stored document shape, before validation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredStackConfig {
    #[serde(default)]
    slack_notify_urls: Option<BTreeMap<String, String>>,
    /// Older documents carry a single URL for the environment they belong to
    #[serde(default)]
    slack_notify_url: Option<String>,
    #[serde(default)]
    artifact_bucket_name: Option<String>,
    #[serde(default)]
    cdk_stack_name: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CodebuildError::Schema(format!(
            "`{}` is missing or empty",
            field
        ))),
    }
}

impl StoredStackConfig {
    fn validate(self, environment_name: &str) -> Result<StackConfig> {
        let slack_notify_urls = match (self.slack_notify_urls, self.slack_notify_url) {
            (Some(urls), _) if !urls.is_empty() => urls,
            (_, Some(url)) if !url.trim().is_empty() => {
                BTreeMap::from([(environment_name.to_string(), url)])
            }
            _ => {
                return Err(CodebuildError::Schema(
                    "`slackNotifyUrls` is missing or empty".to_string(),
                ));
            }
        };

        if let Some((env, _)) = slack_notify_urls.iter().find(|(_, url)| url.trim().is_empty()) {
            return Err(CodebuildError::Schema(format!(
                "`slackNotifyUrls.{}` is empty",
                env
            )));
        }

        Ok(StackConfig {
            slack_notify_urls,
            artifact_bucket_name: required("artifactBucketName", self.artifact_bucket_name)?,
            cdk_stack_name: required("cdkStackName", self.cdk_stack_name)?,
        })
    }
}

/// Parses and validates a stored configuration document.
pub fn parse_stack_config(key: &str, raw: &str, environment_name: &str) -> Result<StackConfig> {
    let stored: StoredStackConfig =
        serde_json::from_str(raw).map_err(|source| CodebuildError::Parse {
            key: key.to_string(),
            source,
        })?;
    stored.validate(environment_name)
}

/// Fetches the stack configuration for `env` with a single request.
///
/// There is no retry: a failed fetch is logged and returned so the caller can
/// abort before anything is provisioned.
pub async fn load_stack_config<S>(store: &S, env: &BootstrapEnv) -> Result<StackConfig>
where
    S: ParameterStore + ?Sized,
{
    if env.environment_name.trim().is_empty() {
        return Err(CodebuildError::ConfigurationMissing(
            self::env::ENVIRONMENT_VAR.to_string(),
        ));
    }

    let key = env.parameter_key();
    info!("Fetching stack configuration from {}", key);

    let raw = match store.get_parameter(&key).await {
        Ok(raw) => raw,
        Err(FetchError::NotFound) => {
            error!("Parameter {} not found", key);
            return Err(CodebuildError::ParameterNotFound { key });
        }
        Err(FetchError::Transport(message)) => {
            error!("Error fetching parameter {}: {}", key, message);
            return Err(CodebuildError::Transport { key, message });
        }
    };

    let config = parse_stack_config(&key, &raw, &env.environment_name)?;
    info!(
        "Loaded configuration for stack '{}' (artifacts in '{}')",
        config.cdk_stack_name, config.artifact_bucket_name
    );
    Ok(config)
}
