//! CodeBuild and SNS backed collaborators

use async_trait::async_trait;
use aws_sdk_codebuild::error::DisplayErrorContext;
use tracing::{debug, info};

use super::{AlertPublisher, BuildState, BuildStatusSource};
use crate::error::{CodebuildError, Result};

#[derive(Clone)]
pub struct CodeBuildStatusSource {
    client: aws_sdk_codebuild::Client,
}

impl CodeBuildStatusSource {
    pub fn new(client: aws_sdk_codebuild::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BuildStatusSource for CodeBuildStatusSource {
    async fn build_state(&self, build_id: &str) -> Result<BuildState> {
        let output = self
            .client
            .batch_get_builds()
            .ids(build_id)
            .send()
            .await
            .map_err(|e| {
                CodebuildError::Notify(format!(
                    "failed to look up build {}: {}",
                    build_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        let build = output
            .builds()
            .first()
            .ok_or_else(|| CodebuildError::Notify(format!("build {} not found", build_id)))?;

        if !build.build_complete() {
            return Ok(BuildState::InProgress);
        }

        let status = build
            .build_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        Ok(BuildState::Complete { status })
    }
}

#[derive(Clone)]
pub struct SnsAlertPublisher {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsAlertPublisher {
    pub fn new(client: aws_sdk_sns::Client, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }
}

#[async_trait]
impl AlertPublisher for SnsAlertPublisher {
    async fn publish(&self, subject: &str, message: &str) -> Result<()> {
        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| {
                CodebuildError::Notify(format!(
                    "failed to publish to {}: {}",
                    self.topic_arn,
                    aws_sdk_sns::error::DisplayErrorContext(&e)
                ))
            })?;
        debug!("Message published: {:?}", output.message_id());
        Ok(())
    }
}

/// Finds the ARN of the topic called `name` among `arns`.
///
/// Topic ARNs end in `:<name>`, so the match is on the last segment only.
pub fn topic_arn_for<'a, I>(arns: I, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    arns.into_iter()
        .find(|arn| arn.rsplit(':').next() == Some(name))
}

/// Looks up the ARN of the topic called `name`, paging through `ListTopics`.
pub async fn resolve_topic_arn(client: &aws_sdk_sns::Client, name: &str) -> Result<String> {
    let mut next_token: Option<String> = None;
    loop {
        let output = client
            .list_topics()
            .set_next_token(next_token.take())
            .send()
            .await
            .map_err(|e| {
                CodebuildError::ConfigError(format!(
                    "failed to list SNS topics while resolving '{}': {}",
                    name,
                    aws_sdk_sns::error::DisplayErrorContext(&e)
                ))
            })?;

        let arns = output.topics().iter().filter_map(|t| t.topic_arn());
        if let Some(arn) = topic_arn_for(arns, name) {
            info!("Resolved alert topic '{}' to {}", name, arn);
            return Ok(arn.to_string());
        }

        match output.next_token() {
            Some(token) => next_token = Some(token.to_string()),
            None => {
                return Err(CodebuildError::ConfigError(format!(
                    "SNS topic '{}' does not exist",
                    name
                )));
            }
        }
    }
}
