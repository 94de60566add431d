//! Declarative stack plan handed to the provisioning tooling
//!
//! The plan lists what has to exist (projects, log group, topic, notifier,
//! grants) with the values taken from [`StackConfig`]. Creating the resources
//! is left to whatever consumes `stack.json`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::buildspec::{self, BuildSpec};
use crate::config::{BootstrapEnv, StackConfig};
use crate::error::{CodebuildError, Result};
use crate::NotifierConfig;

pub const PROJECT_NAME: &str = "opencast-codebuild";
const SOURCE_OWNER: &str = "hudcede";
const OPENCAST_REPO: &str = "matterhorn-dce-fork";
const COOKBOOK_REPO: &str = "mh-opsworks-recipes";
const LOG_RETENTION_DAYS: u32 = 180;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEvent {
    Push,
    PullRequestCreated,
    PullRequestUpdated,
    PullRequestMerged,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Source {
    pub provider: String,
    pub owner: String,
    pub repo: String,
    pub webhook: bool,
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
    Plaintext,
    ParameterStore,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnvironmentVariable {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildProject {
    pub name: String,
    pub source: Source,
    pub compute_type: String,
    pub build_image: String,
    pub cache_bucket: String,
    pub cache_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_bucket: Option<String>,
    pub log_prefix: String,
    /// File name of the buildspec written next to the plan
    pub buildspec: String,
    pub environment_variables: BTreeMap<String, EnvironmentVariable>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogGroup {
    pub name: String,
    pub retention_days: u32,
    pub destroy_on_removal: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NotifierService {
    pub name: String,
    pub slack_notify_url: String,
    /// Name of the alert topic; its ARN is only known once the topic exists
    pub sns_topic_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Grant {
    pub principal: String,
    pub actions: Vec<String>,
    pub resource: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StackPlan {
    pub stack_name: String,
    pub environment: String,
    pub log_group: LogGroup,
    pub alert_topic: String,
    pub notifier: NotifierService,
    pub projects: Vec<BuildProject>,
    pub grants: Vec<Grant>,
}

impl StackPlan {
    /// Builds the plan for one environment from its loaded configuration.
    pub fn new(env: &BootstrapEnv, config: &StackConfig) -> Result<Self> {
        let slack_url = config.slack_url_for(&env.environment_name).ok_or_else(|| {
            CodebuildError::Schema(format!(
                "no Slack notify URL configured for environment '{}'",
                env.environment_name
            ))
        })?;

        let stack_name = config.cdk_stack_name.clone();
        let bucket = config.artifact_bucket_name.clone();
        let alert_topic = format!("{}-build-alerts", stack_name);
        let notifier_name = format!("{}-notify", stack_name);

        let notifier_vars = notifier_variables(&env.namespace, &env.environment_name);
        let project = |suffix: &str, repo: &str, events: Vec<WebhookEvent>, artifacts: bool| {
            BuildProject {
                name: format!("{}-{}", PROJECT_NAME, suffix),
                source: Source {
                    provider: "bitbucket".to_string(),
                    owner: SOURCE_OWNER.to_string(),
                    repo: repo.to_string(),
                    webhook: true,
                    events,
                },
                compute_type: "BUILD_GENERAL1_LARGE".to_string(),
                build_image: "aws/codebuild/amazonlinux2-x86_64-standard:3.0".to_string(),
                cache_bucket: bucket.clone(),
                cache_prefix: format!(".{}-cache", suffix),
                artifact_bucket: artifacts.then(|| bucket.clone()),
                log_prefix: suffix.to_string(),
                buildspec: format!("{}.yml", suffix),
                environment_variables: notifier_vars.clone(),
            }
        };

        let projects = vec![
            project("build", OPENCAST_REPO, vec![WebhookEvent::Push], true),
            project(
                "test-runner",
                OPENCAST_REPO,
                vec![
                    WebhookEvent::PullRequestCreated,
                    WebhookEvent::PullRequestUpdated,
                    WebhookEvent::PullRequestMerged,
                ],
                false,
            ),
            project("cookbook", COOKBOOK_REPO, vec![WebhookEvent::Push], true),
        ];

        let mut grants: Vec<Grant> = projects
            .iter()
            .map(|p| Grant {
                principal: p.name.clone(),
                actions: vec!["s3:GetObject".to_string(), "s3:PutObject".to_string()],
                resource: format!("arn:aws:s3:::{}/*", bucket),
            })
            .collect();
        grants.push(Grant {
            principal: notifier_name.clone(),
            actions: vec!["codebuild:BatchGetBuilds".to_string()],
            resource: "*".to_string(),
        });
        grants.push(Grant {
            principal: notifier_name.clone(),
            actions: vec!["sns:Publish".to_string()],
            resource: alert_topic.clone(),
        });
        grants.push(Grant {
            principal: notifier_name.clone(),
            actions: vec!["sns:ListTopics".to_string()],
            resource: "*".to_string(),
        });

        Ok(Self {
            stack_name,
            environment: env.environment_name.clone(),
            log_group: LogGroup {
                name: format!("/codebuild/{}", PROJECT_NAME),
                retention_days: LOG_RETENTION_DAYS,
                destroy_on_removal: true,
            },
            notifier: NotifierService {
                name: notifier_name,
                slack_notify_url: slack_url.to_string(),
                sns_topic_name: alert_topic.clone(),
            },
            alert_topic,
            projects,
            grants,
        })
    }

    /// Buildspec documents referenced by the projects, keyed by file name
    pub fn buildspecs(&self) -> Vec<(String, BuildSpec)> {
        vec![
            ("build.yml".to_string(), buildspec::opencast_build()),
            ("test-runner.yml".to_string(), buildspec::opencast_test_runner()),
            ("cookbook.yml".to_string(), buildspec::opencast_cookbook()),
        ]
    }

    /// Starting configuration for the notifier service of this stack.
    ///
    /// The topic is given by name and resolved to its ARN when the service starts.
    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            slack_notify_url: self.notifier.slack_notify_url.clone(),
            sns_topic_name: Some(self.notifier.sns_topic_name.clone()),
            ..NotifierConfig::default()
        }
    }

    /// Writes `stack.json`, the buildspecs and `notifier_config.toml` into `out_dir`.
    pub async fn write_to(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(out_dir).await?;
        let mut written = Vec::new();

        let plan_path = out_dir.join("stack.json");
        fs::write(&plan_path, serde_json::to_string_pretty(self)?).await?;
        written.push(plan_path);

        for (name, spec) in self.buildspecs() {
            let path = out_dir.join(name);
            fs::write(&path, spec.to_yaml()?).await?;
            written.push(path);
        }

        let notifier_path = out_dir.join("notifier_config.toml");
        fs::write(&notifier_path, toml::to_string_pretty(&self.notifier_config())?).await?;
        written.push(notifier_path);

        info!(
            "Wrote stack plan '{}' ({} files) to {:?}",
            self.stack_name,
            written.len(),
            out_dir
        );
        Ok(written)
    }
}

fn notifier_variables(namespace: &str, environment: &str) -> BTreeMap<String, EnvironmentVariable> {
    let parameter = |name: &str| EnvironmentVariable {
        value: format!("/{}/notifier/{}/{}", namespace, environment, name),
        kind: VariableType::ParameterStore,
    };
    BTreeMap::from([
        ("NOTIFY_URL".to_string(), parameter("url")),
        ("NOTIFY_SECRET".to_string(), parameter("secret")),
    ])
}
