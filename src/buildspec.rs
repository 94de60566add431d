//! CodeBuild buildspec documents
//!
//! The classifier logic has to run inside the build container, where only a
//! shell is available, so the generated commands repeat [`crate::trigger`]
//! in bash. Both sides share [`RELEASE_TAG_PATTERN`].

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::trigger::{RELEASE_TAG_PATTERN, SKIP_TESTS_FLAGS};

pub const BUILDSPEC_VERSION: f64 = 0.2;
const FFMPEG_URL: &str =
    "https://s3.amazonaws.com/mh-opsworks-shared-assets/ffmpeg-4.4.1-amazon-linux-static.tgz";
const MAVEN_REPO: &str = "/opt/.m2/repository";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BuildSpec {
    pub version: f64,
    pub env: BuildEnv,
    pub phases: Phases,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<Cache>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BuildEnv {
    pub shell: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Phases {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_build: Option<Phase>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Phase {
    #[serde(rename = "runtime-versions", skip_serializing_if = "BTreeMap::is_empty")]
    pub runtime_versions: BTreeMap<String, String>,
    #[serde(rename = "on-failure", skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub finally: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Cache {
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Artifacts {
    #[serde(rename = "discard-paths")]
    pub discard_paths: bool,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BuildSpec {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn strings(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

fn runtime(name: &str, version: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(name.to_string(), version.to_string())])
}

/// Derives `TRIGGER_TYPE` and a flat `TRIGGER_BRANCH_OR_TAG` from the webhook variables.
pub fn classify_trigger_commands() -> Vec<String> {
    strings(&[
        "# webhook triggered runs have CODEBUILD_WEBHOOK_TRIGGER, e.g. `tag/[tag name]`, `branch/[branch name]` or `pr/[number]`",
        "# manually triggered runs only have CODEBUILD_SOURCE_VERSION",
        "TRIGGER_BRANCH_OR_TAG=$CODEBUILD_WEBHOOK_TRIGGER",
        "TRIGGER_TYPE=$(echo $TRIGGER_BRANCH_OR_TAG | cut -d'/' -f1)",
        "if [ -z \"$TRIGGER_BRANCH_OR_TAG\" ]; then TRIGGER_TYPE=manual; TRIGGER_BRANCH_OR_TAG=\"manual/manual-${CODEBUILD_SOURCE_VERSION}\"; fi",
        "case \"$TRIGGER_TYPE\" in branch|tag|pr|manual) ;; *) TRIGGER_TYPE=unknown ;; esac",
        "# drop the leading `<kind>/` token, then flatten any remaining `/` into `-`",
        "export TRIGGER_BRANCH_OR_TAG=$(echo $TRIGGER_BRANCH_OR_TAG | cut -d'/' -f2- | sed -e 's/\\//-/g')",
        "# `branch/`, `tag/` or `pr/` without an identifier names nothing to build",
        "if [ -z \"$TRIGGER_BRANCH_OR_TAG\" ]; then TRIGGER_TYPE=unknown; fi",
        "export TRIGGER_TYPE",
    ])
}

/// Clears `SKIP_TESTS` for pull requests and release tags.
pub fn skip_tests_commands() -> Vec<String> {
    vec![
        "# release tag examples: DCE/5.0.0-1.8.0, DCE/5.0.0-1.8.0-rc1, DCE/5.0.0-1.8.0-hotfix".to_string(),
        format!(
            "if [[ ( $TRIGGER_TYPE == branch || $TRIGGER_TYPE == tag ) && $TRIGGER_BRANCH_OR_TAG =~ {} ]] ; then SKIP_TESTS=\"\" ; fi",
            RELEASE_TAG_PATTERN
        ),
        "if [ \"$TRIGGER_TYPE\" == \"pr\" ] ; then SKIP_TESTS=\"\" ; fi".to_string(),
    ]
}

/// Posts the build notification, signing it when `NOTIFY_SECRET` is set.
pub fn notify_commands(trigger_var: &str) -> Vec<String> {
    vec![
        // ref names may carry `"` or `\`, which must not break the JSON body
        format!(
            r#"trigger_json=$(printf '%s' "${}" | sed -e 's/\\/\\\\/g' -e 's/"/\\"/g')"#,
            trigger_var
        ),
        r#"payload="{\"build_id\":\"$CODEBUILD_BUILD_ID\",\"build_url\":\"$CODEBUILD_BUILD_URL\",\"trigger_branch_or_tag\":\"$trigger_json\"}""#.to_string(),
        "signature=\"\"; if [ -n \"$NOTIFY_SECRET\" ]; then signature=$(printf '%s' \"$payload\" | openssl dgst -sha256 -hmac \"$NOTIFY_SECRET\" | sed -e 's/^.* //'); fi".to_string(),
        "curl -s -X POST -H 'Content-Type: application/json' -H \"X-Notify-Signature-256: sha256=$signature\" --data \"$payload\" \"$NOTIFY_URL/notify\" || true".to_string(),
    ]
}

fn fail_unless_succeeding() -> String {
    "bash -c \"if [ \"$CODEBUILD_BUILD_SUCCEEDING\" == \"0\" ]; then exit 1; fi\"".to_string()
}

/// Maven build of the admin, presentation and worker distributions.
pub fn opencast_build() -> BuildSpec {
    let mut build_commands = strings(&["echo Build started on `date`"]);
    build_commands.extend(classify_trigger_commands());
    build_commands.extend(skip_tests_commands());
    build_commands.extend(strings(&[
        "echo trigger branch or tag \"$TRIGGER_BRANCH_OR_TAG\"",
        "echo skip test options \"$SKIP_TESTS\"",
    ]));
    build_commands.push(format!(
        "mvn -Dmaven.repo.local={} clean install $SKIP_TESTS -Padmin,presentation,worker",
        MAVEN_REPO
    ));

    BuildSpec {
        version: BUILDSPEC_VERSION,
        env: BuildEnv {
            shell: "bash".to_string(),
            variables: BTreeMap::from([
                (
                    "_COMMENT".to_string(),
                    "default is to build without tests".to_string(),
                ),
                ("SKIP_TESTS".to_string(), SKIP_TESTS_FLAGS.to_string()),
            ]),
        },
        phases: Phases {
            install: Some(Phase {
                runtime_versions: runtime("java", "corretto8"),
                commands: strings(&["printenv"]),
                ..Default::default()
            }),
            build: Some(Phase {
                on_failure: Some("ABORT".to_string()),
                commands: build_commands,
                ..Default::default()
            }),
            post_build: Some(Phase {
                commands: vec![
                    fail_unless_succeeding(),
                    "echo Build completed on `date`".to_string(),
                    "tar -C ./build/opencast-dist-admin-5-SNAPSHOT -czf ./build/admin.tgz .".to_string(),
                    "tar -C ./build/opencast-dist-presentation-5-SNAPSHOT -czf ./build/presentation.tgz .".to_string(),
                    "tar -C ./build/opencast-dist-worker-5-SNAPSHOT -czf ./build/worker.tgz .".to_string(),
                ],
                finally: notify_commands("TRIGGER_BRANCH_OR_TAG"),
                ..Default::default()
            }),
        },
        cache: Some(Cache {
            paths: strings(&["/opt/.m2/**/*"]),
        }),
        artifacts: Some(Artifacts {
            discard_paths: true,
            files: strings(&["build/*.tgz"]),
            name: Some("$TRIGGER_BRANCH_OR_TAG".to_string()),
        }),
    }
}

/// Berkshelf package of the opsworks recipes.
pub fn opencast_cookbook() -> BuildSpec {
    let mut build_commands = strings(&["echo Build started on `date`"]);
    build_commands.extend(classify_trigger_commands());
    build_commands.extend(strings(&[
        "echo trigger branch or tag \"$TRIGGER_BRANCH_OR_TAG\"",
        "./bin/run_foodcritic.sh",
        "berks package mh-opsworks-recipes-${TRIGGER_BRANCH_OR_TAG}.tar.gz",
    ]));

    BuildSpec {
        version: BUILDSPEC_VERSION,
        env: BuildEnv {
            shell: "bash".to_string(),
            variables: BTreeMap::new(),
        },
        phases: Phases {
            install: Some(Phase {
                runtime_versions: runtime("ruby", "2.6"),
                commands: strings(&[
                    "printenv",
                    "gem install chef-config -v '< 16.5.77'",
                    "gem install mixlib-log -v '~> 2'",
                    "gem install berkshelf -v '~> 5.1'",
                ]),
                ..Default::default()
            }),
            build: Some(Phase {
                commands: build_commands,
                ..Default::default()
            }),
            post_build: Some(Phase {
                commands: vec![
                    fail_unless_succeeding(),
                    "echo Build completed on `date`".to_string(),
                ],
                finally: notify_commands("TRIGGER_BRANCH_OR_TAG"),
                ..Default::default()
            }),
        },
        cache: None,
        artifacts: Some(Artifacts {
            discard_paths: true,
            files: strings(&["*.tar.gz"]),
            name: Some("cookbook/${TRIGGER_BRANCH_OR_TAG}".to_string()),
        }),
    }
}

/// Full test suite run for pull requests.
pub fn opencast_test_runner() -> BuildSpec {
    BuildSpec {
        version: BUILDSPEC_VERSION,
        env: BuildEnv {
            shell: "bash".to_string(),
            variables: BTreeMap::new(),
        },
        phases: Phases {
            install: Some(Phase {
                runtime_versions: runtime("java", "corretto8"),
                commands: vec![
                    "printenv".to_string(),
                    "# ffmpeg is needed by some of the tests".to_string(),
                    format!(
                        "wget --no-verbose -O /opt/ffmpeg.tgz {} && /bin/tar -C /opt -xzf /opt/ffmpeg.tgz",
                        FFMPEG_URL
                    ),
                ],
                ..Default::default()
            }),
            build: Some(Phase {
                on_failure: Some("ABORT".to_string()),
                commands: vec![
                    "echo Build started on `date`".to_string(),
                    "export PATH=\"/opt/ffmpeg-4.4.1:${PATH}\"".to_string(),
                    "# dates generated during tests must match the expected output".to_string(),
                    "export TZ=US/Eastern".to_string(),
                    "export TRIGGER_PR=$(echo $CODEBUILD_WEBHOOK_TRIGGER | sed -e 's/\\//-/g')".to_string(),
                    "echo trigger pr \"$TRIGGER_PR\"".to_string(),
                    format!("mvn -Dmaven.repo.local={} test -Pnone", MAVEN_REPO),
                ],
                ..Default::default()
            }),
            post_build: Some(Phase {
                commands: vec![
                    fail_unless_succeeding(),
                    "echo Build completed on `date`".to_string(),
                ],
                finally: notify_commands("TRIGGER_PR"),
                ..Default::default()
            }),
        },
        cache: Some(Cache {
            paths: strings(&["build/**/*", "/opt/.m2/**/*"]),
        }),
        artifacts: None,
    }
}
