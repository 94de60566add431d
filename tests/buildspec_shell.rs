//! The buildspec shell commands must classify triggers the same way as `trigger::classify`.

use opencast_codebuild::buildspec::{classify_trigger_commands, notify_commands, skip_tests_commands};
use opencast_codebuild::notify::NotifyEvent;
use opencast_codebuild::trigger::{SKIP_TESTS_FLAGS, classify};
use std::process::Command;

fn run_in_bash(trigger: &str, source_version: &str) -> (String, String, String) {
    let mut script = vec![format!("SKIP_TESTS=\"{}\"", SKIP_TESTS_FLAGS)];
    script.extend(classify_trigger_commands());
    script.extend(skip_tests_commands());
    script.push("echo \"$TRIGGER_TYPE|$TRIGGER_BRANCH_OR_TAG|$SKIP_TESTS\"".to_string());

    let output = Command::new("bash")
        .arg("-c")
        .arg(script.join("\n"))
        .env("CODEBUILD_WEBHOOK_TRIGGER", trigger)
        .env("CODEBUILD_SOURCE_VERSION", source_version)
        .output()
        .expect("bash is available");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut parts = stdout.trim_end_matches('\n').splitn(3, '|');
    (
        parts.next().unwrap().to_string(),
        parts.next().unwrap().to_string(),
        parts.next().unwrap().to_string(),
    )
}

#[test]
fn shell_and_rust_classification_agree() {
    let cases = [
        ("tag/DCE-5.0.0-1.8.0", ""),
        ("tag/DCE-5.0.0-1.8.0-rc1", ""),
        ("tag/DCE-5.0.0-1.8.0-rc", ""),
        ("tag/DCE-5.0.0-1.8.0-hotfix", ""),
        ("branch/DCE/5.0.0-1.8.0", ""),
        ("branch/feature/foo", ""),
        ("branch/develop", ""),
        ("pr/42", ""),
        ("", "abc123"),
        ("", "refs/heads/develop"),
        ("Tag/DCE-5.0.0", ""),
        ("no-separator", ""),
        ("pr/", ""),
        ("branch/", ""),
        ("tag/", ""),
        ("/", ""),
        ("", ""),
    ];

    for (trigger, source_version) in cases {
        let expected = classify(trigger, source_version);
        let (kind, path, skip) = run_in_bash(trigger, source_version);
        assert_eq!(kind, expected.kind.as_str(), "kind for {trigger:?}");
        assert_eq!(path, expected.normalized_path, "path for {trigger:?}");
        assert_eq!(skip, expected.skip_tests_flags(), "skip tests for {trigger:?}");
    }
}

#[test]
fn notification_payload_survives_quotes_in_ref_names() {
    let mut script: Vec<String> = notify_commands("TRIGGER_BRANCH_OR_TAG").into_iter().take(2).collect();
    script.push("printf '%s' \"$payload\"".to_string());

    let trigger = r#"fix-"quoted"-a\b"#;
    let output = Command::new("bash")
        .arg("-c")
        .arg(script.join("\n"))
        .env("TRIGGER_BRANCH_OR_TAG", trigger)
        .env("CODEBUILD_BUILD_ID", "opencast-codebuild-build:1")
        .env("CODEBUILD_BUILD_URL", "https://example.test/1")
        .output()
        .expect("bash is available");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let event: NotifyEvent = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(event.build_id, "opencast-codebuild-build:1");
    assert_eq!(event.trigger_branch_or_tag, trigger);
}
