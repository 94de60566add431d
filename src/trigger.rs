//! Webhook trigger classification
//!
//! Turns the `CODEBUILD_WEBHOOK_TRIGGER` descriptor (or the manual
//! `CODEBUILD_SOURCE_VERSION` fallback) into the build decisions the
//! buildspecs need: what kind of build this is, the flat artifact path and
//! whether maven should skip the test suite.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// Release tags look like `DCE-5.0.0-1.8.0`, `DCE-5.0.0-1.8.0-rc1` or `DCE-5.0.0-1.8.0-hotfix`
/// once the `/` separators have been flattened.
/// The same expression is emitted into the buildspecs for bash `[[ =~ ]]`, so it
/// must stay valid POSIX ERE as well.
pub const RELEASE_TAG_PATTERN: &str = r"^DCE-[0-9.-]+(-hotfix|-rc[0-9])?$";

/// Maven flags used when tests are skipped
pub const SKIP_TESTS_FLAGS: &str = "-DskipTests -Dcheckstyle.skip=true";

static RELEASE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(RELEASE_TAG_PATTERN).expect("release tag pattern is a valid regex")
});

/// What initiated the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Branch,
    Tag,
    #[serde(rename = "pr")]
    PullRequest,
    Manual,
    Unknown,
}

impl TriggerKind {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "branch" => Some(TriggerKind::Branch),
            "tag" => Some(TriggerKind::Tag),
            "pr" => Some(TriggerKind::PullRequest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Branch => "branch",
            TriggerKind::Tag => "tag",
            TriggerKind::PullRequest => "pr",
            TriggerKind::Manual => "manual",
            TriggerKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build decisions derived from the trigger environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTrigger {
    pub kind: TriggerKind,
    /// Artifact path segment, never contains `/`
    pub normalized_path: String,
    pub skip_tests: bool,
}

impl BuildTrigger {
    /// Maven flags for this build, empty when the test suite must run
    pub fn skip_tests_flags(&self) -> &'static str {
        if self.skip_tests { SKIP_TESTS_FLAGS } else { "" }
    }

    /// Shell `export` lines for `eval` inside a build phase
    pub fn to_shell_exports(&self) -> String {
        format!(
            "export TRIGGER_KIND={}\nexport TRIGGER_BRANCH_OR_TAG={}\nexport SKIP_TESTS={}\n",
            shell_quote(self.kind.as_str()),
            shell_quote(&self.normalized_path),
            shell_quote(self.skip_tests_flags()),
        )
    }
}

/// Returns true if the flattened path names a release tag.
pub fn is_release_tag(path: &str) -> bool {
    RELEASE_TAG.is_match(path)
}

/// Replaces every `/` with `-` so the value can be used as a single storage path segment.
pub fn flatten_path(raw: &str) -> String {
    raw.replace('/', "-")
}

/// Classifies a webhook trigger descriptor.
///
/// An empty `raw_trigger` means the build was started by hand, in which case
/// `source_version` names what was built. Input that is neither a recognised
/// `<kind>/<identifier>` descriptor nor empty is reported as
/// [`TriggerKind::Unknown`] with tests skipped.
pub fn classify(raw_trigger: &str, source_version: &str) -> BuildTrigger {
    if raw_trigger.is_empty() {
        return BuildTrigger {
            kind: TriggerKind::Manual,
            normalized_path: format!("manual-{}", flatten_path(source_version)),
            skip_tests: true,
        };
    }

    let (kind, identifier) = match raw_trigger.split_once('/') {
        Some((prefix, rest)) if !rest.is_empty() => match TriggerKind::from_prefix(prefix) {
            Some(kind) => (kind, rest),
            None => (TriggerKind::Unknown, rest),
        },
        Some((_, rest)) => (TriggerKind::Unknown, rest),
        // `cut -f2-` passes a line without a delimiter through untouched
        None => (TriggerKind::Unknown, raw_trigger),
    };

    let normalized_path = flatten_path(identifier);
    let skip_tests = match kind {
        TriggerKind::PullRequest => false,
        TriggerKind::Branch | TriggerKind::Tag => !is_release_tag(&normalized_path),
        TriggerKind::Manual | TriggerKind::Unknown => true,
    };

    BuildTrigger {
        kind,
        normalized_path,
        skip_tests,
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_tag_runs_tests() {
        let trigger = classify("tag/DCE-5.0.0-1.8.0", "");
        assert_eq!(trigger.kind, TriggerKind::Tag);
        assert_eq!(trigger.normalized_path, "DCE-5.0.0-1.8.0");
        assert!(!trigger.skip_tests);
    }

    #[test]
    fn release_candidate_needs_digit() {
        assert!(!classify("tag/DCE-5.0.0-1.8.0-rc1", "").skip_tests);
        assert!(!classify("tag/DCE-5.0.0-1.8.0-hotfix", "").skip_tests);
        assert!(classify("tag/DCE-5.0.0-1.8.0-rc", "").skip_tests);
    }

    #[test]
    fn release_pattern_is_anchored_and_case_sensitive() {
        assert!(!is_release_tag("xDCE-5.0.0"));
        assert!(!is_release_tag("DCE-5.0.0-beta"));
        assert!(!is_release_tag("dce-5.0.0"));
        assert!(!is_release_tag("DCE-"));
        assert!(is_release_tag("DCE-5.0.0"));
    }

    #[test]
    fn release_branch_is_flattened_before_matching() {
        let trigger = classify("branch/DCE/5.0.0-1.8.0", "");
        assert_eq!(trigger.kind, TriggerKind::Branch);
        assert_eq!(trigger.normalized_path, "DCE-5.0.0-1.8.0");
        assert!(!trigger.skip_tests);
    }

    #[test]
    fn pull_request_always_runs_tests() {
        let trigger = classify("pr/42", "");
        assert_eq!(trigger.kind, TriggerKind::PullRequest);
        assert_eq!(trigger.normalized_path, "42");
        assert!(!trigger.skip_tests);
        assert_eq!(trigger.skip_tests_flags(), "");
    }

    #[test]
    fn branch_slashes_are_flattened() {
        let trigger = classify("branch/feature/foo", "");
        assert_eq!(trigger.kind, TriggerKind::Branch);
        assert_eq!(trigger.normalized_path, "feature-foo");
        assert!(trigger.skip_tests);
        assert_eq!(trigger.skip_tests_flags(), SKIP_TESTS_FLAGS);
    }

    #[test]
    fn empty_trigger_is_manual() {
        let trigger = classify("", "abc123");
        assert_eq!(trigger.kind, TriggerKind::Manual);
        assert_eq!(trigger.normalized_path, "manual-abc123");
        assert!(trigger.skip_tests);
    }

    #[test]
    fn manual_source_version_is_flattened() {
        let trigger = classify("", "refs/heads/develop");
        assert_eq!(trigger.normalized_path, "manual-refs-heads-develop");
    }

    #[test]
    fn unrecognised_prefix_is_unknown() {
        let trigger = classify("Tag/DCE-5.0.0", "");
        assert_eq!(trigger.kind, TriggerKind::Unknown);
        assert_eq!(trigger.normalized_path, "DCE-5.0.0");
        assert!(trigger.skip_tests);

        let trigger = classify("no-separator", "");
        assert_eq!(trigger.kind, TriggerKind::Unknown);
        assert_eq!(trigger.normalized_path, "no-separator");
        assert!(trigger.skip_tests);

        for raw in ["branch/", "tag/", "pr/"] {
            let trigger = classify(raw, "");
            assert_eq!(trigger.kind, TriggerKind::Unknown, "{raw}");
            assert_eq!(trigger.normalized_path, "");
            assert!(trigger.skip_tests, "{raw}");
        }
    }

    #[test]
    fn normalized_path_never_contains_separator() {
        for raw in ["branch/a/b/c", "tag/x//y", "pr/1/2", "weird/a/b", "/", ""] {
            let trigger = classify(raw, "v/1");
            assert!(!trigger.normalized_path.contains('/'), "{raw}");
        }
    }

    #[test]
    fn classification_is_repeatable() {
        assert_eq!(
            classify("branch/feature/foo", "abc"),
            classify("branch/feature/foo", "abc")
        );
    }

    #[test]
    fn shell_exports_are_quoted() {
        let exports = classify("branch/it's/here", "").to_shell_exports();
        assert!(exports.contains("export TRIGGER_KIND='branch'\n"));
        assert!(exports.contains(r"export TRIGGER_BRANCH_OR_TAG='it'\''s-here'"));
        assert!(exports.contains("export SKIP_TESTS='-DskipTests -Dcheckstyle.skip=true'"));
    }
}
