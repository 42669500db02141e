use regex::Regex;
use std::sync::LazyLock;

use crate::config::{ENV_BUILD_ARN, ENV_GIT_BRANCH, ENV_SOURCE_VERSION};
use crate::error::StatusError;

// Trailing segment after the last ':' that follows a '/'.
static BUILD_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^.*/.*:(.+)").unwrap());
// Strips any number of leading remote-tracking prefixes.
static BRANCH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(remotes/origin/)*(.+)").unwrap());

/// Build identity taken from the CI environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    pub build_id: String,
    pub branch: String,
    pub commit_sha: String,
}

impl BuildEnvironment {
    /// Read the CodeBuild variables, preferring explicit overrides.
    pub fn from_env(
        build_arn: Option<String>,
        branch: Option<String>,
        commit_sha: Option<String>,
    ) -> Result<Self, StatusError> {
        let build_arn = build_arn.map_or_else(|| env_var(ENV_BUILD_ARN), Ok)?;
        let branch = branch.map_or_else(|| env_var(ENV_GIT_BRANCH), Ok)?;
        let commit_sha = commit_sha.map_or_else(|| env_var(ENV_SOURCE_VERSION), Ok)?;
        Self::parse(&build_arn, &branch, commit_sha)
    }

    pub fn parse(build_arn: &str, branch: &str, commit_sha: String) -> Result<Self, StatusError> {
        if commit_sha.trim().is_empty() {
            return Err(StatusError::Environment("commit SHA is empty".to_string()));
        }
        Ok(Self {
            build_id: parse_build_id(build_arn)?,
            branch: parse_branch(branch)?,
            commit_sha,
        })
    }
}

fn env_var(name: &str) -> Result<String, StatusError> {
    std::env::var(name).map_err(|_| StatusError::Environment(format!("${} is not set", name)))
}

/// `arn:aws:codebuild:region:acct:build/project:uuid` -> `uuid`.
pub fn parse_build_id(build_arn: &str) -> Result<String, StatusError> {
    BUILD_ID_PATTERN
        .captures(build_arn)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| StatusError::Environment(format!("cannot parse build ARN '{}'", build_arn)))
}

/// `remotes/origin/feature-x` -> `feature-x`.
pub fn parse_branch(branch: &str) -> Result<String, StatusError> {
    BRANCH_PATTERN
        .captures(branch)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| StatusError::Environment(format!("cannot parse branch '{}'", branch)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILD_ARN: &str = "arn:aws:codebuild:ap-southeast-2:297045966567:build/some-cool-name:4d8d41b2-ed71-94ed-cc25-161f829f1e7a";

    #[test]
    fn test_build_id_from_arn() {
        assert_eq!(
            parse_build_id(BUILD_ARN).unwrap(),
            "4d8d41b2-ed71-94ed-cc25-161f829f1e7a"
        );
    }

    #[test]
    fn test_build_id_requires_path_and_colon() {
        assert!(parse_build_id("no-slashes-here").is_err());
        assert!(parse_build_id("a/b").is_err());
    }

    #[test]
    fn test_branch_strips_remote_prefix() {
        assert_eq!(
            parse_branch("remotes/origin/COOL-NAME-8-unit-tests").unwrap(),
            "COOL-NAME-8-unit-tests"
        );
        assert_eq!(
            parse_branch("COOL-NAME-8-unit-tests").unwrap(),
            "COOL-NAME-8-unit-tests"
        );
        assert!(parse_branch("").is_err());
    }

    #[test]
    fn test_parse_with_overrides() {
        let env = BuildEnvironment::from_env(
            Some(BUILD_ARN.to_string()),
            Some("remotes/origin/main".to_string()),
            Some("41db5ed82c0f19ab460efeb30ec116e2bf3a210b".to_string()),
        )
        .unwrap();
        assert_eq!(env.branch, "main");
        assert_eq!(env.build_id, "4d8d41b2-ed71-94ed-cc25-161f829f1e7a");
    }

    #[test]
    fn test_empty_commit_sha() {
        let err = BuildEnvironment::parse(BUILD_ARN, "main", " ".to_string()).unwrap_err();
        assert!(matches!(err, StatusError::Environment(_)));
    }
}
