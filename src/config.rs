use clap::Parser;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::StatusError;

/// Parses CI test and analysis reports and posts GitHub commit statuses.
#[derive(Parser, Debug, Clone)]
#[command(name = "ci-status-poster")]
pub struct CliArgs {
    /// Path to the user YAML configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_USER_CONFIG)]
    pub config: PathBuf,

    /// Override the built-in application configuration
    #[arg(long = "app-config")]
    pub app_config: Option<PathBuf>,

    /// SQLite database holding per-branch score history
    #[arg(long = "history-db")]
    pub history_db: Option<PathBuf>,

    /// Branch name (defaults to $CODEBUILD_GIT_BRANCH)
    #[arg(long = "branch")]
    pub branch: Option<String>,

    /// Commit SHA (defaults to $CODEBUILD_SOURCE_VERSION)
    #[arg(long = "commit-sha")]
    pub commit_sha: Option<String>,

    /// Build ARN (defaults to $CODEBUILD_BUILD_ARN)
    #[arg(long = "build-arn")]
    pub build_arn: Option<String>,

    /// Build and print the statuses without posting them
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Read history without appending this build
    #[arg(long = "no-history")]
    pub no_history: bool,

    /// Treat a static report with no matching line as malformed
    #[arg(long = "strict-static")]
    pub strict_static: bool,
}

pub const DEFAULT_USER_CONFIG: &str = "user_config.yml";
pub const DEFAULT_APP_CONFIG: &str = include_str!("../resources/app_config.yml");
pub const HISTORY_DB_FILE: &str = "history.db";
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// Environment variables set by CodeBuild
pub const ENV_BUILD_ARN: &str = "CODEBUILD_BUILD_ARN";
pub const ENV_GIT_BRANCH: &str = "CODEBUILD_GIT_BRANCH";
pub const ENV_SOURCE_VERSION: &str = "CODEBUILD_SOURCE_VERSION";

// Secret names
pub const SECRET_GITHUB_OWNER: &str = "github_owner";
pub const SECRET_GITHUB_TOKEN: &str = "github_token";

/// Largest multiplier accepted from configuration.
pub const MAX_MULTIPLIER: i64 = 1_000_000;

/// Default location of the history database: `<data dir>/ci-status-poster/history.db`.
pub fn default_history_db() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ci-status-poster")
        .join(HISTORY_DB_FILE)
}

// ============================================================================
// Test types
// ============================================================================

/// Identifier of a configured test type (`pytest`, `pylint`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestType(String);

impl TestType {
    pub fn new(name: impl Into<String>) -> Self {
        TestType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dynamic tests carry pass/fail and gate merges; static indicators are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCategory {
    Dynamic,
    Static,
}

/// Everything needed to parse and report a single test type for one run.
#[derive(Debug, Clone)]
pub struct TestTypeDefinition {
    pub test_type: TestType,
    pub category: TestCategory,
    pub input_file: PathBuf,
    pub pattern: Regex,
    pub message: String,
    pub multiplier: Decimal,
    pub is_percent: bool,
}

impl TestTypeDefinition {
    /// Compile a report pattern. Patterns are anchored at the start of the
    /// line, so `.*` prefixes are how a config asks for a mid-line match.
    pub fn compile_pattern(test_type: &str, pattern: &str) -> Result<Regex, StatusError> {
        Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
            StatusError::Config(format!("invalid regex_pattern for '{}': {}", test_type, e))
        })
    }
}

// ============================================================================
// Application config (report locations, patterns, URL templates)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub tests: TestsSection,
    pub code_build: CodeBuildSection,
    pub github: GithubSection,
    pub tests_to_run: TestsToRun,
    /// One section per test type, keyed by its name.
    #[serde(flatten)]
    pub test_types: BTreeMap<String, TestTypeSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestsSection {
    pub root_dir: PathBuf,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeBuildSection {
    /// Template with `{region}`, `{project_name}` and `{build_id}` placeholders.
    pub root_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubSection {
    /// Template with `{owner}`, `{repo}` and `{commit_sha}` placeholders.
    pub api_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestsToRun {
    #[serde(default)]
    pub dynamic: Vec<String>,
    #[serde(default, rename = "static")]
    pub static_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestTypeSection {
    pub input_file: PathBuf,
    pub regex_pattern: String,
    pub message: String,
    pub multiplier: Decimal,
    #[serde(default)]
    pub percent: bool,
}

impl AppConfig {
    pub fn from_yaml(content: &str) -> Result<Self, StatusError> {
        let config: AppConfig = serde_yaml::from_str(content)
            .map_err(|e| StatusError::Config(format!("app config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the app config from `path`, or the built-in defaults when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, StatusError> {
        match path {
            Some(path) => {
                info!("Loading app config from {:?}", path);
                let content = std::fs::read_to_string(path).map_err(|e| {
                    StatusError::Config(format!("failed to read {:?}: {}", path, e))
                })?;
                Self::from_yaml(&content)
            }
            None => Self::from_yaml(DEFAULT_APP_CONFIG),
        }
    }

    /// Validates semantic constraints that serde cannot enforce.
    ///
    /// Every problem is collected so a broken config is reported in one go.
    pub fn validate(&self) -> Result<(), StatusError> {
        let mut problems = Vec::new();

        if self.code_build.root_url.trim().is_empty() {
            problems.push("code_build.root_url is empty".to_string());
        }
        if self.github.api_url.trim().is_empty() {
            problems.push("github.api_url is empty".to_string());
        }

        let mut seen = HashSet::new();
        for name in self.ordered_test_types().map(|(name, _)| name) {
            if !seen.insert(name) {
                problems.push(format!("test type '{}' is listed more than once", name));
                continue;
            }
            match self.test_types.get(name) {
                None => problems.push(format!("test type '{}' has no config section", name)),
                Some(section) => {
                    if section.multiplier <= Decimal::ZERO
                        || section.multiplier > Decimal::from(MAX_MULTIPLIER)
                    {
                        problems.push(format!(
                            "test type '{}' multiplier {} must be in (0, {}]",
                            name, section.multiplier, MAX_MULTIPLIER
                        ));
                    }
                    if let Err(e) = TestTypeDefinition::compile_pattern(name, &section.regex_pattern)
                    {
                        problems.push(e.to_string());
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(StatusError::Config(problems.join("; ")))
        }
    }

    /// Directory holding the report files.
    pub fn logs_dir(&self) -> PathBuf {
        self.tests.root_dir.join(&self.tests.logs_dir)
    }

    /// Configured test types in run order: dynamic first, then static.
    fn ordered_test_types(&self) -> impl Iterator<Item = (&str, TestCategory)> {
        self.tests_to_run
            .dynamic
            .iter()
            .map(|name| (name.as_str(), TestCategory::Dynamic))
            .chain(
                self.tests_to_run
                    .static_types
                    .iter()
                    .map(|name| (name.as_str(), TestCategory::Static)),
            )
    }

    /// Resolve the per-run definitions for every configured test type.
    pub fn definitions(&self) -> Result<Vec<TestTypeDefinition>, StatusError> {
        let logs_dir = self.logs_dir();
        self.ordered_test_types()
            .map(|(name, category)| -> Result<TestTypeDefinition, StatusError> {
                let section = self.test_types.get(name).ok_or_else(|| {
                    StatusError::Config(format!("test type '{}' has no config section", name))
                })?;
                Ok(TestTypeDefinition {
                    test_type: TestType::new(name),
                    category,
                    input_file: logs_dir.join(&section.input_file),
                    pattern: TestTypeDefinition::compile_pattern(name, &section.regex_pattern)?,
                    message: section.message.clone(),
                    multiplier: section.multiplier,
                    is_percent: section.percent,
                })
            })
            .collect()
    }

    /// Link to the CodeBuild console page for `build_id`.
    pub fn build_url(&self, user: &UserConfig, build_id: &str) -> String {
        self.code_build
            .root_url
            .replace("{region}", &user.aws_general.region_name)
            .replace("{project_name}", &user.code_build.project_name)
            .replace("{build_id}", build_id)
    }

    /// GitHub statuses endpoint for one commit.
    pub fn status_api_url(&self, owner: &str, repo: &str, commit_sha: &str) -> String {
        self.github
            .api_url
            .replace("{owner}", owner)
            .replace("{repo}", repo)
            .replace("{commit_sha}", commit_sha)
    }
}

// ============================================================================
// User config (per-project settings)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub aws_general: AwsGeneralSection,
    pub code_build: UserCodeBuildSection,
    pub github: UserGithubSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsGeneralSection {
    pub region_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserCodeBuildSection {
    pub project_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserGithubSection {
    pub repo: String,
}

impl UserConfig {
    pub fn from_yaml(content: &str) -> Result<Self, StatusError> {
        serde_yaml::from_str(content).map_err(|e| StatusError::Config(format!("user config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, StatusError> {
        info!("Loading user config from {:?}", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| StatusError::Config(format!("failed to read {:?}: {}", path, e)))?;
        Self::from_yaml(&content)
    }
}
