use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::operators::{self, MutationOperatorKind};

pub const CONFIG_FILE: &str = "schemata.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Command that builds and runs the test suite.
    #[serde(default = "default_test_command")]
    pub test_command: String,

    /// Calls the side-effect operator must never remove.
    #[serde(default)]
    pub exclude_calls: Vec<String>,

    /// Glob patterns of files never mutated (e.g. `"src/generated/**"`).
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Operator names to enable. Empty enables all.
    #[serde(default)]
    pub operators: Vec<String>,

    /// Fixed per-mutant timeout. Overrides `timeout_multiplier`.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default = "default_timeout_multiplier")]
    pub timeout_multiplier: f64,

    /// Template for the runtime check, with `{id}` as placeholder.
    #[serde(default)]
    pub activation_check: Option<String>,

    #[serde(default)]
    pub build_error_markers: Vec<String>,

    #[serde(default)]
    pub failure_markers: Vec<String>,
}

fn default_test_command() -> String {
    "cargo test".to_string()
}

fn default_timeout_multiplier() -> f64 {
    3.0
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            test_command: default_test_command(),
            exclude_calls: Vec::new(),
            exclude: Vec::new(),
            operators: Vec::new(),
            timeout_ms: None,
            timeout_multiplier: default_timeout_multiplier(),
            activation_check: None,
            build_error_markers: Vec::new(),
            failure_markers: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Load `path` if given, else `schemata.toml` under `root` if present,
    /// else defaults.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Self> {
        let config_path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = root.join(CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let content = std::fs::read_to_string(&config_path).map_err(|e| EngineError::Config {
            path: config_path.clone(),
            message: e.to_string(),
        })?;
        Self::parse(&content, &config_path)
    }

    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ProjectConfig = toml::from_str(content).map_err(|e| EngineError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        if config.timeout_multiplier <= 0.0 {
            return Err(EngineError::Config {
                path: origin.to_path_buf(),
                message: "timeout_multiplier must be positive".to_string(),
            });
        }
        if let Some(template) = &config.activation_check {
            if !template.contains("{id}") {
                return Err(EngineError::Config {
                    path: origin.to_path_buf(),
                    message: "activation_check must contain {id}".to_string(),
                });
            }
        }
        Ok(config)
    }

    pub fn operator_kinds(&self) -> Result<Vec<MutationOperatorKind>> {
        operators::parse_operator_list(&self.operators)
    }

    /// True when `rel_path` matches one of the `exclude` globs.
    pub fn is_excluded(&self, rel_path: &Path) -> bool {
        let path = rel_path.to_string_lossy().replace('\\', "/");
        self.exclude.iter().any(|pattern| glob_match::glob_match(pattern, &path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_without_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig::load(dir.path(), None).unwrap();
        assert_eq!(config.test_command, "cargo test");
        assert_eq!(config.timeout_multiplier, 3.0);
        assert!(config.exclude_calls.is_empty());
    }

    #[test]
    fn load_reads_project_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "test_command = \"npm test\"\nexclude_calls = [\"flush\"]\ntimeout_ms = 500\n",
        )
        .unwrap();
        let config = ProjectConfig::load(dir.path(), None).unwrap();
        assert_eq!(config.test_command, "npm test");
        assert_eq!(config.exclude_calls, vec!["flush".to_string()]);
        assert_eq!(config.timeout_ms, Some(500));
    }

    #[test]
    fn whitespace_only_is_default() {
        let config = ProjectConfig::parse("  \n", Path::new("x.toml")).unwrap();
        assert!(config.operators.is_empty());
    }

    #[test]
    fn unknown_field_is_config_error() {
        let err = ProjectConfig::parse("bogus = 1", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn missing_explicit_path_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = ProjectConfig::load(dir.path(), Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn activation_template_needs_placeholder() {
        assert!(ProjectConfig::parse("activation_check = \"flag()\"", Path::new("x.toml")).is_err());
        assert!(ProjectConfig::parse("activation_check = \"flag(\\\"{id}\\\")\"", Path::new("x.toml")).is_ok());
    }

    #[test]
    fn exclude_globs_match_relative_paths() {
        let config = ProjectConfig::parse("exclude = [\"src/generated/**\"]", Path::new("x.toml")).unwrap();
        assert!(config.is_excluded(Path::new("src/generated/api.rs")));
        assert!(!config.is_excluded(Path::new("src/lib.rs")));
    }

    #[test]
    fn operator_names_parse() {
        let config = ProjectConfig::parse("operators = [\"relational\", \"side-effects\"]", Path::new("x.toml")).unwrap();
        assert_eq!(
            config.operator_kinds().unwrap(),
            vec![
                MutationOperatorKind::RelationalOperatorReplacement,
                MutationOperatorKind::RemoveSideEffects
            ]
        );
    }
}
