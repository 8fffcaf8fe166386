//! Reads and validates the config document from a checkout.

use std::fs;
use std::path::Path;

use crate::policy::PolicySet;

use super::error::{ConfigError, Result};
use super::schema::{DiffConfig, API_VERSION, DIFF_CONFIG_KIND};
use super::validation::ConfigValidator;

/// A config document that passed validation, with its policies compiled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DiffConfig,
    pub policies: PolicySet,
}

/// Loads, parses and validates the config document at `path`.
pub fn load_config(path: &Path) -> Result<LoadedConfig> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = parse_config(&content, path)?;

    let mut validator = ConfigValidator::new();
    let policies = validator.validate(&config)?;

    Ok(LoadedConfig { config, policies })
}

/// Parses the document and checks its envelope.
pub fn parse_config(content: &str, path: &Path) -> Result<DiffConfig> {
    let config: DiffConfig =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if config.api_version != API_VERSION {
        return Err(ConfigError::InvalidApiVersion {
            version: config.api_version,
            expected: API_VERSION.to_string(),
        });
    }

    if config.kind != DIFF_CONFIG_KIND {
        return Err(ConfigError::InvalidKind {
            kind: config.kind,
            expected: DIFF_CONFIG_KIND.to_string(),
        });
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"
apiVersion: envdiff.io/v1
kind: DiffConfig
metadata:
  name: cortex
spec:
  environments:
    source: { name: dev, path: k8s/dev }
    target: { name: prod, path: k8s/prod }
  policies:
    master-sha: { type: regex, match: "^master-([0-9a-f]+)$" }
"#;

    #[test]
    fn test_load_valid_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("envdiff.yaml");
        fs::write(&path, VALID).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.config.metadata.name, "cortex");
        assert!(loaded.policies.get("master-sha").is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = load_config(&temp.path().join("envdiff.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_parse_wrong_api_version() {
        let content = VALID.replace("envdiff.io/v1", "envdiff.io/v2");
        let result = parse_config(&content, Path::new("envdiff.yaml"));
        assert!(matches!(result, Err(ConfigError::InvalidApiVersion { .. })));
    }

    #[test]
    fn test_parse_wrong_kind() {
        let content = VALID.replace("kind: DiffConfig", "kind: Settings");
        let result = parse_config(&content, Path::new("envdiff.yaml"));
        assert!(matches!(result, Err(ConfigError::InvalidKind { .. })));
    }

    #[test]
    fn test_parse_malformed_yaml() {
        let result = parse_config("spec: [", Path::new("envdiff.yaml"));
        assert!(matches!(result, Err(ConfigError::ParseYaml { .. })));
    }

    #[test]
    fn test_load_reports_validation_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("envdiff.yaml");
        fs::write(&path, VALID.replace("name: prod", "name: dev")).unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
