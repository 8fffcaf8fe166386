//! Semantic validation of a parsed `DiffConfig`.

use std::path::{Component, Path};

use crate::git::RepoAddress;
use crate::policy::PolicySet;

use super::error::{ConfigError, Result};
use super::schema::{DiffConfig, EnvironmentSpec};

/// Validator for the config document.
///
/// Collects every problem instead of stopping at the first one. Image
/// entries with unknown policies or unparsable repositories are accepted
/// here and reported per image when the differ resolves them.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    errors: Vec<String>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the document and compiles its policies.
    pub fn validate(&mut self, config: &DiffConfig) -> Result<PolicySet> {
        self.errors.clear();
        let spec = &config.spec;

        self.validate_environment("source", &spec.environments.source);
        self.validate_environment("target", &spec.environments.target);

        let (source, target) = (&spec.environments.source, &spec.environments.target);
        if !source.name.is_empty() && source.name == target.name {
            self.errors.push(format!(
                "environments: source and target are both named '{}'",
                source.name
            ));
        }

        if spec.poll_interval_secs == Some(0) {
            self.errors
                .push("pollIntervalSecs: must be greater than zero".to_string());
        }

        for (name, image) in &spec.images {
            if name.trim().is_empty() {
                self.errors.push("images: empty image name".to_string());
            }
            if image.repository.trim().is_empty() {
                self.errors
                    .push(format!("images.{}.repository: must not be empty", name));
            }
            for (i, path) in image.paths.iter().enumerate() {
                self.check_relative_path(path, &format!("images.{}.paths[{}]", name, i));
            }
        }

        let policies = match PolicySet::compile(&spec.policies) {
            Ok(policies) => Some(policies),
            Err((name, e)) => {
                self.errors.push(format!("policies.{}: {}", name, e));
                None
            }
        };

        match policies {
            Some(policies) if self.errors.is_empty() => Ok(policies),
            _ => Err(ConfigError::Validation(self.errors.join("; "))),
        }
    }

    /// Returns the problems found by the last `validate` call.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn validate_environment(&mut self, role: &str, env: &EnvironmentSpec) {
        let field = format!("environments.{}", role);

        if env.name.trim().is_empty() {
            self.errors.push(format!("{}.name: must not be empty", field));
        } else if env.name.starts_with('.') || env.name.contains(['/', '\\']) {
            self.errors.push(format!(
                "{}.name: '{}' must not start with '.' or contain path separators",
                field, env.name
            ));
        }

        if env.path.trim().is_empty() {
            self.errors.push(format!("{}.path: must not be empty", field));
        } else {
            self.check_relative_path(&env.path, &format!("{}.path", field));
        }

        match (&env.repository, &env.branch) {
            (Some(repository), _) => {
                if let Err(e) = RepoAddress::parse(repository) {
                    self.errors
                        .push(format!("{}.repository: {}", field, e));
                }
            }
            (None, Some(_)) => self
                .errors
                .push(format!("{}.branch: requires a repository", field)),
            (None, None) => {}
        }

        if env.branch.as_deref().is_some_and(|b| b.trim().is_empty()) {
            self.errors.push(format!("{}.branch: must not be empty", field));
        }
    }

    /// Paths must stay inside the checkout they are resolved against.
    fn check_relative_path(&mut self, path: &str, field: &str) {
        let escapes = Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            self.errors.push(format!(
                "{}: '{}' must be relative and must not contain '..'",
                field, path
            ));
        }
    }
}
