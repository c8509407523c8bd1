//! Project configuration (`weft.yml`).
//!
//! One file per project. `${NAME}` environment references are expanded
//! in string values before typing; unresolved references are left
//! literal. Named environments carry partial targets merged key-wise
//! over the base target.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use weft_core::dialect::Dialect;

/// Project configuration file name.
pub const CONFIG_FILE: &str = "weft.yml";
/// Directory holding the project's persisted state.
pub const STATE_DIR: &str = ".weft";
/// State database file name inside [`STATE_DIR`].
pub const STATE_DB: &str = "catalog.db";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
    #[error("invalid configuration: {0}")]
    Yaml(String),
    #[error("`models_dir` is required")]
    MissingModelsDir,
    #[error("unknown dialect `{name}` (known: {known})")]
    UnknownDialect { name: String, known: String },
    #[error("unknown environment `{0}`")]
    UnknownEnvironment(String),
}

/// Typed project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub models_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macros_dir: Option<PathBuf>,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, PartialTarget>,
}

/// The warehouse target, passed through to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(rename = "type", default = "default_dialect_name")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

fn default_dialect_name() -> String {
    Dialect::Generic.name().to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            type_name: default_dialect_name(),
            database: None,
            schema: None,
            host: None,
            user: None,
            password: None,
            options: BTreeMap::new(),
        }
    }
}

/// A partial target from the `environments` table; every field is
/// optional and overrides the base target when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PartialTarget {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// Loads and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::parse(&raw)
    }

    /// Parses configuration from YAML text.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(raw).map_err(|err| ConfigError::Yaml(err.to_string()))?;
        expand_env_values(&mut value, &|name| std::env::var(name).ok());
        let config: ProjectConfig =
            serde_yaml::from_value(value).map_err(|err| ConfigError::Yaml(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.models_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingModelsDir);
        }
        self.dialect()?;
        for env in self.environments.values() {
            if let Some(name) = &env.type_name {
                dialect_from_name(name)?;
            }
        }
        Ok(())
    }

    /// The dialect named by `target.type`, validated against the
    /// registry.
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        dialect_from_name(&self.target.type_name)
    }

    /// Resolves the effective target for an environment: the named
    /// partial merged over the base, `options` merged key-wise.
    pub fn resolved_target(&self, environment: Option<&str>) -> Result<TargetConfig, ConfigError> {
        let mut target = self.target.clone();
        if let Some(name) = environment {
            let partial = self
                .environments
                .get(name)
                .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_string()))?;
            if let Some(type_name) = &partial.type_name {
                target.type_name = type_name.clone();
            }
            if let Some(database) = &partial.database {
                target.database = Some(database.clone());
            }
            if let Some(schema) = &partial.schema {
                target.schema = Some(schema.clone());
            }
            if let Some(host) = &partial.host {
                target.host = Some(host.clone());
            }
            if let Some(user) = &partial.user {
                target.user = Some(user.clone());
            }
            if let Some(password) = &partial.password {
                target.password = Some(password.clone());
            }
            for (key, value) in &partial.options {
                target.options.insert(key.clone(), value.clone());
            }
        }
        dialect_from_name(&target.type_name)?;
        Ok(target)
    }

    /// The state database location for a project rooted at `root`.
    pub fn state_db_path(root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(STATE_DIR).join(STATE_DB)
    }
}

fn dialect_from_name(name: &str) -> Result<Dialect, ConfigError> {
    Dialect::from_name(name).ok_or_else(|| ConfigError::UnknownDialect {
        name: name.to_string(),
        known: Dialect::ALL
            .iter()
            .map(|d| d.name())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn env_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Expands `${NAME}` in every string value of a YAML tree. Unresolved
/// references are left literal.
fn expand_env_values(value: &mut serde_yaml::Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        serde_yaml::Value::String(s) => {
            let expanded = env_ref_regex().replace_all(s, |caps: &regex::Captures<'_>| {
                lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            });
            if expanded != *s {
                *s = expanded.into_owned();
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                expand_env_values(item, lookup);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_env_values(item, lookup);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FULL: &str = r#"
models_dir: models
seeds_dir: seeds
macros_dir: macros
target:
  type: duckdb
  database: analytics
  schema: main
  options:
    threads: "4"
environments:
  prod:
    schema: prod
    options:
      threads: "16"
      retries: "2"
"#;

    #[test]
    fn parses_full_config() {
        let config = ProjectConfig::parse(FULL).unwrap();
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert_eq!(config.dialect().unwrap(), Dialect::Duckdb);
        assert_eq!(config.target.options["threads"], "4");
    }

    #[rstest]
    #[case("generic", Dialect::Generic)]
    #[case("postgres", Dialect::Postgres)]
    #[case("snowflake", Dialect::Snowflake)]
    #[case("bigquery", Dialect::Bigquery)]
    #[case("duckdb", Dialect::Duckdb)]
    fn every_registry_dialect_validates(#[case] name: &str, #[case] expected: Dialect) {
        let raw = format!("models_dir: models\ntarget:\n  type: {name}\n");
        let config = ProjectConfig::parse(&raw).unwrap();
        assert_eq!(config.dialect().unwrap(), expected);
    }

    #[test]
    fn environment_merges_over_base_keywise() {
        let config = ProjectConfig::parse(FULL).unwrap();
        let target = config.resolved_target(Some("prod")).unwrap();
        assert_eq!(target.schema.as_deref(), Some("prod"));
        // Base keys survive; environment keys override or extend.
        assert_eq!(target.database.as_deref(), Some("analytics"));
        assert_eq!(target.options["threads"], "16");
        assert_eq!(target.options["retries"], "2");
        assert_eq!(target.type_name, "duckdb");
    }

    #[test]
    fn unknown_environment_is_an_error() {
        let config = ProjectConfig::parse(FULL).unwrap();
        assert_eq!(
            config.resolved_target(Some("staging")).unwrap_err(),
            ConfigError::UnknownEnvironment("staging".into())
        );
    }

    #[test]
    fn unknown_dialect_is_rejected_with_known_list() {
        let err = ProjectConfig::parse("models_dir: models\ntarget:\n  type: oracle\n")
            .unwrap_err();
        match err {
            ConfigError::UnknownDialect { name, known } => {
                assert_eq!(name, "oracle");
                assert!(known.contains("postgres"));
            }
            other => panic!("expected unknown dialect, got {other:?}"),
        }
    }

    #[test]
    fn models_dir_is_required() {
        let err = ProjectConfig::parse("target:\n  type: generic\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Yaml(_) | ConfigError::MissingModelsDir
        ));
    }

    #[test]
    fn env_references_expand_and_unresolved_stay_literal() {
        let mut value: serde_yaml::Value = serde_yaml::from_str(
            "user: ${WEFT_TEST_USER}\npassword: ${WEFT_TEST_MISSING}\n",
        )
        .unwrap();
        expand_env_values(&mut value, &|name| {
            (name == "WEFT_TEST_USER").then(|| "alice".to_string())
        });
        assert_eq!(value["user"], serde_yaml::Value::from("alice"));
        assert_eq!(
            value["password"],
            serde_yaml::Value::from("${WEFT_TEST_MISSING}")
        );
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        let err = ProjectConfig::parse("models_dir: models\nfrequency: daily\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
