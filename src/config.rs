use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Which SQL dialect the compiler targets.
///
/// The strict dialect (Postgres) supports LATERAL derived tables, casts JSON
/// expressions to JSONB and enforces UUID operand typing. The permissive
/// dialect (MySQL/MariaDB compatible) does none of those.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    Mysql,
}

/// Error parsing a dialect name.
#[derive(Debug, Clone, Error)]
#[error("unknown dialect '{0}'")]
pub struct ParseDialectError(String);

impl std::str::FromStr for DialectKind {
    type Err = ParseDialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" | "mariadb" => Ok(DialectKind::Mysql),
            other => Err(ParseDialectError(other.to_string())),
        }
    }
}

/// Compiler configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Target SQL dialect
    pub dialect: DialectKind,

    /// Log every intermediate derived table while compiling
    pub verbose: bool,

    /// Join child derived tables with LEFT OUTER JOIN (missing children keep
    /// the parent row, with NULL payloads)
    pub outer_joins: bool,

    /// Column stamped by the change-capture mechanism with the committing
    /// transaction identifier
    #[validate(length(min = 1, message = "Transaction id column cannot be empty"))]
    pub tx_column: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Postgres,
            verbose: false,
            outer_joins: true,
            tx_column: "xmin".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            dialect: parse_env_var("DOCSYNC_DIALECT", "postgres")?,
            verbose: parse_env_var("DOCSYNC_VERBOSE", "false")?,
            outer_joins: parse_env_var("DOCSYNC_OUTER_JOINS", "true")?,
            tx_column: env::var("DOCSYNC_TX_COLUMN").unwrap_or_else(|_| "xmin".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
