//! Configuration types for chainsink
//!
//! Settings are loaded from a YAML file. Values may reference environment
//! variables with `${VAR}` or `${VAR:-default}`, expanded before parsing.

use std::path::Path;
use std::sync::LazyLock;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// PostgreSQL source (canonical truth)
    pub postgres: ConnectionConfig,

    /// SingleStore target (analytics store)
    pub singlestore: ConnectionConfig,

    /// Metrics endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Connection parameters for one database endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,

    #[serde(default)]
    pub password: String,

    pub database: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Port for the Prometheus exposition endpoint
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9102
}

impl Settings {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        let settings: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| Error::config(format!("failed to parse config: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, conn) in [("postgres", &self.postgres), ("singlestore", &self.singlestore)] {
            if conn.host.is_empty() {
                return Err(Error::config(format!("{name}.host must not be empty")));
            }
            if conn.port == 0 {
                return Err(Error::config(format!("{name}.port must not be zero")));
            }
            if conn.user.is_empty() {
                return Err(Error::config(format!("{name}.user must not be empty")));
            }
            if conn.database.is_empty() {
                return Err(Error::config(format!("{name}.database must not be empty")));
            }
        }
        Ok(())
    }
}

/// Expand environment variables in the format ${VAR} or ${VAR:-default}
fn expand_env_vars(content: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
postgres:
  host: pg.internal
  port: 5432
  user: indexer
  password: hunter2
  database: analytics
singlestore:
  host: sdb.internal
  port: 3306
  user: loader
  database: analytics
metrics:
  port: 9100
"#;

    #[test]
    fn test_parse_full_config() {
        let settings = Settings::from_yaml(EXAMPLE).unwrap();
        assert_eq!(settings.postgres.host, "pg.internal");
        assert_eq!(settings.postgres.port, 5432);
        assert_eq!(settings.singlestore.user, "loader");
        // password defaults to empty when omitted
        assert_eq!(settings.singlestore.password, "");
        assert_eq!(settings.metrics.port, 9100);
    }

    #[test]
    fn test_metrics_defaults_when_omitted() {
        let yaml = EXAMPLE
            .lines()
            .take_while(|l| !l.starts_with("metrics"))
            .collect::<Vec<_>>()
            .join("\n");
        let settings = Settings::from_yaml(&yaml).unwrap();
        assert_eq!(settings.metrics.port, 9102);
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("CHAINSINK_TEST_PG_HOST", "expanded-host");
        let yaml = EXAMPLE.replace("pg.internal", "${CHAINSINK_TEST_PG_HOST}");
        let settings = Settings::from_yaml(&yaml).unwrap();
        assert_eq!(settings.postgres.host, "expanded-host");
    }

    #[test]
    fn test_env_expansion_default() {
        let yaml = EXAMPLE.replace("hunter2", "${CHAINSINK_TEST_UNSET_VAR:-fallback}");
        let settings = Settings::from_yaml(&yaml).unwrap();
        assert_eq!(settings.postgres.password, "fallback");
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let yaml = EXAMPLE.replace("pg.internal", "\"\"");
        let err = Settings::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("postgres.host"));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let yaml = EXAMPLE.replace("port: 3306", "port: 0");
        let err = Settings::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("singlestore.port"));
    }
}
