// Process configuration, read once from the environment (and `.env`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {0} environment variable")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres connection string. Never defaulted.
    pub database_url: String,
    pub database_max_connections: u32,
    pub gcs_bucket: String,
    pub bind_address: String,
    pub port: u16,
    pub writing_folder: PathBuf,
    pub oral_folder: PathBuf,
    pub writing_module_type_id: i32,
    pub oral_module_type_id: i32,
    pub auto_migrate_batch_size: i64,
    /// Applied to every outbound Google request.
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any key lookup, so tests don't touch the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5)?,
            gcs_bucket: var("GCS_BUCKET_NAME").unwrap_or_else(|| "clarodele-mvp-content".to_string()),
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "PORT", 8080)?,
            writing_folder: var("WRITING_TAREA1_FOLDER")
                .unwrap_or_else(|| "Writing_Tarea_1".to_string())
                .into(),
            oral_folder: var("ORAL_TAREA2_FOLDER")
                .unwrap_or_else(|| "Oral_Tarea_2".to_string())
                .into(),
            writing_module_type_id: parse_or(&var, "WRITING_TAREA1_MODULE_TYPE_ID", 1)?,
            oral_module_type_id: parse_or(&var, "ORAL_TAREA2_MODULE_TYPE_ID", 6)?,
            auto_migrate_batch_size: parse_or(&var, "AUTO_MIGRATE_BATCH_SIZE", 10)?,
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 120)?),
        })
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/tareas")]).unwrap();

        assert_eq!(config.gcs_bucket, "clarodele-mvp-content");
        assert_eq!(config.port, 8080);
        assert_eq!(config.writing_folder, PathBuf::from("Writing_Tarea_1"));
        assert_eq!(config.oral_folder, PathBuf::from("Oral_Tarea_2"));
        assert_eq!(config.writing_module_type_id, 1);
        assert_eq!(config.oral_module_type_id, 6);
        assert_eq!(config.auto_migrate_batch_size, 10);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.http_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_database_url_is_required() {
        let err = config(&[("PORT", "9000")]).unwrap_err();
        assert_eq!(err.to_string(), "Missing DATABASE_URL environment variable");

        let err = config(&[("DATABASE_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_overrides_and_malformed_numbers() {
        let config_ok = config(&[
            ("DATABASE_URL", "postgres://db/x"),
            ("GCS_BUCKET_NAME", "other-bucket"),
            ("PORT", "9000"),
            ("AUTO_MIGRATE_BATCH_SIZE", " 25 "),
        ])
        .unwrap();
        assert_eq!(config_ok.gcs_bucket, "other-bucket");
        assert_eq!(config_ok.port, 9000);
        assert_eq!(config_ok.auto_migrate_batch_size, 25);

        let err = config(&[("DATABASE_URL", "postgres://db/x"), ("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.to_string(), r#"Invalid value for PORT: "eighty""#);
    }
}
