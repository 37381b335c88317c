//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `GET_TEXT_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `GET_TEXT_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `GET_TEXT_CONVERTER__TIMEOUT=2m` sets the `converter.timeout` field.
//!
//! ## Example
//!
//! ```yaml
//! port: 8000
//! temp_dir: /var/tmp/get-text
//! max_upload_size: 52428800
//! converter:
//!   command: ebook-convert
//!   timeout: 5m
//! enable_metrics: true
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "GET_TEXT_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Directory where uploads and conversion results are staged for the duration of a request.
    /// Created on startup if missing.
    pub temp_dir: PathBuf,
    /// Maximum accepted request body size in bytes for `/text`
    pub max_upload_size: u64,
    /// External converter invocation
    pub converter: ConverterConfig,
    /// Enable Prometheus metrics endpoint at `/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// How the external converter is invoked: `<command> [args...] <input> <output>`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Program to run, resolved through PATH when not absolute
    pub command: String,
    /// Extra arguments placed before the input and output paths
    pub args: Vec<String>,
    /// Upper bound for a single conversion; the process is killed when exceeded
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: "ebook-convert".to_string(),
            args: vec![],
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            temp_dir: std::env::temp_dir().join("get-text"),
            max_upload_size: 100 * 1024 * 1024, // 100 MB
            converter: ConverterConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.converter.command.trim().is_empty() {
            return Err(Error::internal("Config validation: converter.command cannot be empty"));
        }

        if self.converter.timeout.is_zero() {
            return Err(Error::internal("Config validation: converter.timeout must be greater than 0"));
        }

        if self.max_upload_size == 0 {
            return Err(Error::internal("Config validation: max_upload_size must be greater than 0"));
        }

        if usize::try_from(self.max_upload_size).is_err() {
            return Err(Error::internal(format!(
                "Config validation: max_upload_size ({}) does not fit in memory on this platform",
                self.max_upload_size
            )));
        }

        if self.temp_dir.as_os_str().is_empty() {
            return Err(Error::internal("Config validation: temp_dir cannot be empty"));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // GET_TEXT_CONFIG names the file itself, it is not a config key
            .merge(Env::prefixed("GET_TEXT_").ignore(&["CONFIG"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.port, 8000);
            assert_eq!(config.converter.command, "ebook-convert");
            assert!(config.converter.args.is_empty());
            assert_eq!(config.converter.timeout, Duration::from_secs(600));
            assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
            assert!(!config.enable_metrics);
            assert!(config.temp_dir.ends_with("get-text"));

            Ok(())
        });
    }

    #[test]
    fn test_yaml_values() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9090
temp_dir: /var/tmp/books
max_upload_size: 1024
converter:
  command: /opt/calibre/ebook-convert
  args: ["--verbose"]
  timeout: 90s
enable_metrics: true
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 9090);
            assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/books"));
            assert_eq!(config.max_upload_size, 1024);
            assert_eq!(config.converter.command, "/opt/calibre/ebook-convert");
            assert_eq!(config.converter.args, vec!["--verbose".to_string()]);
            assert_eq!(config.converter.timeout, Duration::from_secs(90));
            assert!(config.enable_metrics);
            // untouched values keep defaults
            assert_eq!(config.host, "0.0.0.0");

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9090
converter:
  timeout: 90s
"#,
            )?;

            jail.set_env("GET_TEXT_HOST", "127.0.0.1");
            jail.set_env("GET_TEXT_PORT", "8080");
            jail.set_env("GET_TEXT_CONVERTER__TIMEOUT", "2m");
            jail.set_env("GET_TEXT_TEMP_DIR", "/srv/staging");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.converter.timeout, Duration::from_secs(120));
            assert_eq!(config.temp_dir, PathBuf::from("/srv/staging"));
            assert_eq!(config.bind_address(), "127.0.0.1:8080");

            Ok(())
        });
    }

    #[test]
    fn test_config_path_env_is_not_a_key() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.yaml", "port: 7000\n")?;
            jail.set_env("GET_TEXT_CONFIG", "custom.yaml");

            let config = Config::load(&args("custom.yaml"))?;
            assert_eq!(config.port, 7000);

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "tempdir: /tmp/typo\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_load_runs_validation() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
converter:
  command: ""
"#,
            )?;

            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("converter.command"));

            Ok(())
        });
    }

    #[test]
    fn test_config_validation_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.converter.timeout = Duration::ZERO;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("converter.timeout"));
    }

    #[test]
    fn test_config_validation_zero_upload_size() {
        let mut config = Config::default();
        config.max_upload_size = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_upload_size"));
    }

    #[test]
    fn test_config_validation_empty_temp_dir() {
        let mut config = Config::default();
        config.temp_dir = PathBuf::new();

        assert!(config.validate().is_err());
    }
}
