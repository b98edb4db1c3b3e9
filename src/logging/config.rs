//! Logging configuration read from the environment.

use std::path::PathBuf;

/// Where and how verbosely the service logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub environment: String,
    pub level: String,
    pub directory: PathBuf,
}

impl LogConfig {
    /// ENVIRONMENT, LOG_LEVEL and LOG_DIR, with development defaults.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("ENVIRONMENT").ok(),
            std::env::var("LOG_LEVEL").ok(),
            std::env::var("LOG_DIR").ok(),
        )
    }

    fn from_vars(
        environment: Option<String>,
        level: Option<String>,
        directory: Option<String>,
    ) -> Self {
        let environment = environment
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "development".to_string());
        let level = level.filter(|l| !l.trim().is_empty()).unwrap_or_else(|| {
            if environment == "production" {
                "info".to_string()
            } else {
                "debug".to_string()
            }
        });
        let directory = PathBuf::from(directory.unwrap_or_else(|| "logs".to_string()));

        Self {
            environment,
            level,
            directory,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Filter used when RUST_LOG is unset.
    pub fn default_filter(&self) -> String {
        format!(
            "page_composer={},tower_http=debug,axum=debug",
            self.level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_development_debug() {
        let config = LogConfig::from_vars(None, None, None);
        assert_eq!(config.environment, "development");
        assert_eq!(config.level, "debug");
        assert_eq!(config.directory, PathBuf::from("logs"));
        assert!(!config.is_production());
    }

    #[test]
    fn test_production_defaults_to_info() {
        let config = LogConfig::from_vars(Some("production".to_string()), None, None);
        assert!(config.is_production());
        assert_eq!(
            config.default_filter(),
            "page_composer=info,tower_http=debug,axum=debug"
        );
    }

    #[test]
    fn test_explicit_level_wins() {
        let config = LogConfig::from_vars(
            Some("production".to_string()),
            Some("trace".to_string()),
            Some("/var/log/pages".to_string()),
        );
        assert_eq!(config.level, "trace");
        assert_eq!(config.directory, PathBuf::from("/var/log/pages"));
    }
}
