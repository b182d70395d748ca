//! Exporter configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! ```text
//! built-in defaults → TOML file (--config) → CLI flags / environment
//! ```
//!
//! Every layer is a [`PartialConfig`]; the merged result is validated into
//! an [`ExporterConfig`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use zic_metrics::collector::{DEFAULT_ITEM_KEY_PATTERN, DEFAULT_NAMESPACE};
use zic_metrics::registry::is_valid_namespace;
use zic_rpc::DEFAULT_TIMEOUT;

pub const DEFAULT_INTERVAL_SECS: u64 = 30;
/// One day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;
/// One hour.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{setting} must be at most {max}, got {value}")]
    TooLarge {
        setting: &'static str,
        max: u64,
        value: u64,
    },

    #[error("unsupported zabbix url {0:?}: only http:// is supported")]
    UnsupportedUrl(String),

    #[error("namespace {0:?} is not a valid metric name prefix")]
    InvalidNamespace(String),

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// One configuration layer. Unset fields defer to lower layers.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub port: Option<u16>,
    pub zabbix_url: Option<String>,
    pub zabbix_user: Option<String>,
    pub zabbix_password: Option<String>,
    pub interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub namespace: Option<String>,
    pub item_key_pattern: Option<String>,
}

impl PartialConfig {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer `overrides` on top of `self`.
    pub fn merge(self, overrides: PartialConfig) -> PartialConfig {
        PartialConfig {
            port: overrides.port.or(self.port),
            zabbix_url: overrides.zabbix_url.or(self.zabbix_url),
            zabbix_user: overrides.zabbix_user.or(self.zabbix_user),
            zabbix_password: overrides.zabbix_password.or(self.zabbix_password),
            interval_secs: overrides.interval_secs.or(self.interval_secs),
            request_timeout_secs: overrides.request_timeout_secs.or(self.request_timeout_secs),
            namespace: overrides.namespace.or(self.namespace),
            item_key_pattern: overrides.item_key_pattern.or(self.item_key_pattern),
        }
    }
}

/// Validated exporter settings.
#[derive(Clone)]
pub struct ExporterConfig {
    pub port: u16,
    pub zabbix_url: String,
    pub zabbix_user: String,
    pub zabbix_password: String,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    pub namespace: String,
    pub item_key_pattern: String,
}

impl ExporterConfig {
    /// Read the optional file layer and merge `overrides` on top.
    pub fn load(file: Option<&Path>, overrides: PartialConfig) -> Result<Self, ConfigError> {
        let base = match file {
            Some(path) => PartialConfig::from_file(path)?,
            None => PartialConfig::default(),
        };
        Self::try_from(base.merge(overrides))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl TryFrom<PartialConfig> for ExporterConfig {
    type Error = ConfigError;

    fn try_from(partial: PartialConfig) -> Result<Self, Self::Error> {
        let port = partial.port.ok_or(ConfigError::Missing("--port"))?;
        let zabbix_url = partial
            .zabbix_url
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("--zabbix-url"))?;
        let zabbix_user = partial
            .zabbix_user
            .filter(|user| !user.is_empty())
            .ok_or(ConfigError::Missing("--zabbix-user"))?;
        let zabbix_password = partial
            .zabbix_password
            .filter(|password| !password.is_empty())
            .ok_or(ConfigError::Missing("--zabbix-password"))?;

        if !zabbix_url.to_ascii_lowercase().starts_with("http://") {
            return Err(ConfigError::UnsupportedUrl(zabbix_url));
        }

        let interval_secs = partial.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS);
        check_range("--interval-sec", interval_secs, MAX_INTERVAL_SECS)?;
        let request_timeout_secs = partial
            .request_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT.as_secs());
        check_range("--request-timeout-sec", request_timeout_secs, MAX_REQUEST_TIMEOUT_SECS)?;

        let namespace = partial
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        if !is_valid_namespace(&namespace) {
            return Err(ConfigError::InvalidNamespace(namespace));
        }

        Ok(ExporterConfig {
            port,
            zabbix_url,
            zabbix_user,
            zabbix_password,
            interval_secs,
            request_timeout_secs,
            namespace,
            item_key_pattern: partial
                .item_key_pattern
                .unwrap_or_else(|| DEFAULT_ITEM_KEY_PATTERN.to_string()),
        })
    }
}

fn check_range(setting: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero(setting));
    }
    if value > max {
        return Err(ConfigError::TooLarge {
            setting,
            max,
            value,
        });
    }
    Ok(())
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("port", &self.port)
            .field("zabbix_url", &self.zabbix_url)
            .field("zabbix_user", &self.zabbix_user)
            .field("zabbix_password", &"<redacted>")
            .field("interval_secs", &self.interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("namespace", &self.namespace)
            .field("item_key_pattern", &self.item_key_pattern)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn required() -> PartialConfig {
        PartialConfig {
            port: Some(9090),
            zabbix_url: Some("http://zabbix.local".to_string()),
            zabbix_user: Some("Admin".to_string()),
            zabbix_password: Some("zabbix".to_string()),
            ..PartialConfig::default()
        }
    }

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = ExporterConfig::try_from(required()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.namespace, "zabbix_internal_checks");
        assert_eq!(config.item_key_pattern, "zabbix[*]");
    }

    #[test]
    fn each_required_setting_is_reported() {
        let cases: [(fn(&mut PartialConfig), &str); 4] = [
            (|c| c.port = None, "--port"),
            (|c| c.zabbix_url = None, "--zabbix-url"),
            (|c| c.zabbix_user = None, "--zabbix-user"),
            (|c| c.zabbix_password = Some(String::new()), "--zabbix-password"),
        ];
        for (clear, flag) in cases {
            let mut partial = required();
            clear(&mut partial);
            match ExporterConfig::try_from(partial) {
                Err(ConfigError::Missing(missing)) => assert_eq!(missing, flag),
                other => panic!("expected Missing({flag}), got {other:?}"),
            }
        }
    }

    #[test]
    fn zero_interval_rejected() {
        let partial = PartialConfig {
            interval_secs: Some(0),
            ..required()
        };
        assert!(matches!(
            ExporterConfig::try_from(partial),
            Err(ConfigError::Zero("--interval-sec"))
        ));

        let partial = PartialConfig {
            request_timeout_secs: Some(0),
            ..required()
        };
        assert!(matches!(
            ExporterConfig::try_from(partial),
            Err(ConfigError::Zero("--request-timeout-sec"))
        ));
    }

    #[test]
    fn oversized_durations_rejected() {
        let partial = PartialConfig {
            interval_secs: Some(u64::MAX),
            ..required()
        };
        assert!(matches!(
            ExporterConfig::try_from(partial),
            Err(ConfigError::TooLarge {
                setting: "--interval-sec",
                max: MAX_INTERVAL_SECS,
                value: u64::MAX,
            })
        ));

        let partial = PartialConfig {
            request_timeout_secs: Some(MAX_REQUEST_TIMEOUT_SECS + 1),
            ..required()
        };
        assert!(matches!(
            ExporterConfig::try_from(partial),
            Err(ConfigError::TooLarge {
                setting: "--request-timeout-sec",
                ..
            })
        ));

        let partial = PartialConfig {
            interval_secs: Some(MAX_INTERVAL_SECS),
            request_timeout_secs: Some(MAX_REQUEST_TIMEOUT_SECS),
            ..required()
        };
        let config = ExporterConfig::try_from(partial).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn https_url_rejected() {
        let partial = PartialConfig {
            zabbix_url: Some("https://zabbix.local".to_string()),
            ..required()
        };
        assert!(matches!(
            ExporterConfig::try_from(partial),
            Err(ConfigError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn invalid_namespace_rejected() {
        let partial = PartialConfig {
            namespace: Some("zabbix-checks".to_string()),
            ..required()
        };
        assert!(matches!(
            ExporterConfig::try_from(partial),
            Err(ConfigError::InvalidNamespace(_))
        ));
    }

    #[test]
    fn overrides_win_over_file() {
        let file = config_file(
            r#"
port = 9000
zabbix_url = "http://from-file"
zabbix_user = "file-user"
zabbix_password = "file-pass"
interval_secs = 10
"#,
        );
        let overrides = PartialConfig {
            port: Some(9224),
            zabbix_password: Some("cli-pass".to_string()),
            ..PartialConfig::default()
        };

        let config = ExporterConfig::load(Some(file.path()), overrides).unwrap();
        assert_eq!(config.port, 9224);
        assert_eq!(config.zabbix_url, "http://from-file");
        assert_eq!(config.zabbix_user, "file-user");
        assert_eq!(config.zabbix_password, "cli-pass");
        assert_eq!(config.interval_secs, 10);
    }

    #[test]
    fn unknown_file_keys_rejected() {
        let file = config_file("port = 9000\nzabbix_host = \"typo\"\n");
        assert!(matches!(
            PartialConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ExporterConfig::load(Some(&path), required()),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn debug_redacts_password() {
        let config = ExporterConfig::try_from(required()).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("Admin"));
        assert!(!debug.contains("\"zabbix\""));
        assert!(debug.contains("<redacted>"));
    }
}
