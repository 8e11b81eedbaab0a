//! Gateway configuration.
//!
//! Every field has a serde default pointing at the production gateway, so an
//! empty TOML file is a valid configuration and tests only override
//! `base_uri` and `cache_dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_base_uri() -> String {
    "https://imode.net/".to_string()
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("imail")
}

fn default_user_agent() -> String {
    "Mozilla/4.0 (compatible;MSIE 7.0; Windows NT 6.0;)".to_string()
}

fn default_service() -> String {
    "PCMAIL/1.0".to_string()
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// Paths on the gateway, relative to `GatewayConfig::base_uri`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Generic gateway login issuing the intermediate cookie.
    pub gateway: String,
    /// Mail subsystem login issuing the session cookie.
    pub login: String,
    pub mail_send: String,
    pub mail_id_list: String,
    pub mail_detail: String,
    pub login_referer: String,
    pub mail_referer: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gateway: "/dcm/dfw".to_string(),
            login: "/imail/oexaf/acgi/login".to_string(),
            mail_send: "/imail/oexaf/acgi/mailsend".to_string(),
            mail_id_list: "/imail/oexaf/acgi/mailidlist".to_string(),
            mail_detail: "/imail/oexaf/acgi/maildetail".to_string(),
            login_referer: "/imail/oexaf/ahtm/index2.html".to_string(),
            mail_referer: "/imail/oexaf/ahtm/index_f.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
    /// Directory holding one `cookie_<account>` file per account.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Value of the `X-PW-SERVICE` header the gateway requires.
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_read_timeout", with = "duration_secs")]
    pub read_timeout: Duration,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_uri: default_base_uri(),
            cache_dir: default_cache_dir(),
            user_agent: default_user_agent(),
            service: default_service(),
            read_timeout: default_read_timeout(),
            endpoints: Endpoints::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn cache_file(&self, account_id: &str) -> PathBuf {
        self.cache_dir.join(format!("cookie_{account_id}"))
    }

    /// Absolute URL for a gateway-relative path, used for `Referer`.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_uri.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_uri, "https://imode.net/");
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
base_uri = "http://127.0.0.1:3000/"
cache_dir = "/var/tmp/imail"
read_timeout = 3

[endpoints]
gateway = "/login/start"
"#
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_uri, "http://127.0.0.1:3000/");
        assert_eq!(config.cache_dir, PathBuf::from("/var/tmp/imail"));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.endpoints.gateway, "/login/start");
        assert_eq!(config.endpoints.login, "/imail/oexaf/acgi/login");
        assert_eq!(config.service, "PCMAIL/1.0");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "read_timeout = \"soon\"").unwrap();
        assert!(matches!(
            GatewayConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            GatewayConfig::from_file("/nonexistent/imail.toml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn cache_file_is_keyed_by_account() {
        let config = GatewayConfig::default().with_cache_dir("/tmp/c");
        assert_eq!(config.cache_file("abc"), PathBuf::from("/tmp/c/cookie_abc"));
    }

    #[test]
    fn url_for_joins_with_single_separator() {
        let config = GatewayConfig::default();
        assert_eq!(
            config.url_for("/imail/oexaf/ahtm/index2.html"),
            "https://imode.net/imail/oexaf/ahtm/index2.html"
        );
    }
}
