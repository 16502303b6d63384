//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Array connection and driver settings derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq)]
#[ortho_config(
    prefix = "K2",
    discovery(
        app_name = "k2ctl",
        env_var = "K2_CONFIG_PATH",
        config_file_name = "k2.toml",
        dotfile_name = ".k2.toml",
        project_file_name = "k2.toml"
    )
)]
pub struct K2Config {
    /// Management address (IP or host name) of the array.
    pub san_ip: String,
    /// Login used for the REST API.
    pub san_login: String,
    /// Password used for the REST API.
    pub san_password: String,
    /// Path of the REST API root on the management endpoint.
    #[ortho_config(default = "/api/v2".to_owned())]
    pub api_path: String,
    /// Whether to validate the array's TLS certificate. Arrays ship with
    /// self-signed certificates, so validation is off unless requested.
    pub ssl_validate: Option<bool>,
    /// Silences the warning logged when TLS validation is disabled.
    pub suppress_ssl_warnings: Option<bool>,
    /// Derive the oversubscription ratio from live array figures.
    pub auto_calc_max_oversubscription_ratio: Option<bool>,
    /// Oversubscription ratio reported when auto-calculation is off or
    /// cannot be computed.
    #[ortho_config(default = 20.0)]
    pub max_over_subscription_ratio: f64,
    /// Block size handed to the block-copy primitive (for example `1M`).
    #[ortho_config(default = "1M".to_owned())]
    pub volume_dd_blocksize: String,
    /// Backend name reported in volume stats.
    pub volume_backend_name: Option<String>,
    /// Storage protocol reported in volume stats.
    #[ortho_config(default = "iSCSI".to_owned())]
    pub storage_protocol: String,
    /// Per-request HTTP timeout in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl K2Config {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to k2.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("k2ctl")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on the fields the driver cannot run
    /// without.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.san_ip,
            &FieldMetadata::new("array management address", "K2_SAN_IP", "san_ip"),
        )?;
        Self::require_field(
            &self.san_login,
            &FieldMetadata::new("array login", "K2_SAN_LOGIN", "san_login"),
        )?;
        Self::require_field(
            &self.san_password,
            &FieldMetadata::new("array password", "K2_SAN_PASSWORD", "san_password"),
        )?;
        Self::require_field(
            &self.volume_dd_blocksize,
            &FieldMetadata::new(
                "block-copy block size",
                "K2_VOLUME_DD_BLOCKSIZE",
                "volume_dd_blocksize",
            ),
        )?;
        Ok(())
    }

    /// Whether the array's TLS certificate is validated. Off when unset.
    #[must_use]
    pub const fn validates_tls(&self) -> bool {
        matches!(self.ssl_validate, Some(true))
    }

    /// Whether the disabled-validation warning is silenced. Off when unset.
    #[must_use]
    pub const fn suppresses_ssl_warnings(&self) -> bool {
        matches!(self.suppress_ssl_warnings, Some(true))
    }

    /// Whether the oversubscription ratio is derived from live figures. Off
    /// when unset.
    #[must_use]
    pub const fn auto_calculates_ratio(&self) -> bool {
        matches!(self.auto_calc_max_oversubscription_ratio, Some(true))
    }

    /// Returns the URL of the REST API root.
    #[must_use]
    pub fn base_url(&self) -> String {
        let path = self.api_path.trim().trim_end_matches('/');
        if path.is_empty() || path.starts_with('/') {
            format!("https://{}{path}", self.san_ip.trim())
        } else {
            format!("https://{}/{path}", self.san_ip.trim())
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
