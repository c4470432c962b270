//! Configuration loading via `ortho-config`.

use std::num::NonZeroUsize;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::address::AcquisitionPolicy;

/// Connector settings derived from defaults, configuration files and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "IAAS",
    discovery(
        app_name = "iaas-connector",
        env_var = "IAAS_CONFIG_PATH",
        config_file_name = "iaas-connector.toml",
        dotfile_name = ".iaas-connector.toml",
        project_file_name = "iaas-connector.toml"
    )
)]
pub struct ConnectorConfig {
    /// Login user for instances created with generated key pairs.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub vm_user_login: String,
    /// Prefix of generated key-pair names (`<prefix>-<region>-<uuid>`).
    #[ortho_config(default = "default".to_owned())]
    pub key_pair_prefix: String,
    /// Region used for every OpenStack call.
    #[ortho_config(default = "RegionOne".to_owned())]
    pub openstack_region: String,
    /// Maximum number of free elastic addresses tried before allocating.
    /// Unset tries every free address.
    pub max_association_attempts: Option<usize>,
    /// Fail instance creation when no default key pair can be created,
    /// instead of creating instances without one.
    #[ortho_config(default = false)]
    pub require_default_key_pair: bool,
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

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to iaas-connector.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl ConnectorConfig {
    /// Configuration holding every default, as if no source set a value.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            vm_user_login: String::from("ubuntu"),
            key_pair_prefix: String::from("default"),
            openstack_region: String::from("RegionOne"),
            max_association_attempts: None,
            require_default_key_pair: false,
        }
    }

    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("iaas-connector")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the address acquisition policy described by this configuration.
    #[must_use]
    pub fn acquisition_policy(&self) -> AcquisitionPolicy {
        AcquisitionPolicy {
            max_association_attempts: self
                .max_association_attempts
                .and_then(NonZeroUsize::new),
        }
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when the attempt cap is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.vm_user_login,
            &FieldMetadata::new("VM login user", "IAAS_VM_USER_LOGIN", "vm_user_login"),
        )?;
        Self::require_field(
            &self.key_pair_prefix,
            &FieldMetadata::new(
                "key pair name prefix",
                "IAAS_KEY_PAIR_PREFIX",
                "key_pair_prefix",
            ),
        )?;
        Self::require_field(
            &self.openstack_region,
            &FieldMetadata::new(
                "OpenStack region",
                "IAAS_OPENSTACK_REGION",
                "openstack_region",
            ),
        )?;
        if self.max_association_attempts == Some(0) {
            return Err(ConfigError::Invalid(String::from(
                "max_association_attempts must be at least 1: unset IAAS_MAX_ASSOCIATION_ATTEMPTS to try every free address",
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
