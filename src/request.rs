//! Provisioning requests submitted by the hosting service.

use serde::{Deserialize, Serialize};

use crate::backend::BackendError;

/// Parameters required to create one or more instances.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InstanceRequest {
    /// Group tag (AWS) or server name (OpenStack) applied to every instance.
    pub tag: String,
    /// Image identifier. AWS images are region qualified (`eu-west-1/ami-…`).
    pub image: String,
    /// Number of instances to create.
    pub number: u32,
    /// Sizing constraints.
    #[serde(default)]
    pub hardware: Hardware,
    /// Caller supplied credentials. When absent the AWS adapter falls back to
    /// a generated per-region key pair.
    #[serde(default)]
    pub credentials: Option<InstanceCredentials>,
    /// Provider specific placement and pricing options.
    #[serde(default)]
    pub options: Option<InstanceOptions>,
    /// Script lines passed to the instance as user data on first boot.
    #[serde(default)]
    pub init_script: Vec<String>,
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Validates the provider-neutral fields of the request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when the tag or image is empty or
    /// when no instance is requested.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.tag.is_empty() {
            return Err(BackendError::Validation("tag".to_owned()));
        }
        if self.image.is_empty() {
            return Err(BackendError::Validation("image".to_owned()));
        }
        if self.number == 0 {
            return Err(BackendError::Validation("number".to_owned()));
        }
        Ok(())
    }

    /// Returns the user data payload built from the init script.
    #[must_use]
    pub fn user_data(&self) -> String {
        self.init_script.join("\n")
    }
}

/// Sizing constraints for new instances.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Hardware {
    /// Minimum RAM in megabytes (AWS template matching).
    #[serde(default)]
    pub min_ram: Option<u32>,
    /// Minimum virtual cores (AWS template matching).
    #[serde(default)]
    pub min_cores: Option<f64>,
    /// Explicit hardware type or flavour name (OpenStack).
    #[serde(default, rename = "type")]
    pub hardware_type: Option<String>,
}

/// Credentials a caller attaches to the instances it requests.
#[derive(Clone, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceCredentials {
    /// Login user override.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password, when the image allows password logins.
    #[serde(default)]
    pub password: Option<String>,
    /// Name of a key pair already registered with the provider.
    #[serde(default)]
    pub public_key_name: Option<String>,
    /// Public key material.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Private key material used to reach the instance over SSH.
    #[serde(default)]
    pub private_key: Option<String>,
}

impl InstanceCredentials {
    /// Credentials that log in as `username` with the named provider key pair.
    #[must_use]
    pub fn with_key_pair(username: impl Into<String>, key_pair_name: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            public_key_name: Some(key_pair_name.into()),
            ..Self::default()
        }
    }

    /// Returns the username when it is present and not blank.
    #[must_use]
    pub fn login_user(&self) -> Option<&str> {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    /// Returns the key-pair name when it is present and not empty.
    #[must_use]
    pub fn key_pair_name(&self) -> Option<&str> {
        self.public_key_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }
}

impl std::fmt::Debug for InstanceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("public_key_name", &self.public_key_name)
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Login details used to run scripts on an instance over SSH.
#[derive(Clone, Eq, PartialEq)]
pub struct SshCredentials {
    /// Remote login user.
    pub username: String,
    /// Private key material, when one is known.
    pub private_key: Option<String>,
}

impl std::fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshCredentials")
            .field("username", &self.username)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Key/value tag attached to created instances.
#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Placement and pricing options understood by the AWS adapter.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceOptions {
    /// Maximum spot price, as a decimal string.
    #[serde(default)]
    pub spot_price: Option<String>,
    /// Security groups the instances join.
    #[serde(default)]
    pub security_group_names: Vec<String>,
    /// Subnet the instances are placed in.
    #[serde(default)]
    pub subnet_id: Option<String>,
    /// Tags copied to the instances' user metadata.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Builder for [`InstanceRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceRequestBuilder {
    tag: String,
    image: String,
    number: u32,
    hardware: Hardware,
    credentials: Option<InstanceCredentials>,
    options: Option<InstanceOptions>,
    init_script: Vec<String>,
}

impl InstanceRequestBuilder {
    /// Creates a builder requesting a single instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            number: 1,
            ..Self::default()
        }
    }

    /// Sets the group tag.
    #[must_use]
    pub fn tag(mut self, value: impl Into<String>) -> Self {
        self.tag = value.into();
        self
    }

    /// Sets the image identifier.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets how many instances to create.
    #[must_use]
    pub const fn number(mut self, value: u32) -> Self {
        self.number = value;
        self
    }

    /// Sets the minimum RAM in megabytes.
    #[must_use]
    pub const fn min_ram(mut self, value: u32) -> Self {
        self.hardware.min_ram = Some(value);
        self
    }

    /// Sets the minimum number of cores.
    #[must_use]
    pub fn min_cores(mut self, value: f64) -> Self {
        self.hardware.min_cores = Some(value);
        self
    }

    /// Sets the hardware type or flavour name.
    #[must_use]
    pub fn hardware_type(mut self, value: impl Into<String>) -> Self {
        self.hardware.hardware_type = Some(value.into());
        self
    }

    /// Sets caller supplied credentials.
    #[must_use]
    pub fn credentials(mut self, value: Option<InstanceCredentials>) -> Self {
        self.credentials = value;
        self
    }

    /// Sets provider options.
    #[must_use]
    pub fn options(mut self, value: Option<InstanceOptions>) -> Self {
        self.options = value;
        self
    }

    /// Sets the init script lines.
    #[must_use]
    pub fn init_script(mut self, lines: Vec<String>) -> Self {
        self.init_script = lines;
        self
    }

    /// Builds and validates the [`InstanceRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<InstanceRequest, BackendError> {
        let request = InstanceRequest {
            tag: self.tag.trim().to_owned(),
            image: self.image.trim().to_owned(),
            number: self.number,
            hardware: Hardware {
                hardware_type: self
                    .hardware
                    .hardware_type
                    .map(|value| value.trim().to_owned())
                    .filter(|value| !value.is_empty()),
                ..self.hardware
            },
            credentials: self.credentials,
            options: self.options,
            init_script: self.init_script,
        };
        request.validate()?;
        Ok(request)
    }
}
