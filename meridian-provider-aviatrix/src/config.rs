//! Provider configuration

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("provider configuration is missing '{0}'")]
    Missing(&'static str),

    #[error("invalid controller address '{0}': expected a host name or IP, without scheme or path")]
    InvalidController(String),
}

/// Connection settings for the controller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Controller host name or IP address
    pub controller_ip: String,
    pub username: String,
    pub password: String,
    /// Verify the controller's TLS certificate
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_verify_tls() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(
        controller_ip: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            controller_ip: controller_ip.into(),
            username: username.into(),
            password: password.into(),
            verify_tls: default_verify_tls(),
        }
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller_ip.is_empty() {
            return Err(ConfigError::Missing("controller_ip"));
        }
        if self.controller_ip.contains("://") || self.controller_ip.contains('/') {
            return Err(ConfigError::InvalidController(self.controller_ip.clone()));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        Ok(())
    }

    /// Endpoint every API action is posted to
    pub fn api_url(&self) -> String {
        format!("https://{}/v1/api", self.controller_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config() {
        let config = ProviderConfig::new("10.0.0.10", "admin", "secret");
        assert!(config.validate().is_ok());
        assert!(config.verify_tls);
        assert_eq!(config.api_url(), "https://10.0.0.10/v1/api");
    }

    #[test]
    fn missing_fields_are_reported() {
        assert_eq!(
            ProviderConfig::new("", "admin", "secret").validate(),
            Err(ConfigError::Missing("controller_ip"))
        );
        assert_eq!(
            ProviderConfig::new("ctl.example.com", "admin", "").validate(),
            Err(ConfigError::Missing("password"))
        );
    }

    #[test]
    fn controller_must_be_a_bare_host() {
        assert!(matches!(
            ProviderConfig::new("https://ctl.example.com", "admin", "secret").validate(),
            Err(ConfigError::InvalidController(_))
        ));
    }

    #[test]
    fn verify_tls_defaults_to_true_when_deserialized() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"controller_ip": "ctl", "username": "admin", "password": "secret"}"#,
        )
        .unwrap();
        assert!(config.verify_tls);
    }
}
