//! Connection settings for a Dataverse environment

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const API_PATH: &str = "api/data/v9.2/";

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// App registration used for the client credentials flow
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DataverseConfig {
    /// Environment URL, e.g. `https://contoso.crm4.dynamics.com`
    pub url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_authority")]
    pub authority_host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for DataverseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataverseConfig")
            .field("url", &self.url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority_host", &self.authority_host)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl DataverseConfig {
    pub fn new(
        url: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: default_authority(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("dataverse.url", &self.url),
            ("dataverse.tenant_id", &self.tenant_id),
            ("dataverse.client_id", &self.client_id),
            ("dataverse.client_secret", &self.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: field.to_string(),
                });
            }
        }
        self.environment_url()?;
        Ok(())
    }

    /// Environment root with a trailing slash
    pub fn environment_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|_| ConfigError::InvalidValue {
            field: "dataverse.url".to_string(),
            value: self.url.clone(),
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidValue {
                field: "dataverse.url".to_string(),
                value: self.url.clone(),
            });
        }
        Ok(url)
    }

    /// Web API root, `{url}/api/data/v9.2/`
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        self.environment_url()?
            .join(API_PATH)
            .map_err(|_| ConfigError::InvalidValue {
                field: "dataverse.url".to_string(),
                value: self.url.clone(),
            })
    }

    /// OAuth2 token endpoint for the tenant
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Client credentials scope, `{url}/.default`
    pub fn scope(&self) -> String {
        format!("{}/.default", self.url.trim().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DataverseConfig {
        DataverseConfig::new(
            "https://contoso.crm4.dynamics.com",
            "tenant",
            "client",
            "secret",
        )
    }

    #[test]
    fn test_derived_urls() {
        let config = config();
        assert_eq!(
            config.api_base_url().unwrap().as_str(),
            "https://contoso.crm4.dynamics.com/api/data/v9.2/"
        );
        assert_eq!(
            config.token_url(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
        assert_eq!(config.scope(), "https://contoso.crm4.dynamics.com/.default");
    }

    #[test]
    fn test_trailing_slash_is_tolerated() {
        let mut config = config();
        config.url = "https://contoso.crm4.dynamics.com/".to_string();
        assert_eq!(config.scope(), "https://contoso.crm4.dynamics.com/.default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_secret() {
        let mut config = config();
        config.client_secret = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "dataverse.client_secret"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = config();
        config.url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        assert!(!format!("{:?}", config()).contains("\"secret\""));
    }
}
