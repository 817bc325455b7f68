//! Provider (MVPD) activation collaborators: the registration/activation
//! client and the provider metadata directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guide_proto::config::AuthConfig;
use guide_proto::error::GuideError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Registration context returned by `begin_registration`.  The code is shown
/// in the provider login web view; the whole context is needed again to
/// complete activation.
#[derive(Debug, Clone)]
pub struct Registration {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful activation.
#[derive(Debug, Clone)]
pub struct Activation {
    pub provider_id: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn begin_registration(&self) -> Result<Registration, GuideError>;

    async fn activate(
        &self,
        provider_id: &str,
        registration: &Registration,
    ) -> Result<Activation, GuideError>;

    /// Invalidate any provider authorization held upstream.  Idempotent.
    async fn deauthorize(&self);
}

#[derive(Debug, Deserialize)]
struct WireRegistration {
    code: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireActivation {
    expires_at: DateTime<Utc>,
}

pub struct HttpAuthClient {
    http: reqwest::Client,
    config: AuthConfig,
}

impl HttpAuthClient {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn begin_registration(&self) -> Result<Registration, GuideError> {
        let response = self
            .http
            .post(self.url("registration"))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    GuideError::NoNetwork
                } else {
                    GuideError::Authentication(e.to_string())
                }
            })?;
        if !response.status().is_success() {
            return Err(GuideError::Authentication(format!(
                "registration failed: HTTP {}",
                response.status()
            )));
        }
        let wire: WireRegistration = response
            .json()
            .await
            .map_err(|e| GuideError::Authentication(e.to_string()))?;
        Ok(Registration {
            code: wire.code,
            expires_at: wire.expires_at,
        })
    }

    async fn activate(
        &self,
        provider_id: &str,
        registration: &Registration,
    ) -> Result<Activation, GuideError> {
        let response = self
            .http
            .post(self.url("activation"))
            .json(&serde_json::json!({
                "provider_id": provider_id,
                "code": registration.code,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    GuideError::NoNetwork
                } else {
                    GuideError::Authentication(e.to_string())
                }
            })?;
        if !response.status().is_success() {
            return Err(GuideError::Authentication(format!(
                "activation failed: HTTP {}",
                response.status()
            )));
        }
        let wire: WireActivation = response
            .json()
            .await
            .map_err(|e| GuideError::Authentication(e.to_string()))?;
        Ok(Activation {
            provider_id: provider_id.to_string(),
            expires_at: wire.expires_at,
        })
    }

    async fn deauthorize(&self) {
        // best-effort: a failed deauthorize leaves only upstream state behind
        if let Err(e) = self.http.delete(self.url("authorization")).send().await {
            warn!("deauthorize request failed: {}", e);
        }
    }
}

// ── provider directory ────────────────────────────────────────────────────────

/// Display metadata for one pay-TV provider.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub logo_url: String,
    /// Optional account-management portal shown behind the provider logo.
    #[serde(default)]
    pub portal_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderFile {
    provider: Vec<ProviderInfo>,
}

/// Synchronous, pure lookup of provider display metadata keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ProviderDirectory {
    providers: HashMap<String, ProviderInfo>,
}

impl ProviderDirectory {
    /// Load from the configured TOML file; a missing or malformed file
    /// degrades to an empty directory (lookups resolve to empty strings).
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(dir) => dir,
                Err(e) => {
                    warn!("failed to parse provider directory {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let file: ProviderFile = toml::from_str(content)?;
        let providers = file
            .provider
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        Ok(Self { providers })
    }

    /// `(display_name, logo_url)`; unknown ids resolve to empty strings.
    pub fn lookup(&self, provider_id: &str) -> (String, String) {
        match self.providers.get(provider_id) {
            Some(p) => (p.display_name.clone(), p.logo_url.clone()),
            None => (String::new(), String::new()),
        }
    }

    pub fn portal_url(&self, provider_id: &str) -> Option<&str> {
        self.providers
            .get(provider_id)
            .and_then(|p| p.portal_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTORY: &str = r#"
        [[provider]]
        id = "xfinity"
        display_name = "Xfinity"
        logo_url = "https://img.example.net/providers/xfinity.png"
        portal_url = "https://www.xfinity.com/account"

        [[provider]]
        id = "fios"
        display_name = "Verizon Fios"
    "#;

    #[test]
    fn test_parse_and_lookup() {
        let dir = ProviderDirectory::parse(DIRECTORY).unwrap();
        let (name, logo) = dir.lookup("xfinity");
        assert_eq!(name, "Xfinity");
        assert!(logo.ends_with("xfinity.png"));
        assert_eq!(dir.portal_url("xfinity"), Some("https://www.xfinity.com/account"));

        let (name, logo) = dir.lookup("fios");
        assert_eq!(name, "Verizon Fios");
        assert!(logo.is_empty());
        assert!(dir.portal_url("fios").is_none());
    }

    #[test]
    fn test_unknown_provider_resolves_empty() {
        let dir = ProviderDirectory::parse(DIRECTORY).unwrap();
        assert_eq!(dir.lookup("nosuch"), (String::new(), String::new()));
        assert_eq!(dir.lookup(""), (String::new(), String::new()));
    }
}
