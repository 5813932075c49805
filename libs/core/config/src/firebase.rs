use crate::{ConfigError, FromEnv, env_or_default, env_required};
use std::fmt;

pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Firebase project settings for the document store and account directory adapters.
#[derive(Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    /// OAuth2 bearer token. Emulators accept requests without one.
    pub access_token: Option<String>,
    pub firestore_base_url: String,
    pub identity_toolkit_base_url: String,
}

impl FirebaseConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: None,
            firestore_base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
            identity_toolkit_base_url: DEFAULT_IDENTITY_TOOLKIT_BASE_URL.to_string(),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// `.../projects/{id}/databases/(default)/documents`
    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.firestore_base_url.trim_end_matches('/'),
            self.project_id
        )
    }

    /// `.../projects/{id}/accounts:lookup`
    pub fn accounts_lookup_url(&self) -> String {
        format!(
            "{}/projects/{}/accounts:lookup",
            self.identity_toolkit_base_url.trim_end_matches('/'),
            self.project_id
        )
    }
}

impl fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("project_id", &self.project_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("firestore_base_url", &self.firestore_base_url)
            .field("identity_toolkit_base_url", &self.identity_toolkit_base_url)
            .finish()
    }
}

impl FromEnv for FirebaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            project_id: env_required("FIREBASE_PROJECT_ID")?,
            access_token: std::env::var("FIREBASE_ACCESS_TOKEN").ok(),
            firestore_base_url: env_or_default("FIRESTORE_BASE_URL", DEFAULT_FIRESTORE_BASE_URL),
            identity_toolkit_base_url: env_or_default(
                "IDENTITY_TOOLKIT_BASE_URL",
                DEFAULT_IDENTITY_TOOLKIT_BASE_URL,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firebase_config_urls() {
        let config = FirebaseConfig::new("event-mate");
        assert_eq!(
            config.documents_url(),
            "https://firestore.googleapis.com/v1/projects/event-mate/databases/(default)/documents"
        );
        assert_eq!(
            config.accounts_lookup_url(),
            "https://identitytoolkit.googleapis.com/v1/projects/event-mate/accounts:lookup"
        );
    }

    #[test]
    fn test_firebase_config_from_env_emulator() {
        temp_env::with_vars(
            [
                ("FIREBASE_PROJECT_ID", Some("demo-project")),
                ("FIREBASE_ACCESS_TOKEN", None),
                ("FIRESTORE_BASE_URL", Some("http://localhost:8080/v1/")),
                (
                    "IDENTITY_TOOLKIT_BASE_URL",
                    Some("http://localhost:9099/identitytoolkit.googleapis.com/v1"),
                ),
            ],
            || {
                let config = FirebaseConfig::from_env().unwrap();
                assert!(config.access_token.is_none());
                assert_eq!(
                    config.documents_url(),
                    "http://localhost:8080/v1/projects/demo-project/databases/(default)/documents"
                );
                assert!(config.accounts_lookup_url().starts_with("http://localhost:9099/"));
            },
        );
    }

    #[test]
    fn test_firebase_config_requires_project() {
        temp_env::with_var_unset("FIREBASE_PROJECT_ID", || {
            let err = FirebaseConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("FIREBASE_PROJECT_ID"));
        });
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = FirebaseConfig::new("p").with_access_token("ya29.secret");
        assert!(!format!("{:?}", config).contains("ya29.secret"));
    }
}
