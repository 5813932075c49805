//! Account lookup by email.

use async_trait::async_trait;
use core_config::firebase::FirebaseConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::LookupError;
use crate::models::{Account, EmailAddress};

/// Read-only view of the account directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Find the account registered under `email`.
    ///
    /// Returns `LookupError::NotFound` only when the directory positively
    /// answered that no such account exists.
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Account, LookupError>;
}

/// In-memory implementation of AccountDirectory (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountDirectory {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account under its email (case-insensitive).
    pub async fn insert(&self, account: Account) {
        let key = account.email.clone().unwrap_or_default().to_lowercase();
        self.accounts.write().await.insert(key, account);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Account, LookupError> {
        let accounts = self.accounts.read().await;
        accounts
            .get(&email.as_str().to_lowercase())
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

/// Identity Toolkit `accounts:lookup` implementation of AccountDirectory.
#[derive(Debug, Clone)]
pub struct FirebaseAccountDirectory {
    client: reqwest::Client,
    config: FirebaseConfig,
}

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    email: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<Account>,
}

impl FirebaseAccountDirectory {
    pub fn new(client: reqwest::Client, config: FirebaseConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl AccountDirectory for FirebaseAccountDirectory {
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Account, LookupError> {
        let mut request = self
            .client
            .post(self.config.accounts_lookup_url())
            .json(&LookupRequest {
                email: [email.as_str()],
            });
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;

        first_account(body)
    }
}

fn classify_status(status: u16, body: String) -> LookupError {
    let detail = format!("status {status}: {body}");
    if status >= 500 || status == 429 {
        LookupError::Unavailable(detail)
    } else {
        LookupError::Rejected(detail)
    }
}

// An empty (or absent) `users` list is the directory's "no such account".
fn first_account(body: LookupResponse) -> Result<Account, LookupError> {
    body.users.into_iter().next().ok_or(LookupError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sam() -> Account {
        Account {
            uid: "u1".into(),
            email: Some("Sam@Example.com".into()),
            display_name: Some("Sam".into()),
        }
    }

    #[tokio::test]
    async fn test_in_memory_lookup_is_case_insensitive() {
        let directory = InMemoryAccountDirectory::new();
        directory.insert(sam()).await;

        let email = EmailAddress::parse("sam@example.com").unwrap();
        let account = directory.find_by_email(&email).await.unwrap();
        assert_eq!(account.uid, "u1");
    }

    #[tokio::test]
    async fn test_in_memory_lookup_not_found() {
        let directory = InMemoryAccountDirectory::new();
        let email = EmailAddress::parse("nobody@example.com").unwrap();
        assert_eq!(
            directory.find_by_email(&email).await.unwrap_err(),
            LookupError::NotFound
        );
    }

    #[tokio::test]
    async fn test_mock_directory_reports_outage() {
        let mut directory = MockAccountDirectory::new();
        directory
            .expect_find_by_email()
            .returning(|_| Err(LookupError::Unavailable("503".into())));

        let email = EmailAddress::parse("sam@example.com").unwrap();
        let err = directory.find_by_email(&email).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_lookup_response_maps_users() {
        let body: LookupResponse = serde_json::from_value(json!({
            "kind": "identitytoolkit#GetAccountInfoResponse",
            "users": [{ "localId": "u1", "email": "sam@example.com", "displayName": "Sam" }]
        }))
        .unwrap();

        let account = first_account(body).unwrap();
        assert_eq!(account.uid, "u1");
        assert_eq!(account.greeting_name(), "Sam");
    }

    #[test]
    fn test_lookup_response_without_users_is_not_found() {
        let body: LookupResponse =
            serde_json::from_value(json!({ "kind": "identitytoolkit#GetAccountInfoResponse" }))
                .unwrap();
        assert_eq!(first_account(body).unwrap_err(), LookupError::NotFound);
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(503, String::new()), LookupError::Unavailable(_)));
        assert!(matches!(classify_status(429, String::new()), LookupError::Unavailable(_)));
        assert!(matches!(classify_status(403, String::new()), LookupError::Rejected(_)));
        assert!(!classify_status(404, String::new()).is_not_found());
    }

    #[test]
    fn test_lookup_request_shape() {
        let body = serde_json::to_value(LookupRequest {
            email: ["sam@example.com"],
        })
        .unwrap();
        assert_eq!(body, json!({ "email": ["sam@example.com"] }));
    }
}
