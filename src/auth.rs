// OAuth access tokens for Google REST APIs. A token is fetched on every call;
// nothing is cached between scrapes.

use std::path::Path;

use crate::config::GcpCredentials;
use crate::error::{Result, SourceError};

pub const BIGQUERY_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/bigquery.readonly",
    "https://www.googleapis.com/auth/cloud-platform.read-only",
];

pub const MONITORING_SCOPES: &[&str] = &["https://www.googleapis.com/auth/monitoring.read"];

pub const BILLING_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-billing.readonly",
    "https://www.googleapis.com/auth/cloud-platform.read-only",
];

#[derive(Debug, Clone)]
pub struct GcpAuth {
    credentials: GcpCredentials,
    scopes: &'static [&'static str],
}

impl GcpAuth {
    pub fn new(credentials: GcpCredentials, scopes: &'static [&'static str]) -> Self {
        Self {
            credentials,
            scopes,
        }
    }

    /// Value for the `Authorization` header.
    pub async fn authorization(&self) -> Result<String> {
        let token = self.access_token().await?;
        Ok(bearer(&token))
    }

    async fn access_token(&self) -> Result<String> {
        match &self.credentials {
            GcpCredentials::AccessToken { token } => Ok(token.clone()),
            GcpCredentials::Default => {
                let config = google_cloud_auth::project::Config::default().with_scopes(self.scopes);
                let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new(config)
                    .await
                    .map_err(|e| {
                        SourceError::Auth(format!("Failed to create token source: {}", e))
                    })?;
                token_from_provider(&ts).await
            }
            GcpCredentials::ServiceAccount { key_path } => {
                self.token_from_service_account_file(Path::new(key_path))
                    .await
            }
        }
    }

    async fn token_from_service_account_file(&self, key_path: &Path) -> Result<String> {
        use google_cloud_auth::credentials::CredentialsFile;

        let key_json = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            SourceError::Auth(format!(
                "Failed to read service account key file '{}': {}",
                key_path.display(),
                e
            ))
        })?;
        let creds: CredentialsFile = serde_json::from_str(&key_json).map_err(|e| {
            SourceError::Auth(format!("Failed to parse service account JSON: {}", e))
        })?;

        let config = google_cloud_auth::project::Config::default().with_scopes(self.scopes);
        let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new_with_credentials(
            config,
            Box::new(creds),
        )
        .await
        .map_err(|e| {
            SourceError::Auth(format!(
                "Failed to create token source from service account: {}",
                e
            ))
        })?;
        token_from_provider(&ts).await
    }
}

async fn token_from_provider(
    ts: &google_cloud_auth::token::DefaultTokenSourceProvider,
) -> Result<String> {
    use google_cloud_token::TokenSourceProvider;

    ts.token_source()
        .token()
        .await
        .map_err(|e| SourceError::Auth(format!("Failed to get token: {}", e)))
}

/// Token sources may already return `Bearer <token>`.
fn bearer(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}
