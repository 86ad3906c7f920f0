// =============================================================================
// GOOGLE CLOUD AUTHENTICATION
// =============================================================================
//
// Access tokens for the Cloud Storage JSON API.
//
// **Credential sources, first match wins:**
// - `GOOGLE_SERVICE_ACCOUNT_KEY` - path to a service account JSON key
// - `GOOGLE_SERVICE_ACCOUNT_JSON` - the key content itself
// - `GOOGLE_SERVICE_ACCOUNT_JSON_B64` - the key content, base64 encoded
// - none of the above: the GCE / Cloud Run metadata server
//
// Service account keys use the JWT bearer flow: a self-signed RS256 assertion
// is exchanged at the key's `token_uri` for a short-lived access token.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Invalid service account credentials: {0}")]
    Credentials(String),

    #[error("Token request failed: {0}")]
    Token(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

/// Shape shared by the OAuth token endpoint and the metadata server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

enum CredentialSource {
    ServiceAccount(ServiceAccountCredentials),
    MetadataServer,
}

/// Hands out bearer tokens, caching each one until shortly before it expires.
pub struct GoogleAuth {
    source: CredentialSource,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl GoogleAuth {
    pub async fn from_file(path: &str, client: Client) -> Result<Self, GoogleError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GoogleError::Credentials(format!("{}: {}", path, e)))?;
        Self::from_json(&content, client)
    }

    pub fn from_json(json: &str, client: Client) -> Result<Self, GoogleError> {
        let credentials: ServiceAccountCredentials =
            serde_json::from_str(json).map_err(|e| GoogleError::Credentials(e.to_string()))?;
        info!(account = %credentials.client_email, "Using service account credentials");
        Ok(Self::with_source(CredentialSource::ServiceAccount(credentials), client))
    }

    pub fn from_base64_json(encoded: &str, client: Client) -> Result<Self, GoogleError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| GoogleError::Credentials(format!("base64: {}", e)))?;
        let json = String::from_utf8(decoded)
            .map_err(|e| GoogleError::Credentials(format!("utf-8: {}", e)))?;
        Self::from_json(&json, client)
    }

    pub fn metadata_server(client: Client) -> Self {
        info!("No service account key configured, using the metadata server");
        Self::with_source(CredentialSource::MetadataServer, client)
    }

    pub async fn from_env(client: Client) -> Result<Self, GoogleError> {
        if let Ok(path) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            return Self::from_file(&path, client).await;
        }

        if let Ok(json) = std::env::var("GOOGLE_SERVICE_ACCOUNT_JSON") {
            return Self::from_json(&json, client);
        }

        if let Ok(encoded) = std::env::var("GOOGLE_SERVICE_ACCOUNT_JSON_B64") {
            return Self::from_base64_json(&encoded, client);
        }

        Ok(Self::metadata_server(client))
    }

    fn with_source(source: CredentialSource, client: Client) -> Self {
        Self {
            source,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String, GoogleError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + EXPIRY_MARGIN {
                    return Ok(token.token.clone());
                }
            }
        }

        let fresh = match &self.source {
            CredentialSource::ServiceAccount(credentials) => {
                self.fetch_service_account_token(credentials).await?
            }
            CredentialSource::MetadataServer => self.fetch_metadata_token().await?,
        };
        debug!(expires_in = fresh.expires_in, "Fetched new access token");

        let mut cached = self.cached_token.write().await;
        *cached = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at: SystemTime::now() + Duration::from_secs(fresh.expires_in),
        });

        Ok(fresh.access_token)
    }

    async fn fetch_service_account_token(
        &self,
        credentials: &ServiceAccountCredentials,
    ) -> Result<TokenResponse, GoogleError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GoogleError::Token(e.to_string()))?
            .as_secs();

        let claims = JwtClaims {
            iss: credentials.client_email.clone(),
            scope: STORAGE_SCOPE.to_string(),
            aud: credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| GoogleError::Credentials(e.to_string()))?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| GoogleError::Credentials(e.to_string()))?;

        let response = self
            .client
            .post(&credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?;

        Self::read_token(response).await
    }

    async fn fetch_metadata_token(&self) -> Result<TokenResponse, GoogleError> {
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        Self::read_token(response).await
    }

    async fn read_token(response: reqwest::Response) -> Result<TokenResponse, GoogleError> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GoogleError::Token(format!("{}: {}", status, text)));
        }

        Ok(response.json().await?)
    }
}
