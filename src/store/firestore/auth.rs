//! Access tokens for the Firestore REST API.
//!
//! Production requests carry an OAuth2 bearer token obtained by signing a
//! service-account JWT and exchanging it at the token endpoint. The token
//! is cached and refreshed a minute before it expires. The emulator accepts
//! the fixed token `owner`, which grants admin access.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::config::ServiceAccountKey;
use crate::store::StoreError;

const SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub enum Credentials {
    /// A fixed bearer token, sent as-is.
    Static(String),
    ServiceAccount(ServiceAccountKey),
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub(crate) struct TokenSource {
    http: reqwest::Client,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub(crate) fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self { http, credentials, cached: Mutex::new(None) }
    }

    pub(crate) async fn token(&self) -> Result<String, StoreError> {
        let key = match &self.credentials {
            Credentials::Static(token) => return Ok(token.clone()),
            Credentials::ServiceAccount(key) => key,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange(key).await?;
        let value = fresh.access_token.clone();
        *cached = Some(CachedToken {
            value: fresh.access_token,
            expires_at: Instant::now() + Duration::from_secs(fresh.expires_in),
        });
        Ok(value)
    }

    async fn exchange(&self, key: &ServiceAccountKey) -> Result<TokenResponse, StoreError> {
        let assertion = sign_assertion(key, Utc::now().timestamp())?;
        let res = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!(
                "token exchange failed with {status}: {body}"
            )));
        }
        Ok(res.json().await?)
    }
}

fn sign_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, StoreError> {
    let claims = Claims {
        iss: &key.client_email,
        scope: SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| StoreError::Backend(format!("invalid service account key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| StoreError::Backend(format!("failed to sign token assertion: {e}")))
}
