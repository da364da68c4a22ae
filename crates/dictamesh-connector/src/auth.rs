//! Authentication providers that inject credentials into outgoing
//! requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ConnectorError;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Injects credentials into `req`, refreshing first if needed.
    async fn authenticate(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ConnectorError>;

    /// Forces a token refresh regardless of the current expiry window.
    async fn refresh_token(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// API key carried in a configurable request header.
pub struct ApiKeyAuth {
    header_name: String,
    key: String,
}

impl ApiKeyAuth {
    pub fn new(header_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self { header_name: header_name.into(), key: key.into() }
    }
}

#[async_trait]
impl AuthProvider for ApiKeyAuth {
    async fn authenticate(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ConnectorError> {
        Ok(req.header(self.header_name.clone(), self.key.clone()))
    }
}

pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

#[async_trait]
impl AuthProvider for BasicAuth {
    async fn authenticate(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ConnectorError> {
        Ok(req.basic_auth(self.username.clone(), Some(self.password.clone())))
    }
}

pub struct BearerTokenAuth {
    token: String,
}

impl BearerTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AuthProvider for BearerTokenAuth {
    async fn authenticate(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ConnectorError> {
        Ok(req.bearer_auth(self.token.clone()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// OAuth2 client-credentials flow with proactive refresh before the token
/// expiry window.
pub struct OAuth2Auth {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    /// How long before expiry a refresh is triggered.
    refresh_window: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl OAuth2Auth {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_window: Duration,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_window,
            cached: RwLock::new(None),
        }
    }

    async fn fetch_token(&self) -> Result<CachedToken, ConnectorError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await
            .map_err(|e| ConnectorError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ConnectorError::AuthFailed("token endpoint rejected client credentials".into()));
        }
        if !response.status().is_success() {
            return Err(ConnectorError::Unavailable(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::BadRequest(e.to_string()))?;
        Ok(CachedToken {
            access_token: body.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in as i64),
        })
    }

    async fn valid_token(&self) -> Result<String, ConnectorError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                let refresh_at = token.expires_at
                    - chrono::Duration::from_std(self.refresh_window).unwrap_or_default();
                if Utc::now() < refresh_at {
                    return Ok(token.access_token.clone());
                }
            }
        }
        let fresh = self.fetch_token().await?;
        let token = fresh.access_token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(token)
    }
}

#[async_trait]
impl AuthProvider for OAuth2Auth {
    async fn authenticate(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ConnectorError> {
        let token = self.valid_token().await?;
        Ok(req.bearer_auth(token))
    }

    async fn refresh_token(&self) -> Result<(), ConnectorError> {
        let fresh = self.fetch_token().await?;
        *self.cached.write().await = Some(fresh);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Signed JWT auth, regenerated when the remaining lifetime drops below
/// `refresh_window`.
pub struct SignedJwtAuth {
    issuer: String,
    subject: String,
    signing_key: EncodingKey,
    lifetime: Duration,
    refresh_window: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl SignedJwtAuth {
    pub fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        signing_key: EncodingKey,
        lifetime: Duration,
        refresh_window: Duration,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            signing_key,
            lifetime,
            refresh_window,
            cached: RwLock::new(None),
        }
    }

    fn mint(&self) -> Result<CachedToken, ConnectorError> {
        let now = Utc::now();
        let exp = now + chrono::Duration::from_std(self.lifetime).unwrap_or_default();
        let claims = JwtClaims {
            iss: self.issuer.clone(),
            sub: self.subject.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let token = encode(&Header::new(jsonwebtoken::Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| ConnectorError::Internal(e.into()))?;
        Ok(CachedToken { access_token: token, expires_at: exp })
    }
}

#[async_trait]
impl AuthProvider for SignedJwtAuth {
    async fn authenticate(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ConnectorError> {
        let needs_refresh = {
            let cached = self.cached.read().await;
            match cached.as_ref() {
                Some(token) => {
                    let refresh_at = token.expires_at
                        - chrono::Duration::from_std(self.refresh_window).unwrap_or_default();
                    Utc::now() >= refresh_at
                }
                None => true,
            }
        };
        if needs_refresh {
            let fresh = self.mint()?;
            *self.cached.write().await = Some(fresh);
        }
        let token = self.cached.read().await.as_ref().unwrap().access_token.clone();
        Ok(req.bearer_auth(token))
    }

    async fn refresh_token(&self) -> Result<(), ConnectorError> {
        let fresh = self.mint()?;
        *self.cached.write().await = Some(fresh);
        Ok(())
    }
}

pub type SharedAuth = Arc<dyn AuthProvider>;
