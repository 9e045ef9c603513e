use std::error::Error as StdError;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::client::connect::Connection;
use hyper::client::HttpConnector;
use hyper::service::Service;
use hyper::{Client, Uri};
use hyper_rustls::HttpsConnector;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::authorized_user::AuthorizedUserSecret;
use yup_oauth2::{ApplicationSecret, AuthorizedUserAuthenticator};

use crate::error::{GmailError, GmailResult};
use crate::transport::https_client;

/// Full mailbox access scope
pub const GMAIL_SCOPE: &str = "https://mail.google.com/";

/// Short-lived bearer token returned by a token exchange
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= Utc::now())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Anything able to hand out a live access token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn exchange(&self) -> GmailResult<AccessToken>;
}

/// Read the OAuth2 client descriptor downloaded from the Google API console
pub async fn load_application_secret(path: impl AsRef<Path>) -> GmailResult<ApplicationSecret> {
    let path = path.as_ref();
    yup_oauth2::read_application_secret(path)
        .await
        .map_err(|e| {
            GmailError::Config(format!(
                "unable to read OAuth2 client credentials {}: {}",
                path.display(),
                e
            ))
        })
}

/// Exchanges a long-lived refresh token for access tokens
///
/// The authenticator starts without any access token, so the first call to
/// [`TokenSource::exchange`] always performs a refresh-token grant. Later calls
/// reuse the cached token until it expires.
pub struct RefreshTokenSource<S = HttpsConnector<HttpConnector>> {
    auth: Authenticator<S>,
}

impl RefreshTokenSource {
    pub async fn new(secret: ApplicationSecret, refresh_token: &str) -> GmailResult<Self> {
        Self::with_client(secret, refresh_token, https_client()).await
    }

    /// Load the client descriptor at `credentials_path` and pair it with `refresh_token`
    pub async fn from_credentials_file(
        credentials_path: impl AsRef<Path>,
        refresh_token: &str,
    ) -> GmailResult<Self> {
        let secret = load_application_secret(credentials_path).await?;
        debug!("Loaded OAuth2 client {}", secret.client_id);
        Self::new(secret, refresh_token).await
    }
}

impl<S> RefreshTokenSource<S>
where
    S: Service<Uri> + Clone + Send + Sync + 'static,
    S::Response: Connection + AsyncRead + AsyncWrite + Send + Unpin + 'static,
    S::Future: Send + Unpin + 'static,
    S::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    /// Same as [`RefreshTokenSource::new`], talking to the token endpoint through `client`
    pub async fn with_client(
        secret: ApplicationSecret,
        refresh_token: &str,
        client: Client<S>,
    ) -> GmailResult<Self> {
        if refresh_token.trim().is_empty() {
            return Err(GmailError::Auth("refresh token is empty".to_string()));
        }

        // The authorized-user flow always posts to Google's fixed token endpoint:
        // `token_uri` from the client descriptor is not used.
        debug!(
            "Refresh grant for client {} (token_uri {} unused)",
            secret.client_id, secret.token_uri
        );

        let user_secret = AuthorizedUserSecret {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            refresh_token: refresh_token.to_string(),
            key_type: "authorized_user".to_string(),
        };

        let auth = AuthorizedUserAuthenticator::with_client(user_secret, client)
            .build()
            .await
            .map_err(|e| GmailError::Auth(format!("unable to create OAuth2 authenticator: {}", e)))?;

        Ok(Self { auth })
    }
}

#[async_trait]
impl<S> TokenSource for RefreshTokenSource<S>
where
    S: Service<Uri> + Clone + Send + Sync + 'static,
    S::Response: Connection + AsyncRead + AsyncWrite + Send + Unpin + 'static,
    S::Future: Send + Unpin + 'static,
    S::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    async fn exchange(&self) -> GmailResult<AccessToken> {
        let token = self
            .auth
            .token(&[GMAIL_SCOPE])
            .await
            .map_err(|e| GmailError::Auth(format!("token exchange rejected: {}", e)))?;

        let secret = token
            .token()
            .ok_or_else(|| GmailError::Auth("token endpoint returned no access token".to_string()))?
            .to_string();

        let expires_at = token
            .expiration_time()
            .and_then(|expiry| DateTime::from_timestamp(expiry.unix_timestamp(), 0));

        info!("🔐 Access token ready (expires at {:?})", expires_at);

        Ok(AccessToken::new(secret, expires_at))
    }
}
