//! Source of "currently playing" snapshots.
//!
//! [`PlaybackClient`] is the capability the poll loop depends on. [`Client`]
//! implements it against the Spotify Web API; tests substitute scripted
//! implementations.
//!
//! Neither operation retries. Retry policy belongs to the caller, which
//! treats the two failure types differently:
//! * [`ConnectionError`] from [`connect`](PlaybackClient::connect) escalates
//!   into reconnection attempts
//! * [`FetchError`] from [`fetch_currently_playing`](PlaybackClient::fetch_currently_playing)
//!   only affects the poll in which it occurred

use std::{future::Future, time::SystemTime};

use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    StatusCode, Url,
};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    oauth,
    protocol::{self, auth::Token, player::Playback, user::User},
    secrets::Credentials,
    snapshot::Snapshot,
    util,
};

/// Authentication or the connection test failed.
#[derive(Debug, Error)]
#[error("connecting failed: {0}")]
pub struct ConnectionError(#[from] pub Error);

/// Querying what is currently playing failed.
#[derive(Debug, Error)]
#[error("fetching what is playing failed: {0}")]
pub struct FetchError(#[from] pub Error);

/// Access to what a streaming service is currently playing.
pub trait PlaybackClient {
    /// Authenticates with the service.
    ///
    /// May be called again after a failure; each call starts over.
    fn connect(&mut self) -> impl Future<Output = std::result::Result<(), ConnectionError>>;

    /// Queries what is currently playing.
    ///
    /// Returns `None` when nothing is playing, including when playback is
    /// paused or stopped.
    fn fetch_currently_playing(
        &mut self,
    ) -> impl Future<Output = std::result::Result<Option<Snapshot>, FetchError>>;
}

/// Spotify Web API client.
pub struct Client {
    config: Config,
    http_client: HttpClient,
    credentials: Option<Credentials>,
    token: Option<Token>,
}

impl Client {
    /// Base URL of the Web API.
    const API_URL: &'static str = "https://api.spotify.com/v1";

    /// Creates a client that is not yet connected.
    ///
    /// The credentials in `config` are not checked until
    /// [`connect`](PlaybackClient::connect).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let http_client = HttpClient::new(&config)?;

        Ok(Self {
            config,
            http_client,
            credentials: None,
            token: None,
        })
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.token.is_some()
    }

    /// Obtains a usable token from the cache, by refreshing, or by asking
    /// the user to authorize, in that order of preference.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
        let cache_path = self.config.cache_path.clone();

        let cached = match oauth::load_cache(&cache_path) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("ignoring unreadable token cache {}: {e}", cache_path.display());
                None
            }
        };

        // Tokens granted with fewer scopes than requested cannot be
        // refreshed into ones with more, so start over.
        let cached = cached.filter(|token| {
            let sufficient = token.has_scopes(&self.config.scopes);
            if !sufficient {
                info!("cached token lacks requested scopes; authorizing again");
            }
            sufficient
        });

        let token = match cached {
            Some(token) if !token.is_expired_at(SystemTime::now()) => token,
            Some(token) => oauth::refresh(&self.http_client, credentials, &token).await?,
            None => {
                info!(
                    "no token found in {}; starting authorization",
                    cache_path.display()
                );
                let code = oauth::authorize(&self.config, credentials).await?;
                oauth::exchange_code(&self.http_client, &self.config, credentials, &code).await?
            }
        };

        oauth::save_cache(&cache_path, &token)?;
        Ok(token)
    }

    /// Returns a valid access token, refreshing it when it is about to
    /// expire.
    async fn access_token(&mut self) -> Result<String> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| Error::failed_precondition("not connected"))?;

        if token.is_expired_at(SystemTime::now()) {
            let credentials = self
                .credentials
                .as_ref()
                .ok_or_else(|| Error::failed_precondition("not connected"))?;
            let refreshed = oauth::refresh(&self.http_client, credentials, token).await?;
            if let Err(e) = oauth::save_cache(&self.config.cache_path, &refreshed) {
                warn!("could not update token cache: {e}");
            }
            self.token = Some(refreshed);
        }

        self.token
            .as_ref()
            .map(|token| token.access_token.clone())
            .ok_or_else(|| Error::failed_precondition("not connected"))
    }

    /// Forces a refresh before the next request, keeping the refresh token.
    fn flush_access_token(&mut self) {
        if let Some(ref mut token) = self.token {
            token.expires_at = None;
        }
    }

    /// Performs an authenticated GET request on the Web API.
    ///
    /// Returns `Ok(None)` for `204 No Content`.
    async fn get<T>(&mut self, path: &str, query: &[(&str, &str)]) -> Result<Option<T>>
    where
        T: std::fmt::Debug + for<'de> Deserialize<'de>,
    {
        // Check the URL early to not needlessly hit the rate limiter.
        let mut url = Url::parse(&format!("{}{path}", Self::API_URL))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let access_token = self.access_token().await?;
        let mut request = self.http_client.get(url, "");
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))?,
        );

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NO_CONTENT || (status.is_success() && body.trim().is_empty()) {
            return Ok(None);
        }

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.flush_access_token();
            }
            return Err(Error::from_status(status, &protocol::error_message(&body)));
        }

        protocol::json(&body, path).map(Some)
    }
}

impl PlaybackClient for Client {
    async fn connect(&mut self) -> std::result::Result<(), ConnectionError> {
        self.token = None;

        let credentials = self.config.credentials.resolve()?;
        let token = self.authenticate(&credentials).await?;
        self.credentials = Some(credentials);
        self.token = Some(token);

        // Verify that the token is accepted by the Web API.
        match self.get::<User>("/me", &[]).await {
            Ok(Some(user)) => {
                info!("authenticated as {}", user.name());
                Ok(())
            }
            Ok(None) => {
                self.token = None;
                Err(Error::data_loss("no user profile received").into())
            }
            Err(e) => {
                self.token = None;
                Err(e.into())
            }
        }
    }

    async fn fetch_currently_playing(
        &mut self,
    ) -> std::result::Result<Option<Snapshot>, FetchError> {
        let market = self.config.market.clone();
        let playback = self
            .get::<Playback>("/me/player", &[("market", market.as_str())])
            .await?;

        Ok(playback.and_then(|playback| Snapshot::from_playback(&playback, util::now_from_epoch())))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{error::ErrorKind, secrets::CredentialSource};

    fn client_with(credentials: CredentialSource) -> Client {
        Client::new(Config::with_credentials(credentials).unwrap()).unwrap()
    }

    fn client() -> Client {
        client_with(CredentialSource {
            client_id: Some("0123456789abcdef0123456789abcdef".to_owned()),
            client_secret: Some("fedcba9876543210fedcba9876543210".to_owned()),
            secrets_file: None,
        })
    }

    #[tokio::test]
    async fn missing_credentials_fail_connect() {
        let mut client = client_with(CredentialSource {
            secrets_file: Some(PathBuf::from("/nonexistent/secrets.toml")),
            ..CredentialSource::default()
        });

        let ConnectionError(err) = client.connect().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
        assert!(err.to_string().contains("SPOTIPY_CLIENT_ID"));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn malformed_credentials_fail_connect() {
        let mut client = client_with(CredentialSource {
            client_id: Some("not-a-client-id".to_owned()),
            client_secret: Some("fedcba9876543210fedcba9876543210".to_owned()),
            secrets_file: None,
        });

        let ConnectionError(err) = client.connect().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn lone_client_id_fails_connect() {
        let mut client = client_with(CredentialSource {
            client_id: Some("0123456789abcdef0123456789abcdef".to_owned()),
            ..CredentialSource::default()
        });

        let ConnectionError(err) = client.connect().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn fetch_before_connect_fails_without_network() {
        let mut client = client();
        assert!(!client.is_connected());

        let FetchError(err) = client.fetch_currently_playing().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    }

    #[test]
    fn errors_describe_their_stage() {
        let err = ConnectionError(Error::unauthenticated("refresh token revoked"));
        assert_eq!(
            err.to_string(),
            "connecting failed: no valid authentication credentials: refresh token revoked"
        );

        let err = FetchError(Error::unavailable("503"));
        assert!(err.to_string().starts_with("fetching what is playing failed"));
    }
}
