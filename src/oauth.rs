//! OAuth 2.0 authorization code flow against the Spotify accounts service.
//!
//! The flow has three stages:
//! 1. Without a cached token, the user opens the [authorize URL](authorize_url)
//!    in a browser, grants access and pastes the URL the browser was
//!    redirected to.
//! 2. The code in that URL is [exchanged](exchange_code) for an access and
//!    refresh token pair, which is written to the token cache.
//! 3. Expired access tokens are [refreshed](refresh) with the refresh token,
//!    without user interaction.
//!
//! # Token Cache
//!
//! The cache is a JSON file holding a single [`Token`]. It is created with
//! owner-only permissions on Unix because it grants access to the account.

use std::{fs, io, path::Path, time::SystemTime};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Url,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{self, auth::Token},
    secrets::Credentials,
};

/// Where users grant access to the application.
const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";

/// Where codes and refresh tokens are exchanged for access tokens.
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Builds the URL the user has to visit to authorize the application.
///
/// # Errors
///
/// Returns `Internal` if the authorize URL cannot be parsed.
pub fn authorize_url(config: &Config, credentials: &Credentials, state: &str) -> Result<Url> {
    let mut url = Url::parse(AUTHORIZE_URL)?;
    url.query_pairs_mut()
        .append_pair("client_id", &credentials.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("scope", &config.scope())
        .append_pair("state", state);

    Ok(url)
}

/// Extracts the authorization code from the URL the browser was redirected
/// to.
///
/// # Errors
///
/// Returns an error if:
/// * `redirected` is not a URL
/// * the `state` parameter does not match `expected_state`
/// * the user denied access
/// * the URL carries no code
pub fn parse_redirect(redirected: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(redirected.trim())
        .map_err(|e| Error::invalid_argument(format!("redirect URL invalid: {e}")))?;

    let mut code = None;
    let mut state = None;
    let mut denied = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => denied = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(Error::permission_denied(
            "redirect URL state does not match the authorization request",
        ));
    }

    if let Some(reason) = denied {
        return Err(Error::permission_denied(format!(
            "authorization denied: {reason}"
        )));
    }

    code.ok_or_else(|| Error::invalid_argument("redirect URL carries no code"))
}

/// Asks the user to authorize the application and returns the code.
///
/// Prints the authorize URL and reads the redirected URL from standard
/// input.
///
/// # Errors
///
/// Returns `Cancelled` when standard input is closed, or any error of
/// [`parse_redirect`].
pub async fn authorize(config: &Config, credentials: &Credentials) -> Result<String> {
    let state = uuid::Uuid::new_v4().simple().to_string();
    let url = authorize_url(config, credentials, &state)?;

    println!("Open this URL in your browser and grant access:\n\n    {url}\n");
    println!("Then paste the URL you were redirected to and press Enter:");

    let mut line = String::new();
    let read = BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    if read == 0 {
        return Err(Error::cancelled("no redirect URL entered"));
    }

    parse_redirect(&line, &state)
}

/// Exchanges an authorization code for a token pair.
///
/// # Errors
///
/// Returns an error if the request fails or the accounts service rejects
/// the code.
pub async fn exchange_code(
    http_client: &HttpClient,
    config: &Config,
    credentials: &Credentials,
    code: &str,
) -> Result<Token> {
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", code)
        .append_pair("redirect_uri", &config.redirect_uri)
        .finish();

    request_token(http_client, credentials, form).await
}

/// Obtains a new access token with the refresh token of `token`.
///
/// The refresh token is kept when the response does not carry a new one.
///
/// # Errors
///
/// Returns `Unauthenticated` if `token` has no refresh token, or an error
/// if the request fails or the accounts service rejects the refresh token.
pub async fn refresh(
    http_client: &HttpClient,
    credentials: &Credentials,
    token: &Token,
) -> Result<Token> {
    let refresh_token = token
        .refresh_token
        .as_deref()
        .ok_or_else(|| Error::unauthenticated("token cache holds no refresh token"))?;

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "refresh_token")
        .append_pair("refresh_token", refresh_token)
        .finish();

    let refreshed = request_token(http_client, credentials, form).await?;
    debug!("access token refreshed");

    Ok(refreshed.inherit_refresh_token(token))
}

async fn request_token(
    http_client: &HttpClient,
    credentials: &Credentials,
    form: String,
) -> Result<Token> {
    let basic = format!("{}:{}", credentials.client_id, credentials.client_secret);
    let basic = HeaderValue::from_str(&format!("Basic {}", BASE64.encode(basic)))?;

    let mut request = http_client.post(Url::parse(TOKEN_URL)?, form);
    let headers = request.headers_mut();
    headers.insert(AUTHORIZATION, basic);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );

    let response = http_client.execute(request).await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        // The accounts service answers rejected grants with 400, which is
        // an authentication failure from our point of view.
        let message = protocol::error_message(&body);
        return Err(match status.as_u16() {
            400 | 401 => Error::unauthenticated(format!("{status}: {message}")),
            _ => Error::from_status(status, &message),
        });
    }

    let token: Token = protocol::json(&body, "token")?;
    Ok(token.issued_at(SystemTime::now()))
}

/// Reads the token cache.
///
/// Returns `Ok(None)` when there is no cache yet.
///
/// # Errors
///
/// Returns an error if the cache exists but cannot be read or parsed.
pub fn load_cache<P: AsRef<Path>>(path: P) -> Result<Option<Token>> {
    match fs::read_to_string(path.as_ref()) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `token` to the token cache, replacing what was there.
///
/// # Errors
///
/// Returns an error if the cache cannot be written.
pub fn save_cache<P: AsRef<Path>>(path: P, token: &Token) -> Result<()> {
    let json = serde_json::to_string(token)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path.as_ref())?;
    io::Write::write_all(&mut file, json.as_bytes())?;
    trace!("token cache written to {}", path.as_ref().display());

    Ok(())
}
