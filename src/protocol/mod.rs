//! Wire types for the Spotify accounts service and Web API.
//!
//! # Submodules
//!
//! * [`auth`] - OAuth token responses and the on-disk token cache
//! * [`player`] - Playback state of the current user
//! * [`user`] - Profile of the current user
//!
//! Both services report failures in a JSON body next to the HTTP status.
//! The accounts service uses the flat OAuth form ([`AuthError`]), the Web API
//! wraps its errors in an object ([`ApiError`]).

pub mod auth;
pub mod player;
pub mod user;

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::Result;

/// Parses and logs JSON responses from Spotify.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of API endpoint for logging
///
/// # Errors
///
/// Returns error if:
/// * Response body is not valid JSON
/// * JSON structure doesn't match type `T`
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}

/// Error body of the accounts service.
///
/// ```json
/// {
///     "error": "invalid_grant",
///     "error_description": "Refresh token revoked"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Error body of the Web API.
///
/// ```json
/// {
///     "error": {
///         "status": 401,
///         "message": "The access token expired"
///     }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiErrorDetail {
    pub status: u16,
    pub message: String,
}

/// Extracts a human readable message from an error response body.
///
/// Falls back to the raw body when it matches neither error format.
#[must_use]
pub fn error_message(body: &str) -> String {
    if let Ok(api) = serde_json::from_str::<ApiError>(body) {
        return api.error.message;
    }

    if let Ok(auth) = serde_json::from_str::<AuthError>(body) {
        return match auth.error_description {
            Some(description) => format!("{} ({description})", auth.error),
            None => auth.error,
        };
    }

    body.trim().to_owned()
}
