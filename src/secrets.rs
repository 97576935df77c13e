//! Client credentials loaded from a secrets file.
//!
//! The file is TOML with two keys:
//!
//! ```toml
//! client_id = "0123456789abcdef0123456789abcdef"
//! client_secret = "fedcba9876543210fedcba9876543210"
//! ```
//!
//! Both values are issued by the Spotify developer dashboard. Keep the file
//! private: the secret grants token exchanges on behalf of the application.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use veil::Redact;

use crate::error::{Error, Result};

/// Maximum size of a secrets file in bytes.
///
/// Prevents an out-of-memory condition when pointed at the wrong file.
const MAX_FILE_SIZE: u64 = 1024;

/// Length of Spotify client ids and secrets.
const CREDENTIAL_LENGTH: usize = 32;

/// Application credentials for the OAuth token endpoint.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Redact)]
pub struct Credentials {
    pub client_id: String,

    #[redact]
    pub client_secret: String,
}

impl Credentials {
    /// Creates credentials, validating their shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when either value is not a 32 character
    /// hexadecimal string.
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self> {
        let credentials = Self {
            client_id: client_id.trim().to_owned(),
            client_secret: client_secret.trim().to_owned(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            let chars = value.chars().count();
            if chars != CREDENTIAL_LENGTH {
                return Err(Error::invalid_argument(format!(
                    "{name} should be {CREDENTIAL_LENGTH} characters long but is {chars}"
                )));
            }

            if !value.chars().all(|chr| chr.is_ascii_hexdigit()) {
                return Err(Error::invalid_argument(format!(
                    "{name} should be hexadecimal"
                )));
            }
        }

        Ok(())
    }

    /// Loads credentials from a TOML secrets file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file:
    /// * does not exist or cannot be read
    /// * is larger than 1 KiB
    /// * is not valid TOML or lacks either key
    /// * carries malformed credentials
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_size = fs::metadata(path)?.len();
        if file_size > MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let credentials: Self = toml::from_str(&contents)?;
        Self::new(&credentials.client_id, &credentials.client_secret)
    }
}

/// Where the credentials come from, before they are checked.
///
/// Values passed on the command line or in the environment win over the
/// secrets file. Nothing is read or validated until [`resolve`](Self::resolve)
/// is called.
#[derive(Clone, Default, PartialEq, Eq, Redact)]
pub struct CredentialSource {
    pub client_id: Option<String>,

    #[redact]
    pub client_secret: Option<String>,

    pub secrets_file: Option<PathBuf>,
}

impl CredentialSource {
    /// Turns the configured values into checked credentials.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when only one of the two values is set, or
    /// when neither is set and there is no readable secrets file. Returns
    /// the errors of [`Credentials::new`] and [`Credentials::from_file`]
    /// otherwise.
    pub fn resolve(&self) -> Result<Credentials> {
        match (&self.client_id, &self.client_secret) {
            (Some(client_id), Some(client_secret)) => Credentials::new(client_id, client_secret),
            (Some(_), None) => Err(Error::unauthenticated(
                "client id set without client secret (SPOTIPY_CLIENT_SECRET)",
            )),
            (None, Some(_)) => Err(Error::unauthenticated(
                "client secret set without client id (SPOTIPY_CLIENT_ID)",
            )),
            (None, None) => {
                let Some(ref path) = self.secrets_file else {
                    return Err(Error::unauthenticated(
                        "no client credentials: set SPOTIPY_CLIENT_ID and SPOTIPY_CLIENT_SECRET",
                    ));
                };

                Credentials::from_file(path).map_err(|e| {
                    if e.downcast::<io::Error>()
                        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
                    {
                        Error::unauthenticated(format!(
                            "no client credentials: set SPOTIPY_CLIENT_ID and SPOTIPY_CLIENT_SECRET, or put client_id and client_secret in {}",
                            path.display()
                        ))
                    } else {
                        e
                    }
                })
            }
        }
    }
}

impl From<Credentials> for CredentialSource {
    fn from(credentials: Credentials) -> Self {
        Self {
            client_id: Some(credentials.client_id),
            client_secret: Some(credentials.client_secret),
            secrets_file: None,
        }
    }
}
