use std::path::PathBuf;

use crate::{
    error::{Error, Result},
    secrets::CredentialSource,
};

/// Permissions requested during authorization.
pub const SCOPES: [&str; 3] = [
    "user-library-read",
    "user-read-currently-playing",
    "user-read-playback-state",
];

/// Redirect URI registered for the application in the developer dashboard.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:9090";

/// Token cache location relative to the working directory.
pub const DEFAULT_CACHE_PATH: &str = ".cache";

/// Market used to resolve track relinking.
pub const DEFAULT_MARKET: &str = "DE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    pub user_agent: String,

    /// Resolved when connecting, so that missing credentials are a
    /// connection failure.
    pub credentials: CredentialSource,
    /// Kept verbatim: the authorization server compares it byte for byte.
    pub redirect_uri: String,
    pub cache_path: PathBuf,
    pub scopes: Vec<String>,
    pub market: String,

    /// Render diagnostics about every poll.
    pub debug: bool,
}

impl Config {
    /// Creates a configuration with default settings for the given
    /// credential source.
    ///
    /// # Errors
    ///
    /// Will return `Err` if no valid `User-Agent` can be created out of the
    /// package name and version or the detected OS name and version.
    pub fn with_credentials(credentials: CredentialSource) -> Result<Self> {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            return Err(Error::invalid_argument(format!(
                "application name and/or version invalid (\"{app_name}\"; \"{app_version}\")"
            )));
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));
        if os_name.is_empty()
            || os_name.contains(illegal_chars)
            || os_version.is_empty()
            || os_version.contains(illegal_chars)
        {
            return Err(Error::invalid_argument(format!(
                "os name and/or version invalid (\"{os_name}\"; \"{os_version}\")"
            )));
        }

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,

            user_agent,

            credentials,
            redirect_uri: DEFAULT_REDIRECT_URI.to_owned(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            scopes: SCOPES.iter().map(ToString::to_string).collect(),
            market: DEFAULT_MARKET.to_owned(),

            debug: false,
        })
    }

    /// The requested scopes in the space separated form of the OAuth
    /// protocol.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> CredentialSource {
        CredentialSource {
            client_id: Some("0123456789abcdef0123456789abcdef".to_owned()),
            client_secret: Some("fedcba9876543210fedcba9876543210".to_owned()),
            secrets_file: None,
        }
    }

    #[test]
    fn defaults() {
        let config = Config::with_credentials(credentials()).unwrap();
        assert_eq!(config.redirect_uri, "http://127.0.0.1:9090");
        assert_eq!(config.cache_path, PathBuf::from(".cache"));
        assert_eq!(config.market, "DE");
        assert!(!config.debug);
        assert!(config.user_agent.starts_with("nowplaying64/"));
    }

    #[test]
    fn scope_is_space_separated() {
        let config = Config::with_credentials(credentials()).unwrap();
        assert_eq!(
            config.scope(),
            "user-library-read user-read-currently-playing user-read-playback-state"
        );
    }
}
