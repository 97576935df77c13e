//! HTTP client with rate limiting for the Spotify Web API.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting to stay clear of the Web API quota
//! * Consistent timeouts and headers
//!
//! # Rate Limiting
//!
//! The Web API enforces its limit over a rolling 30 second window without
//! publishing the exact number of calls. This client allows:
//! * 60 calls per 30-second interval
//! * Bursts up to the maximum calls per interval
//! * Requests that would exceed the limit are delayed
//!
//! # Example
//!
//! ```rust
//! use nowplaying64::http::Client;
//!
//! let client = Client::new(&config)?;
//!
//! let request = client.get(url, "");
//! let response = client.execute(request).await?;
//! ```

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{self, Body, Method, Url};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Direct access to underlying client without rate limiting.
    pub unlimited: reqwest::Client,

    /// Rate limiter for API quota compliance.
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window over which the Web API counts calls.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(30);

    /// Maximum allowed API calls per interval.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 60;

    /// Duration to keep idle connections alive.
    ///
    /// Spans a full poll interval so consecutive polls reuse the connection.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads.
    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Duration to wait for a connection to be established.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built, for example when
    /// the TLS backend fails to initialize.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method, URL and body.
    ///
    /// Creates a raw request that can be executed with `execute()`.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        let body_mut = request.body_mut();
        *body_mut = Some(body.into());

        request
    }

    /// Builds a POST request.
    pub fn post<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::POST, url, body)
    }

    /// Builds a GET request.
    pub fn get<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::GET, url, body)
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * Request execution fails
    /// * Network error occurs
    ///
    /// Unsuccessful status codes are not errors at this level; callers
    /// inspect the response status themselves.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No need to await with jitter: there is only ever one request in flight.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
