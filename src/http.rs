//! REST client for track loading.
//!
//! Nodes resolve identifiers, URLs and search queries into playable
//! [`Track`]s over HTTP. This module wraps `reqwest::Client` with:
//! * the node's password on every request
//! * request rate limiting, so that bulk lookups do not flood the node
//! * consistent timeouts
//!
//! # Example
//!
//! ```rust
//! use nodelink::http::{Client, SearchSource};
//!
//! let client = Client::new(&config)?;
//! let result = client.search("never gonna give you up", SearchSource::YouTube).await?;
//! for track in result.tracks {
//!     println!("{track}");
//! }
//! ```

use std::{fmt, future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Body, Method, Url,
};

use crate::{
    config::Config,
    error::{Error, Result},
    protocol::{self, rest::LoadResult},
    track::{Track, TrackInfo},
};

/// Where a search query is resolved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SearchSource {
    #[default]
    YouTube,
    SoundCloud,
}

impl SearchSource {
    /// The identifier prefix that selects this source.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::YouTube => "ytsearch:",
            Self::SoundCloud => "scsearch:",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YouTube => write!(f, "YouTube"),
            Self::SoundCloud => write!(f, "SoundCloud"),
        }
    }
}

/// HTTP client of one node with built-in rate limiting.
pub struct Client {
    /// Direct access to the underlying client without rate limiting.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
    base_url: Url,
}

impl Client {
    /// Rolling window of the rate limit.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum calls per window. Requests beyond are delayed.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Searches and playlist lookups may take the node a while.
    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client for the node described by `config`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * the node's REST URL is invalid
    /// * the password is not a valid header value
    /// * HTTP client creation fails
    pub fn new(config: &Config) -> Result<Self> {
        let mut password = HeaderValue::from_str(&config.password)?;
        password.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, password);

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(Self::TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.client_name);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let burst = NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
            .ok_or_else(|| Error::internal("calls per interval is zero"))?;
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| Error::internal("quota time interval is zero"))?
            .allow_burst(burst);

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
            base_url: config.rest_url()?,
        })
    }

    /// Builds a request with specified method, URL and body.
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

    pub fn post<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::POST, url, body)
    }

    pub fn get<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::GET, url, body)
    }

    /// Executes a request once the rate limiter allows it.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails on the network.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn fetch(&self, request: reqwest::Request, origin: &str) -> Result<String> {
        trace!("{} {}", request.method(), request.url());
        let response = self.execute(request).await?.error_for_status()?;
        let body = response.text().await?;
        if body.is_empty() {
            return Err(Error::data_loss(format!("{origin}: empty response")));
        }
        Ok(body)
    }

    /// Resolves an identifier, URL or prefixed search query into tracks.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    /// A query that the node could not resolve is not an error; see
    /// [`LoadResult::has_error`].
    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResult> {
        let url = self.endpoint("loadtracks", &[("identifier", identifier)])?;
        let body = self.fetch(self.get(url, ""), "loadtracks").await?;
        let result: LoadResult = protocol::json(&body, "loadtracks")?;

        if let Some(message) = result.exception_message() {
            warn!("loading {identifier} failed: {message}");
        } else {
            debug!(
                "loaded {} track(s) for {identifier} ({:?})",
                result.tracks.len(),
                result.load_type
            );
        }

        Ok(result)
    }

    /// Searches `source` for `query`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    pub async fn search(&self, query: &str, source: SearchSource) -> Result<LoadResult> {
        self.load_tracks(&format!("{}{query}", source.prefix())).await
    }

    /// Decodes an encoded track back into its metadata.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the node does not recognize the
    /// track.
    pub async fn decode_track(&self, encoded: &str) -> Result<TrackInfo> {
        let url = self.endpoint("decodetrack", &[("track", encoded)])?;
        let body = self.fetch(self.get(url, ""), "decodetrack").await?;
        protocol::json(&body, "decodetrack")
    }

    /// Decodes many encoded tracks in one request.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    pub async fn decode_tracks(&self, encoded: &[String]) -> Result<Vec<Track>> {
        let url = self.endpoint("decodetracks", &[])?;
        let mut request = self.post(url, serde_json::to_vec(encoded)?);
        request.headers_mut().insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let body = self.fetch(request, "decodetracks").await?;
        protocol::json(&body, "decodetracks")
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new(&Config::default()).unwrap()
    }

    #[test]
    fn search_prefixes() {
        assert_eq!(SearchSource::YouTube.prefix(), "ytsearch:");
        assert_eq!(SearchSource::SoundCloud.prefix(), "scsearch:");
    }

    #[test]
    fn endpoints_encode_queries() {
        let url = client()
            .endpoint("loadtracks", &[("identifier", "ytsearch:rick & morty")])
            .unwrap();
        assert_eq!(url.path(), "/loadtracks");
        assert_eq!(
            url.query_pairs().next().map(|(k, v)| (k.into_owned(), v.into_owned())),
            Some(("identifier".to_owned(), "ytsearch:rick & morty".to_owned()))
        );

        let url = client().endpoint("decodetracks", &[]).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn rejects_unprintable_password() {
        let config = Config {
            password: "bad\npassword".to_owned(),
            ..Config::default()
        };
        assert!(Client::new(&config).is_err());
    }
}
