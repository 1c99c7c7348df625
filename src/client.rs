//! HTTP client with retry logic and connectivity pre-flight.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`ClientBuilder`] to configure and create clients. This module holds
//! the executor, [`Client::execute`]; the resolver methods that parse and
//! normalize responses live in [`crate::resolve`].

use crate::{
    config::ApiConfig,
    connectivity::{
        Connectivity, ConnectivityProbe, HttpProbe, DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_URL,
    },
    dedup::InFlightRegistry,
    error::NormalizedError,
    metadata::{RequestBody, RequestMetadata},
    platform::{platform_headers, PlatformInfo},
    response::{Body, Executed},
    retry::RetryPolicy,
    Error, Response, Result,
};
use http::header::ACCEPT;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

pub(crate) type SharedOutcome = std::result::Result<Response<Body>, NormalizedError>;

/// An HTTP client for making API calls with retry logic and rich error handling.
///
/// The client is designed to be created once per application and cloned
/// freely: clones share the connection pool, configuration and the in-flight
/// request registry.
///
/// # Examples
///
/// ```no_run
/// use rollcall::{Client, RetryPolicy};
/// use rollcall::platform::{Platform, PlatformInfo};
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct Task {
///     id: u64,
///     title: String,
/// }
///
/// # async fn example() -> Result<(), rollcall::NormalizedError> {
/// let client = Client::builder()
///     .base_url("http://192.168.1.38:8000")?
///     .platform(&PlatformInfo::new(Platform::Android, "34"))?
///     .retry_policy(RetryPolicy::default().with_timeout(Duration::from_secs(20)))
///     .build()?;
///
/// let tasks = client.get::<Vec<Task>>("/tasks").await?;
/// println!("{} tasks, {} attempt(s)", tasks.data.len(), tasks.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: Url,
    default_headers: HeaderMap,
    retry_policy: RetryPolicy,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    in_flight: InFlightRegistry<SharedOutcome>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The base URL relative paths are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The retry policy used when a request does not bring its own.
    pub fn default_retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// The registry backing [`Client::resolve_deduplicated`].
    pub fn in_flight(&self) -> &InFlightRegistry<std::result::Result<Response<Body>, NormalizedError>> {
        &self.inner.in_flight
    }

    /// Executes a request under its retry policy and returns the raw response.
    ///
    /// Before the first attempt the connectivity probe runs; only a definite
    /// offline answer fails the call, with [`Error::NoConnection`]. Each
    /// attempt is raced against the policy timeout.
    ///
    /// Responses are returned as soon as their status is not in the policy's
    /// retryable set, so a 404 comes back after one attempt. Retryable
    /// statuses and retryable errors consume attempts, waiting
    /// [`RetryPolicy::delay_for_attempt`] in between. Once attempts run out,
    /// the last retryable response is returned if there was one, otherwise the
    /// last error, otherwise [`Error::MaxRetriesExceeded`].
    ///
    /// # Errors
    ///
    /// Connection failures, malformed requests, and any error when the request
    /// sets `skip_retry_on_error` are returned without further attempts.
    pub async fn execute(&self, metadata: RequestMetadata) -> Result<Executed> {
        let policy = metadata
            .retry_policy
            .as_ref()
            .unwrap_or(&self.inner.retry_policy);
        let url = self.build_url(&metadata)?;

        if let Some(probe) = &self.inner.probe {
            if probe.check().await == Connectivity::Offline {
                tracing::error!(url = %url, "Device is offline, request not attempted");
                return Err(Error::NoConnection);
            }
        }

        let start_time = Instant::now();
        let max_attempts = policy.max_attempts();
        let mut last_response = None;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.attempt(&metadata, &url, policy, attempt).await {
                Ok(response) => {
                    let status = response.status();
                    if !policy.retries_status(status) {
                        tracing::info!(
                            status = status.as_u16(),
                            attempt = attempt,
                            url = %url,
                            "Received HTTP response"
                        );
                        return Ok(Executed {
                            response,
                            attempts: attempt,
                            elapsed: start_time.elapsed(),
                        });
                    }

                    tracing::warn!(
                        status = status.as_u16(),
                        attempt = attempt,
                        max_attempts = max_attempts,
                        url = %url,
                        "Request failed with retryable status"
                    );
                    last_response = Some(response);
                }
                Err(e) => {
                    if metadata.skip_retry_on_error || !e.is_retryable() {
                        tracing::error!(
                            error = %e,
                            attempt = attempt,
                            method = %metadata.method,
                            url = %url,
                            "Request failed"
                        );
                        return Err(e);
                    }

                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        url = %url,
                        "Request attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                let delay = policy.delay_for_attempt(attempt);
                tracing::info!(
                    delay_ms = delay.as_millis(),
                    attempt = attempt,
                    "Retrying request after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(response) = last_response {
            tracing::warn!(
                attempts = max_attempts,
                url = %url,
                "All attempts failed, returning last response"
            );
            return Ok(Executed {
                response,
                attempts: max_attempts,
                elapsed: start_time.elapsed(),
            });
        }

        Err(last_error.unwrap_or(Error::MaxRetriesExceeded {
            attempts: max_attempts,
        }))
    }

    /// Executes a single request attempt, bounded by the policy timeout.
    async fn attempt(
        &self,
        metadata: &RequestMetadata,
        url: &Url,
        policy: &RetryPolicy,
        attempt: usize,
    ) -> Result<reqwest::Response> {
        tracing::debug!(
            method = %metadata.method,
            url = %url,
            attempt = attempt,
            max_attempts = policy.max_attempts(),
            "Executing HTTP request"
        );

        let request = self.build_request(metadata, url)?;

        match tokio::time::timeout(policy.timeout(), request.send()).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Timeout {
                after: policy.timeout(),
            }),
        }
    }

    /// Resolves the request path against the base URL and appends the query.
    fn build_url(&self, metadata: &RequestMetadata) -> Result<Url> {
        let mut url = match Url::parse(&metadata.path) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let mut url = self.inner.base_url.clone();
                let base_path = url.path().trim_end_matches('/').to_string();
                url.set_path(&format!(
                    "{}/{}",
                    base_path,
                    metadata.path.trim_start_matches('/')
                ));
                url
            }
            Err(e) => return Err(e.into()),
        };

        for (key, value) in &metadata.query_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        Ok(url)
    }

    /// Builds one attempt's request. Bodies are rebuilt every time.
    fn build_request(
        &self,
        metadata: &RequestMetadata,
        url: &Url,
    ) -> Result<reqwest::RequestBuilder> {
        let mut headers = self.inner.default_headers.clone();
        headers.extend(metadata.headers.clone());

        let mut request = self
            .inner
            .http_client
            .request(metadata.method.clone(), url.clone())
            .headers(headers);

        match &metadata.body {
            Some(RequestBody::Json(json)) => request = request.json(json),
            Some(RequestBody::Text(text)) => request = request.body(text.clone()),
            Some(RequestBody::Multipart(parts)) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = form.part(part.name.clone(), part.to_part()?);
                }
                request = request.multipart(form);
            }
            None => {}
        }

        Ok(request)
    }

    /// Returns `true` if `GET /test-cors` answers with a 2xx within 5 seconds.
    ///
    /// Makes a single attempt. Failures are logged, never returned.
    pub async fn check_api_health(&self) -> bool {
        let metadata = RequestMetadata::new(Method::GET, "/test-cors")
            .with_retry_policy(RetryPolicy::health_check());

        match self.execute(metadata).await {
            Ok(executed) => executed.response.status().is_success(),
            Err(e) => {
                tracing::error!(error = %e, base_url = %self.inner.base_url, "API health check failed");
                false
            }
        }
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Every client sends `Accept: application/json` unless overridden.
///
/// # Examples
///
/// ```no_run
/// use rollcall::{ClientBuilder, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), rollcall::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://hr.example.com")?
///     .timeout(Duration::from_secs(15))
///     .default_header("X-Tenant", "acme")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    retry_policy: RetryPolicy,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    probe_url: String,
    skip_probe: bool,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Self {
            base_url: None,
            default_headers,
            retry_policy: RetryPolicy::default(),
            probe: None,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            skip_probe: false,
        }
    }

    /// Starts a builder from a loaded [`ApiConfig`].
    ///
    /// Configuration issues are logged, not rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured base URL is invalid.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        for issue in config.validate() {
            tracing::warn!(issue = %issue, "API configuration issue");
        }

        let mut builder = Self::new()
            .base_url(config.base_url())?
            .retry_policy(config.retry.to_policy());
        if let Some(probe_url) = &config.probe_url {
            builder = builder.probe_url(probe_url.clone());
        }
        Ok(builder)
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sends the platform-identifying headers with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform version is not a valid header value.
    pub fn platform(mut self, info: &PlatformInfo) -> Result<Self> {
        self.default_headers.extend(platform_headers(info, [])?);
        Ok(self)
    }

    /// Sets the retry policy used by requests that do not carry their own.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the per-attempt timeout of the default retry policy.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.retry_policy = self.retry_policy.with_timeout(timeout);
        self
    }

    /// Replaces the default `HEAD` probe.
    pub fn connectivity_probe(mut self, probe: impl ConnectivityProbe + 'static) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// Points the default `HEAD` probe at another resource.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = url.into();
        self
    }

    /// Sends requests without probing connectivity first.
    pub fn skip_connectivity_probe(mut self) -> Self {
        self.skip_probe = true;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided, if the probe URL is
    /// invalid, or if the HTTP client cannot be created.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::ConfigurationError("Base URL is required".to_string()))?;

        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let probe = match (self.skip_probe, self.probe) {
            (true, _) => None,
            (false, Some(probe)) => Some(probe),
            (false, None) => {
                let probe: Arc<dyn ConnectivityProbe> =
                    Arc::new(HttpProbe::new(&self.probe_url, DEFAULT_PROBE_TIMEOUT)?);
                Some(probe)
            }
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                base_url,
                default_headers: self.default_headers,
                retry_policy: self.retry_policy,
                probe,
                in_flight: InFlightRegistry::new(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
