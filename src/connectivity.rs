//! Pre-flight connectivity probing.
//!
//! Before the first attempt of every call the client asks its
//! [`ConnectivityProbe`] whether the device is online. Only a definite
//! [`Connectivity::Offline`] stops the call; an inconclusive probe lets the
//! real request go ahead and report its own failure.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Resource fetched by the default probe.
pub const DEFAULT_PROBE_URL: &str = "https://www.google.com/favicon.ico";

/// Time allowed for the default probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// The outcome of a connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The probe target answered.
    Online,
    /// The device has no network.
    Offline,
    /// The probe could not tell; treated as online.
    Unknown,
}

/// A source of the pre-flight connectivity signal.
///
/// Platform integrations can implement this on top of an OS reachability API
/// to report [`Connectivity::Offline`] in airplane mode.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Reports the current reachability. Runs once before each request.
    async fn check(&self) -> Connectivity;
}

/// Probes by sending `HEAD` to a well-known resource.
///
/// A probe failure is reported as [`Connectivity::Unknown`], never as offline,
/// so a blocked probe host cannot take the client down.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http_client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpProbe {
    /// Creates a probe against `url` with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>, timeout: Duration) -> crate::Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::new(),
            url: Url::parse(url.as_ref())?,
            timeout,
        })
    }

    /// The probed resource.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> Connectivity {
        let request = self
            .http_client
            .head(self.url.clone())
            .timeout(self.timeout)
            .send();

        match request.await {
            Ok(_) => Connectivity::Online,
            Err(e) => {
                tracing::warn!(error = %e, url = %self.url, "Network check failed, assuming connected");
                Connectivity::Unknown
            }
        }
    }
}

/// A probe with a fixed answer, for hosts that track reachability elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub Connectivity);

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn check(&self) -> Connectivity {
        self.0
    }
}
