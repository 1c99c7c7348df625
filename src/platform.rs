//! Platform-identifying request headers.

use http::header::USER_AGENT;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;

/// The operating system the client runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    /// The value sent in `X-Platform`.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }

    fn user_agent(self) -> &'static str {
        match self {
            Platform::Ios => "EmployeeApp-iOS/1.0",
            _ => "EmployeeApp-Android/1.0",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The platform and OS version reported to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: Platform,
    pub version: String,
}

impl PlatformInfo {
    /// Describes a device running `os` at `version`.
    pub fn new(os: Platform, version: impl Into<String>) -> Self {
        Self {
            os,
            version: version.into(),
        }
    }
}

/// Builds `User-Agent`, `X-Platform` and `X-Platform-Version`, then applies
/// `extra` on top so callers can override any of them.
///
/// # Errors
///
/// Returns an error if the version or an extra header is not a valid header.
///
/// # Examples
///
/// ```
/// use rollcall::platform::{platform_headers, Platform, PlatformInfo};
///
/// let headers = platform_headers(&PlatformInfo::new(Platform::Ios, "17.4"), []).unwrap();
/// assert_eq!(headers["user-agent"], "EmployeeApp-iOS/1.0");
/// assert_eq!(headers["x-platform"], "ios");
/// ```
pub fn platform_headers<'a>(
    info: &PlatformInfo,
    extra: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(info.os.user_agent()));
    headers.insert(
        HeaderName::from_static("x-platform"),
        HeaderValue::from_static(info.os.as_str()),
    );
    headers.insert(
        HeaderName::from_static("x-platform-version"),
        HeaderValue::try_from(info.version.as_str()).map_err(|e| {
            crate::Error::ConfigurationError(format!("Invalid platform version: {}", e))
        })?,
    );

    for (name, value) in extra {
        let name = HeaderName::try_from(name)
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}
