//! Response types: the raw outcome of the executor and the typed outcome of
//! the resolver.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A response body, parsed according to its declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// The body of a response whose `content-type` includes `application/json`.
    Json(serde_json::Value),
    /// Any other body.
    Text(String),
}

impl Body {
    /// Returns `true` if `headers` declare a JSON body.
    pub fn is_json(headers: &HeaderMap) -> bool {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"))
    }

    /// Parses `raw` as JSON when `headers` declare it, as text otherwise.
    /// An empty body is always text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeserializationFailed`] if the body claims to be
    /// JSON but is not.
    pub fn parse(headers: &HeaderMap, status: StatusCode, raw: &str) -> crate::Result<Self> {
        if raw.is_empty() || !Self::is_json(headers) {
            return Ok(Body::Text(raw.to_string()));
        }

        serde_json::from_str(raw)
            .map(Body::Json)
            .map_err(|e| crate::Error::DeserializationFailed {
                raw_response: raw.to_string(),
                serde_error: e.to_string(),
                status,
            })
    }

    /// Returns the JSON value, if this is a JSON body.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(value) => Some(value),
            Body::Text(_) => None,
        }
    }

    /// Returns the text, if this is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Json(_) => None,
        }
    }

    /// Converts the body into a JSON value. Text becomes a JSON string, and
    /// an empty body becomes `null`.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Body::Json(value) => value,
            Body::Text(text) if text.is_empty() => serde_json::Value::Null,
            Body::Text(text) => serde_json::Value::String(text),
        }
    }
}

/// The raw outcome of [`crate::Client::execute`].
///
/// The response may carry any status: a non-retryable status, or the last
/// retryable one once attempts ran out.
#[derive(Debug)]
pub struct Executed {
    /// The underlying response, body unread.
    pub response: reqwest::Response,
    /// The number of attempts made, including the one that produced `response`.
    pub attempts: usize,
    /// Time from the first attempt until `response` arrived, including backoff.
    pub elapsed: Duration,
}

/// A wrapper around a successful, resolved HTTP response.
///
/// This type provides both the deserialized response data and metadata about
/// the HTTP transaction.
///
/// # Examples
///
/// ```no_run
/// use rollcall::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Department {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), rollcall::NormalizedError> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client.get::<Department>("/departments/7").await?;
///
/// println!("Department: {}", response.data.name);
/// println!("Request took {:?}", response.latency);
/// println!("Attempts: {}", response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body as a string.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The total latency of the request, including all retry attempts.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type using the provided function.
    ///
    /// # Examples
    ///
    /// ```
    /// # use rollcall::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     "42".to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers
    }

    #[test]
    fn parses_by_content_type() {
        let body = Body::parse(&json_headers(), StatusCode::OK, r#"{"id": 3}"#).unwrap();
        assert_eq!(body.as_json().unwrap()["id"], 3);

        let body = Body::parse(&HeaderMap::new(), StatusCode::OK, r#"{"id": 3}"#).unwrap();
        assert_eq!(body.as_text(), Some(r#"{"id": 3}"#));
    }

    #[test]
    fn malformed_json_keeps_the_raw_body() {
        let err = Body::parse(&json_headers(), StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.raw_response(), Some("<html>"));
    }
}
