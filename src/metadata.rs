//! Request metadata and configuration types.

use crate::retry::RetryPolicy;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::collections::HashMap;

/// A request body, kept in a form that can be rebuilt for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A JSON document, sent with `Content-Type: application/json`.
    Json(serde_json::Value),
    /// A plain string, sent as-is.
    Text(String),
    /// A multipart form. The transport sets `Content-Type` with its boundary.
    Multipart(Vec<FormPart>),
}

/// One field of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    /// The form field name.
    pub name: String,
    /// The raw field content.
    pub bytes: Vec<u8>,
    /// The file name, for file fields.
    pub file_name: Option<String>,
    /// The MIME type, for file fields.
    pub mime: Option<String>,
}

impl FormPart {
    /// A plain text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes: value.into().into_bytes(),
            file_name: None,
            mime: None,
        }
    }

    /// A file field, e.g. a captured attendance photo.
    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            bytes,
            file_name: Some(file_name.into()),
            mime: Some(mime.into()),
        }
    }

    pub(crate) fn to_part(&self) -> crate::Result<reqwest::multipart::Part> {
        let mut part = reqwest::multipart::Part::bytes(self.bytes.clone());
        if let Some(file_name) = &self.file_name {
            part = part.file_name(file_name.clone());
        }
        if let Some(mime) = &self.mime {
            part = part
                .mime_str(mime)
                .map_err(|e| crate::Error::ConfigurationError(format!("Invalid MIME type: {}", e)))?;
        }
        Ok(part)
    }
}

/// Metadata for an individual HTTP request.
///
/// Holds everything needed to fire the request any number of times: method,
/// path, headers, query parameters, body, and the optional per-call retry
/// policy that overrides the client default.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The request path, relative to the base URL, or an absolute URL.
    pub path: String,

    /// Additional headers for this request.
    pub headers: HeaderMap,

    /// Query parameters for this request.
    pub query_params: HashMap<String, String>,

    /// The request body, if any.
    pub body: Option<RequestBody>,

    /// Overrides the client's default retry policy for this call.
    pub retry_policy: Option<RetryPolicy>,

    /// When set, any error raised during an attempt ends the call immediately.
    pub skip_retry_on_error: bool,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query_params: HashMap::new(),
            body: None,
            retry_policy: None,
            skip_retry_on_error: false,
        }
    }

    /// An authenticated JSON call with the standard retry preset.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be used as a header value.
    pub fn authenticated(
        method: Method,
        path: impl Into<String>,
        token: impl AsRef<str>,
    ) -> crate::Result<Self> {
        let mut metadata = Self::new(method, path).with_bearer_token(token)?;
        metadata
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(metadata.with_retry_policy(RetryPolicy::authenticated()))
    }

    /// An authenticated multipart upload with the upload retry preset.
    ///
    /// No `Content-Type` header is set so the transport can add the boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be used as a header value.
    pub fn form_upload(
        path: impl Into<String>,
        token: impl AsRef<str>,
        parts: Vec<FormPart>,
    ) -> crate::Result<Self> {
        Ok(Self::new(Method::POST, path)
            .with_bearer_token(token)?
            .with_body(RequestBody::Multipart(parts))
            .with_retry_policy(RetryPolicy::upload()))
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds `Accept: application/json` and `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be used as a header value.
    pub fn with_bearer_token(mut self, token: impl AsRef<str>) -> crate::Result<Self> {
        let value = HeaderValue::try_from(format!("Bearer {}", token.as_ref()))
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid token: {}", e)))?;
        self.headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Adds multiple query parameters to the request.
    pub fn with_query_params(
        mut self,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.query_params.extend(params);
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` to JSON and sets it as the request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(self, body: &T) -> crate::Result<Self> {
        let json = serde_json::to_value(body)
            .map_err(|e| crate::Error::SerializationFailed(e.to_string()))?;
        Ok(self.with_body(RequestBody::Json(json)))
    }

    /// Overrides the client's default retry policy for this request.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Stops retrying as soon as an attempt raises an error.
    ///
    /// Retryable HTTP statuses are still retried.
    pub fn skip_retry_on_error(mut self) -> Self {
        self.skip_retry_on_error = true;
        self
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_requests_carry_token_and_json_type() {
        let metadata = RequestMetadata::authenticated(Method::GET, "/tasks", "abc123").unwrap();

        assert_eq!(metadata.headers.get(AUTHORIZATION).unwrap(), "Bearer abc123");
        assert_eq!(metadata.headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(metadata.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(metadata.retry_policy, Some(RetryPolicy::authenticated()));
    }

    #[test]
    fn uploads_leave_content_type_to_the_transport() {
        let parts = vec![FormPart::file("photo", "selfie.jpg", "image/jpeg", vec![1, 2, 3])];
        let metadata = RequestMetadata::form_upload("/attendance/photo", "abc123", parts).unwrap();

        assert_eq!(metadata.method, Method::POST);
        assert!(metadata.headers.get(CONTENT_TYPE).is_none());
        assert!(matches!(metadata.body, Some(RequestBody::Multipart(ref p)) if p.len() == 1));
        assert_eq!(metadata.retry_policy.unwrap().max_attempts(), 2);
    }

    #[test]
    fn rejects_tokens_with_newlines() {
        let result = RequestMetadata::new(Method::GET, "/me").with_bearer_token("a\nb");
        assert!(matches!(result, Err(crate::Error::ConfigurationError(_))));
    }
}
