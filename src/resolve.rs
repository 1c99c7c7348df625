//! The typed response resolver.
//!
//! These [`Client`] methods run the executor, parse the body according to
//! its content type, and turn every failure into a [`NormalizedError`].
//! Nothing below lets a raw transport error escape.

use crate::{
    error::{ErrorKind, NormalizedError},
    metadata::RequestMetadata,
    response::{Body, Executed},
    Client, Error, Response,
};
use http::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

type Resolved<T> = std::result::Result<T, NormalizedError>;

impl Client {
    /// Makes a request and resolves it into a typed [`Response`].
    ///
    /// JSON bodies are decoded into `Res`; text bodies are decoded as a JSON
    /// string, so `Res = String` accepts any text response.
    ///
    /// # Errors
    ///
    /// Non-2xx responses become a [`NormalizedError`] whose message is taken
    /// from the body (see [`error_message`]). Transport failures are rewritten
    /// into user-facing messages.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rollcall::{Client, metadata::RequestMetadata};
    /// use http::Method;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct CheckIn { attendance_id: u64 }
    ///
    /// # async fn example(token: &str) -> Result<(), rollcall::NormalizedError> {
    /// let client = Client::builder()
    ///     .base_url("https://hr.example.com")?
    ///     .build()?;
    ///
    /// let metadata = RequestMetadata::authenticated(Method::POST, "/attendance/check-in", token)?
    ///     .with_json(&serde_json::json!({ "location": "18.464900,73.867800" }))?;
    ///
    /// let response = client.call::<CheckIn>(metadata).await?;
    /// println!("checked in as #{}", response.data.attendance_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Res>(&self, metadata: RequestMetadata) -> Resolved<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let response = self.resolve_body(metadata).await?;
        decode(response)
    }

    /// Like [`Client::call`], returning only the decoded body.
    pub async fn resolve<Res>(&self, metadata: RequestMetadata) -> Resolved<Res>
    where
        Res: DeserializeOwned,
    {
        Ok(self.call(metadata).await?.data)
    }

    /// Like [`Client::call`], but concurrent calls sharing `key` share one
    /// execution and all observe its outcome.
    ///
    /// Only the first caller's `metadata` is used while the key is running.
    pub async fn resolve_deduplicated<Res>(
        &self,
        key: impl Into<String>,
        metadata: RequestMetadata,
    ) -> Resolved<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let client = self.clone();
        let shared = self
            .in_flight()
            .run(key, move || async move { client.resolve_body(metadata).await });

        decode(shared.await?)
    }

    /// Resolves a batch of requests, at most `max_concurrent` at a time.
    ///
    /// Successful values come back in input order; failed requests are logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Fails only when every request fails.
    pub async fn batch<Res>(
        &self,
        requests: Vec<RequestMetadata>,
        max_concurrent: usize,
    ) -> Resolved<Vec<Res>>
    where
        Res: DeserializeOwned,
    {
        let chunk_size = max_concurrent.max(1);
        let mut results = Vec::with_capacity(requests.len());
        let mut first_error = None;
        let mut requests = requests.into_iter().enumerate().peekable();

        while requests.peek().is_some() {
            let chunk: Vec<_> = requests.by_ref().take(chunk_size).collect();
            let outcomes = futures::future::join_all(
                chunk
                    .into_iter()
                    .map(|(index, metadata)| async move { (index, self.resolve(metadata).await) }),
            )
            .await;

            for (index, outcome) in outcomes {
                match outcome {
                    Ok(value) => results.push(value),
                    Err(e) => {
                        tracing::error!(index = index, error = %e, "Batch request failed");
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) if results.is_empty() => Err(NormalizedError::with_kind(
                ErrorKind::Batch,
                format!("All batch requests failed. First error: {}", e.message()),
            )),
            _ => Ok(results),
        }
    }

    /// Runs the executor and parses the body, normalizing non-2xx responses.
    async fn resolve_body(&self, metadata: RequestMetadata) -> Resolved<Response<Body>> {
        let method = metadata.method.clone();
        let path = metadata.path.clone();
        let Executed {
            response,
            attempts,
            elapsed,
        } = self.execute(metadata).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let raw_body = response.text().await.map_err(Error::from)?;

        if !status.is_success() {
            let (message, body) = match Body::parse(&headers, status, &raw_body) {
                Ok(body) => (error_message(status, &body), body),
                Err(_) => (status_line(status), Body::Text(raw_body)),
            };

            if status.is_client_error() {
                tracing::error!(status = status.as_u16(), method = %method, path = %path, message = %message, "Client error (4xx)");
            } else {
                tracing::warn!(status = status.as_u16(), method = %method, path = %path, message = %message, "Server error");
            }

            return Err(NormalizedError::from_response(message, status, body));
        }

        let body = Body::parse(&headers, status, &raw_body)?;
        Ok(Response::new(
            body, raw_body, status, headers, elapsed, attempts,
        ))
    }

    /// Makes a GET request to the specified path.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rollcall::Client;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Employee { name: String }
    ///
    /// # async fn example() -> Result<(), rollcall::NormalizedError> {
    /// let client = Client::builder()
    ///     .base_url("https://hr.example.com")?
    ///     .build()?;
    ///
    /// let employee: rollcall::Response<Employee> = client.get("/employees/E-17").await?;
    /// println!("Employee: {}", employee.data.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<Res>(&self, path: impl Into<String>) -> Resolved<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call(RequestMetadata::new(Method::GET, path)).await
    }

    /// Makes a POST request to the specified path with a JSON body.
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Resolved<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::POST, path).with_json(body)?;
        self.call(metadata).await
    }

    /// Makes a PUT request to the specified path with a JSON body.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Resolved<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::PUT, path).with_json(body)?;
        self.call(metadata).await
    }

    /// Makes a PATCH request to the specified path with a JSON body.
    pub async fn patch<Req, Res>(
        &self,
        path: impl Into<String>,
        body: &Req,
    ) -> Resolved<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::PATCH, path).with_json(body)?;
        self.call(metadata).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete<Res>(&self, path: impl Into<String>) -> Resolved<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call(RequestMetadata::new(Method::DELETE, path)).await
    }
}

/// Decodes a resolved body into the caller's type.
fn decode<Res: DeserializeOwned>(response: Response<Body>) -> Resolved<Response<Res>> {
    let Response {
        data,
        raw_body,
        status,
        headers,
        latency,
        attempts,
    } = response;

    match serde_json::from_value::<Res>(data.into_json()) {
        Ok(data) => Ok(Response::new(
            data, raw_body, status, headers, latency, attempts,
        )),
        Err(e) => {
            tracing::error!(error = %e, raw_response = %raw_body, "Failed to deserialize response");
            Err(Error::DeserializationFailed {
                raw_response: raw_body,
                serde_error: e.to_string(),
                status,
            }
            .into())
        }
    }
}

/// Picks the message for a non-2xx response.
///
/// For JSON bodies: a 422 whose `detail` is an array of `{loc, msg}` entries
/// becomes `"Validation Error: a.b: msg, c: msg"`; otherwise a string
/// `detail`, then a string `message`, then the status line. For text bodies:
/// the text, or the status line when it is empty.
pub fn error_message(status: StatusCode, body: &Body) -> String {
    match body {
        Body::Json(value) => json_error_message(status, value),
        Body::Text(text) if !text.is_empty() => text.clone(),
        Body::Text(_) => status_line(status),
    }
}

fn json_error_message(status: StatusCode, value: &Value) -> String {
    let detail = value.get("detail");

    if status == StatusCode::UNPROCESSABLE_ENTITY {
        if let Some(Value::Array(errors)) = detail {
            let errors: Vec<String> = errors.iter().map(validation_entry).collect();
            return format!("Validation Error: {}", errors.join(", "));
        }
    }

    if let Some(Value::String(detail)) = detail {
        if !detail.is_empty() {
            return detail.clone();
        }
    }

    match value.get("message") {
        Some(Value::String(message)) if !message.is_empty() => message.clone(),
        _ => status_line(status),
    }
}

fn validation_entry(entry: &Value) -> String {
    let field = match entry.get("loc") {
        Some(Value::Array(segments)) => segments
            .iter()
            .map(|segment| match segment {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("."),
        _ => "unknown".to_string(),
    };
    let msg = entry.get("msg").and_then(Value::as_str).unwrap_or_default();

    format!("{}: {}", field, msg)
}

/// `"HTTP 503: Service Unavailable"`, or just `"HTTP 599"` for statuses
/// without a standard reason phrase.
fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {}: {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_errors_are_flattened() {
        let body = Body::Json(json!({
            "detail": [
                {"loc": ["body", "email"], "msg": "invalid"},
                {"loc": ["body", "shifts", 0, "start"], "msg": "field required"},
                {"msg": "bad"}
            ]
        }));

        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, &body),
            "Validation Error: body.email: invalid, body.shifts.0.start: field required, unknown: bad"
        );
    }

    #[test]
    fn single_validation_error() {
        let body = Body::Json(json!({"detail": [{"loc": ["body", "email"], "msg": "invalid"}]}));
        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, &body),
            "Validation Error: body.email: invalid"
        );
    }

    #[test]
    fn string_detail_wins_over_message() {
        let body = Body::Json(json!({"detail": "Employee not found", "message": "ignored"}));
        assert_eq!(error_message(StatusCode::NOT_FOUND, &body), "Employee not found");

        let body = Body::Json(json!({"detail": "Already checked in"}));
        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, &body),
            "Already checked in"
        );
    }

    #[test]
    fn falls_back_to_message_then_status_line() {
        let body = Body::Json(json!({"message": "Department code taken"}));
        assert_eq!(error_message(StatusCode::CONFLICT, &body), "Department code taken");

        let body = Body::Json(json!({"errors": []}));
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, &body),
            "HTTP 503: Service Unavailable"
        );

        // array detail outside a 422 is not treated as validation output
        let body = Body::Json(json!({"detail": [{"loc": ["x"], "msg": "y"}]}));
        assert_eq!(error_message(StatusCode::BAD_REQUEST, &body), "HTTP 400: Bad Request");
    }

    #[test]
    fn unnamed_statuses_have_no_dangling_separator() {
        let status = StatusCode::from_u16(599).unwrap();
        assert_eq!(error_message(status, &Body::Text(String::new())), "HTTP 599");

        let body = Body::Json(json!({"errors": []}));
        let status = StatusCode::from_u16(499).unwrap();
        assert_eq!(error_message(status, &body), "HTTP 499");
    }

    #[test]
    fn text_bodies_are_used_verbatim() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, &Body::Text("upstream down".into())),
            "upstream down"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, &Body::Text(String::new())),
            "HTTP 502: Bad Gateway"
        );
    }

    #[test]
    fn decode_preserves_json_values() {
        let value = json!({"id": 12345678901234_u64, "ratio": 0.125, "name": "Ops"});
        let response = Response::new(
            Body::Json(value.clone()),
            value.to_string(),
            StatusCode::OK,
            http::HeaderMap::new(),
            std::time::Duration::ZERO,
            1,
        );

        let decoded: Response<Value> = decode(response).unwrap();
        assert_eq!(decoded.data, value);
    }
}
