//! # Rollcall - the service layer of an employee attendance client
//!
//! Rollcall wraps the backend REST API and the device location API behind a
//! few resilient primitives:
//!
//! - an **executor** ([`Client::execute`]) that probes connectivity, races
//!   every attempt against a timeout, and retries transient failures with
//!   exponential backoff according to a [`RetryPolicy`];
//! - a **resolver** ([`Client::call`] and friends) that parses JSON or text
//!   bodies and turns every failure into one [`NormalizedError`], including
//!   flattened validation errors;
//! - an **in-flight registry** ([`dedup::InFlightRegistry`]) so concurrent
//!   identical calls share a single execution;
//! - a **location service** ([`location::LocationService`]) that bounds each
//!   GPS reading with a timeout and retries it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rollcall::{Client, RetryPolicy};
//! use rollcall::metadata::RequestMetadata;
//! use http::Method;
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct AttendanceStatus {
//!     checked_in: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rollcall::NormalizedError> {
//!     let client = Client::builder()
//!         .base_url("http://192.168.1.38:8000")?
//!         .retry_policy(
//!             RetryPolicy::default()
//!                 .with_max_attempts(4)
//!                 .with_retry_delay(Duration::from_millis(500)),
//!         )
//!         .build()?;
//!
//!     let metadata = RequestMetadata::authenticated(Method::GET, "/attendance/status", "token")?;
//!     let status = client.resolve::<AttendanceStatus>(metadata).await?;
//!     println!("Checked in: {}", status.checked_in);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! The executor reports an [`Error`]; the resolver always reports a
//! [`NormalizedError`] carrying a user-presentable message, the status code
//! when a response arrived, and the parsed body:
//!
//! ```no_run
//! use rollcall::{Client, ErrorKind};
//!
//! # async fn example() -> Result<(), rollcall::NormalizedError> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.post::<_, serde_json::Value>("/departments", &serde_json::json!({"name": ""})).await {
//!     Ok(created) => println!("Created: {}", created.data),
//!     Err(e) if e.kind() == ErrorKind::Http => {
//!         // e.g. "Validation Error: body.name: field required"
//!         eprintln!("{} ({:?})", e.message(), e.status());
//!     }
//!     Err(e) => eprintln!("{}", e),
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
pub mod connectivity;
pub mod dedup;
mod error;
pub mod location;
pub mod metadata;
pub mod platform;
mod resolve;
mod response;
pub mod retry;

pub use client::{Client, ClientBuilder};
pub use error::{Error, ErrorKind, NormalizedError, Result, TIMED_OUT_MESSAGE, UNREACHABLE_MESSAGE};
pub use resolve::error_message;
pub use response::{Body, Executed, Response};
pub use retry::RetryPolicy;
