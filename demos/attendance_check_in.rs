//! Example walking through a location-verified check-in.
//!
//! This example shows how to:
//! - Load the backend address from a TOML config
//! - Probe the API before doing any work
//! - Read the device location with timeouts and retries
//! - Reject a check-in made too far from the workplace
//! - Post the check-in and report normalized errors
//!
//! Run with: `cargo run --example attendance_check_in`
//!
//! Point `ROLLCALL_CONFIG` at a config file to target a real backend.

use http::Method;
use rollcall::config::ApiConfig;
use rollcall::location::{
    format_coordinates_for_api, is_within_radius, LocationCoordinates, LocationOptions,
    LocationService, Place, StaticLocationProvider, DEFAULT_LOCATION_ATTEMPTS,
    DEFAULT_WORKPLACE_RADIUS_METERS,
};
use rollcall::metadata::RequestMetadata;
use rollcall::platform::{Platform, PlatformInfo};
use rollcall::ClientBuilder;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_CONFIG: &str = r#"
host = "127.0.0.1"
backend_port = 8000

[retry]
max_attempts = 3
retry_delay_ms = 500
"#;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct CheckIn {
    attendance_id: u64,
    status: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall=debug,attendance_check_in=info".into()),
        )
        .init();

    let config = match std::env::var("ROLLCALL_CONFIG") {
        Ok(path) => ApiConfig::from_file(path)?,
        Err(_) => ApiConfig::from_toml_str(DEFAULT_CONFIG)?,
    };

    let client = ClientBuilder::from_config(&config)?
        .platform(&PlatformInfo::new(Platform::Android, "34"))?
        .build()?;

    println!("=== API Health ===");
    if !client.check_api_health().await {
        println!("{} is not answering, giving up", client.base_url());
        return Ok(());
    }

    println!("=== Location ===");
    let workplace = LocationCoordinates::new(18.4649, 73.8678);
    // an emulator stand-in for the platform location API
    let provider = StaticLocationProvider::new(
        LocationCoordinates::new(18.4652, 73.8676).with_accuracy(8.0),
    )
    .with_place(Place {
        name: Some("Main Gate".into()),
        city: Some("Pune".into()),
        country: Some("India".into()),
        ..Place::default()
    });
    let locations = LocationService::new(provider);

    if !locations.services_enabled().await {
        println!("Location services are off, enable them in device settings");
        return Ok(());
    }

    let here = locations
        .location_with_retry(DEFAULT_LOCATION_ATTEMPTS, LocationOptions::default())
        .await?;
    let address = locations.address_for(&here).await?;
    println!("You are at {}", address.formatted_address);

    if !is_within_radius(&here, &workplace, DEFAULT_WORKPLACE_RADIUS_METERS) {
        println!("Too far from the workplace to check in");
        return Ok(());
    }

    println!("=== Check-in ===");
    let token = std::env::var("ROLLCALL_TOKEN").unwrap_or_else(|_| "demo-token".to_string());
    let metadata = RequestMetadata::authenticated(Method::POST, "/attendance/check-in", &token)?
        .with_json(&json!({
            "location": format_coordinates_for_api(&here),
            "address": address.formatted_address,
        }))?;

    match client.call::<CheckIn>(metadata).await {
        Ok(response) => {
            println!("Checked in: {:?}", response.data);
            println!("Attempts: {}, latency: {:?}", response.attempts, response.latency);
        }
        Err(e) => {
            println!("Check-in failed: {}", e.message());
            if let Some(status) = e.status() {
                println!("Status: {}", status);
            }
        }
    }

    Ok(())
}
