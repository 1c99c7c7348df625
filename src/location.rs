//! Best-effort device location with bounded retries.
//!
//! The platform location API is consumed through [`LocationProvider`]; this
//! module only adds a timeout race around each reading, a retry loop, and
//! reverse-geocoded address enrichment. Location permission is assumed to be
//! granted before any of this runs.
//!
//! # Examples
//!
//! ```
//! use rollcall::location::{
//!     is_within_radius, LocationCoordinates, LocationOptions, LocationService,
//!     StaticLocationProvider, DEFAULT_WORKPLACE_RADIUS_METERS,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), rollcall::location::LocationError> {
//! let office = LocationCoordinates::new(18.4649, 73.8678);
//! let service = LocationService::new(StaticLocationProvider::new(office));
//!
//! let here = service.location_with_retry(3, LocationOptions::default()).await?;
//! assert!(is_within_radius(&here, &office, DEFAULT_WORKPLACE_RADIUS_METERS));
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Time allowed for one location reading.
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Readings attempted by default before giving up.
pub const DEFAULT_LOCATION_ATTEMPTS: usize = 3;

/// Minimum movement between two watched readings.
pub const DEFAULT_WATCH_DISTANCE_METERS: f64 = 10.0;

/// Minimum time between two watched readings.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Distance from the workplace within which attendance is accepted.
pub const DEFAULT_WORKPLACE_RADIUS_METERS: f64 = 100.0;

const EARTH_RADIUS_METERS: f64 = 6371e3;

/// A single location reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationCoordinates {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
}

impl LocationCoordinates {
    /// A reading with only latitude and longitude.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            heading: None,
            speed: None,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy = Some(meters);
        self
    }
}

/// How hard the platform should try for a precise fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Low,
    Balanced,
    #[default]
    High,
    Highest,
}

/// Per-reading options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationOptions {
    pub timeout: Duration,
    pub accuracy: Accuracy,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCATION_TIMEOUT,
            accuracy: Accuracy::default(),
        }
    }
}

/// Options for continuous tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Defaults to [`Accuracy::Balanced`] to spare the battery.
    pub accuracy: Accuracy,
    /// Readings closer than this to the last delivered one are dropped.
    pub distance_interval_meters: f64,
    /// Requested minimum time between platform updates.
    pub time_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Balanced,
            distance_interval_meters: DEFAULT_WATCH_DISTANCE_METERS,
            time_interval: DEFAULT_WATCH_INTERVAL,
        }
    }
}

/// A stream of watched readings. Dropping it stops the subscription.
pub type PositionStream = BoxStream<'static, Result<LocationCoordinates, LocationError>>;

/// A place as reported by the platform's reverse geocoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    pub name: Option<String>,
    pub street: Option<String>,
    pub district: Option<String>,
    pub subregion: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

/// A human-readable address for a reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocationAddress {
    pub name: Option<String>,
    pub street: Option<String>,
    pub district: Option<String>,
    pub subregion: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub formatted_address: String,
}

impl LocationAddress {
    /// An address that is only the coordinates, `"lat, lon"`.
    pub fn from_coordinates(coords: &LocationCoordinates) -> Self {
        Self {
            formatted_address: format!("{:.6}, {:.6}", coords.latitude, coords.longitude),
            ..Self::default()
        }
    }

    fn from_place(place: Place, coords: &LocationCoordinates) -> Self {
        let parts: Vec<&str> = [
            place.name.as_deref(),
            place.street.as_deref(),
            place.district.as_deref().or(place.subregion.as_deref()),
            place.city.as_deref(),
            place.region.as_deref(),
            place.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();

        if parts.is_empty() {
            return Self::from_coordinates(coords);
        }

        Self {
            formatted_address: parts.join(", "),
            name: place.name,
            street: place.street,
            district: place.district,
            subregion: place.subregion,
            city: place.city,
            region: place.region,
            country: place.country,
            postal_code: place.postal_code,
        }
    }
}

/// A reading plus its optional address.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationResult {
    pub coordinates: LocationCoordinates,
    pub address: Option<LocationAddress>,
    pub timestamp: SystemTime,
}

/// Errors from the location path.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    /// The platform did not answer within the timeout.
    #[error("Location request timed out after {}ms. Please ensure GPS is enabled and try again.", .after.as_millis())]
    TimedOut { after: Duration },

    /// The platform answered with an error.
    #[error("Unable to get your location: {reason}")]
    Unavailable { reason: String },

    /// No attempt was made, so there is no error to report.
    #[error("Failed to get location after {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// The platform location API.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Reads the current position. May never resolve; callers bound it.
    async fn current_position(&self, accuracy: Accuracy)
        -> Result<LocationCoordinates, LocationError>;

    /// Looks up the place at `coords`, `None` if nothing is known there.
    async fn reverse_geocode(
        &self,
        coords: &LocationCoordinates,
    ) -> Result<Option<Place>, LocationError>;

    /// Subscribes to position updates until the stream is dropped.
    fn watch_position(&self, options: WatchOptions) -> PositionStream;

    /// Whether the device's location services are switched on.
    async fn services_enabled(&self) -> Result<bool, LocationError>;
}

/// A provider with a fixed reading, for emulators and tests.
#[derive(Debug, Clone)]
pub struct StaticLocationProvider {
    coordinates: LocationCoordinates,
    place: Option<Place>,
}

impl StaticLocationProvider {
    /// Always reports `coordinates` and no place.
    pub fn new(coordinates: LocationCoordinates) -> Self {
        Self {
            coordinates,
            place: None,
        }
    }

    /// Reports `place` from reverse geocoding.
    pub fn with_place(mut self, place: Place) -> Self {
        self.place = Some(place);
        self
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn current_position(&self, _accuracy: Accuracy) -> Result<LocationCoordinates, LocationError> {
        Ok(self.coordinates)
    }

    async fn reverse_geocode(
        &self,
        _coords: &LocationCoordinates,
    ) -> Result<Option<Place>, LocationError> {
        Ok(self.place.clone())
    }

    fn watch_position(&self, _options: WatchOptions) -> PositionStream {
        stream::once(futures::future::ready(Ok(self.coordinates))).boxed()
    }

    async fn services_enabled(&self) -> Result<bool, LocationError> {
        Ok(true)
    }
}

/// Wraps a [`LocationProvider`] with timeouts, retries and address lookup.
#[derive(Debug, Clone)]
pub struct LocationService<P> {
    provider: P,
}

impl<P: LocationProvider> LocationService<P> {
    /// Wraps `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Takes one reading, racing the provider against `options.timeout`.
    ///
    /// # Errors
    ///
    /// [`LocationError::TimedOut`] if the timeout wins, otherwise the
    /// provider's error.
    pub async fn current_location(
        &self,
        options: LocationOptions,
    ) -> Result<LocationCoordinates, LocationError> {
        let reading = self.provider.current_position(options.accuracy);

        match tokio::time::timeout(options.timeout, reading).await {
            Ok(Ok(coords)) => {
                tracing::info!(
                    latitude = coords.latitude,
                    longitude = coords.longitude,
                    accuracy = ?coords.accuracy,
                    "Location obtained"
                );
                Ok(coords)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LocationError::TimedOut {
                after: options.timeout,
            }),
        }
    }

    /// Returns `true` if location services are on. A failed check counts as off.
    pub async fn services_enabled(&self) -> bool {
        match self.provider.services_enabled().await {
            Ok(enabled) => enabled,
            Err(e) => {
                tracing::error!(error = %e, "Error checking location services");
                false
            }
        }
    }

    /// Streams readings for continuous tracking.
    ///
    /// The first reading is always delivered; later ones only once the device
    /// has moved at least `options.distance_interval_meters` from the last
    /// delivered reading. Errors are passed through. Drop the stream to stop
    /// watching.
    pub fn watch_location(&self, options: WatchOptions) -> PositionStream {
        let min_distance = options.distance_interval_meters;
        let mut last_delivered: Option<LocationCoordinates> = None;

        self.provider
            .watch_position(options)
            .filter(move |reading| {
                let deliver = match reading {
                    Ok(coords) => {
                        let too_close = last_delivered
                            .as_ref()
                            .is_some_and(|last| distance_meters(last, coords) < min_distance);
                        if !too_close {
                            last_delivered = Some(*coords);
                        }
                        !too_close
                    }
                    Err(_) => true,
                };
                futures::future::ready(deliver)
            })
            .boxed()
    }

    /// Takes a reading, trying up to `max_attempts` times.
    ///
    /// After failed attempt `n` it waits [`location_backoff`]`(n)`: 1s, 2s,
    /// 4s and so on, without a cap.
    ///
    /// # Errors
    ///
    /// The last attempt's error, or [`LocationError::Exhausted`] when
    /// `max_attempts` is 0.
    pub async fn location_with_retry(
        &self,
        max_attempts: usize,
        options: LocationOptions,
    ) -> Result<LocationCoordinates, LocationError> {
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            tracing::debug!(attempt = attempt, max_attempts = max_attempts, "Location attempt");

            match self.current_location(options).await {
                Ok(coords) => return Ok(coords),
                Err(e) => {
                    tracing::warn!(error = %e, attempt = attempt, "Location attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(location_backoff(attempt)).await;
            }
        }

        Err(last_error.unwrap_or(LocationError::Exhausted {
            attempts: max_attempts,
        }))
    }

    /// Reverse-geocodes `coords`, falling back to the bare coordinates when
    /// the geocoder knows nothing about the place.
    ///
    /// # Errors
    ///
    /// Returns the geocoder's error.
    pub async fn address_for(
        &self,
        coords: &LocationCoordinates,
    ) -> Result<LocationAddress, LocationError> {
        Ok(match self.provider.reverse_geocode(coords).await? {
            Some(place) => LocationAddress::from_place(place, coords),
            None => LocationAddress::from_coordinates(coords),
        })
    }

    /// Takes one reading and, unless `skip_geocoding`, looks up its address.
    ///
    /// A failed address lookup leaves `address` empty; it never fails the
    /// reading.
    ///
    /// # Errors
    ///
    /// Returns the reading's error.
    pub async fn current_location_with_address(
        &self,
        options: LocationOptions,
        skip_geocoding: bool,
    ) -> Result<LocationResult, LocationError> {
        let coordinates = self.current_location(options).await?;

        let address = if skip_geocoding {
            None
        } else {
            match self.address_for(&coordinates).await {
                Ok(address) => Some(address),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not get address, continuing without it");
                    None
                }
            }
        };

        Ok(LocationResult {
            coordinates,
            address,
            timestamp: SystemTime::now(),
        })
    }
}

/// Wait after failed location attempt `attempt` (1-indexed): `2^(attempt-1)` seconds.
pub fn location_backoff(attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    Duration::from_secs(2u64.saturating_pow(exponent))
}

/// `"lat,lon"` with six decimals, as the attendance API expects.
pub fn format_coordinates_for_api(coords: &LocationCoordinates) -> String {
    format!("{:.6},{:.6}", coords.latitude, coords.longitude)
}

/// Great-circle distance in meters (haversine).
pub fn distance_meters(a: &LocationCoordinates, b: &LocationCoordinates) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Returns `true` if `current` lies within `radius_meters` of `workplace`.
pub fn is_within_radius(
    current: &LocationCoordinates,
    workplace: &LocationCoordinates,
    radius_meters: f64,
) -> bool {
    distance_meters(current, workplace) <= radius_meters
}
