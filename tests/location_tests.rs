//! Location service tests against a scripted provider, on paused tokio time.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rollcall::location::{
    Accuracy, LocationCoordinates, LocationError, LocationOptions, LocationProvider,
    LocationService, Place, PositionStream, StaticLocationProvider, WatchOptions,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Step {
    Hang,
    Fail(&'static str),
    Fix(LocationCoordinates),
}

/// Replays a fixed script of readings; the last step repeats.
struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    readings: AtomicUsize,
    geocode: Result<Option<Place>, LocationError>,
    geocodes: AtomicUsize,
    track: Vec<Result<LocationCoordinates, LocationError>>,
    watched_with: Mutex<Option<WatchOptions>>,
    enabled: Result<bool, LocationError>,
}

impl ScriptedProvider {
    fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            readings: AtomicUsize::new(0),
            geocode: Ok(None),
            geocodes: AtomicUsize::new(0),
            track: Vec::new(),
            watched_with: Mutex::new(None),
            enabled: Ok(true),
        }
    }

    fn with_track(mut self, track: Vec<Result<LocationCoordinates, LocationError>>) -> Self {
        self.track = track;
        self
    }

    fn with_services(mut self, enabled: Result<bool, LocationError>) -> Self {
        self.enabled = enabled;
        self
    }

    fn with_geocode(mut self, geocode: Result<Option<Place>, LocationError>) -> Self {
        self.geocode = geocode;
        self
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    async fn current_position(
        &self,
        _accuracy: Accuracy,
    ) -> Result<LocationCoordinates, LocationError> {
        self.readings.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Hang => std::future::pending().await,
            Step::Fail(reason) => Err(LocationError::Unavailable {
                reason: reason.to_string(),
            }),
            Step::Fix(coords) => Ok(coords),
        }
    }

    async fn reverse_geocode(
        &self,
        _coords: &LocationCoordinates,
    ) -> Result<Option<Place>, LocationError> {
        self.geocodes.fetch_add(1, Ordering::SeqCst);
        self.geocode.clone()
    }

    fn watch_position(&self, options: WatchOptions) -> PositionStream {
        *self.watched_with.lock().unwrap() = Some(options);
        stream::iter(self.track.clone()).boxed()
    }

    async fn services_enabled(&self) -> Result<bool, LocationError> {
        self.enabled.clone()
    }
}

fn office() -> LocationCoordinates {
    LocationCoordinates::new(18.4649, 73.8678).with_accuracy(12.0)
}

fn options(timeout_ms: u64) -> LocationOptions {
    LocationOptions {
        timeout: Duration::from_millis(timeout_ms),
        accuracy: Accuracy::High,
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_reading_times_out() {
    let service = LocationService::new(ScriptedProvider::new([Step::Hang]));

    let started = Instant::now();
    let result = service.current_location(options(250)).await;

    assert_eq!(
        result,
        Err(LocationError::TimedOut {
            after: Duration::from_millis(250)
        })
    );
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_provider_is_bounded_by_timeouts_and_backoff() {
    let service = LocationService::new(ScriptedProvider::new([Step::Hang]));

    let started = Instant::now();
    let result = service.location_with_retry(2, options(100)).await;

    // two 100ms timeouts around one second of backoff
    assert!(matches!(result, Err(LocationError::TimedOut { .. })));
    assert!(started.elapsed() >= Duration::from_millis(1100));
    assert_eq!(service.provider().readings.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_on_second_attempt() {
    let provider = ScriptedProvider::new([Step::Fail("GPS signal lost"), Step::Fix(office())]);
    let service = LocationService::new(provider);

    let started = Instant::now();
    let coords = service.location_with_retry(3, options(1000)).await.unwrap();

    assert_eq!(coords, office());
    assert_eq!(service.provider().readings.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let provider = ScriptedProvider::new([Step::Fail("no fix")]);
    let service = LocationService::new(provider);

    let started = Instant::now();
    let result = service.location_with_retry(4, options(1000)).await;

    assert_eq!(
        result,
        Err(LocationError::Unavailable {
            reason: "no fix".to_string()
        })
    );
    // 1s + 2s + 4s, no wait after the last attempt
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert!(started.elapsed() < Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_zero_attempts_is_exhausted() {
    let service = LocationService::new(ScriptedProvider::new([Step::Fix(office())]));

    let result = service.location_with_retry(0, options(1000)).await;

    assert_eq!(result, Err(LocationError::Exhausted { attempts: 0 }));
    assert_eq!(service.provider().readings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_address_is_attached() {
    let place = Place {
        name: Some("Main Gate".into()),
        city: Some("Pune".into()),
        country: Some("India".into()),
        ..Place::default()
    };
    let provider = ScriptedProvider::new([Step::Fix(office())]).with_geocode(Ok(Some(place)));
    let service = LocationService::new(provider);

    let result = service
        .current_location_with_address(options(1000), false)
        .await
        .unwrap();

    assert_eq!(result.coordinates, office());
    let address = result.address.unwrap();
    assert_eq!(address.formatted_address, "Main Gate, Pune, India");
    assert_eq!(address.city.as_deref(), Some("Pune"));
}

#[tokio::test]
async fn test_unknown_place_falls_back_to_coordinates() {
    let provider = ScriptedProvider::new([Step::Fix(office())]).with_geocode(Ok(None));
    let service = LocationService::new(provider);

    let address = service.address_for(&office()).await.unwrap();
    assert_eq!(address.formatted_address, "18.464900, 73.867800");
}

#[tokio::test]
async fn test_geocoding_failure_does_not_fail_the_reading() {
    let provider = ScriptedProvider::new([Step::Fix(office())]).with_geocode(Err(
        LocationError::Unavailable {
            reason: "geocoder offline".to_string(),
        },
    ));
    let service = LocationService::new(provider);

    let result = service
        .current_location_with_address(options(1000), false)
        .await
        .unwrap();

    assert_eq!(result.coordinates, office());
    assert!(result.address.is_none());
    assert_eq!(service.provider().geocodes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_skip_geocoding() {
    let service = LocationService::new(ScriptedProvider::new([Step::Fix(office())]));

    let result = service
        .current_location_with_address(options(1000), true)
        .await
        .unwrap();

    assert!(result.address.is_none());
    assert_eq!(service.provider().geocodes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reading_error_fails_the_combined_call() {
    let service = LocationService::new(ScriptedProvider::new([Step::Hang]));

    let result = service
        .current_location_with_address(options(500), false)
        .await;

    assert!(matches!(result, Err(LocationError::TimedOut { .. })));
    assert_eq!(service.provider().geocodes.load(Ordering::SeqCst), 0);
}

fn north_of_office(meters: f64) -> LocationCoordinates {
    // one degree of latitude is about 111.19 km
    LocationCoordinates::new(office().latitude + meters / 111_195.0, office().longitude)
}

#[tokio::test]
async fn test_watch_drops_readings_within_distance_interval() {
    let lost = LocationError::Unavailable {
        reason: "signal lost".to_string(),
    };
    let provider = ScriptedProvider::new([Step::Fix(office())]).with_track(vec![
        Ok(office()),
        Ok(north_of_office(5.0)),
        Ok(north_of_office(25.0)),
        Err(lost.clone()),
        Ok(north_of_office(30.0)),
        Ok(north_of_office(40.0)),
    ]);
    let service = LocationService::new(provider);

    let delivered: Vec<_> = service
        .watch_location(WatchOptions::default())
        .collect()
        .await;

    assert_eq!(
        delivered,
        vec![
            Ok(office()),
            Ok(north_of_office(25.0)),
            Err(lost),
            Ok(north_of_office(40.0)),
        ]
    );
}

#[tokio::test]
async fn test_watch_defaults_favor_battery() {
    let provider = ScriptedProvider::new([Step::Fix(office())]);
    let service = LocationService::new(provider);

    let defaults = WatchOptions::default();
    assert_eq!(defaults.accuracy, Accuracy::Balanced);
    assert_eq!(defaults.distance_interval_meters, 10.0);
    assert_eq!(defaults.time_interval, Duration::from_secs(5));

    let mut readings = service.watch_location(defaults);
    assert!(readings.next().await.is_none());
    assert_eq!(*service.provider().watched_with.lock().unwrap(), Some(defaults));
}

#[tokio::test]
async fn test_zero_distance_interval_delivers_every_reading() {
    let provider = ScriptedProvider::new([Step::Fix(office())])
        .with_track(vec![Ok(office()), Ok(office()), Ok(north_of_office(1.0))]);
    let service = LocationService::new(provider);

    let options = WatchOptions {
        distance_interval_meters: 0.0,
        ..WatchOptions::default()
    };
    let delivered: Vec<_> = service.watch_location(options).collect().await;
    assert_eq!(delivered.len(), 3);
}

#[tokio::test]
async fn test_static_provider_watch_yields_its_fix() {
    let service = LocationService::new(StaticLocationProvider::new(office()));

    let delivered: Vec<_> = service
        .watch_location(WatchOptions::default())
        .collect()
        .await;
    assert_eq!(delivered, vec![Ok(office())]);
    assert!(service.services_enabled().await);
}

#[tokio::test]
async fn test_services_enabled_treats_errors_as_off() {
    let off = LocationService::new(ScriptedProvider::new([Step::Hang]).with_services(Ok(false)));
    assert!(!off.services_enabled().await);

    let broken = LocationService::new(ScriptedProvider::new([Step::Hang]).with_services(Err(
        LocationError::Unavailable {
            reason: "no location provider".to_string(),
        },
    )));
    assert!(!broken.services_enabled().await);

    let on = LocationService::new(ScriptedProvider::new([Step::Hang]));
    assert!(on.services_enabled().await);
}
