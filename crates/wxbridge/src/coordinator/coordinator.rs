use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use arc_swap::ArcSwap;
use arc_swap::ArcSwapOption;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::backoff::BackoffPolicy;
use super::subscriber::Subscriber;
use super::subscriber::SubscriberId;
use crate::secret::ApiKey;
use crate::weather::build;
use crate::weather::EndpointKind;
use crate::weather::FetchError;
use crate::weather::FetchResults;
use crate::weather::LocationDescriptor;
use crate::weather::WeatherGateway;
use crate::weather::WeatherSnapshot;

/// A subscriber taking longer than this to handle a snapshot is logged.
const SLOW_SUBSCRIBER: Duration = Duration::from_millis(250);

/// Refresh lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Idle,
    Refreshing,
    /// The last cycle failed on every endpoint; waiting out the retry delay.
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled,
    Requested,
}

struct Status {
    phase: Phase,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<FetchError>,
    failures: BTreeMap<EndpointKind, FetchError>,
    consecutive_failures: u32,
    /// `None` parks the scheduler.
    next_refresh: Option<Instant>,
    reauth_required: bool,
}

/// Point-in-time view of the coordinator for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub phase: Phase,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<FetchError>,
    /// Errors of the endpoints that failed in the last cycle.
    pub failures: BTreeMap<EndpointKind, FetchError>,
    pub consecutive_failures: u32,
    pub reauth_required: bool,
    pub next_refresh_in_seconds: Option<u64>,
    pub update_interval_seconds: u64,
    pub subscribers: usize,
}

/// Owns the refresh lifecycle for one location.
///
/// All mutable state lives here. Readers get the current snapshot through an atomic
/// pointer load; a refresh builds a new snapshot and swaps it in.
pub struct Coordinator {
    gateway: Arc<dyn WeatherGateway>,
    location: LocationDescriptor,
    interval: Duration,
    backoff: BackoffPolicy,

    api_key: ArcSwap<ApiKey>,
    snapshot: ArcSwapOption<WeatherSnapshot>,
    status: Mutex<Status>,

    /// Ordered by id, which is the registration order.
    subscribers: Mutex<BTreeMap<SubscriberId, Arc<dyn Subscriber>>>,
    next_subscriber: AtomicU64,

    /// Held for the duration of a refresh cycle.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Number of completed refresh cycles.
    cycles: AtomicU64,

    schedule_changed: Notify,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(
        gateway: Arc<dyn WeatherGateway>,
        location: LocationDescriptor,
        api_key: ApiKey,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            location,
            interval,
            backoff: BackoffPolicy::for_interval(interval),
            api_key: ArcSwap::from_pointee(api_key),
            snapshot: ArcSwapOption::empty(),
            status: Mutex::new(Status {
                phase: Phase::Idle,
                last_update: None,
                last_error: None,
                failures: BTreeMap::new(),
                consecutive_failures: 0,
                next_refresh: None,
                reauth_required: false,
            }),
            subscribers: Mutex::new(BTreeMap::new()),
            next_subscriber: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
            cycles: AtomicU64::new(0),
            schedule_changed: Notify::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn location(&self) -> &LocationDescriptor {
        &self.location
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock_status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, BTreeMap<SubscriberId, Arc<dyn Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber.
    ///
    /// If a snapshot exists it is delivered immediately. If none exists and nothing is
    /// scheduled yet, this schedules the first refresh. After shutdown the subscriber
    /// is not retained and the returned id is already unregistered.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::SeqCst));
        {
            let mut subscribers = self.lock_subscribers();
            if self.shutdown.is_cancelled() {
                debug!(subscriber = subscriber.name(), %id, "Coordinator shut down, not registering");
                return id;
            }
            debug!(subscriber = subscriber.name(), %id, "Registering subscriber");
            subscribers.insert(id, subscriber.clone());
        }

        if let Some(snapshot) = self.snapshot.load_full() {
            subscriber.on_snapshot(&snapshot);
            return id;
        }

        let mut status = self.lock_status();
        if status.next_refresh.is_none() && !status.reauth_required {
            status.next_refresh = Some(Instant::now());
            drop(status);
            self.schedule_changed.notify_one();
        }
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.lock_subscribers().remove(&id).is_some()
    }

    /// The most recently published snapshot, if any was ever built.
    pub fn current_snapshot(&self) -> Option<Arc<WeatherSnapshot>> {
        self.snapshot.load_full()
    }

    pub fn last_error(&self) -> Option<FetchError> {
        self.lock_status().last_error.clone()
    }

    /// Whether the upstream rejected the key. Automatic refreshes are stopped until
    /// [`Coordinator::update_api_key`] is called.
    pub fn reauth_required(&self) -> bool {
        self.lock_status().reauth_required
    }

    pub fn phase(&self) -> Phase {
        self.lock_status().phase
    }

    pub fn status(&self) -> CoordinatorStatus {
        let subscribers = self.lock_subscribers().len();
        let status = self.lock_status();
        let now = Instant::now();
        CoordinatorStatus {
            phase: status.phase,
            last_update: status.last_update,
            last_error: status.last_error.clone(),
            failures: status.failures.clone(),
            consecutive_failures: status.consecutive_failures,
            reauth_required: status.reauth_required,
            next_refresh_in_seconds: status
                .next_refresh
                .map(|at| at.saturating_duration_since(now).as_secs()),
            update_interval_seconds: self.interval.as_secs(),
            subscribers,
        }
    }

    /// Replace the API key, clear the reauthentication condition and refresh right away.
    pub fn update_api_key(&self, api_key: ApiKey) {
        self.api_key.store(Arc::new(api_key));
        {
            let mut status = self.lock_status();
            status.reauth_required = false;
            status.consecutive_failures = 0;
            if status.last_error.as_ref().is_some_and(FetchError::is_auth) {
                status.last_error = None;
            }
            status.next_refresh = Some(Instant::now());
        }
        info!("API key updated, resuming refresh");
        self.schedule_changed.notify_one();
    }

    /// Refresh now, or join the refresh already in flight.
    ///
    /// A call that arrives while a cycle is running joins that cycle and returns when
    /// it has completed and its subscribers have been notified. Otherwise a new cycle
    /// runs.
    pub async fn request_refresh(&self) {
        self.refresh(Trigger::Requested).await;
    }

    /// Stop scheduling and drop all subscribers. An in-flight refresh runs to completion.
    pub fn shutdown(&self) {
        info!("Coordinator shutting down");
        {
            let mut subscribers = self.lock_subscribers();
            self.shutdown.cancel();
            subscribers.clear();
        }
        self.lock_status().next_refresh = None;
        self.schedule_changed.notify_one();
    }

    /// Drive scheduled refreshes until [`Coordinator::shutdown`] is called.
    pub async fn run(self: Arc<Self>) {
        info!(
            location = %self.location,
            interval_secs = self.interval.as_secs(),
            "Coordinator starting"
        );

        loop {
            let deadline = self.lock_status().next_refresh;
            let wait = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.schedule_changed.notified() => continue,
                _ = wait => self.refresh(Trigger::Scheduled).await,
            }
        }

        info!("Coordinator stopped");
    }

    fn is_due(&self) -> bool {
        self.lock_status()
            .next_refresh
            .is_some_and(|at| at <= Instant::now())
    }

    async fn refresh(&self, trigger: Trigger) {
        let observed = self.cycles.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;

        if self.shutdown.is_cancelled() {
            return;
        }
        if self.cycles.load(Ordering::SeqCst) != observed {
            debug!(?trigger, "Refresh coalesced into the one in flight");
            return;
        }
        match trigger {
            Trigger::Scheduled if !self.is_due() => return,
            Trigger::Requested if self.reauth_required() => {
                warn!("Refresh skipped: API key was rejected, reauthentication required");
                return;
            }
            _ => {}
        }

        self.refresh_cycle().await;
        self.cycles.fetch_add(1, Ordering::SeqCst);
        self.schedule_changed.notify_one();
    }

    async fn refresh_cycle(&self) {
        self.lock_status().phase = Phase::Refreshing;
        debug!(location = %self.location, "Refreshing weather data");

        let api_key = self.api_key.load_full();
        let key: &ApiKey = &api_key;
        let location = &self.location;
        let (current, hourly, daily, alerts, air_quality) = tokio::join!(
            self.gateway.fetch(EndpointKind::Current, location, key),
            self.gateway.fetch(EndpointKind::Hourly, location, key),
            self.gateway.fetch(EndpointKind::Daily, location, key),
            self.gateway.fetch(EndpointKind::Alerts, location, key),
            self.gateway.fetch(EndpointKind::AirQuality, location, key),
        );
        let results: FetchResults = [
            (EndpointKind::Current, current),
            (EndpointKind::Hourly, hourly),
            (EndpointKind::Daily, daily),
            (EndpointKind::Alerts, alerts),
            (EndpointKind::AirQuality, air_quality),
        ]
        .into_iter()
        .collect();

        let failures: BTreeMap<EndpointKind, FetchError> = results
            .iter()
            .filter_map(|(kind, r)| r.as_ref().err().map(|e| (*kind, e.clone())))
            .collect();
        let auth_error = failures.values().find(|e| e.is_auth()).cloned();
        let all_failed = failures.len() == results.len();
        // The key may have been replaced while the fetches were in flight.
        let key_replaced = !Arc::ptr_eq(&self.api_key.load_full(), &api_key);

        if let Some(e) = &auth_error {
            if key_replaced {
                info!(error = %e, "Replaced API key was rejected, retrying with the new key");
            } else {
                error!(error = %e, "API key rejected, automatic refresh stopped until the key is updated");
            }
        }

        if all_failed {
            let mut status = self.lock_status();
            status.phase = Phase::Backoff;
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
            status.last_error = auth_error
                .clone()
                .or_else(|| failures.values().next().cloned());
            status.failures = failures;
            if auth_error.is_some() {
                Self::after_auth_failure(&mut status, key_replaced);
            } else {
                let delay = self.backoff.delay_for(status.consecutive_failures);
                status.next_refresh = Some(Instant::now() + delay);
                warn!(
                    attempt = status.consecutive_failures,
                    retry_in_secs = delay.as_secs(),
                    error = ?status.last_error,
                    "All weather endpoints failed, backing off"
                );
            }
            return;
        }

        let previous = self.snapshot.load_full();
        let snapshot = Arc::new(build(previous.as_deref(), &results));
        self.snapshot.store(Some(snapshot.clone()));

        {
            let mut status = self.lock_status();
            status.last_update = Some(snapshot.fetched_at());
            status.last_error = auth_error
                .clone()
                .or_else(|| failures.values().next().cloned());
            status.failures = failures;
            status.consecutive_failures = 0;
            if auth_error.is_some() {
                Self::after_auth_failure(&mut status, key_replaced);
            } else {
                status.next_refresh = Some(Instant::now() + self.interval);
            }
        }

        if snapshot.partial_failures().is_empty() {
            info!("Weather snapshot published");
        } else {
            warn!(
                stale = ?snapshot.partial_failures(),
                "Weather snapshot published with degraded sections"
            );
        }

        self.notify_subscribers(&snapshot);
        self.lock_status().phase = Phase::Idle;
    }

    /// Park the scheduler on a rejected key, unless the key was replaced during the
    /// cycle; then the new key is tried right away.
    fn after_auth_failure(status: &mut Status, key_replaced: bool) {
        if key_replaced {
            status.next_refresh = Some(Instant::now());
        } else {
            status.reauth_required = true;
            status.next_refresh = None;
        }
    }

    fn notify_subscribers(&self, snapshot: &Arc<WeatherSnapshot>) {
        let subscribers: Vec<Arc<dyn Subscriber>> =
            self.lock_subscribers().values().cloned().collect();

        for subscriber in subscribers {
            let started = std::time::Instant::now();
            subscriber.on_snapshot(snapshot);
            let elapsed = started.elapsed();
            if elapsed > SLOW_SUBSCRIBER {
                warn!(
                    subscriber = subscriber.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow subscriber"
                );
            }
        }
    }
}
