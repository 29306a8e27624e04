use crate::error::{lock_poisoned, Result};
use crate::types::{
    AxisData, BaroData, GpsData, LightData, Sample, SampleSnapshot, SensorKind, SensorState,
    StepData,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Platform capability for one family of sensors.
///
/// Implementations wrap whatever the host exposes (Android sensor manager,
/// sysfs IIO, a replay file). `read` is polled at the subscription interval
/// and returns `None` when no fresh reading is ready.
pub trait SensorBackend: Send + Sync + 'static {
    /// Hardware present and, where applicable, the backing service enabled
    fn is_available(&self, kind: SensorKind) -> bool;

    fn has_permission(&self, kind: SensorKind) -> bool;

    /// Ask the platform for access; returns the granted outcome
    fn request_permission(&self, kind: SensorKind) -> bool;

    fn read(&self, kind: SensorKind) -> Option<Sample>;
}

/// Owns the per-sensor feeds and the most recent sample of each sensor.
pub struct SensorHub {
    backend: Arc<dyn SensorBackend>,
    buffers: Arc<RwLock<SampleSnapshot>>,
    feeds: Mutex<HashMap<SensorKind, JoinHandle<()>>>,
    granted: RwLock<SensorState>,
    available: RwLock<SensorState>,
}

impl SensorHub {
    pub fn new(backend: Arc<dyn SensorBackend>) -> Self {
        Self {
            backend,
            buffers: Arc::new(RwLock::new(SampleSnapshot::default())),
            feeds: Mutex::new(HashMap::new()),
            granted: RwLock::new(SensorState::none()),
            available: RwLock::new(SensorState::none()),
        }
    }

    /// Probe every supported sensor. Never fails; a failed probe reads as `false`.
    pub fn detect_availability(&self) -> SensorState {
        let mut state = SensorState::none();
        for kind in SensorKind::ALL {
            let present = self.backend.is_available(kind);
            log::debug!("[sensors] {} available: {}", kind, present);
            state.set(kind, present);
        }
        if let Ok(mut available) = self.available.write() {
            *available = state;
        }
        state
    }

    /// Request access to every sensor that does not already have it.
    ///
    /// Each sensor is handled independently so one denial never blocks the
    /// rest.
    pub fn request_permissions(&self) -> SensorState {
        let mut state = SensorState::none();
        for kind in SensorKind::ALL {
            let granted = if self.backend.has_permission(kind) {
                true
            } else {
                self.backend.request_permission(kind)
            };
            if !granted {
                log::warn!("[sensors] permission denied for {}", kind);
            }
            state.set(kind, granted);
        }
        if let Ok(mut current) = self.granted.write() {
            *current = state;
        }
        state
    }

    /// Sensors that may be enabled for a session: available and granted.
    pub fn usable(&self) -> Result<SensorState> {
        let available = *self.available.read().map_err(|_| lock_poisoned("availability"))?;
        let granted = *self.granted.read().map_err(|_| lock_poisoned("permission"))?;
        Ok(available.intersect(&granted))
    }

    /// Open a feed that overwrites the sensor's buffered sample.
    ///
    /// Any existing feed for the sensor is replaced and the buffer cleared so
    /// the new subscription starts clean.
    pub async fn subscribe(&self, kind: SensorKind, interval_ms: u64) -> Result<()> {
        let buffers = Arc::clone(&self.buffers);
        self.subscribe_with(kind, interval_ms, move |sample| {
            if let Ok(mut snapshot) = buffers.write() {
                snapshot.store(sample);
            }
        })
        .await
    }

    /// Open a feed delivering every reading to `on_sample`.
    pub async fn subscribe_with<F>(&self, kind: SensorKind, interval_ms: u64, on_sample: F) -> Result<()>
    where
        F: Fn(Sample) + Send + 'static,
    {
        self.unsubscribe(kind).await?;
        self.buffers
            .write()
            .map_err(|_| lock_poisoned("sample buffer"))?
            .reset(kind);

        let backend = Arc::clone(&self.backend);
        let handle = tokio::spawn(feed_loop(backend, kind, interval_ms.max(1), on_sample));
        self.feeds
            .lock()
            .map_err(|_| lock_poisoned("feed"))?
            .insert(kind, handle);
        log::debug!("[sensors] subscribed {} at {} ms", kind, interval_ms);
        Ok(())
    }

    /// Close the feed for a sensor. Safe to call when not subscribed.
    ///
    /// Returns only after the feed task has finished, so no callback can run
    /// once this resolves.
    pub async fn unsubscribe(&self, kind: SensorKind) -> Result<()> {
        let handle = self
            .feeds
            .lock()
            .map_err(|_| lock_poisoned("feed"))?
            .remove(&kind);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            log::debug!("[sensors] unsubscribed {}", kind);
        }
        Ok(())
    }

    pub async fn unsubscribe_all(&self) -> Result<()> {
        for kind in SensorKind::ALL {
            self.unsubscribe(kind).await?;
        }
        Ok(())
    }

    pub fn is_subscribed(&self, kind: SensorKind) -> bool {
        self.feeds
            .lock()
            .map(|feeds| feeds.contains_key(&kind))
            .unwrap_or(false)
    }

    /// Copy of the most recent sample of every sensor
    pub fn snapshot(&self) -> Result<SampleSnapshot> {
        Ok(*self.buffers.read().map_err(|_| lock_poisoned("sample buffer"))?)
    }
}

impl Drop for SensorHub {
    fn drop(&mut self) {
        if let Ok(mut feeds) = self.feeds.lock() {
            for (_, handle) in feeds.drain() {
                handle.abort();
            }
        }
    }
}

async fn feed_loop<F>(backend: Arc<dyn SensorBackend>, kind: SensorKind, interval_ms: u64, on_sample: F)
where
    F: Fn(Sample) + Send + 'static,
{
    let mut ticker = interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;

        if let Some(sample) = backend.read(kind) {
            on_sample(sample);
            sample_count += 1;
            if sample_count % 500 == 0 {
                log::debug!("[{}] {} samples", kind, sample_count);
            }
        }
    }
}

/// Backend producing smooth synthetic readings for every sensor.
///
/// Used by the CLI when no hardware is attached and by tests. Availability and
/// permission outcomes are configurable per sensor.
pub struct SyntheticBackend {
    available: SensorState,
    already_granted: SensorState,
    grant_on_request: SensorState,
    counter: AtomicU64,
}

impl SyntheticBackend {
    /// Every sensor present and granted
    pub fn new() -> Self {
        Self::with_states(SensorState::all(), SensorState::all(), SensorState::all())
    }

    pub fn with_states(
        available: SensorState,
        already_granted: SensorState,
        grant_on_request: SensorState,
    ) -> Self {
        Self {
            available,
            already_granted,
            grant_on_request,
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBackend for SyntheticBackend {
    fn is_available(&self, kind: SensorKind) -> bool {
        self.available.get(kind)
    }

    fn has_permission(&self, kind: SensorKind) -> bool {
        self.already_granted.get(kind)
    }

    fn request_permission(&self, kind: SensorKind) -> bool {
        self.grant_on_request.get(kind)
    }

    fn read(&self, kind: SensorKind) -> Option<Sample> {
        use std::f64::consts::PI;

        if !self.available.get(kind) {
            return None;
        }
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) as f64;
        let t = seq * 0.02;
        let timestamp = current_timestamp();

        let sample = match kind {
            SensorKind::Gps => Sample::Gps(GpsData {
                timestamp,
                latitude: 37.7749 + seq * 0.00001,
                longitude: -122.4194 + seq * 0.00001,
                altitude: 12.0 + (seq * 0.05).sin(),
                speed: 10.0 + (seq * 0.5).sin() * 5.0,
                heading: (seq * 0.5) % 360.0,
                accuracy: 5.0 + (seq * 0.1).sin() * 2.0,
            }),
            SensorKind::Accelerometer => Sample::Accelerometer(AxisData {
                timestamp,
                x: (t * 2.0 * PI).sin() * 0.5,
                y: (t * 2.0 * PI).cos() * 0.3,
                z: 9.81 + (t * PI).sin() * 0.1,
            }),
            SensorKind::Gyroscope => Sample::Gyroscope(AxisData {
                timestamp,
                x: (t * 0.5).sin() * 0.05,
                y: (t * 0.3).cos() * 0.03,
                z: (t * 1.0).sin() * 0.1,
            }),
            SensorKind::Magnetometer => Sample::Magnetometer(AxisData {
                timestamp,
                x: 22.0 + (t * 0.2).cos(),
                y: 5.0 + (t * 0.2).sin(),
                z: -41.0,
            }),
            SensorKind::Barometer => Sample::Barometer(BaroData {
                timestamp,
                pressure_hpa: 1013.25 + (t * 0.1).sin() * 0.4,
            }),
            SensorKind::Pedometer => Sample::Pedometer(StepData {
                timestamp,
                steps: (seq / 25.0) as u64,
            }),
            SensorKind::Light => Sample::Light(LightData {
                timestamp,
                illuminance: 320.0 + (t * 0.7).sin() * 40.0,
            }),
        };
        Some(sample)
    }
}

pub fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
