use crate::error::{LoggerError, Result};
use crate::format;
use crate::sensors::SensorHub;
use crate::storage::{
    last_log_number, repair_unterminated, rotating_file_name, LogRotation, LogTarget, LogWriter,
};
use crate::types::{SensorKind, SensorState};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No run in progress
    Idle,
    /// Sampling and appending records
    Active,
}

/// Session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub started_at_ms: i64,
    pub state: SessionState,
    pub interval_ms: u64,
    pub active_sensors: SensorState,
    pub records_written: u64,
    pub path: PathBuf,
}

struct ActiveRun {
    metadata: SessionMetadata,
    ticker: JoinHandle<()>,
    records: Arc<AtomicU64>,
}

/// One logging run at a time against a single log target.
///
/// The enabled-sensor mask is copied at `start` and never consulted again,
/// so changing the selection mid-run only affects the next session.
pub struct LogSession {
    hub: Arc<SensorHub>,
    target: LogTarget,
    writer: LogWriter,
    rotation: Mutex<Option<LogRotation>>,
    current: RwLock<Option<PathBuf>>,
    prepared: OnceCell<()>,
    active: Mutex<Option<ActiveRun>>,
}

impl LogSession {
    /// Create an idle session. Must be called inside a tokio runtime.
    pub fn new(hub: Arc<SensorHub>, target: LogTarget) -> Self {
        let (initial, current, rotation) = match &target {
            LogTarget::SingleFile { path } => (path.clone(), Some(path.clone()), None),
            LogTarget::Rotating { dir } => (
                dir.join(rotating_file_name(0)),
                None,
                Some(LogRotation::new(dir.clone())),
            ),
        };

        Self {
            hub,
            target,
            writer: LogWriter::spawn(initial),
            rotation: Mutex::new(rotation),
            current: RwLock::new(current),
            prepared: OnceCell::new(),
            active: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    /// First-access initialisation of the log target, run at most once.
    ///
    /// A single artifact gets crash repair. A rotating directory has nothing
    /// to repair (an interrupted file just lacks its last record) and only
    /// locates the most recent file for export and clear.
    pub async fn prepare(&self) -> Result<()> {
        self.prepared
            .get_or_try_init(|| async {
                match &self.target {
                    LogTarget::SingleFile { path } => {
                        repair_unterminated(path, Utc::now().timestamp_millis()).await?;
                    }
                    LogTarget::Rotating { dir } => {
                        let last = last_log_number(dir).await?;
                        if last > 0 {
                            let path = dir.join(rotating_file_name(last));
                            self.writer.switch_to(path.clone()).await?;
                            self.set_current(path);
                        }
                    }
                }
                Ok::<(), LoggerError>(())
            })
            .await?;
        Ok(())
    }

    /// Artifact that export and clear act on, if one exists yet
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.current.read().ok().and_then(|p| p.clone())
    }

    fn set_current(&self, path: PathBuf) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(path);
        }
    }

    /// Transition to Active (Idle → Active)
    pub async fn start(&self, interval_ms: u64, active_sensors: SensorState) -> Result<SessionMetadata> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(LoggerError::AlreadyRunning);
        }
        if interval_ms == 0 {
            return Err(LoggerError::InvalidParameters(
                "interval must be at least 1 ms".to_string(),
            ));
        }

        let missing = active_sensors.not_in(&self.hub.usable()?);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(SensorKind::name).collect();
            return Err(LoggerError::SensorUnavailable(names.join(", ")));
        }

        self.prepare().await?;

        for kind in active_sensors.enabled() {
            if let Err(e) = self.hub.subscribe(kind, interval_ms).await {
                let _ = self.hub.unsubscribe_all().await;
                return Err(e);
            }
        }

        let started_at_ms = Utc::now().timestamp_millis();
        let path = match self.open_session(started_at_ms, &active_sensors).await {
            Ok(path) => path,
            Err(e) => {
                let _ = self.hub.unsubscribe_all().await;
                return Err(e);
            }
        };

        let records = Arc::new(AtomicU64::new(0));
        let ticker = tokio::spawn(tick_loop(
            Arc::clone(&self.hub),
            self.writer.clone(),
            active_sensors,
            interval_ms,
            Arc::clone(&records),
        ));

        let metadata = SessionMetadata {
            session_id: format!("session_{}", started_at_ms),
            started_at_ms,
            state: SessionState::Active,
            interval_ms,
            active_sensors,
            records_written: 0,
            path,
        };
        log::info!(
            "[session] {} started: {} ms interval, sensors [{}]",
            metadata.session_id,
            interval_ms,
            active_sensors
                .enabled()
                .map(|k| k.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        *active = Some(ActiveRun {
            metadata: metadata.clone(),
            ticker,
            records,
        });
        Ok(metadata)
    }

    /// Write the session preamble and return the file it went to.
    async fn open_session(&self, started_at_ms: i64, mask: &SensorState) -> Result<PathBuf> {
        let header = format::header(mask);
        match &self.target {
            LogTarget::SingleFile { path } => {
                // One append so START and header cannot be split by a crash between writes
                let preamble = format!("{}\n{}\n", format::start_marker(started_at_ms), header);
                self.writer.append(preamble).await?;
                Ok(path.clone())
            }
            LogTarget::Rotating { .. } => {
                let mut rotation = self.rotation.lock().await;
                let rotation = rotation
                    .as_mut()
                    .ok_or_else(|| LoggerError::Internal("rotation not configured".to_string()))?;
                let path = rotation.next_path().await?;
                self.writer.switch_to(path.clone()).await?;
                self.set_current(path.clone());
                self.writer.append_line(&header).await?;
                Ok(path)
            }
        }
    }

    /// Transition to Idle (Active → Idle).
    ///
    /// Feeds and the ticker are fully stopped before the END marker is
    /// written. Returns whether the END marker was confirmed as the last line;
    /// the session is Idle afterwards either way.
    pub async fn stop(&self) -> Result<bool> {
        let mut active = self.active.lock().await;
        let run = active.take().ok_or(LoggerError::NotRunning)?;

        if let Err(e) = self.hub.unsubscribe_all().await {
            log::error!("[session] failed to release sensor feeds: {}", e);
        }
        run.ticker.abort();
        let _ = run.ticker.await;

        let records = run.records.load(Ordering::Relaxed);
        let verified = if self.target.uses_markers() {
            self.finish_with_marker().await
        } else {
            match self.writer.last_line().await {
                Ok(_) => true,
                Err(e) => {
                    log::error!("[session] failed to flush {}: {}", self.writer.path().display(), e);
                    false
                }
            }
        };

        log::info!(
            "[session] {} stopped: {} records, verified={}",
            run.metadata.session_id,
            records,
            verified
        );
        Ok(verified)
    }

    async fn finish_with_marker(&self) -> bool {
        let marker = format::end_marker(Utc::now().timestamp_millis());
        if let Err(e) = self.writer.append_line(&marker).await {
            log::error!("[session] failed to write {}: {}", marker, e);
            return false;
        }
        match self.writer.last_line().await {
            Ok(Some(line)) if line == marker => true,
            Ok(line) => {
                log::error!(
                    "[session] END verification failed: expected {:?}, found {:?}",
                    marker,
                    line
                );
                false
            }
            Err(e) => {
                log::error!("[session] END verification failed: {}", e);
                false
            }
        }
    }

    /// Truncate the current artifact, whatever the session state.
    pub async fn clear(&self) -> Result<()> {
        self.prepare().await?;
        if self.artifact_path().is_some() {
            self.writer.truncate().await?;
            log::info!("[session] cleared {}", self.writer.path().display());
        }
        Ok(())
    }

    pub async fn state(&self) -> SessionState {
        if self.active.lock().await.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == SessionState::Active
    }

    /// Metadata snapshot of the running session
    pub async fn metadata(&self) -> Option<SessionMetadata> {
        self.active.lock().await.as_ref().map(|run| {
            let mut meta = run.metadata.clone();
            meta.records_written = run.records.load(Ordering::Relaxed);
            meta
        })
    }
}

async fn tick_loop(
    hub: Arc<SensorHub>,
    writer: LogWriter,
    mask: SensorState,
    interval_ms: u64,
    records: Arc<AtomicU64>,
) {
    let mut ticker = interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; records start one interval in
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let snapshot = match hub.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("[session] {}", e);
                continue;
            }
        };
        let line = format::format_record(&Local::now().naive_local(), &snapshot, &mask, interval_ms);
        match writer.append_line(&line).await {
            Ok(()) => {
                records.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::error!("[session] failed to append record: {}", e),
        }
    }
}
