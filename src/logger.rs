use crate::error::{LoggerError, Result};
use crate::sensors::{SensorBackend, SensorHub};
use crate::session::{LogSession, SessionMetadata, SessionState};
use crate::share::{self, ExportOutcome, ShareTarget};
use crate::storage::LogTarget;
use crate::types::SensorState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_INTERVAL_MS: u64 = 200;

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub target: LogTarget,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl LoggerConfig {
    pub fn new(target: LogTarget) -> Self {
        Self {
            target,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(LoggerError::InvalidParameters(
                "interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Entry point tying sensors, the session and export together
pub struct SensorLogger {
    hub: Arc<SensorHub>,
    session: LogSession,
    share: Option<Arc<dyn ShareTarget>>,
    config: LoggerConfig,
}

impl SensorLogger {
    pub fn new(backend: Arc<dyn SensorBackend>, config: LoggerConfig) -> Result<Self> {
        config.validate()?;
        let hub = Arc::new(SensorHub::new(backend));
        let session = LogSession::new(Arc::clone(&hub), config.target.clone());
        Ok(Self {
            hub,
            session,
            share: None,
            config,
        })
    }

    pub fn with_share_target(mut self, target: Arc<dyn ShareTarget>) -> Self {
        self.share = Some(target);
        self
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn hub(&self) -> &SensorHub {
        &self.hub
    }

    pub fn session(&self) -> &LogSession {
        &self.session
    }

    pub fn detect_availability(&self) -> SensorState {
        self.hub.detect_availability()
    }

    /// Request sensor permissions and initialise the log target
    pub async fn request_permissions(&self) -> Result<SensorState> {
        let granted = self.hub.request_permissions();
        self.session.prepare().await?;
        Ok(granted)
    }

    /// Start with the configured interval
    pub async fn start_logging(&self, active_sensors: SensorState) -> Result<SessionMetadata> {
        self.start_logging_at(self.config.interval_ms, active_sensors)
            .await
    }

    pub async fn start_logging_at(
        &self,
        interval_ms: u64,
        active_sensors: SensorState,
    ) -> Result<SessionMetadata> {
        self.session.start(interval_ms, active_sensors).await
    }

    pub async fn stop_logging(&self) -> Result<bool> {
        self.session.stop().await
    }

    pub async fn state(&self) -> SessionState {
        self.session.state().await
    }

    pub async fn share_log_file(&self) -> ExportOutcome {
        if let Err(e) = self.session.prepare().await {
            return ExportOutcome::Failed(e.to_string());
        }
        let target = self.share.clone();
        let path = self.session.artifact_path();
        let handle = tokio::task::spawn_blocking(move || {
            share::export(target.as_deref(), path.as_deref())
        });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => ExportOutcome::Failed(e.to_string()),
        }
    }

    pub async fn clear_log_file(&self) -> Result<()> {
        self.session.clear().await
    }
}
