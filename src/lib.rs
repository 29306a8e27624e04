//! Multi-sensor acquisition and CSV logging, plus an airspeed/wind estimator.

pub mod error;
pub mod filters;
pub mod format;
pub mod logger;
pub mod sensors;
pub mod session;
pub mod settings;
pub mod share;
pub mod storage;
pub mod types;

pub use error::{EstimatorError, LoggerError, Result};
pub use filters::wind_estimator::{
    AirflowAngles, ObservationModel, WindEstimate, WindEstimator, WindEstimatorConfig,
};
pub use logger::{LoggerConfig, SensorLogger};
pub use sensors::{SensorBackend, SensorHub, SyntheticBackend};
pub use session::{LogSession, SessionMetadata, SessionState};
pub use share::{DirectoryShare, ExportOutcome, ShareTarget};
pub use storage::LogTarget;
pub use types::{Attitude, Ned, SensorKind, SensorState};
